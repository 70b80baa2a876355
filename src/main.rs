//! # Emotion Recognition API - Main Application Entry Point
//!
//! HTTP service that classifies the emotion in an uploaded voice clip or face
//! image.
//!
//! ## Application Architecture:
//! - **config**: configuration (defaults, `config.toml`, environment variables)
//! - **device**: picks the compute device the models run on
//! - **emotion**: the two predictors, feature extraction and the model registry
//! - **upload**: multipart parsing and scoped temp files
//! - **handlers**: route table and the analysis endpoints
//! - **health**: status and metrics endpoints
//! - **middleware**: per-endpoint metrics
//! - **state**: shared, read-mostly application state
//! - **error**: error kinds and their HTTP responses
//!
//! ## Startup order:
//! 1. Load `.env`, set up tracing
//! 2. Load and validate configuration
//! 3. Load both models once. A model that fails to load is reported and its
//!    endpoints answer 503; the server still starts.
//! 4. Serve until SIGINT/SIGTERM, then stop gracefully
//!
//! `emotion-api predict-folder <dir>` skips the server and prints the top
//! face emotion for every image in `<dir>` as JSON.

mod config;
mod device;
mod emotion;
mod error;
mod handlers;
mod health;
mod middleware;
mod state;
mod upload;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use crate::config::{AppConfig, CorsConfig};
use emotion::ModelRegistry;
use state::AppState;
use std::path::Path;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting emotion-api v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    if let Some(dir) = &config.uploads.temp_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create upload staging directory {}", dir.display()))?;
    }

    let mut args = std::env::args().skip(1);
    if args.next().as_deref() == Some("predict-folder") {
        let dir = args.next().context("Usage: emotion-api predict-folder <dir>")?;
        return predict_folder(&config, Path::new(&dir));
    }

    let models = ModelRegistry::load(&config);
    if !models.audio.is_loaded() {
        warn!("Audio emotion model unavailable; /analyze/audio will return 503");
    }
    if !models.image.is_loaded() {
        warn!("Image emotion model unavailable; image endpoints will return 503");
    }

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let workers = config.server.workers;
    let app_state = AppState::new(config, models);

    info!("Starting HTTP server on {}", bind_addr);

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // Last wrapped runs first
            .wrap(middleware::MetricsMiddleware)
            .wrap(TracingLogger::default())
            .wrap(build_cors(&app_state.config.cors))
            .configure(handlers::configure_routes)
    })
    .disable_signals();

    if let Some(workers) = workers {
        server = server.workers(workers);
    }

    let server = server.bind(&bind_addr)?.run();
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
            }
        }
        signal = shutdown_signal() => {
            match signal {
                Ok(name) => info!("Received {}, stopping server...", name),
                Err(e) => error!("Signal handling failed, stopping server: {}", e),
            }
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

fn predict_folder(config: &AppConfig, dir: &Path) -> Result<()> {
    let models = ModelRegistry::load(config);
    let model = models
        .image
        .get()
        .context("Image emotion model failed to load; see the log above")?;

    let results = emotion::image::predict_folder(model.as_ref(), dir)?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

/// Log filter comes from `RUST_LOG`, defaulting to
/// `emotion_api=debug,actix_web=info`.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "emotion_api=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

fn build_cors(config: &CorsConfig) -> Cors {
    let mut cors = Cors::default()
        .allow_any_method()
        .allow_any_header()
        .max_age(3600);

    if config.allowed_origins.iter().any(|origin| origin == "*") {
        // Credentials cannot be combined with a wildcard origin
        cors = cors.allow_any_origin();
    } else {
        for origin in &config.allowed_origins {
            cors = cors.allowed_origin(origin);
        }
        cors = cors.supports_credentials();
    }

    cors
}

/// Resolves with the name of the first termination signal received.
#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl+C")
}
