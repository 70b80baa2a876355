//! # HTTP Handlers
//!
//! Route table for the whole service. Status endpoints live in `crate::health`,
//! the upload endpoints in [`analysis`].

pub mod analysis;

pub use analysis::{analyze_audio, analyze_batch_images, analyze_image};

use crate::health;
use actix_web::web;

/// Register every route on `cfg`. Shared by `main` and the handler tests.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(health::root))
        .route("/health", web::get().to(health::health_check))
        .route("/metrics", web::get().to(health::detailed_metrics))
        .service(
            web::scope("/analyze")
                .route("/audio", web::post().to(analyze_audio))
                .route("/image", web::post().to(analyze_image))
                .route("/batch-images", web::post().to(analyze_batch_images)),
        );
}
