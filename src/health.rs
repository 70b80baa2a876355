//! # Status Endpoints
//!
//! - `GET /` - short banner with model availability and the endpoint list
//! - `GET /health` - process, model and upload status for load balancers and operators
//! - `GET /metrics` - request and prediction counters
//!
//! None of these touch the models; they only read the registry and metrics.

use crate::emotion::ModelType;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::collections::BTreeMap;

pub async fn root(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "message": "Emotion Recognition API",
        "status": "running",
        "audio_model": state.models.audio.status_label(),
        "image_model": state.models.image.status_label(),
        "endpoints": {
            "audio": "POST /analyze/audio",
            "image": "POST /analyze/image",
            "batch_images": "POST /analyze/batch-images",
            "health": "GET /health",
            "metrics": "GET /metrics"
        }
    }))
}

/// Health report.
///
/// The service counts as healthy while it is serving requests, even when a
/// model failed to load; the per-model status says which endpoints will 503.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = &state.config;
    let models = &state.models;

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "audio_model_status": models.audio.status_label(),
        "image_model_status": models.image.status_label(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "device": models.device,
        "models": {
            "audio": models.audio.summary(),
            "image": models.image.summary()
        },
        "uploads": {
            "staging_dir": state.staging_dir().display().to_string(),
            "max_batch_size": config.uploads.max_batch_size,
            "max_file_size_bytes": config.uploads.max_file_size_bytes
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate()
        },
        "memory": memory_info()
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoints: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms()
            })
        })
        .collect();
    endpoints.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    // Sorted so the output is stable between calls
    let distribution = |model: ModelType| -> BTreeMap<String, u64> {
        metrics
            .emotion_counts
            .get(&model)
            .map(|counts| counts.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default()
    };

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": metrics.error_rate(),
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "endpoints": endpoints,
        "predictions": {
            "audio_cnn": distribution(ModelType::AudioCnn),
            "deepface": distribution(ModelType::FaceEmotion)
        },
        "no_face_count": metrics.no_face_count,
        "failed_analyses": metrics.failed_analyses
    }))
}

/// Resident and virtual memory of this process, from `/proc` on Linux.
fn memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            let field_bytes = |key: &str| -> u64 {
                status
                    .lines()
                    .find(|line| line.starts_with(key))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<u64>().ok())
                    .map(|kb| kb * 1024)
                    .unwrap_or(0)
            };
            return json!({
                "resident_memory_bytes": field_bytes("VmRSS:"),
                "virtual_memory_bytes": field_bytes("VmSize:"),
                "available": true
            });
        }
    }

    json!({ "available": false })
}
