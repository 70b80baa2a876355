//! # Application State Management
//!
//! State shared by every HTTP request handler.
//!
//! ## What is shared and how:
//! - **config** and **models** are read-only after startup, so they sit behind
//!   a plain `Arc`. Handlers clone the `Arc` of the model they need and hand it
//!   to the blocking pool; nothing ever takes a lock on the inference path.
//! - **metrics** change on every request and live behind `Arc<RwLock<_>>`.
//!   Locks are held only for the duration of a counter update.

use crate::config::AppConfig;
use crate::emotion::{ModelRegistry, ModelType};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub models: Arc<ModelRegistry>,
    pub metrics: Arc<RwLock<AppMetrics>>,
    pub start_time: Instant,
}

/// Counters collected across all requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,

    /// Key: endpoint pattern (e.g. "POST /analyze/image")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,

    /// Predicted labels per model, e.g. deepface → {happy: 12, sad: 3}
    pub emotion_counts: HashMap<ModelType, HashMap<String, u64>>,

    /// Images the face model could not classify
    pub no_face_count: u64,

    /// Analyses that failed with an internal error
    pub failed_analyses: u64,
}

#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(config: AppConfig, models: ModelRegistry) -> Self {
        Self {
            config: Arc::new(config),
            models: Arc::new(models),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Directory uploads are staged in.
    pub fn staging_dir(&self) -> PathBuf {
        self.config
            .uploads
            .temp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    fn with_metrics<R>(&self, update: impl FnOnce(&mut AppMetrics) -> R) -> R {
        // Counters stay usable even if a writer panicked
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut metrics)
    }

    pub fn increment_request_count(&self) {
        self.with_metrics(|m| m.request_count += 1);
    }

    pub fn increment_error_count(&self) {
        self.with_metrics(|m| m.error_count += 1);
    }

    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        self.with_metrics(|m| {
            let metric = m.endpoint_metrics.entry(endpoint.to_string()).or_default();
            metric.request_count += 1;
            metric.total_duration_ms += duration_ms;
            if is_error {
                metric.error_count += 1;
            }
        });
    }

    pub fn record_prediction(&self, model: ModelType, label: &str) {
        self.with_metrics(|m| {
            *m.emotion_counts
                .entry(model)
                .or_default()
                .entry(label.to_string())
                .or_default() += 1;
        });
    }

    pub fn record_no_face(&self) {
        self.with_metrics(|m| m.no_face_count += 1);
    }

    pub fn record_failed_analysis(&self) {
        self.with_metrics(|m| m.failed_analyses += 1);
    }

    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl AppMetrics {
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
