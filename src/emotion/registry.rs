//! # Model Registry
//!
//! Holds the models loaded at process start together with their load status.
//! Loading happens exactly once; a model that fails to load stays unavailable
//! for the lifetime of the process and requests for it are rejected.
//!
//! ## State:
//! Each slot is either `Loaded` (with a shared, read-only model) or `Failed`
//! (with the error message for the health report). Nothing here is mutated
//! after startup, so handlers can read it without locking.

use crate::config::AppConfig;
use crate::device::{self, DevicePreference};
use crate::emotion::{AudioClassifier, AudioCnn, FaceEmotionCnn, FaceEmotionModel};
use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Outcome of the startup load.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ModelStatus {
    Loaded {
        /// RFC 3339 timestamp
        loaded_at: String,
        load_time_ms: u64,
    },
    Failed {
        message: String,
    },
}

/// A model that may or may not have loaded.
pub struct ModelSlot<T: ?Sized> {
    pub name: &'static str,
    pub path: PathBuf,
    pub status: ModelStatus,
    model: Option<Arc<T>>,
}

impl<T: ?Sized> ModelSlot<T> {
    pub fn loaded(name: &'static str, path: impl Into<PathBuf>, model: Arc<T>, load_time_ms: u64) -> Self {
        Self {
            name,
            path: path.into(),
            status: ModelStatus::Loaded {
                loaded_at: chrono::Utc::now().to_rfc3339(),
                load_time_ms,
            },
            model: Some(model),
        }
    }

    pub fn failed(name: &'static str, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            name,
            path: path.into(),
            status: ModelStatus::Failed {
                message: message.into(),
            },
            model: None,
        }
    }

    /// Run `loader`, recording the result. Never fails: a load error becomes a `Failed` slot.
    pub fn load_with<F>(name: &'static str, path: &Path, loader: F) -> Self
    where
        F: FnOnce() -> Result<Arc<T>>,
    {
        let start = Instant::now();
        match loader() {
            Ok(model) => {
                let elapsed = start.elapsed();
                info!(
                    model = name,
                    path = %path.display(),
                    load_time_ms = elapsed.as_millis() as u64,
                    "Model loaded successfully"
                );
                Self::loaded(name, path, model, elapsed.as_millis() as u64)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                error!(model = name, path = %path.display(), error = %message, "Failed to load model");
                Self::failed(name, path, message)
            }
        }
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.model.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// "loaded" / "not loaded", the wording the status endpoints use.
    pub fn status_label(&self) -> &'static str {
        if self.is_loaded() {
            "loaded"
        } else {
            "not loaded"
        }
    }

    pub fn summary(&self) -> serde_json::Value {
        json!({
            "name": self.name,
            "path": self.path.display().to_string(),
            "status": self.status_label(),
            "detail": self.status,
        })
    }
}

impl<T: ?Sized> std::fmt::Debug for ModelSlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSlot")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("status", &self.status)
            .finish()
    }
}

#[derive(Debug)]
pub struct ModelRegistry {
    pub audio: ModelSlot<dyn AudioClassifier>,
    pub image: ModelSlot<dyn FaceEmotionModel>,
    /// Device the models were loaded onto
    pub device: &'static str,
}

impl ModelRegistry {
    pub fn new(
        audio: ModelSlot<dyn AudioClassifier>,
        image: ModelSlot<dyn FaceEmotionModel>,
    ) -> Self {
        Self {
            audio,
            image,
            device: "cpu",
        }
    }

    /// Load both models described by `config`.
    pub fn load(config: &AppConfig) -> Self {
        let preference = config
            .models
            .device
            .parse::<DevicePreference>()
            .unwrap_or_default();
        let device = device::select_device(preference);

        let models = &config.models;
        let audio = ModelSlot::<dyn AudioClassifier>::load_with("audio_cnn", &models.audio_model_path, || {
            let model = AudioCnn::load(
                &models.audio_model_path,
                models.audio_labels.clone(),
                config.audio.clone(),
                device.clone(),
            )?;
            Ok(Arc::new(model) as Arc<dyn AudioClassifier>)
        });
        let image = ModelSlot::<dyn FaceEmotionModel>::load_with("face_emotion", &models.image_model_path, || {
            let model = FaceEmotionCnn::load(&models.image_model_path, models.image_labels.clone(), device.clone())?;
            Ok(Arc::new(model) as Arc<dyn FaceEmotionModel>)
        });

        Self {
            device: device::device_name(&device),
            ..Self::new(audio, image)
        }
    }
}
