//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix, `__` between sections)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platforms set these)
//! 2. Environment variables (APP_SERVER__PORT, APP_MODELS__DEVICE, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main application configuration that contains all settings.
///
/// Settings are grouped by concern so each part of the service only
/// needs to look at its own section:
/// - `server`: where to listen
/// - `models`: which weights to load and how to label their outputs
/// - `audio`: how uploaded audio is turned into a spectrogram
/// - `uploads`: limits and staging location for uploaded files
/// - `cors`: which browser origins may call the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub audio: AudioConfig,
    pub uploads: UploadConfig,
    pub cors: CorsConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address to bind (`0.0.0.0` accepts connections from anywhere)
/// - `port`: TCP port number to listen on
/// - `workers`: number of actix worker threads; `None` means one per core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub workers: Option<usize>,
}

/// Model weights and label sets.
///
/// The label lists are positional: entry `i` names output logit `i` of the
/// corresponding network, so they must match the order used at training time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub audio_model_path: PathBuf,
    pub image_model_path: PathBuf,
    pub audio_labels: Vec<String>,
    pub image_labels: Vec<String>,
    /// Compute device preference: "auto", "cpu", "cuda" or "metal"
    pub device: String,
}

/// Spectrogram parameters for the audio classifier.
///
/// ## Fields:
/// - `sample_rate`: audio is resampled to this rate before analysis
/// - `n_fft`: FFT window size in samples
/// - `hop_length`: distance between successive windows in samples
/// - `n_mels`: number of mel bands (height of the network input)
/// - `max_frames`: spectrogram width; longer clips are truncated, shorter ones padded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub max_frames: usize,
}

/// Upload limits and staging location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum number of images accepted by the batch endpoint
    pub max_batch_size: usize,
    /// Maximum size of a single uploaded file in bytes
    pub max_file_size_bytes: usize,
    /// Directory for staged temp files; the system temp dir when unset
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

/// Provides default configuration values.
///
/// ## Why defaults matter:
/// The service must be able to start with no config file at all. The model
/// paths point at the conventional `models/` directory; if the weights are
/// not there the service still starts and reports the model as not loaded.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                workers: None,
            },
            models: ModelsConfig {
                audio_model_path: PathBuf::from("models/best_emotion_model.safetensors"),
                image_model_path: PathBuf::from("models/face_emotion_model.safetensors"),
                audio_labels: to_strings(&[
                    "neutral", "calm", "happy", "sad", "angry", "fearful", "disgust", "surprised",
                ]),
                image_labels: to_strings(&[
                    "angry", "disgust", "fear", "happy", "sad", "surprise", "neutral",
                ]),
                device: "auto".to_string(),
            },
            audio: AudioConfig {
                sample_rate: 16000,
                n_fft: 512,
                hop_length: 256,
                n_mels: 64,
                max_frames: 128,
            },
            uploads: UploadConfig {
                max_batch_size: 10,
                max_file_size_bytes: 25 * 1024 * 1024, // 25 MiB
                temp_dir: None,
            },
            cors: CorsConfig {
                // Vite dev server
                allowed_origins: to_strings(&["http://localhost:5173", "http://127.0.0.1:5173"]),
            },
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and PORT environment variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=9000`: Override server port
    /// - `APP_MODELS__DEVICE=cpu`: Force CPU inference
    /// - `APP_UPLOADS__MAX_BATCH_SIZE=5`: Shrink the batch limit
    /// - `APP_CORS__ALLOWED_ORIGINS=https://a.example,https://b.example`
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors.allowed_origins")
                    .with_list_parse_key("models.audio_labels")
                    .with_list_parse_key("models.image_labels")
                    .try_parsing(true),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Catching these at startup gives a clear message instead of a
    /// confusing failure on the first request.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.server.workers == Some(0) {
            return Err(anyhow::anyhow!("Worker count must be greater than 0"));
        }

        if self.uploads.max_batch_size == 0 {
            return Err(anyhow::anyhow!("Max batch size must be greater than 0"));
        }

        if self.uploads.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!("Max file size must be greater than 0"));
        }

        if self.models.audio_labels.is_empty() || self.models.image_labels.is_empty() {
            return Err(anyhow::anyhow!("Model label lists cannot be empty"));
        }

        let audio = &self.audio;
        if audio.sample_rate == 0
            || audio.n_fft == 0
            || audio.hop_length == 0
            || audio.n_mels == 0
            || audio.max_frames == 0
        {
            return Err(anyhow::anyhow!("Audio feature parameters must be greater than 0"));
        }

        if audio.hop_length > audio.n_fft {
            return Err(anyhow::anyhow!(
                "Audio hop length ({}) cannot exceed the FFT size ({})",
                audio.hop_length,
                audio.n_fft
            ));
        }

        self.models
            .device
            .parse::<crate::device::DevicePreference>()
            .map_err(|e| anyhow::anyhow!(e))?;

        Ok(())
    }
}
