//! # Emotion Models
//!
//! Predictor adapters for the two modalities the API serves.
//!
//! ## Key Components:
//! - **AudioClassifier**: audio file → `(label, probability)`
//! - **FaceEmotionModel**: image file → score per emotion (percentages)
//! - **Registry**: loads both models once at startup and records whether it worked
//!
//! Handlers only see the traits, so the candle implementations can be swapped
//! for fakes in tests.

pub mod audio;
pub mod features;
pub mod image;
pub mod network;
pub mod registry;
pub mod scores;

pub use self::audio::AudioCnn;
pub use self::image::{predict_with_confidence, FaceEmotionCnn};
pub use self::registry::ModelRegistry;
pub use self::scores::{round2, to_percentage, EmotionScores, Prediction};

use serde::Serialize;
use std::path::Path;

/// Which model produced a result. Serialized names are part of the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ModelType {
    #[serde(rename = "audio_cnn")]
    AudioCnn,
    #[serde(rename = "deepface")]
    FaceEmotion,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::AudioCnn => "audio_cnn",
            ModelType::FaceEmotion => "deepface",
        }
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audio emotion classifier. Confidence is a probability in `[0, 1]`.
pub trait AudioClassifier: Send + Sync {
    fn predict_file(&self, path: &Path) -> anyhow::Result<Prediction>;
}

/// Face emotion model returning the whole score distribution.
pub trait FaceEmotionModel: Send + Sync {
    fn predict(&self, path: &Path) -> anyhow::Result<EmotionScores>;
}
