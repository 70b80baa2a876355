//! # Audio Emotion Classifier
//!
//! Loads the audio CNN from a safetensors file and classifies staged audio
//! files. Input is a `[1, 1, n_mels, max_frames]` log-mel spectrogram, output
//! is one probability per configured label.

use crate::config::AudioConfig;
use crate::emotion::features::LogMelExtractor;
use crate::emotion::network::EmotionCnn;
use crate::emotion::scores::{EmotionScores, Prediction};
use crate::emotion::AudioClassifier;
use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use std::path::Path;

const AUDIO_CHANNELS: [usize; 3] = [16, 32, 64];

pub struct AudioCnn {
    net: EmotionCnn,
    extractor: LogMelExtractor,
    labels: Vec<String>,
    device: Device,
}

impl AudioCnn {
    /// Load weights from `path`. Fails if the file is missing or does not
    /// contain the expected tensors for the given label count.
    pub fn load(path: &Path, labels: Vec<String>, audio: AudioConfig, device: Device) -> Result<Self> {
        if !path.is_file() {
            return Err(anyhow!("Model file not found: {}", path.display()));
        }

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, &device)? };
        Self::from_var_builder(vb, labels, audio, device)
            .with_context(|| format!("Failed to load audio model from {}", path.display()))
    }

    pub fn from_var_builder(
        vb: VarBuilder,
        labels: Vec<String>,
        audio: AudioConfig,
        device: Device,
    ) -> Result<Self> {
        let net = EmotionCnn::new(vb, AUDIO_CHANNELS, labels.len())?;
        Ok(Self {
            net,
            extractor: LogMelExtractor::new(audio),
            labels,
            device,
        })
    }

    /// Full distribution for an already-extracted spectrogram.
    pub fn classify(&self, features: Vec<f32>) -> Result<EmotionScores> {
        let config = self.extractor.config();
        let input = Tensor::from_vec(features, (1, 1, config.n_mels, config.max_frames), &self.device)?;
        let probs = self.net.probabilities(&input)?;
        Ok(EmotionScores::from_labels(&self.labels, &probs))
    }
}

impl AudioClassifier for AudioCnn {
    fn predict_file(&self, path: &Path) -> Result<Prediction> {
        let features = self.extractor.extract_file(path)?;
        let scores = self.classify(features)?;
        scores
            .argmax()
            .ok_or_else(|| anyhow!("Audio model produced no scores"))
    }
}
