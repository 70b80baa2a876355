//! # Face Emotion Model
//!
//! Classifies facial expressions in still images. The image is converted to
//! grayscale, center-cropped to a square and resized to 48×48 before being
//! fed to the network. Scores are reported as percentages (0–100).
//!
//! The adapter functions at the bottom are what the HTTP layer uses: any
//! model failure collapses to "no prediction", which the API reports as
//! "no face detected".

use crate::emotion::network::EmotionCnn;
use crate::emotion::scores::{EmotionScores, Prediction};
use crate::emotion::FaceEmotionModel;
use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use image::imageops::{self, FilterType};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Input resolution of the face network
pub const FACE_SIZE: u32 = 48;

const FACE_CHANNELS: [usize; 3] = [32, 64, 128];

/// Extensions `predict_folder` treats as images
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff"];

pub struct FaceEmotionCnn {
    net: EmotionCnn,
    labels: Vec<String>,
    device: Device,
}

impl FaceEmotionCnn {
    pub fn load(path: &Path, labels: Vec<String>, device: Device) -> Result<Self> {
        if !path.is_file() {
            return Err(anyhow!("Model file not found: {}", path.display()));
        }

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, &device)? };
        Self::from_var_builder(vb, labels, device)
            .with_context(|| format!("Failed to load face emotion model from {}", path.display()))
    }

    pub fn from_var_builder(vb: VarBuilder, labels: Vec<String>, device: Device) -> Result<Self> {
        let net = EmotionCnn::new(vb, FACE_CHANNELS, labels.len())?;
        Ok(Self { net, labels, device })
    }

    fn preprocess(&self, path: &Path) -> Result<Tensor> {
        // Uploads keep the client's extension, which may not match the bytes
        let gray = image::ImageReader::open(path)
            .with_context(|| format!("Failed to open image {}", path.display()))?
            .with_guessed_format()?
            .decode()
            .with_context(|| format!("Failed to decode image {}", path.display()))?
            .to_luma8();

        let (width, height) = gray.dimensions();
        if width == 0 || height == 0 {
            return Err(anyhow!("Image has no pixels"));
        }

        let side = width.min(height);
        let square = imageops::crop_imm(&gray, (width - side) / 2, (height - side) / 2, side, side).to_image();
        let face = imageops::resize(&square, FACE_SIZE, FACE_SIZE, FilterType::Triangle);

        let pixels: Vec<f32> = face.into_raw().into_iter().map(|p| p as f32 / 255.0).collect();
        Ok(Tensor::from_vec(
            pixels,
            (1, 1, FACE_SIZE as usize, FACE_SIZE as usize),
            &self.device,
        )?)
    }
}

impl FaceEmotionModel for FaceEmotionCnn {
    fn predict(&self, path: &Path) -> Result<EmotionScores> {
        let input = self.preprocess(path)?;
        let probs = self.net.probabilities(&input)?;
        let percentages: Vec<f32> = probs.iter().map(|p| p * 100.0).collect();
        Ok(EmotionScores::from_labels(&self.labels, &percentages))
    }
}

/// Best label and its score, or `None` if the model could not classify the image.
pub fn predict_with_confidence(model: &dyn FaceEmotionModel, path: &Path) -> Option<Prediction> {
    match model.predict(path) {
        Ok(scores) if scores.is_empty() => {
            tracing::warn!(path = %path.display(), "Face emotion model returned no scores");
            None
        }
        Ok(scores) => {
            tracing::debug!(classes = scores.len(), ranked = ?scores.ranked(), "Face emotion scores");
            scores.argmax()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %format!("{:#}", e), "Face emotion prediction failed");
            None
        }
    }
}

/// Top label for each path, in input order.
pub fn predict_many(model: &dyn FaceEmotionModel, paths: &[PathBuf]) -> Vec<Option<String>> {
    paths
        .iter()
        .enumerate()
        .map(|(i, path)| {
            tracing::debug!("Processing image {}/{}: {}", i + 1, paths.len(), path.display());
            predict_with_confidence(model, path).map(|p| p.label)
        })
        .collect()
}

/// Top label for every image in `dir`, keyed by file name.
pub fn predict_folder(model: &dyn FaceEmotionModel, dir: &Path) -> Result<BTreeMap<String, Option<String>>> {
    let mut images: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    images.sort();

    tracing::info!("Found {} images in {}", images.len(), dir.display());

    let labels = predict_many(model, &images);
    Ok(images
        .iter()
        .zip(labels)
        .filter_map(|(path, label)| {
            path.file_name()
                .map(|name| (name.to_string_lossy().into_owned(), label))
        })
        .collect())
}
