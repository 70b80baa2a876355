//! Convolutional classifier shared by both modalities.
//!
//! Three conv blocks (3×3, padding 1, ReLU), max-pooling after the first
//! two, global average pooling, then a linear head. Weight names follow the
//! `conv1`, `conv2`, `conv3`, `fc` prefixes in the safetensors file.

use candle_core::{Module, Result, Tensor, D};
use candle_nn::{conv2d, linear, Conv2d, Conv2dConfig, Linear, VarBuilder};

pub struct EmotionCnn {
    conv1: Conv2d,
    conv2: Conv2d,
    conv3: Conv2d,
    fc: Linear,
    num_classes: usize,
}

impl EmotionCnn {
    /// `channels` are the output widths of the three conv blocks.
    pub fn new(vb: VarBuilder, channels: [usize; 3], num_classes: usize) -> Result<Self> {
        let cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };
        Ok(Self {
            conv1: conv2d(1, channels[0], 3, cfg, vb.pp("conv1"))?,
            conv2: conv2d(channels[0], channels[1], 3, cfg, vb.pp("conv2"))?,
            conv3: conv2d(channels[1], channels[2], 3, cfg, vb.pp("conv3"))?,
            fc: linear(channels[2], num_classes, vb.pp("fc"))?,
            num_classes,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Class probabilities for a single `[1, 1, H, W]` input.
    pub fn probabilities(&self, input: &Tensor) -> Result<Vec<f32>> {
        let logits = self.forward(input)?;
        let probs = candle_nn::ops::softmax(&logits, D::Minus1)?;
        let probs = probs.squeeze(0)?.to_vec1::<f32>()?;
        if probs.len() != self.num_classes() {
            candle_core::bail!("expected {} class scores, got {}", self.num_classes(), probs.len());
        }
        Ok(probs)
    }
}

impl Module for EmotionCnn {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = self.conv1.forward(xs)?.relu()?.max_pool2d(2)?;
        let xs = self.conv2.forward(&xs)?.relu()?.max_pool2d(2)?;
        let xs = self.conv3.forward(&xs)?.relu()?;
        // [B, C, H, W] -> [B, C]
        let xs = xs.mean(D::Minus1)?.mean(D::Minus1)?;
        self.fc.forward(&xs)
    }
}
