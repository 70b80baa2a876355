//! Score distributions and arg-max selection.

use serde::Serialize;

/// A single `(label, confidence)` outcome.
///
/// The confidence scale depends on the producer: the audio classifier
/// reports a probability in `[0, 1]`, the face model a percentage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
}

impl Prediction {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Per-class scores in model output order.
///
/// Kept as a vector rather than a map so ties resolve to the class that
/// appears first, which is the order the network's output layer defines.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmotionScores {
    entries: Vec<(String, f32)>,
}

impl EmotionScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair labels with scores positionally. Extra entries on either side are dropped.
    pub fn from_labels(labels: &[String], scores: &[f32]) -> Self {
        let mut out = Self::new();
        for (label, score) in labels.iter().zip(scores) {
            out.push(label.clone(), *score);
        }
        out
    }

    pub fn push(&mut self, label: impl Into<String>, score: f32) {
        self.entries.push((label.into(), score));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.entries.iter().map(|(label, score)| (label.as_str(), *score))
    }

    /// Label with the highest score. NaN scores never win.
    /// Returns `None` for an empty (or all-NaN) distribution.
    pub fn argmax(&self) -> Option<Prediction> {
        let mut best: Option<&(String, f32)> = None;
        for entry in &self.entries {
            if entry.1.is_nan() {
                continue;
            }
            match best {
                Some((_, best_score)) if entry.1 <= *best_score => {}
                _ => best = Some(entry),
            }
        }
        best.map(|(label, score)| Prediction::new(label.clone(), *score))
    }

    /// Entries sorted by descending score.
    pub fn ranked(&self) -> Vec<(&str, f32)> {
        let mut ranked: Vec<(&str, f32)> = self.iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

impl FromIterator<(String, f32)> for EmotionScores {
    fn from_iter<I: IntoIterator<Item = (String, f32)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Round to two decimal places, the precision the API reports.
pub fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

/// Convert a `[0, 1]` probability to a percentage clamped to `[0, 100]`.
pub fn to_percentage(probability: f32) -> f32 {
    round2(probability * 100.0).clamp(0.0, 100.0)
}
