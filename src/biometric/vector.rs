//! Descriptor arithmetic: normalization, similarity, score summaries

use crate::{Error, Result};

/// Check a raw descriptor before it reaches the matcher
pub fn validate(vector: &[f32], dimension: usize) -> Result<()> {
    if vector.len() != dimension {
        return Err(Error::invalid_input(format!(
            "Face descriptor must have {dimension} components, got {}",
            vector.len()
        )));
    }
    if let Some(index) = vector.iter().position(|x| !x.is_finite()) {
        return Err(Error::invalid_input(format!(
            "Face descriptor component {index} is not a finite number"
        )));
    }
    Ok(())
}

/// Scale to unit Euclidean length; a zero vector is returned unchanged
pub fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector
        .iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum::<f64>()
        .sqrt();

    if norm == 0.0 {
        return vector.to_vec();
    }

    vector
        .iter()
        .map(|x| (f64::from(*x) / norm) as f32)
        .collect()
}

/// Cosine similarity clamped to [-1, 1]; 0 for mismatched lengths or a zero vector
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0_f64;
    let mut norm_a = 0_f64;
    let mut norm_b = 0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let xf = f64::from(*x);
        let yf = f64::from(*y);
        dot += xf * yf;
        norm_a += xf * xf;
        norm_b += yf * yf;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

/// Summary of a set of pairwise scores
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreSummary {
    pub best: f32,
    pub median: f32,
    pub mean: f32,
    pub count: usize,
}

impl ScoreSummary {
    /// Zero scores for an empty set
    pub fn from_scores(scores: &[f32]) -> Self {
        if scores.is_empty() {
            return Self::default();
        }

        let mut sorted = scores.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len();
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };

        Self {
            best: sorted[n - 1],
            median,
            mean: sorted.iter().sum::<f32>() / n as f32,
            count: n,
        }
    }
}
