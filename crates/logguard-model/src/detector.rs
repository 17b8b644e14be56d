// Detector: score rows by reconstruction error and flag the ones above the threshold

use crate::artifact::load_model;
use crate::autoencoder::Autoencoder;
use crate::error::DetectionError;
use logguard_core::FeatureMatrix;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_THRESHOLD: f64 = 1.5;

/// Flags every loss strictly greater than `threshold`.
pub fn flag_anomalies(losses: &[f64], threshold: f64) -> Vec<bool> {
    losses.iter().map(|loss| *loss > threshold).collect()
}

/// Flags and losses for one run, index-aligned with the feature rows.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    anomalies: Vec<bool>,
    losses: Vec<f64>,
}

impl RunResult {
    pub fn from_losses(losses: Vec<f64>, threshold: f64) -> Self {
        Self {
            anomalies: flag_anomalies(&losses, threshold),
            losses,
        }
    }

    pub fn empty() -> Self {
        Self {
            anomalies: Vec::new(),
            losses: Vec::new(),
        }
    }

    pub fn anomalies(&self) -> &[bool] {
        &self.anomalies
    }

    pub fn losses(&self) -> &[f64] {
        &self.losses
    }

    pub fn total_samples(&self) -> usize {
        self.anomalies.len()
    }

    pub fn anomaly_count(&self) -> usize {
        self.anomalies.iter().filter(|a| **a).count()
    }

    /// Percentage of flagged rows, 0 for an empty result.
    pub fn anomaly_rate(&self) -> f64 {
        if self.total_samples() == 0 {
            0.0
        } else {
            self.anomaly_count() as f64 / self.total_samples() as f64 * 100.0
        }
    }

    pub fn flagged_indices(&self) -> Vec<usize> {
        self.anomalies
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.then_some(i))
            .collect()
    }
}

pub struct Detector {
    model: Autoencoder,
    threshold: f64,
}

impl Detector {
    pub fn new(model: Autoencoder, threshold: f64) -> Self {
        Self { model, threshold }
    }

    /// Load persisted parameters from `path`.
    pub fn load<P: AsRef<Path>>(path: P, threshold: f64) -> Result<Self, DetectionError> {
        let model = load_model(path)?;
        Ok(Self::new(model, threshold))
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn input_dim(&self) -> usize {
        self.model.input_dim()
    }

    /// Per-row mean squared reconstruction error.
    pub fn score(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, DetectionError> {
        if matrix.cols() != self.model.input_dim() {
            return Err(DetectionError::ShapeMismatch {
                expected: self.model.input_dim(),
                found: matrix.cols(),
            });
        }
        Ok(self.model.reconstruction_errors(matrix))
    }

    pub fn detect(&self, matrix: &FeatureMatrix) -> Result<RunResult, DetectionError> {
        let losses = self.score(matrix)?;

        if !losses.is_empty() {
            let min = losses.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = losses.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let mean = losses.iter().sum::<f64>() / losses.len() as f64;
            debug!(min, max, mean, threshold = self.threshold, "Reconstruction loss");
        }

        Ok(RunResult::from_losses(losses, self.threshold))
    }
}
