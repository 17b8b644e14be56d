// Model artifact: JSON blob holding the layer parameters
// Trainer writes it, Detector reads it back and checks the topology

use crate::autoencoder::{Activation, Autoencoder, Dense};
use crate::error::{DetectionError, TrainingError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

pub const MODEL_FORMAT: &str = "logguard-autoencoder";
pub const MODEL_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerParams {
    pub inputs: usize,
    pub outputs: usize,
    pub activation: Activation,
    pub weights: Vec<f64>,
    pub bias: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format: String,
    pub version: u32,
    pub input_dim: usize,
    pub layers: Vec<LayerParams>,
}

impl ModelArtifact {
    pub fn from_model(model: &Autoencoder) -> Self {
        Self {
            format: MODEL_FORMAT.to_string(),
            version: MODEL_VERSION,
            input_dim: model.input_dim(),
            layers: model
                .layers()
                .iter()
                .map(|l| LayerParams {
                    inputs: l.inputs,
                    outputs: l.outputs,
                    activation: l.activation,
                    weights: l.weights.clone(),
                    bias: l.bias.clone(),
                })
                .collect(),
        }
    }

    pub fn into_model(self) -> Result<Autoencoder, DetectionError> {
        if self.format != MODEL_FORMAT {
            return Err(DetectionError::Malformed(format!(
                "unknown format '{}'",
                self.format
            )));
        }
        if self.version != MODEL_VERSION {
            return Err(DetectionError::Malformed(format!(
                "unsupported version {}",
                self.version
            )));
        }

        let input_dim = self.input_dim;
        let layers = self
            .layers
            .into_iter()
            .map(|p| Dense {
                inputs: p.inputs,
                outputs: p.outputs,
                weights: p.weights,
                bias: p.bias,
                activation: p.activation,
            })
            .collect();
        let model = Autoencoder::from_layers(layers).map_err(DetectionError::Malformed)?;

        if model.input_dim() != input_dim {
            return Err(DetectionError::Malformed(format!(
                "declared input_dim {} but layers take {}",
                input_dim,
                model.input_dim()
            )));
        }
        Ok(model)
    }
}

pub fn save_model<P: AsRef<Path>>(model: &Autoencoder, path: P) -> Result<(), TrainingError> {
    let path = path.as_ref();
    if !model.is_finite() {
        return Err(TrainingError::NonFiniteParameters);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| TrainingError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let bytes = serde_json::to_vec_pretty(&ModelArtifact::from_model(model))?;
    fs::write(path, bytes).map_err(|source| TrainingError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    info!(path = %path.display(), parameters = model.parameter_count(), "Model saved");
    Ok(())
}

pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Autoencoder, DetectionError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DetectionError::NotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path).map_err(|source| DetectionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let artifact: ModelArtifact =
        serde_json::from_slice(&bytes).map_err(|e| DetectionError::Malformed(e.to_string()))?;
    artifact.into_model()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_creates_directories_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("nested").join("autoencoder.json");

        let model = Autoencoder::seeded(6, 3);
        save_model(&model, &path).unwrap();
        assert!(path.exists());

        // shortest round-trip float formatting keeps bits
        assert_eq!(load_model(&path).unwrap(), model);
    }

    #[test]
    fn test_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_model(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, DetectionError::NotFound(_)));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, b"not json at all").unwrap();
        assert!(matches!(load_model(&path), Err(DetectionError::Malformed(_))));
    }

    #[test]
    fn test_truncated_weights_are_malformed() {
        let mut artifact = ModelArtifact::from_model(&Autoencoder::seeded(5, 1));
        artifact.layers[2].weights.pop();
        assert!(matches!(artifact.into_model(), Err(DetectionError::Malformed(_))));
    }

    #[test]
    fn test_wrong_version() {
        let mut artifact = ModelArtifact::from_model(&Autoencoder::seeded(5, 1));
        artifact.version = 99;
        assert!(matches!(artifact.into_model(), Err(DetectionError::Malformed(_))));
    }
}
