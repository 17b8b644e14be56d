use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("invalid training config: {0}")]
    InvalidConfig(String),

    #[error("feature matrix has no columns")]
    EmptySchema,

    #[error("loss became non-finite ({loss}) at epoch {epoch}")]
    NonFiniteLoss { epoch: usize, loss: f64 },

    #[error("model parameters became non-finite after training")]
    NonFiniteParameters,

    #[error("training stopped before epoch {epoch}")]
    Cancelled { epoch: usize },

    #[error("failed to persist model to {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize model: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("model artifact not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read model from {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed model artifact: {0}")]
    Malformed(String),

    #[error("shape mismatch: model expects {expected} features, input has {found}")]
    ShapeMismatch { expected: usize, found: usize },
}
