// Error taxonomy for the pipeline
// stage errors abort a run, alert dispatch errors are logged and swallowed

use crate::state::PipelineStage;
use logguard_core::{GenerateError, RecordError};
use logguard_model::{DetectionError, TrainingError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("invalid value for '{key}': {reason}")]
    OutOfRange { key: &'static str, reason: String },

    #[error("'{0}' must not be empty")]
    EmptyPath(&'static str),

    #[error("wrong type for '{key}': {reason}")]
    WrongType { key: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to write config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("result artifact not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed result artifact: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum AlertDispatchError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("webhook rejected the alert ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Records(#[from] RecordError),

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error("training failed: {0}")]
    Training(#[from] TrainingError),

    #[error("detection failed: {0}")]
    Detection(#[from] DetectionError),

    #[error("export failed: {0}")]
    Export(#[from] ExportError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("a pipeline run is already in progress")]
    AlreadyRunning,

    #[error("no pipeline run is in progress")]
    NotRunning,

    #[error("run stopped before {0}")]
    Stopped(PipelineStage),

    #[error("worker task failed: {0}")]
    Worker(String),
}
