// Error types for record IO and traffic generation

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("data file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record at line {line}: {reason}")]
    Malformed { line: u64, reason: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("generator '{name}' failed: {reason}")]
    Failed { name: String, reason: String },

    #[error(transparent)]
    Record(#[from] RecordError),
}
