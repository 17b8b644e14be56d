//! Reconstruction model, training and detection
//!
//! Autoencoder `d -> 4 -> 2 -> 4 -> d`, trained full-batch with Adam on the
//! mean squared reconstruction error; rows whose error exceeds a threshold are anomalies.

pub mod artifact;
pub mod autoencoder;
pub mod detector;
pub mod error;
pub mod optimizer;
pub mod trainer;

pub use artifact::{load_model, save_model, ModelArtifact};
pub use autoencoder::{Activation, Autoencoder, Dense, HIDDEN_DIM, LATENT_DIM};
pub use detector::{flag_anomalies, Detector, RunResult, DEFAULT_THRESHOLD};
pub use error::{DetectionError, TrainingError};
pub use optimizer::Adam;
pub use trainer::{TrainedModel, Trainer, TrainerConfig, TrainingReport};
