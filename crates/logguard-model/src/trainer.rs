// Trainer: deterministic full-batch fitting of the autoencoder

use crate::artifact::save_model;
use crate::autoencoder::Autoencoder;
use crate::error::TrainingError;
use crate::optimizer::Adam;
use logguard_core::FeatureMatrix;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct TrainerConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    // re-applied at the start of every fit
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            learning_rate: 0.01,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub epochs_run: usize,
    pub samples: usize,
    // loss of the first / last epoch, None when no epoch ran
    pub initial_loss: Option<f64>,
    pub final_loss: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub model: Autoencoder,
    pub report: TrainingReport,
}

impl TrainedModel {
    /// Write the parameters to `path`, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TrainingError> {
        save_model(&self.model, path)
    }
}

pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn fit(&self, matrix: &FeatureMatrix) -> Result<TrainedModel, TrainingError> {
        self.fit_with_cancel(matrix, || false)
    }

    /// Fit, checking `should_stop` before every epoch. A running epoch always finishes.
    pub fn fit_with_cancel(
        &self,
        matrix: &FeatureMatrix,
        should_stop: impl Fn() -> bool,
    ) -> Result<TrainedModel, TrainingError> {
        let lr = self.config.learning_rate;
        if !lr.is_finite() || lr <= 0.0 {
            return Err(TrainingError::InvalidConfig(format!(
                "learning rate must be finite and positive, got {}",
                lr
            )));
        }
        if matrix.cols() == 0 {
            return Err(TrainingError::EmptySchema);
        }

        let mut model = Autoencoder::seeded(matrix.cols(), self.config.seed);
        let mut report = TrainingReport {
            epochs_run: 0,
            samples: matrix.rows(),
            initial_loss: None,
            final_loss: None,
        };

        if matrix.is_empty() {
            warn!("No samples to train on, keeping initial parameters");
            return Ok(TrainedModel { model, report });
        }

        let mut optimizer = Adam::new(lr);
        for epoch in 1..=self.config.epochs {
            if should_stop() {
                return Err(TrainingError::Cancelled { epoch });
            }

            let (loss, grads) = model.loss_and_gradients(matrix);
            if !loss.is_finite() {
                return Err(TrainingError::NonFiniteLoss { epoch, loss });
            }
            optimizer.step(&mut model.parameters_mut(), &grads);

            report.initial_loss.get_or_insert(loss);
            report.final_loss = Some(loss);
            report.epochs_run = epoch;

            if epoch % 10 == 0 {
                info!(epoch, epochs = self.config.epochs, loss, "Training progress");
            }
        }

        if !model.is_finite() {
            return Err(TrainingError::NonFiniteParameters);
        }

        debug!(
            samples = report.samples,
            initial_loss = ?report.initial_loss,
            final_loss = ?report.final_loss,
            "Training finished"
        );
        Ok(TrainedModel { model, report })
    }

    /// Fit and persist in one go.
    pub fn fit_and_save<P: AsRef<Path>>(
        &self,
        matrix: &FeatureMatrix,
        path: P,
    ) -> Result<TrainedModel, TrainingError> {
        let trained = self.fit(matrix)?;
        trained.save(path)?;
        Ok(trained)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn matrix() -> FeatureMatrix {
        FeatureMatrix::from_rows(
            4,
            &[
                vec![0.5, -0.5, 1.0, 0.0],
                vec![-1.0, 0.2, 0.3, 0.8],
                vec![0.1, 0.9, -0.7, -1.1],
            ],
        )
    }

    #[test]
    fn test_fit_is_deterministic() {
        let trainer = Trainer::new(TrainerConfig::default());
        let a = trainer.fit(&matrix()).unwrap();
        let b = trainer.fit(&matrix()).unwrap();
        assert_eq!(a.model, b.model);
        assert_eq!(a.report, b.report);
    }

    #[test]
    fn test_seed_changes_parameters() {
        let a = Trainer::new(TrainerConfig::default()).fit(&matrix()).unwrap();
        let b = Trainer::new(TrainerConfig {
            seed: 7,
            ..Default::default()
        })
        .fit(&matrix())
        .unwrap();
        assert_ne!(a.model, b.model);
    }

    #[test]
    fn test_loss_goes_down() {
        let trained = Trainer::new(TrainerConfig::default()).fit(&matrix()).unwrap();
        assert_eq!(trained.report.epochs_run, 50);
        assert!(trained.report.final_loss.unwrap() < trained.report.initial_loss.unwrap());
    }

    #[test]
    fn test_non_finite_input_is_training_error() {
        let bad = FeatureMatrix::from_rows(2, &[vec![f64::NAN, 1.0], vec![0.0, 1.0]]);
        let err = Trainer::new(TrainerConfig::default()).fit(&bad).unwrap_err();
        assert!(matches!(err, TrainingError::NonFiniteLoss { epoch: 1, .. }));
    }

    #[test]
    fn test_empty_matrix_keeps_init() {
        let trained = Trainer::new(TrainerConfig::default())
            .fit(&FeatureMatrix::empty(4))
            .unwrap();
        assert_eq!(trained.report.epochs_run, 0);
        assert_eq!(trained.model, Autoencoder::seeded(4, 42));
    }

    #[test]
    fn test_bad_learning_rate() {
        let trainer = Trainer::new(TrainerConfig {
            learning_rate: f64::NAN,
            ..Default::default()
        });
        assert!(matches!(
            trainer.fit(&matrix()),
            Err(TrainingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_cancel_between_epochs() {
        let calls = Cell::new(0);
        let trainer = Trainer::new(TrainerConfig::default());
        let result = trainer.fit_with_cancel(&matrix(), || {
            calls.set(calls.get() + 1);
            calls.get() > 3
        });
        // three epochs completed, stopped before the fourth
        assert!(matches!(result, Err(TrainingError::Cancelled { epoch: 4 })));
    }
}
