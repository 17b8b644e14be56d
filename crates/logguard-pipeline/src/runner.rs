// Pipeline runner: sequences the stages of one run on a dedicated task
// generate -> extract -> train -> detect -> alert -> export, then record history

use crate::alerting::{AlertDispatcher, AlertMessage};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::export::export_results;
use crate::history::{RunHistory, RunHistoryRecord};
use crate::notify::{notifier_from_config, Notifier};
use crate::state::{PipelineStage, RunState, RunStateHandle};
use chrono::Utc;
use logguard_core::{
    load_records, write_records, FeatureExtractor, LogRecord, SyntheticTraffic, TrafficGenerator,
};
use logguard_model::{Detector, RunResult, Trainer, TrainingError, TrainingReport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::{self, JoinHandle};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub anomalies_count: usize,
    pub total_samples: usize,
    pub anomaly_rate: f64,
    pub flagged: Vec<usize>,
    pub training: TrainingReport,
    pub result_path: Option<PathBuf>,
    pub elapsed_ms: u128,
}

/// A started run. Await [`RunHandle::wait`] for its outcome.
pub struct RunHandle {
    pub run_id: Uuid,
    handle: JoinHandle<Result<RunSummary, PipelineError>>,
}

impl RunHandle {
    pub async fn wait(self) -> Result<RunSummary, PipelineError> {
        self.handle
            .await
            .map_err(|e| PipelineError::Worker(e.to_string()))?
    }
}

pub struct PipelineRunner {
    config: PipelineConfig,
    state: RunStateHandle,
    generator: Arc<dyn TrafficGenerator>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl PipelineRunner {
    pub fn new(config: PipelineConfig) -> Self {
        let notifier = notifier_from_config(&config.notification);
        Self {
            config,
            state: RunStateHandle::new(),
            generator: Arc::new(SyntheticTraffic::default()),
            notifier,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn TrafficGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> RunStateHandle {
        self.state.clone()
    }

    pub fn status(&self) -> RunState {
        self.state.snapshot()
    }

    /// Start a run in the background. Rejected while another run is active.
    pub fn start(&self) -> Result<RunHandle, PipelineError> {
        let run_id = Uuid::new_v4();
        self.state.try_begin(run_id)?;

        let run = PipelineRun {
            run_id,
            config: self.config.clone(),
            state: self.state.clone(),
            generator: self.generator.clone(),
            notifier: self.notifier.clone(),
        };
        info!(run_id = %run_id, "Pipeline run started");

        let handle = tokio::spawn(run.execute());
        Ok(RunHandle { run_id, handle })
    }

    /// Start and wait for the outcome.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        self.start()?.wait().await
    }

    /// Cooperative stop, honoured at the next stage transition or training epoch.
    pub fn request_stop(&self) -> Result<(), PipelineError> {
        self.state.request_stop()?;
        info!("Stop requested");
        Ok(())
    }
}

// everything one run needs, moved onto its task
struct PipelineRun {
    run_id: Uuid,
    config: PipelineConfig,
    state: RunStateHandle,
    generator: Arc<dyn TrafficGenerator>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl PipelineRun {
    async fn execute(self) -> Result<RunSummary, PipelineError> {
        let history = RunHistory::new(&self.config.history_path);
        let outcome = self.stages().await;

        let record = match &outcome {
            Ok(summary) => {
                self.state
                    .finish_success(summary.anomalies_count, summary.total_samples);
                info!(
                    run_id = %self.run_id,
                    anomalies = summary.anomalies_count,
                    total = summary.total_samples,
                    elapsed_ms = summary.elapsed_ms as u64,
                    "Pipeline run completed"
                );
                RunHistoryRecord::success(Utc::now(), summary.anomalies_count, summary.total_samples)
            }
            Err(e) => {
                self.state.finish_failure(e);
                error!(run_id = %self.run_id, error = %e, "Pipeline run failed");
                RunHistoryRecord::failure(Utc::now())
            }
        };

        if let Err(e) = history.append(record) {
            warn!(run_id = %self.run_id, error = %e, "Failed to record run history");
        }
        outcome
    }

    async fn stages(&self) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();
        let config = &self.config;

        // GENERATING //
        self.state
            .advance(PipelineStage::Generating, "Generating synthetic traffic")?;
        if config.generate_synthetic {
            let generator = self.generator.clone();
            let data_path = config.data_path.clone();
            let count = blocking(move || -> Result<usize, PipelineError> {
                let records = generator.generate()?;
                write_records(&data_path, &records)?;
                Ok(records.len())
            })
            .await??;
            info!(generator = self.generator.name(), count, "Synthetic traffic written");
        }

        // EXTRACTING //
        self.state
            .advance(PipelineStage::Extracting, "Extracting features")?;
        let data_path = config.data_path.clone();
        let (records, matrix) = blocking(move || -> Result<_, PipelineError> {
            let records = load_records(&data_path)?;
            let matrix = FeatureExtractor::new().extract(&records);
            Ok((records, matrix))
        })
        .await??;
        let total = records.len();

        // TRAINING //
        self.state
            .advance(PipelineStage::Training, "Training reconstruction model")?;
        let trainer = Trainer::new(config.trainer_config());
        let model_path = config.model_path.clone();
        let state = self.state.clone();
        let (matrix, training) = blocking(move || {
            let trained = trainer
                .fit_with_cancel(&matrix, || state.should_stop())
                .map_err(|e| match e {
                    TrainingError::Cancelled { .. } => PipelineError::Stopped(PipelineStage::Detecting),
                    other => other.into(),
                })?;
            trained.save(&model_path)?;
            Ok::<_, PipelineError>((matrix, trained.report))
        })
        .await??;

        // DETECTING //
        self.state
            .advance(PipelineStage::Detecting, "Detecting anomalies")?;
        let model_path = config.model_path.clone();
        let threshold = config.threshold;
        let result: RunResult = blocking(move || -> Result<_, PipelineError> {
            let detector = Detector::load(&model_path, threshold)?;
            Ok(detector.detect(&matrix)?)
        })
        .await??;
        let anomalies = result.anomaly_count();
        let flagged = result.flagged_indices();

        // ALERTING //
        self.state
            .advance(PipelineStage::Alerting, "Dispatching alerts")?;
        if anomalies > 0 {
            let mut dispatcher = AlertDispatcher::new(&config.alert_log_path);
            if let Some(notifier) = &self.notifier {
                dispatcher =
                    dispatcher.with_notifier(notifier.clone(), config.notification.attach_alert_log);
            }
            let message = AlertMessage::for_run(anomalies, total, config.threshold);
            let flagged_records: Vec<LogRecord> =
                flagged.iter().map(|i| records[*i].clone()).collect();

            let writer = dispatcher.clone();
            let log_message = message.clone();
            let (_, tail) = blocking(move || {
                let refs: Vec<&LogRecord> = flagged_records.iter().collect();
                writer.record(&log_message, &refs)
            })
            .await?;
            dispatcher.notify(&message, tail.as_deref()).await;
        }

        // EXPORTING //
        self.state
            .advance(PipelineStage::Exporting, "Exporting results")?;
        let anomaly_rate = result.anomaly_rate();
        let result_path = if config.export_results {
            let path = config.result_path();
            let target = path.clone();
            blocking(move || export_results(&result, &target)).await??;
            Some(path)
        } else {
            None
        };

        Ok(RunSummary {
            run_id: self.run_id,
            anomalies_count: anomalies,
            total_samples: total,
            anomaly_rate,
            flagged,
            training,
            result_path,
            elapsed_ms: started.elapsed().as_millis(),
        })
    }
}

// run CPU or file work on the blocking pool
async fn blocking<T, F>(f: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Worker(e.to_string()))
}
