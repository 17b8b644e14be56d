// Run state: one record behind one mutex, shared by handle
// readers always get a consistent clone

use crate::error::PipelineError;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Idle,
    Generating,
    Extracting,
    Training,
    Detecting,
    Alerting,
    Exporting,
    Completed,
    Failed,
}

impl PipelineStage {
    /// Progress percentage reported once the stage is entered.
    pub fn progress(self) -> u8 {
        match self {
            PipelineStage::Idle => 0,
            PipelineStage::Generating => 10,
            PipelineStage::Extracting => 30,
            PipelineStage::Training => 50,
            PipelineStage::Detecting => 70,
            PipelineStage::Alerting => 85,
            PipelineStage::Exporting => 95,
            PipelineStage::Completed => 100,
            // failed runs reset progress
            PipelineStage::Failed => 0,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Completed | PipelineStage::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Generating => "generating",
            PipelineStage::Extracting => "extracting",
            PipelineStage::Training => "training",
            PipelineStage::Detecting => "detecting",
            PipelineStage::Alerting => "alerting",
            PipelineStage::Exporting => "exporting",
            PipelineStage::Completed => "completed",
            PipelineStage::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub stage: PipelineStage,
    pub running: bool,
    pub run_id: Option<Uuid>,
    pub message: String,
    pub progress: u8,
    pub started_at: Option<DateTime<Utc>>,
    pub estimated_finish: Option<DateTime<Utc>>,

    // finish time and counts of the most recent run
    pub last_run: Option<DateTime<Utc>>,
    pub last_anomalies: usize,
    pub last_total: usize,
    pub success: Option<bool>,
    pub error: Option<String>,

    #[serde(skip)]
    stop_requested: bool,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            stage: PipelineStage::Idle,
            running: false,
            run_id: None,
            message: "Ready".to_string(),
            progress: 0,
            started_at: None,
            estimated_finish: None,
            last_run: None,
            last_anomalies: 0,
            last_total: 0,
            success: None,
            error: None,
            stop_requested: false,
        }
    }
}

impl RunState {
    /// Elapsed time of the active run, or of the last one up to its finish.
    pub fn runtime(&self, now: DateTime<Utc>) -> Option<Duration> {
        let started = self.started_at?;
        let end = if self.running {
            now
        } else {
            self.last_run.unwrap_or(now)
        };
        Some(end - started)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }
}

/// Linear extrapolation: elapsed / progress * 100.
pub fn estimate_finish(
    started: DateTime<Utc>,
    now: DateTime<Utc>,
    progress: u8,
) -> Option<DateTime<Utc>> {
    if progress == 0 {
        return None;
    }
    let elapsed_ms = (now - started).num_milliseconds().max(0);
    let total_ms = elapsed_ms * 100 / progress as i64;
    Some(started + Duration::milliseconds(total_ms))
}

#[derive(Debug, Clone, Default)]
pub struct RunStateHandle {
    inner: Arc<Mutex<RunState>>,
}

impl RunStateHandle {
    pub fn new() -> Self {
        Self::default()
    }

    // a panicked writer leaves the state readable
    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> RunState {
        self.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn should_stop(&self) -> bool {
        self.lock().stop_requested
    }

    /// Claim the runner for a new run. Fails if one is already active.
    pub fn try_begin(&self, run_id: Uuid) -> Result<(), PipelineError> {
        let mut state = self.lock();
        if state.running {
            return Err(PipelineError::AlreadyRunning);
        }

        state.running = true;
        state.stop_requested = false;
        state.run_id = Some(run_id);
        state.stage = PipelineStage::Idle;
        state.progress = 0;
        state.message = "Starting".to_string();
        state.started_at = Some(Utc::now());
        state.estimated_finish = None;
        state.success = None;
        state.error = None;
        Ok(())
    }

    /// Enter `stage`, unless a stop was requested.
    pub fn advance(&self, stage: PipelineStage, message: &str) -> Result<(), PipelineError> {
        let mut state = self.lock();
        if state.stop_requested {
            return Err(PipelineError::Stopped(stage));
        }

        let now = Utc::now();
        state.stage = stage;
        state.progress = stage.progress();
        state.message = message.to_string();
        let progress = state.progress;
        state.estimated_finish = state
            .started_at
            .and_then(|started| estimate_finish(started, now, progress));

        info!(
            run_id = ?state.run_id,
            stage = %stage,
            progress = state.progress,
            "{}",
            message
        );
        Ok(())
    }

    pub fn request_stop(&self) -> Result<(), PipelineError> {
        let mut state = self.lock();
        if !state.running {
            return Err(PipelineError::NotRunning);
        }
        state.stop_requested = true;
        state.message = "Stop requested".to_string();
        Ok(())
    }

    pub fn finish_success(&self, anomalies: usize, total: usize) {
        let mut state = self.lock();
        let now = Utc::now();
        state.stage = PipelineStage::Completed;
        state.progress = PipelineStage::Completed.progress();
        state.running = false;
        state.stop_requested = false;
        state.message = format!("Completed: {} anomalies in {} samples", anomalies, total);
        state.estimated_finish = Some(now);
        state.last_run = Some(now);
        state.last_anomalies = anomalies;
        state.last_total = total;
        state.success = Some(true);
        state.error = None;
    }

    pub fn finish_failure(&self, error: &PipelineError) {
        let mut state = self.lock();
        state.stage = PipelineStage::Failed;
        state.progress = PipelineStage::Failed.progress();
        state.running = false;
        state.stop_requested = false;
        state.message = match error {
            PipelineError::Stopped(_) => "Run stopped".to_string(),
            _ => "Run failed".to_string(),
        };
        state.estimated_finish = None;
        state.last_run = Some(Utc::now());
        state.last_anomalies = 0;
        state.last_total = 0;
        state.success = Some(false);
        state.error = Some(error.to_string());
    }
}
