//! LogGuard pipeline: configuration, run orchestration, alerting and run history

pub mod alerting;
pub mod config;
pub mod error;
pub mod export;
pub mod history;
pub mod notify;
pub mod runner;
pub mod state;

pub use alerting::{AlertDispatcher, AlertMessage, DispatchOutcome};
pub use config::{NotificationConfig, PipelineConfig};
pub use error::{
    AlertDispatchError, ConfigError, ExportError, HistoryError, PipelineError, ValidationError,
};
pub use export::{export_results, load_results, result_view, ResultArtifact, ResultRow};
pub use history::{HistoryPage, HistoryQuery, RunHistory, RunHistoryRecord, SortKey, SortOrder};
pub use notify::{Notifier, WebhookNotifier};
pub use runner::{PipelineRunner, RunHandle, RunSummary};
pub use state::{PipelineStage, RunState, RunStateHandle};
