//! Alert dispatch
//!
//! Abnormal records are appended to a CSV alert log, one row per record,
//! prefixed with the alert subject and body. The header is written only into
//! an empty log. When a notifier is configured the alert is also forwarded;
//! every failure here is logged and never aborts a run.

use crate::error::AlertDispatchError;
use crate::notify::Notifier;
use logguard_core::LogRecord;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

// rows of the alert log attached to notifications
const TAIL_LINES: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
    pub anomaly_count: usize,
    pub total_samples: usize,
}

impl AlertMessage {
    pub fn for_run(anomaly_count: usize, total_samples: usize, threshold: f64) -> Self {
        let rate = if total_samples == 0 {
            0.0
        } else {
            anomaly_count as f64 / total_samples as f64 * 100.0
        };
        Self {
            subject: format!("Anomaly alert: {} suspicious requests detected", anomaly_count),
            body: format!(
                "{} of {} requests ({:.2}%) had a reconstruction error above {}. \
                 Review the alert log for the affected requests.",
                anomaly_count, total_samples, rate, threshold
            ),
            anomaly_count,
            total_samples,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchOutcome {
    pub logged_rows: usize,
    pub notified: bool,
}

#[derive(Clone)]
pub struct AlertDispatcher {
    log_path: PathBuf,
    notifier: Option<Arc<dyn Notifier>>,
    attach_alert_log: bool,
}

impl AlertDispatcher {
    pub fn new<P: Into<PathBuf>>(log_path: P) -> Self {
        Self {
            log_path: log_path.into(),
            notifier: None,
            attach_alert_log: false,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>, attach_alert_log: bool) -> Self {
        self.notifier = Some(notifier);
        self.attach_alert_log = attach_alert_log;
        self
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Log and forward an alert. A zero count leaves the alert log untouched.
    pub async fn dispatch(
        &self,
        anomaly_count: usize,
        message: &AlertMessage,
        flagged: &[&LogRecord],
    ) -> DispatchOutcome {
        if anomaly_count == 0 {
            return DispatchOutcome::default();
        }
        let (logged_rows, tail) = self.record(message, flagged);
        let notified = self.notify(message, tail.as_deref()).await;
        DispatchOutcome {
            logged_rows,
            notified,
        }
    }

    /// File half of a dispatch: append to the alert log and read back the
    /// tail to attach, if a notifier wants it. Errors are logged.
    pub fn record(&self, message: &AlertMessage, flagged: &[&LogRecord]) -> (usize, Option<String>) {
        let rows = match self.append_alert_log(message, flagged) {
            Ok(rows) => {
                info!(path = %self.log_path.display(), rows, "Alert log updated");
                rows
            }
            Err(e) => {
                error!(path = %self.log_path.display(), error = %e, "Failed to write alert log");
                0
            }
        };
        let tail = if self.notifier.is_some() && self.attach_alert_log {
            self.read_tail(TAIL_LINES)
        } else {
            None
        };
        (rows, tail)
    }

    /// Forward to the notifier, if any. Returns whether it accepted the alert.
    pub async fn notify(&self, message: &AlertMessage, tail: Option<&str>) -> bool {
        let Some(notifier) = &self.notifier else {
            return false;
        };
        match notifier.send(message, tail).await {
            Ok(()) => {
                info!(channel = notifier.name(), anomalies = message.anomaly_count, "Alert sent");
                true
            }
            Err(e) => {
                warn!(channel = notifier.name(), error = %e, "Failed to send alert");
                false
            }
        }
    }

    /// Append one CSV row per flagged record, writing the header into an empty log.
    pub fn append_alert_log(
        &self,
        message: &AlertMessage,
        flagged: &[&LogRecord],
    ) -> Result<usize, AlertDispatchError> {
        let io_err = |source| AlertDispatchError::Io {
            path: self.log_path.clone(),
            source,
        };

        if let Some(parent) = self.log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| AlertDispatchError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .map_err(io_err)?;
        let is_empty = file.metadata().map_err(io_err)?.len() == 0;

        let mut writer = csv::Writer::from_writer(file);
        if is_empty {
            let mut header = vec!["subject", "body"];
            header.extend(LogRecord::COLUMNS);
            writer.write_record(&header)?;
        }

        for record in flagged {
            let mut row = vec![message.subject.clone(), message.body.clone()];
            row.extend(record.to_row());
            writer.write_record(&row)?;
        }
        writer.flush().map_err(io_err)?;
        Ok(flagged.len())
    }

    // last `lines` lines of the alert log, if readable
    fn read_tail(&self, lines: usize) -> Option<String> {
        let content = fs::read_to_string(&self.log_path).ok()?;
        let all: Vec<&str> = content.lines().collect();
        let start = all.len().saturating_sub(lines);
        Some(all[start..].join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveTime;
    use std::sync::Mutex;

    fn record(endpoint: &str, status: u16) -> LogRecord {
        LogRecord {
            timestamp: NaiveTime::from_hms_opt(2, 14, 9).unwrap(),
            source_address: "203.0.113.7".to_string(),
            user_identity: "unknown".to_string(),
            endpoint: endpoint.to_string(),
            duration: 12.5,
            status_code: status,
            bytes_sent: 90_000,
            http_method: "DELETE".to_string(),
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, Option<String>)>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(
            &self,
            message: &AlertMessage,
            attachment: Option<&str>,
        ) -> Result<(), AlertDispatchError> {
            self.sent
                .lock()
                .unwrap()
                .push((message.subject.clone(), attachment.map(str::to_string)));
            if self.fail {
                Err(AlertDispatchError::Rejected {
                    status: 500,
                    body: "down".to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_zero_count_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.csv");
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = AlertDispatcher::new(&path).with_notifier(notifier.clone(), false);

        let outcome = dispatcher
            .dispatch(0, &AlertMessage::for_run(0, 10, 1.5), &[])
            .await;

        assert_eq!(outcome, DispatchOutcome::default());
        assert!(!path.exists());
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("alerts.csv");
        let dispatcher = AlertDispatcher::new(&path);
        let a = record("/admin", 403);
        let b = record("/config", 500);

        let message = AlertMessage::for_run(2, 10, 1.5);
        dispatcher.dispatch(2, &message, &[&a, &b]).await;
        dispatcher.dispatch(1, &AlertMessage::for_run(1, 10, 1.5), &[&a]).await;

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "subject,body,timestamp,ip_address,username,endpoint,duration,status,bytes_sent,method"
        );
        assert_eq!(content.matches("subject,body").count(), 1);
        assert!(lines[2].contains("/config"));
        assert!(lines[2].ends_with("02:14:09,203.0.113.7,unknown,/config,12.5,500,90000,DELETE"));
    }

    #[tokio::test]
    async fn test_notifier_gets_tail_and_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.csv");
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let dispatcher = AlertDispatcher::new(&path).with_notifier(notifier.clone(), true);
        let a = record("/admin", 401);

        let outcome = dispatcher
            .dispatch(1, &AlertMessage::for_run(1, 4, 1.5), &[&a])
            .await;

        assert_eq!(outcome.logged_rows, 1);
        assert!(!outcome.notified);
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.as_ref().unwrap().contains("/admin"));
    }

    #[tokio::test]
    async fn test_record_on_blocking_pool_then_notify() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.csv");
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = AlertDispatcher::new(&path).with_notifier(notifier.clone(), true);
        let message = AlertMessage::for_run(2, 8, 1.5);
        let flagged = vec![record("/admin", 403), record("/backup", 200)];

        let writer = dispatcher.clone();
        let log_message = message.clone();
        let (rows, tail) = tokio::task::spawn_blocking(move || {
            let refs: Vec<&LogRecord> = flagged.iter().collect();
            writer.record(&log_message, &refs)
        })
        .await
        .unwrap();
        assert_eq!(rows, 2);
        assert!(tail.as_deref().unwrap().contains("/backup"));

        assert!(dispatcher.notify(&message, tail.as_deref()).await);
        assert_eq!(notifier.sent.lock().unwrap()[0].0, message.subject);
    }

    #[test]
    fn test_record_without_notifier_reads_no_tail() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = AlertDispatcher::new(dir.path().join("alerts.csv"));
        let a = record("/admin", 403);

        let (rows, tail) = dispatcher.record(&AlertMessage::for_run(1, 1, 1.5), &[&a]);
        assert_eq!(rows, 1);
        assert!(tail.is_none());
    }

    #[test]
    fn test_message_text() {
        let message = AlertMessage::for_run(5, 200, 1.5);
        assert!(message.subject.contains('5'));
        assert!(message.body.contains("5 of 200"));
        assert!(message.body.contains("2.50%"));
    }
}
