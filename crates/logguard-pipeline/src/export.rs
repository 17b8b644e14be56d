// Result export: pretty JSON {anomalies, losses} next to the run outputs

use crate::error::ExportError;
use chrono::NaiveTime;
use logguard_core::LogRecord;
use logguard_model::RunResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

pub const RESULT_FILE: &str = "result.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultArtifact {
    pub anomalies: Vec<bool>,
    pub losses: Vec<f64>,
}

impl From<&RunResult> for ResultArtifact {
    fn from(result: &RunResult) -> Self {
        Self {
            anomalies: result.anomalies().to_vec(),
            // JSON has no NaN
            losses: result
                .losses()
                .iter()
                .map(|l| if l.is_finite() { *l } else { 0.0 })
                .collect(),
        }
    }
}

impl ResultArtifact {
    pub fn anomaly_count(&self) -> usize {
        self.anomalies.iter().filter(|a| **a).count()
    }
}

/// Write the result, replacing any previous artifact at `path`.
pub fn export_results<P: AsRef<Path>>(result: &RunResult, path: P) -> Result<(), ExportError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ExportError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let json = serde_json::to_string_pretty(&ResultArtifact::from(result))?;
    fs::write(path, json).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    info!(path = %path.display(), samples = result.total_samples(), "Results exported");
    Ok(())
}

pub fn load_results<P: AsRef<Path>>(path: P) -> Result<ResultArtifact, ExportError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ExportError::NotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let artifact: ResultArtifact = serde_json::from_str(&content)?;
    if artifact.anomalies.len() != artifact.losses.len() {
        return Err(ExportError::Malformed(format!(
            "{} flags but {} losses",
            artifact.anomalies.len(),
            artifact.losses.len()
        )));
    }
    Ok(artifact)
}

// One record of the results view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    // 1-based position in the data file
    pub id: usize,
    pub timestamp: NaiveTime,
    pub endpoint: String,
    pub duration: f64,
    pub is_anomaly: bool,
    pub loss: f64,
}

/// Join the exported result with the records it was computed from.
pub fn result_view(
    records: &[LogRecord],
    artifact: &ResultArtifact,
) -> Result<Vec<ResultRow>, ExportError> {
    if records.len() != artifact.anomalies.len() {
        return Err(ExportError::Malformed(format!(
            "result covers {} rows but the data file has {}",
            artifact.anomalies.len(),
            records.len()
        )));
    }

    Ok(records
        .iter()
        .zip(artifact.anomalies.iter().zip(&artifact.losses))
        .enumerate()
        .map(|(i, (record, (is_anomaly, loss)))| ResultRow {
            id: i + 1,
            timestamp: record.timestamp,
            endpoint: record.endpoint.clone(),
            duration: record.duration,
            is_anomaly: *is_anomaly,
            loss: *loss,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(second: u32) -> LogRecord {
        LogRecord {
            timestamp: NaiveTime::from_hms_opt(12, 0, second).unwrap(),
            source_address: "10.0.0.5".to_string(),
            user_identity: "user".to_string(),
            endpoint: "/login".to_string(),
            duration: 0.4,
            status_code: 200,
            bytes_sent: 512,
            http_method: "POST".to_string(),
        }
    }

    #[test]
    fn test_export_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join(RESULT_FILE);
        let result = RunResult::from_losses(vec![0.2, 3.0, f64::NAN], 1.5);

        export_results(&result, &path).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["anomalies"], serde_json::json!([false, true, false]));
        assert_eq!(raw["losses"][2], serde_json::json!(0.0));

        let loaded = load_results(&path).unwrap();
        assert_eq!(loaded.anomaly_count(), 1);
        assert_eq!(loaded.losses, vec![0.2, 3.0, 0.0]);
    }

    #[test]
    fn test_export_losses_reload_exactly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(RESULT_FILE);
        let losses = vec![0.1 + 0.2, 0.116361550755313, 1.0 / 3.0, 2.220446049250313e-16];
        let result = RunResult::from_losses(losses.clone(), 0.2);

        export_results(&result, &path).unwrap();

        let loaded = load_results(&path).unwrap();
        assert_eq!(loaded.losses, losses);
        assert_eq!(loaded.anomalies, vec![true, false, true, false]);
    }

    #[test]
    fn test_export_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(RESULT_FILE);
        export_results(&RunResult::from_losses(vec![5.0, 5.0], 1.5), &path).unwrap();
        export_results(&RunResult::empty(), &path).unwrap();

        let loaded = load_results(&path).unwrap();
        assert!(loaded.anomalies.is_empty());
        assert!(loaded.losses.is_empty());
    }

    #[test]
    fn test_mismatched_artifact_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(RESULT_FILE);
        fs::write(&path, r#"{"anomalies": [true], "losses": [1.0, 2.0]}"#).unwrap();
        assert!(matches!(load_results(&path), Err(ExportError::Malformed(_))));
        assert!(matches!(
            load_results(dir.path().join("missing.json")),
            Err(ExportError::NotFound(_))
        ));
    }

    #[test]
    fn test_result_view_joins_by_position() {
        let records = vec![record(1), record(2)];
        let artifact = ResultArtifact {
            anomalies: vec![false, true],
            losses: vec![0.1, 4.2],
        };

        let rows = result_view(&records, &artifact).unwrap();
        assert_eq!(rows[1].id, 2);
        assert!(rows[1].is_anomaly);
        assert_eq!(rows[1].loss, 4.2);
        assert_eq!(rows[1].timestamp, NaiveTime::from_hms_opt(12, 0, 2).unwrap());

        assert!(result_view(&records[..1], &artifact).is_err());
    }
}
