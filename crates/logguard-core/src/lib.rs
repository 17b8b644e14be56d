//! Core types for the access log anomaly pipeline
//! this crate holds the record type, record IO, the feature schema and the traffic generator.
pub mod error;
pub mod features;
pub mod records;
pub mod traffic;

pub use error::{GenerateError, RecordError};
pub use features::{FeatureExtractor, FeatureMatrix, Scaler, FEATURE_DIM, FEATURE_NAMES};
pub use records::{load_records, write_records};
pub use traffic::{SyntheticTraffic, TrafficGenerator};

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

// LOG RECORD //

/// One observed request from an access log.
///
/// Field names on disk follow the access log CSV columns
/// (`ip_address`, `username`, `status`, `method`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    // time of day the request was seen
    #[serde(with = "records::time_of_day")]
    pub timestamp: NaiveTime,

    #[serde(rename = "ip_address")]
    pub source_address: String,

    #[serde(rename = "username")]
    pub user_identity: String,

    pub endpoint: String,

    // request duration in seconds
    pub duration: f64,

    #[serde(rename = "status")]
    pub status_code: u16,

    pub bytes_sent: u64,

    #[serde(rename = "method")]
    pub http_method: String,
}

impl LogRecord {
    /// Column names in the order `to_row` emits them.
    pub const COLUMNS: [&'static str; 8] = [
        "timestamp",
        "ip_address",
        "username",
        "endpoint",
        "duration",
        "status",
        "bytes_sent",
        "method",
    ];

    /// Fractional hour of day, e.g. 08:30 -> 8.5
    pub fn hour_of_day(&self) -> f64 {
        self.timestamp.hour() as f64 + self.timestamp.minute() as f64 / 60.0
    }

    // addresses treated as internal traffic
    pub fn is_internal_address(&self) -> bool {
        ["192.168.", "10.", "172.16."]
            .iter()
            .any(|prefix| self.source_address.starts_with(prefix))
    }

    pub fn is_identified_user(&self) -> bool {
        !matches!(
            self.user_identity.trim().to_lowercase().as_str(),
            "" | "unknown" | "guest" | "null"
        )
    }

    pub fn is_admin(&self) -> bool {
        self.user_identity == "admin"
    }

    pub fn is_sensitive_endpoint(&self) -> bool {
        matches!(self.endpoint.as_str(), "/admin" | "/config" | "/api/delete")
    }

    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }

    /// Render the record as text cells, matching `COLUMNS`.
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.timestamp.format("%H:%M:%S").to_string(),
            self.source_address.clone(),
            self.user_identity.clone(),
            self.endpoint.clone(),
            self.duration.to_string(),
            self.status_code.to_string(),
            self.bytes_sent.to_string(),
            self.http_method.clone(),
        ]
    }
}

#[cfg(test)]
pub(crate) fn sample_record() -> LogRecord {
    LogRecord {
        timestamp: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        source_address: "192.168.1.20".to_string(),
        user_identity: "user".to_string(),
        endpoint: "/dashboard".to_string(),
        duration: 1.0,
        status_code: 200,
        bytes_sent: 1200,
        http_method: "GET".to_string(),
    }
}
