// Access log record IO (CSV)

use crate::error::RecordError;
use crate::LogRecord;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Load every record from a CSV access log, preserving file order.
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<LogRecord>, RecordError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(RecordError::NotFound(path.to_path_buf()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut records = Vec::new();
    for row in reader.deserialize::<LogRecord>() {
        let record = row.map_err(|e| RecordError::Malformed {
            line: e.position().map(|p| p.line()).unwrap_or(0),
            reason: e.to_string(),
        })?;
        records.push(record);
    }

    info!(path = %path.display(), count = records.len(), "Loaded access log records");
    Ok(records)
}

/// Write records as CSV (header included), replacing the file.
pub fn write_records<P: AsRef<Path>>(path: P, records: &[LogRecord]) -> Result<(), RecordError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| RecordError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush().map_err(|source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    debug!(path = %path.display(), count = records.len(), "Wrote access log records");
    Ok(())
}

// serde helpers for the time-of-day column
pub(crate) mod time_of_day {
    use chrono::{DateTime, NaiveDateTime, NaiveTime};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M:%S").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
    }

    // HH:MM:SS first, full date-times are reduced to their time of day
    pub fn parse(raw: &str) -> Option<NaiveTime> {
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M:%S%.f")
            .ok()
            .or_else(|| NaiveTime::parse_from_str(raw, "%H:%M").ok())
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.time()))
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|dt| dt.time())
            })
    }
}
