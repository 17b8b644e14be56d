//! Run history: JSON array of past runs, newest last, capped at [`HISTORY_CAP`].
//!
//! A missing, empty or corrupt file reads as an empty history.

use crate::error::HistoryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

pub const HISTORY_CAP: usize = 100;
pub const MAX_PER_PAGE: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHistoryRecord {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub anomalies_count: usize,
    pub total_samples: usize,
    // percentage, 0 when there were no samples
    pub anomaly_rate: f64,
}

impl RunHistoryRecord {
    pub fn success(timestamp: DateTime<Utc>, anomalies_count: usize, total_samples: usize) -> Self {
        let anomaly_rate = if total_samples == 0 {
            0.0
        } else {
            anomalies_count as f64 / total_samples as f64 * 100.0
        };
        Self {
            timestamp,
            success: true,
            anomalies_count,
            total_samples,
            anomaly_rate,
        }
    }

    pub fn failure(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            success: false,
            anomalies_count: 0,
            total_samples: 0,
            anomaly_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Timestamp,
    AnomaliesCount,
    TotalSamples,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "timestamp" => Ok(SortKey::Timestamp),
            "anomalies_count" | "anomalies" => Ok(SortKey::AnomaliesCount),
            "total_samples" | "samples" => Ok(SortKey::TotalSamples),
            other => Err(format!(
                "unknown sort key '{}' (timestamp, anomalies_count, total_samples)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("unknown order '{}' (asc, desc)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub success: Option<bool>,
    pub sort_by: SortKey,
    pub order: SortOrder,
    // 1-based
    pub page: usize,
    pub per_page: usize,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            success: None,
            sort_by: SortKey::Timestamp,
            order: SortOrder::Desc,
            page: 1,
            per_page: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPage {
    pub records: Vec<RunHistoryRecord>,
    // matches after filtering, before paging
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone)]
pub struct RunHistory {
    path: PathBuf,
}

impl RunHistory {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<RunHistoryRecord>, HistoryError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(HistoryError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str(&content) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Run history unreadable, starting fresh");
                Ok(Vec::new())
            }
        }
    }

    /// Append one record, dropping the oldest beyond the cap.
    pub fn append(&self, record: RunHistoryRecord) -> Result<usize, HistoryError> {
        let mut records = self.load()?;
        records.push(record);
        if records.len() > HISTORY_CAP {
            let excess = records.len() - HISTORY_CAP;
            records.drain(..excess);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| HistoryError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(&records)?;
        fs::write(&self.path, json).map_err(|source| HistoryError::Io {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), entries = records.len(), "Run history updated");
        Ok(records.len())
    }

    /// Most recent successful run, if any.
    pub fn latest_success(&self) -> Result<Option<RunHistoryRecord>, HistoryError> {
        Ok(self.load()?.into_iter().rev().find(|r| r.success))
    }

    pub fn query(&self, query: &HistoryQuery) -> Result<HistoryPage, HistoryError> {
        let mut records: Vec<RunHistoryRecord> = self
            .load()?
            .into_iter()
            .filter(|r| query.success.map_or(true, |wanted| r.success == wanted))
            .collect();

        records.sort_by(|a, b| {
            let ordering = match query.sort_by {
                SortKey::Timestamp => a.timestamp.cmp(&b.timestamp),
                SortKey::AnomaliesCount => a.anomalies_count.cmp(&b.anomalies_count),
                SortKey::TotalSamples => a.total_samples.cmp(&b.total_samples),
            };
            match query.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        let per_page = query.per_page.clamp(1, MAX_PER_PAGE);
        let page = query.page.max(1);
        let total = records.len();
        let total_pages = total.div_ceil(per_page);

        let records = records
            .into_iter()
            .skip((page - 1).saturating_mul(per_page))
            .take(per_page)
            .collect();

        Ok(HistoryPage {
            records,
            total,
            page,
            per_page,
            total_pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(minutes: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + Duration::minutes(minutes)
    }

    #[test]
    fn test_rate() {
        assert_eq!(RunHistoryRecord::success(at(0), 5, 50).anomaly_rate, 10.0);
        assert_eq!(RunHistoryRecord::success(at(0), 0, 0).anomaly_rate, 0.0);
        let failed = RunHistoryRecord::failure(at(0));
        assert!(!failed.success);
        assert_eq!((failed.anomalies_count, failed.total_samples), (0, 0));
    }

    #[test]
    fn test_cap_drops_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::new(dir.path().join("history.json"));

        for i in 0..=HISTORY_CAP as i64 {
            history.append(RunHistoryRecord::success(at(i), i as usize, 100)).unwrap();
        }

        let records = history.load().unwrap();
        assert_eq!(records.len(), HISTORY_CAP);
        assert_eq!(records[0].timestamp, at(1));
        assert_eq!(records.last().unwrap().timestamp, at(HISTORY_CAP as i64));
    }

    #[test]
    fn test_corrupt_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{ not an array").unwrap();

        let history = RunHistory::new(&path);
        assert!(history.load().unwrap().is_empty());
        assert_eq!(history.append(RunHistoryRecord::failure(at(0))).unwrap(), 1);

        fs::write(&path, "").unwrap();
        assert!(history.load().unwrap().is_empty());
    }

    #[test]
    fn test_query_filter_sort_page() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::new(dir.path().join("history.json"));
        for i in 0..7 {
            let record = if i % 3 == 0 {
                RunHistoryRecord::failure(at(i))
            } else {
                RunHistoryRecord::success(at(i), (i * 2) as usize, 100)
            };
            history.append(record).unwrap();
        }

        // successes: minutes 1, 2, 4, 5
        let page = history
            .query(&HistoryQuery {
                success: Some(true),
                sort_by: SortKey::AnomaliesCount,
                order: SortOrder::Desc,
                page: 1,
                per_page: 3,
            })
            .unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.total_pages, 2);
        let counts: Vec<usize> = page.records.iter().map(|r| r.anomalies_count).collect();
        assert_eq!(counts, vec![10, 8, 4]);

        let second = history
            .query(&HistoryQuery {
                success: Some(true),
                sort_by: SortKey::AnomaliesCount,
                order: SortOrder::Desc,
                page: 2,
                per_page: 3,
            })
            .unwrap();
        assert_eq!(second.records.len(), 1);
        assert_eq!(second.records[0].anomalies_count, 2);

        let oldest_first = history
            .query(&HistoryQuery {
                order: SortOrder::Asc,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(oldest_first.records[0].timestamp, at(0));
        assert_eq!(oldest_first.total, 7);
    }

    #[test]
    fn test_per_page_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::new(dir.path().join("history.json"));
        let page = history
            .query(&HistoryQuery {
                per_page: 5000,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.per_page, MAX_PER_PAGE);
        assert_eq!(page.total_pages, 0);
    }

    #[test]
    fn test_page_far_past_end_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::new(dir.path().join("history.json"));
        history.append(RunHistoryRecord::success(at(0), 1, 10)).unwrap();

        let page = history
            .query(&HistoryQuery {
                page: usize::MAX,
                per_page: MAX_PER_PAGE,
                ..Default::default()
            })
            .unwrap();
        assert!(page.records.is_empty());
        assert_eq!(page.page, usize::MAX);
        assert_eq!((page.total, page.total_pages), (1, 1));
    }

    #[test]
    fn test_latest_success_skips_failures() {
        let dir = tempfile::tempdir().unwrap();
        let history = RunHistory::new(dir.path().join("history.json"));
        assert_eq!(history.latest_success().unwrap(), None);

        history.append(RunHistoryRecord::success(at(0), 2, 40)).unwrap();
        history.append(RunHistoryRecord::success(at(1), 7, 70)).unwrap();
        history.append(RunHistoryRecord::failure(at(2))).unwrap();

        let latest = history.latest_success().unwrap().unwrap();
        assert_eq!(latest.timestamp, at(1));
        assert_eq!(latest.anomalies_count, 7);
        assert_eq!(latest.anomaly_rate, 10.0);
    }

    #[test]
    fn test_sort_key_parse() {
        assert_eq!("anomalies_count".parse::<SortKey>().unwrap(), SortKey::AnomaliesCount);
        assert_eq!("DESC".parse::<SortOrder>().unwrap(), SortOrder::Desc);
        assert!("size".parse::<SortKey>().is_err());
    }
}
