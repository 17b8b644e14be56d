// Synthetic access traffic for demo runs
// Produces mostly office-hours internal traffic with a share of abnormal requests mixed in

use crate::error::GenerateError;
use crate::LogRecord;
use chrono::NaiveTime;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

// Generator trait - anything that can hand the pipeline a fresh batch of records
pub trait TrafficGenerator: Send + Sync {
    fn name(&self) -> &'static str;
    fn generate(&self) -> Result<Vec<LogRecord>, GenerateError>;
}

const USERNAMES: [&str; 6] = ["admin", "user", "guest", "unknown", "test", "root"];
const IP_BASES: [&str; 5] = ["192.168.1.", "10.0.0.", "172.16.0.", "91.92.18.", "203.0.113."];
const NORMAL_ENDPOINTS: [&str; 4] = ["/login", "/dashboard", "/api/data", "/profile"];
const ABNORMAL_ENDPOINTS: [&str; 4] = ["/config", "/admin", "/settings", "/logout"];
const ABNORMAL_USERS: [&str; 4] = ["unknown", "guest", "root", "test"];
const ABNORMAL_STATUSES: [u16; 5] = [400, 401, 403, 404, 500];
const ALL_METHODS: [&str; 4] = ["PUT", "DELETE", "POST", "GET"];

#[derive(Debug, Clone)]
pub struct SyntheticTraffic {
    pub rows: usize,
    // share of abnormal requests (0.0 - 1.0)
    pub abnormal_ratio: f64,
    // fixed seed for reproducible batches, None = fresh entropy
    pub seed: Option<u64>,
}

impl Default for SyntheticTraffic {
    fn default() -> Self {
        Self {
            rows: 5000,
            abnormal_ratio: 0.1,
            seed: None,
        }
    }
}

fn pick<T: Copy>(rng: &mut impl Rng, items: &[T]) -> T {
    items[rng.gen_range(0..items.len())]
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl SyntheticTraffic {
    pub fn new(rows: usize) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_abnormal_ratio(mut self, ratio: f64) -> Self {
        self.abnormal_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    fn normal_record(rng: &mut impl Rng) -> LogRecord {
        let hour = rng.gen_range(8..=17);
        LogRecord {
            timestamp: Self::time(rng, hour),
            source_address: format!("{}{}", pick(rng, &IP_BASES[..3]), rng.gen_range(1..=254)),
            user_identity: pick(rng, &USERNAMES[..4]).to_string(),
            endpoint: pick(rng, &NORMAL_ENDPOINTS).to_string(),
            duration: round2(rng.gen_range(0.2..=2.0)),
            status_code: 200,
            bytes_sent: rng.gen_range(500..=5000),
            http_method: pick(rng, &["GET", "POST"]).to_string(),
        }
    }

    fn abnormal_record(rng: &mut impl Rng) -> LogRecord {
        // outside office hours: 00-07 or 18-23
        let hour = pick(rng, &[0, 1, 2, 3, 4, 5, 6, 7, 18, 19, 20, 21, 22, 23]);
        let bytes_sent = if rng.gen_bool(0.5) {
            rng.gen_range(0..=100)
        } else {
            rng.gen_range(10_000..=20_000)
        };
        LogRecord {
            timestamp: Self::time(rng, hour),
            source_address: format!("{}{}", pick(rng, &IP_BASES[3..]), rng.gen_range(1..=254)),
            user_identity: pick(rng, &ABNORMAL_USERS).to_string(),
            endpoint: pick(rng, &ABNORMAL_ENDPOINTS).to_string(),
            duration: round2(rng.gen_range(0.01..=8.0)),
            status_code: pick(rng, &ABNORMAL_STATUSES),
            bytes_sent,
            http_method: pick(rng, &ALL_METHODS).to_string(),
        }
    }

    fn time(rng: &mut impl Rng, hour: u32) -> NaiveTime {
        let minute = rng.gen_range(0..60);
        let second = rng.gen_range(0..60);
        NaiveTime::from_hms_opt(hour, minute, second).unwrap_or(NaiveTime::MIN)
    }

    pub fn records(&self) -> Vec<LogRecord> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let ratio = if self.abnormal_ratio.is_nan() {
            0.0
        } else {
            self.abnormal_ratio.clamp(0.0, 1.0)
        };

        (0..self.rows)
            .map(|_| {
                if rng.gen_bool(ratio) {
                    Self::abnormal_record(&mut rng)
                } else {
                    Self::normal_record(&mut rng)
                }
            })
            .collect()
    }
}

impl TrafficGenerator for SyntheticTraffic {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn generate(&self) -> Result<Vec<LogRecord>, GenerateError> {
        if !(0.0..=1.0).contains(&self.abnormal_ratio) {
            return Err(GenerateError::Failed {
                name: self.name().to_string(),
                reason: format!("abnormal ratio {} outside 0..=1", self.abnormal_ratio),
            });
        }
        let records = self.records();
        info!(rows = records.len(), seed = ?self.seed, "Generated synthetic traffic");
        Ok(records)
    }
}
