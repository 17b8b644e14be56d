//! Feature engineering: LogRecord -> fixed-width numeric vector, plus per-run standardization.
//!
//! The schema is fixed. Every record maps to exactly [`FEATURE_DIM`] values in the
//! order given by [`FEATURE_NAMES`]. Standardization statistics are fitted on the
//! records of the current call and are never written to disk.

use crate::LogRecord;
use tracing::debug;

pub const FEATURE_DIM: usize = 28;

pub const FEATURE_NAMES: [&str; FEATURE_DIM] = [
    "hour",
    "is_working_hour",
    "is_internal_ip",
    "is_identified_user",
    "is_admin",
    "is_sensitive_endpoint",
    "method_GET",
    "method_POST",
    "method_PUT",
    "method_DELETE",
    "duration",
    "is_error",
    "status_200",
    "status_201",
    "status_400",
    "status_401",
    "status_403",
    "status_404",
    "status_500",
    "bytes_sent",
    "endpoint_/login",
    "endpoint_/dashboard",
    "endpoint_/admin",
    "endpoint_/config",
    "endpoint_/api/data",
    "endpoint_/logout",
    "endpoint_/settings",
    "endpoint_/profile",
];

const METHODS: [&str; 4] = ["GET", "POST", "PUT", "DELETE"];
const STATUSES: [u16; 7] = [200, 201, 400, 401, 403, 404, 500];
const ENDPOINTS: [&str; 8] = [
    "/login",
    "/dashboard",
    "/admin",
    "/config",
    "/api/data",
    "/logout",
    "/settings",
    "/profile",
];

fn flag(on: bool) -> f64 {
    if on {
        1.0
    } else {
        0.0
    }
}

/// Raw (unscaled) feature vector for one record.
pub fn encode(record: &LogRecord) -> [f64; FEATURE_DIM] {
    let mut out = [0.0; FEATURE_DIM];
    let hour = record.hour_of_day();

    out[0] = hour;
    out[1] = flag((8.0..=18.0).contains(&hour));
    out[2] = flag(record.is_internal_address());
    out[3] = flag(record.is_identified_user());
    out[4] = flag(record.is_admin());
    out[5] = flag(record.is_sensitive_endpoint());
    for (i, method) in METHODS.iter().enumerate() {
        out[6 + i] = flag(record.http_method == *method);
    }
    out[10] = record.duration;
    out[11] = flag(record.is_error());
    for (i, status) in STATUSES.iter().enumerate() {
        out[12 + i] = flag(record.status_code == *status);
    }
    out[19] = record.bytes_sent as f64;
    for (i, endpoint) in ENDPOINTS.iter().enumerate() {
        out[20 + i] = flag(record.endpoint == *endpoint);
    }
    out
}

// FEATURE MATRIX //

/// Row-major `n x d` matrix. Row order always matches the input record order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
}

impl FeatureMatrix {
    /// Build from rows as given. Values are kept verbatim (no sanitizing).
    ///
    /// Panics if rows have differing lengths from `cols`.
    pub fn from_rows(cols: usize, rows: &[Vec<f64>]) -> Self {
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            assert_eq!(row.len(), cols, "row width must equal column count");
            data.extend_from_slice(row);
        }
        Self {
            data,
            rows: rows.len(),
            cols,
        }
    }

    pub fn empty(cols: usize) -> Self {
        Self {
            data: Vec::new(),
            rows: 0,
            cols,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.data[index * self.cols..(index + 1) * self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        // chunks_exact panics on a zero chunk size
        self.data.chunks_exact(self.cols.max(1)).take(self.rows)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Returns a matrix holding the given rows, in the given order.
    pub fn select(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Self {
            data,
            rows: indices.len(),
            cols: self.cols,
        }
    }

    // smallest and largest value, for debug logging
    fn min_max(&self) -> Option<(f64, f64)> {
        self.data.iter().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}

// SCALER //

/// Per-column standardization statistics (population std, like a standard scaler).
///
/// A column with zero variance gets a scale of 1 so it maps to 0 instead of NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct Scaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl Scaler {
    pub fn fit(raw: &FeatureMatrix) -> Self {
        let cols = raw.cols();
        let n = raw.rows();
        let mut mean = vec![0.0; cols];
        let mut scale = vec![1.0; cols];
        if n == 0 {
            return Self { mean, scale };
        }

        for row in raw.iter_rows() {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n as f64;
        }

        let mut var = vec![0.0; cols];
        for row in raw.iter_rows() {
            for ((acc, v), m) in var.iter_mut().zip(row).zip(&mean) {
                *acc += (v - m) * (v - m);
            }
        }
        for (s, v) in scale.iter_mut().zip(&var) {
            let std = (v / n as f64).sqrt();
            *s = if std > 0.0 && std.is_finite() { std } else { 1.0 };
        }

        Self { mean, scale }
    }

    /// Standardize `raw`; non-finite results become 0.
    ///
    /// Panics if `raw` has a different column count than the fitted matrix.
    pub fn transform(&self, raw: &FeatureMatrix) -> FeatureMatrix {
        let cols = raw.cols();
        assert_eq!(
            cols,
            self.mean.len(),
            "matrix width must equal the fitted column count"
        );
        let mut data = Vec::with_capacity(raw.as_slice().len());
        for row in raw.iter_rows() {
            for (j, v) in row.iter().enumerate() {
                let z = (v - self.mean[j]) / self.scale[j];
                data.push(if z.is_finite() { z } else { 0.0 });
            }
        }
        FeatureMatrix {
            data,
            rows: raw.rows(),
            cols,
        }
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }
}

// EXTRACTOR //

#[derive(Debug, Default, Clone, Copy)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Encode every record without scaling.
    pub fn encode_all(&self, records: &[LogRecord]) -> FeatureMatrix {
        let mut data = Vec::with_capacity(records.len() * FEATURE_DIM);
        for record in records {
            data.extend_from_slice(&encode(record));
        }
        FeatureMatrix {
            data,
            rows: records.len(),
            cols: FEATURE_DIM,
        }
    }

    /// Encode and standardize with statistics fitted on these same records.
    pub fn extract(&self, records: &[LogRecord]) -> FeatureMatrix {
        self.extract_with_scaler(records).0
    }

    /// Like `extract`, also handing back the fitted scaler.
    pub fn extract_with_scaler(&self, records: &[LogRecord]) -> (FeatureMatrix, Scaler) {
        let raw = self.encode_all(records);
        let scaler = Scaler::fit(&raw);
        let matrix = scaler.transform(&raw);

        if let Some((min, max)) = matrix.min_max() {
            debug!(rows = matrix.rows(), cols = matrix.cols(), min, max, "Features scaled");
        }
        (matrix, scaler)
    }
}
