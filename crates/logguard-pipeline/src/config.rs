//! Pipeline configuration (TOML)
//!
//! Every field has a default, unknown keys are rejected, and every loaded or
//! updated value passes [`PipelineConfig::validate`] before it is handed out.

use crate::error::{ConfigError, ValidationError};
use logguard_model::TrainerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "logguard.toml";

// top-level keys accepted in the file and in updates
pub const RECOGNIZED_KEYS: [&str; 12] = [
    "data_path",
    "model_path",
    "output_dir",
    "alert_log_path",
    "history_path",
    "threshold",
    "epochs",
    "learning_rate",
    "seed",
    "generate_synthetic",
    "export_results",
    "notification",
];

pub const NOTIFICATION_KEYS: [&str; 4] = ["enabled", "webhook_url", "recipient", "attach_alert_log"];

const MAX_EPOCHS: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    // access log CSV (written by the generator, read by the extractor)
    pub data_path: PathBuf,

    pub model_path: PathBuf,

    // result.json lands here
    pub output_dir: PathBuf,

    pub alert_log_path: PathBuf,
    pub history_path: PathBuf,

    // reconstruction error above this is anomalous
    pub threshold: f64,

    pub epochs: usize,
    pub learning_rate: f64,
    pub seed: u64,

    // regenerate synthetic traffic at the start of every run
    pub generate_synthetic: bool,

    pub export_results: bool,

    pub notification: NotificationConfig,
}

// Chat webhook notification settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub webhook_url: String,
    pub recipient: String,

    // append the tail of the alert log to the message
    pub attach_alert_log: bool,
}

impl NotificationConfig {
    /// Enabled with a webhook URL and a recipient.
    pub fn is_complete(&self) -> bool {
        self.enabled && !self.webhook_url.trim().is_empty() && !self.recipient.trim().is_empty()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/access_logs.csv"),
            model_path: PathBuf::from("models/autoencoder.json"),
            output_dir: PathBuf::from("output"),
            alert_log_path: PathBuf::from("output/alerts.csv"),
            history_path: PathBuf::from("output/run_history.json"),
            threshold: logguard_model::DEFAULT_THRESHOLD,
            epochs: 50,
            learning_rate: 0.01,
            seed: 42,
            generate_synthetic: true,
            export_results: true,
            notification: NotificationConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(ValidationError::OutOfRange {
                key: "threshold",
                reason: format!("must be finite and > 0, got {}", self.threshold),
            });
        }
        if self.epochs == 0 || self.epochs > MAX_EPOCHS {
            return Err(ValidationError::OutOfRange {
                key: "epochs",
                reason: format!("must be in 1..={}, got {}", MAX_EPOCHS, self.epochs),
            });
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 || self.learning_rate > 1.0 {
            return Err(ValidationError::OutOfRange {
                key: "learning_rate",
                reason: format!("must be in (0, 1], got {}", self.learning_rate),
            });
        }

        let paths = [
            ("data_path", &self.data_path),
            ("model_path", &self.model_path),
            ("output_dir", &self.output_dir),
            ("alert_log_path", &self.alert_log_path),
            ("history_path", &self.history_path),
        ];
        for (key, path) in paths {
            if path.as_os_str().is_empty() {
                return Err(ValidationError::EmptyPath(key));
            }
        }
        Ok(())
    }

    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            epochs: self.epochs,
            learning_rate: self.learning_rate,
            seed: self.seed,
        }
    }

    pub fn result_path(&self) -> PathBuf {
        self.output_dir.join(crate::export::RESULT_FILE)
    }

    /// Merge `updates` over this config and validate the result.
    ///
    /// Keys may be nested tables or dotted (`notification.enabled`). The
    /// receiver is left untouched; a rejected update changes nothing.
    pub fn apply_update(&self, updates: &toml::Table) -> Result<PipelineConfig, ConfigError> {
        let mut merged = match toml::Value::try_from(self)? {
            toml::Value::Table(table) => table,
            other => {
                return Err(ValidationError::WrongType {
                    key: "config".to_string(),
                    reason: format!("serialized to {}", other.type_str()),
                }
                .into())
            }
        };

        for (key, value) in updates {
            let path: Vec<&str> = key.split('.').map(str::trim).collect();
            check_key(&path, value)?;
            merge_at(&mut merged, &path, value.clone());
        }

        let updated: PipelineConfig = toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| ValidationError::WrongType {
                key: updates.keys().cloned().collect::<Vec<_>>().join(", "),
                reason: e.message().to_string(),
            })?;
        updated.validate()?;
        Ok(updated)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn check_key(path: &[&str], value: &toml::Value) -> Result<(), ValidationError> {
    let unknown = || ValidationError::UnknownKey(path.join("."));
    match path {
        [key] if *key == "notification" => match value {
            toml::Value::Table(table) => {
                for nested in table.keys() {
                    if !NOTIFICATION_KEYS.contains(&nested.as_str()) {
                        return Err(ValidationError::UnknownKey(format!("notification.{}", nested)));
                    }
                }
                Ok(())
            }
            _ => Err(ValidationError::WrongType {
                key: "notification".to_string(),
                reason: "expected a table".to_string(),
            }),
        },
        [key] if RECOGNIZED_KEYS.contains(key) => Ok(()),
        ["notification", nested] if NOTIFICATION_KEYS.contains(nested) => Ok(()),
        _ => Err(unknown()),
    }
}

// insert `value` at `path`, merging tables instead of replacing them
fn merge_at(table: &mut toml::Table, path: &[&str], value: toml::Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = table;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        if !entry.is_table() {
            *entry = toml::Value::Table(toml::Table::new());
        }
        current = match entry {
            toml::Value::Table(t) => t,
            _ => return,
        };
    }

    if let toml::Value::Table(incoming) = &value {
        if let Some(toml::Value::Table(existing)) = current.get_mut(*last) {
            for (k, v) in incoming {
                existing.insert(k.clone(), v.clone());
            }
            return;
        }
    }
    current.insert(last.to_string(), value);
}

/// Parse `KEY=VALUE` into an update table. The value is read as a TOML
/// literal and falls back to a plain string (`data_path=data/x.csv`).
pub fn parse_assignments<S: AsRef<str>>(pairs: &[S]) -> Result<toml::Table, ValidationError> {
    let mut table = toml::Table::new();
    for pair in pairs {
        let pair = pair.as_ref();
        let Some((key, raw)) = pair.split_once('=') else {
            return Err(ValidationError::WrongType {
                key: pair.to_string(),
                reason: "expected KEY=VALUE".to_string(),
            });
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ValidationError::UnknownKey(String::new()));
        }
        table.insert(key.to_string(), parse_value(raw.trim()));
    }
    Ok(table)
}

fn parse_value(raw: &str) -> toml::Value {
    format!("v = {}", raw)
        .parse::<toml::Table>()
        .ok()
        .and_then(|mut t| t.remove("v"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}

/// Load and validate a config file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: PipelineConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Load `path`, writing the defaults there first when it does not exist.
pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<PipelineConfig, ConfigError> {
    let path = path.as_ref();
    if path.exists() {
        return load_config(path);
    }

    warn!(path = %path.display(), "Config file not found, writing defaults");
    let config = PipelineConfig::default();
    config.save(path)?;
    info!(path = %path.display(), "Default config written");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config() {
        let toml_content = r#"
data_path = "logs/access.csv"
threshold = 2.5
epochs = 10
generate_synthetic = false

[notification]
enabled = true
webhook_url = "https://hooks.example.com/T000"
recipient = "secops"
"#;
        let config: PipelineConfig = toml::from_str(toml_content).unwrap();
        config.validate().unwrap();
        assert_eq!(config.data_path, PathBuf::from("logs/access.csv"));
        assert_eq!(config.threshold, 2.5);
        assert_eq!(config.epochs, 10);
        assert!(!config.generate_synthetic);
        // untouched keys keep their defaults
        assert_eq!(config.learning_rate, 0.01);
        assert!(config.notification.is_complete());
        assert!(!config.notification.attach_alert_log);
    }

    #[test]
    fn test_unknown_key_rejected_at_load() {
        let result: Result<PipelineConfig, _> = toml::from_str("batch_size = 32\n");
        assert!(result.is_err());

        let nested: Result<PipelineConfig, _> = toml::from_str("[notification]\nsmtp_server = \"x\"\n");
        assert!(nested.is_err());
    }

    #[test]
    fn test_validation_ranges() {
        let mut config = PipelineConfig::default();
        config.threshold = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::OutOfRange { key: "threshold", .. })
        ));

        let mut config = PipelineConfig::default();
        config.epochs = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.learning_rate = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.model_path = PathBuf::new();
        assert_eq!(config.validate(), Err(ValidationError::EmptyPath("model_path")));
    }

    #[test]
    fn test_apply_update_dotted_and_nested() {
        let base = PipelineConfig::default();
        let updates = parse_assignments(&[
            "threshold=2",
            "notification.enabled=true",
            "data_path=data/other.csv",
        ])
        .unwrap();

        let updated = base.apply_update(&updates).unwrap();
        assert_eq!(updated.threshold, 2.0);
        assert!(updated.notification.enabled);
        assert_eq!(updated.data_path, PathBuf::from("data/other.csv"));
        // receiver unchanged
        assert_eq!(base, PipelineConfig::default());
    }

    #[test]
    fn test_apply_update_merges_tables() {
        let mut base = PipelineConfig::default();
        base.notification.recipient = "secops".to_string();

        let updates: toml::Table = toml::from_str("[notification]\nenabled = true\n").unwrap();
        let updated = base.apply_update(&updates).unwrap();
        assert!(updated.notification.enabled);
        assert_eq!(updated.notification.recipient, "secops");
    }

    #[test]
    fn test_apply_update_rejects_bad_values() {
        let base = PipelineConfig::default();

        let unknown = parse_assignments(&["batch_size=64"]).unwrap();
        assert!(matches!(
            base.apply_update(&unknown),
            Err(ConfigError::Invalid(ValidationError::UnknownKey(k))) if k == "batch_size"
        ));

        let negative = parse_assignments(&["threshold=-1"]).unwrap();
        assert!(matches!(
            base.apply_update(&negative),
            Err(ConfigError::Invalid(ValidationError::OutOfRange { key: "threshold", .. }))
        ));

        let wrong_type = parse_assignments(&["epochs=lots"]).unwrap();
        assert!(matches!(
            base.apply_update(&wrong_type),
            Err(ConfigError::Invalid(ValidationError::WrongType { .. }))
        ));
    }

    #[test]
    fn test_load_or_default_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("logguard.toml");

        let config = load_or_default(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, PipelineConfig::default());

        // second load reads the written file back
        assert_eq!(load_or_default(&path).unwrap(), config);
    }
}
