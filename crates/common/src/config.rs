//! Migration engine configuration
//!
//! Sources, lowest priority first: built-in defaults, a YAML file, then
//! `POSMIGRATE_*` environment variables (a `.env` file is honoured).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "POSMIGRATE_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {file_path}")]
    FileNotFound { file_path: String },

    #[error("Config parsing failed: {format} - {reason}")]
    ParsingFailed { format: String, reason: String },

    #[error("Invalid config value: {config_key} = '{value}' - {reason}")]
    InvalidValue {
        config_key: String,
        value: String,
        reason: String,
    },

    #[error("Config validation failed: {reason}")]
    ValidationFailed { reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Token bucket mirroring the remote API limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfigBase {
    pub bucket_capacity: u32,
    pub refill_rate_per_second: f64,
}

impl Default for RateLimitConfigBase {
    fn default() -> Self {
        Self {
            bucket_capacity: 40,
            refill_rate_per_second: 2.0,
        }
    }
}

impl RateLimitConfigBase {
    /// Plus-plan style limits
    pub fn large() -> Self {
        Self {
            bucket_capacity: 80,
            refill_rate_per_second: 4.0,
        }
    }
}

/// Retry queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfigBase {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfigBase {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfigBase {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

/// Adaptive batch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfigBase {
    /// Batch size at full rate-limit headroom
    pub max_batch_size: usize,
    /// HYBRID stages with at least this many records run as bulk jobs
    pub hybrid_bulk_threshold: usize,
}

impl Default for BatchConfigBase {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            hybrid_bulk_threshold: 5000,
        }
    }
}

impl BatchConfigBase {
    pub fn small() -> Self {
        Self {
            max_batch_size: 5,
            hybrid_bulk_threshold: 2000,
        }
    }

    pub fn large() -> Self {
        Self {
            max_batch_size: 25,
            hybrid_bulk_threshold: 10_000,
        }
    }
}

/// Asynchronous bulk job polling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BulkConfigBase {
    pub poll_interval_ms: u64,
    pub max_poll_duration_ms: u64,
    /// Backoff applied to consecutive poll errors
    pub error_backoff_initial_ms: u64,
    pub error_backoff_max_ms: u64,
}

impl Default for BulkConfigBase {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            max_poll_duration_ms: 30 * 60 * 1_000,
            error_backoff_initial_ms: 500,
            error_backoff_max_ms: 30_000,
        }
    }
}

impl BulkConfigBase {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_poll_duration(&self) -> Duration {
        Duration::from_millis(self.max_poll_duration_ms)
    }
}

/// Time limits for mapping-suggestion calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionTimeoutConfig {
    pub suggest_timeout_ms: u64,
    pub validate_timeout_ms: u64,
    pub schema_detection_timeout_ms: u64,
}

impl Default for SuggestionTimeoutConfig {
    fn default() -> Self {
        Self {
            suggest_timeout_ms: 10_000,
            validate_timeout_ms: 10_000,
            schema_detection_timeout_ms: 30_000,
        }
    }
}

/// Post-migration verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Fields compared on matched record pairs
    pub critical_fields: Vec<String>,
    /// Match keys, tried in order until one finds a migrated counterpart
    pub match_keys: Vec<String>,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            critical_fields: ["title", "price", "sku", "email"]
                .into_iter()
                .map(String::from)
                .collect(),
            match_keys: ["sku", "id", "email"].into_iter().map(String::from).collect(),
        }
    }
}

/// Complete configuration of one migration run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub rate_limit: RateLimitConfigBase,
    pub retry: RetryConfigBase,
    pub batch: BatchConfigBase,
    pub bulk: BulkConfigBase,
    pub suggestion: SuggestionTimeoutConfig,
    pub verification: VerificationConfig,
}

impl MigrationConfig {
    /// Defaults, then the optional YAML file, then environment overrides
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env_vars(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            file_path: path.display().to_string(),
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParsingFailed {
            format: "yaml".to_string(),
            reason: e.to_string(),
        })
    }

    /// Apply `POSMIGRATE_*` variables; unknown keys are ignored
    pub fn apply_env_vars<I>(&mut self, vars: I) -> ConfigResult<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(config_key) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            self.apply_env_var(config_key, &value)?;
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str) -> ConfigResult<()> {
        match key.to_uppercase().as_str() {
            "BUCKET_CAPACITY" => self.rate_limit.bucket_capacity = parse(key, value)?,
            "REFILL_RATE" => self.rate_limit.refill_rate_per_second = parse(key, value)?,
            "MAX_RETRIES" => self.retry.max_retries = parse(key, value)?,
            "RETRY_BASE_DELAY_MS" => self.retry.initial_backoff_ms = parse(key, value)?,
            "MAX_BATCH_SIZE" => self.batch.max_batch_size = parse(key, value)?,
            "HYBRID_BULK_THRESHOLD" => self.batch.hybrid_bulk_threshold = parse(key, value)?,
            "BULK_POLL_INTERVAL_MS" => self.bulk.poll_interval_ms = parse(key, value)?,
            "BULK_MAX_POLL_DURATION_MS" => self.bulk.max_poll_duration_ms = parse(key, value)?,
            "SUGGEST_TIMEOUT_MS" => {
                let timeout = parse(key, value)?;
                self.suggestion.suggest_timeout_ms = timeout;
                self.suggestion.validate_timeout_ms = timeout;
            }
            "SCHEMA_TIMEOUT_MS" => self.suggestion.schema_detection_timeout_ms = parse(key, value)?,
            _ => {}
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let checks: [(&str, bool); 6] = [
            ("rate_limit.bucket_capacity", self.rate_limit.bucket_capacity > 0),
            (
                "rate_limit.refill_rate_per_second",
                self.rate_limit.refill_rate_per_second.is_finite()
                    && self.rate_limit.refill_rate_per_second > 0.0,
            ),
            ("batch.max_batch_size", self.batch.max_batch_size > 0),
            ("bulk.poll_interval_ms", self.bulk.poll_interval_ms > 0),
            (
                "bulk.max_poll_duration_ms",
                self.bulk.max_poll_duration_ms >= self.bulk.poll_interval_ms,
            ),
            ("retry.backoff_multiplier", self.retry.backoff_multiplier >= 1.0),
        ];

        let failed: Vec<&str> = checks
            .iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| *name)
            .collect();
        if failed.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed {
                reason: format!("invalid values for {}", failed.join(", ")),
            })
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        config_key: format!("{ENV_PREFIX}{key}"),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine_constants() {
        let config = MigrationConfig::default();
        assert_eq!(config.rate_limit.bucket_capacity, 40);
        assert_eq!(config.rate_limit.refill_rate_per_second, 2.0);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_backoff(), Duration::from_secs(1));
        assert_eq!(config.batch.max_batch_size, 10);
        assert_eq!(config.bulk.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.bulk.max_poll_duration(), Duration::from_secs(1800));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = MigrationConfig::default();
        config
            .apply_env_vars(vec![
                ("POSMIGRATE_MAX_BATCH_SIZE".to_string(), "20".to_string()),
                ("POSMIGRATE_REFILL_RATE".to_string(), "4.5".to_string()),
                ("HOME".to_string(), "/root".to_string()),
            ])
            .expect("valid overrides");
        assert_eq!(config.batch.max_batch_size, 20);
        assert_eq!(config.rate_limit.refill_rate_per_second, 4.5);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = MigrationConfig::default();
        let err = config
            .apply_env_vars(vec![("POSMIGRATE_MAX_RETRIES".to_string(), "many".to_string())])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let mut config = MigrationConfig::default();
        config.rate_limit.bucket_capacity = 0;
        config.batch.max_batch_size = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("rate_limit.bucket_capacity"));
        assert!(err.contains("batch.max_batch_size"));
    }
}
