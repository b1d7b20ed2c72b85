//! Batch configuration.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// How simulated durability of a processed batch is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStrategy {
    /// One bulk counter increment for the whole batch.
    #[default]
    Batch,
    /// Fixed-size chunks flushed one at a time, yielding between flushes.
    Streaming,
    /// One increment per item.
    Individual,
}

impl CommitStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitStrategy::Batch => "batch",
            CommitStrategy::Streaming => "streaming",
            CommitStrategy::Individual => "individual",
        }
    }
}

impl FromStr for CommitStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "batch" => Ok(CommitStrategy::Batch),
            "streaming" => Ok(CommitStrategy::Streaming),
            "individual" => Ok(CommitStrategy::Individual),
            other => Err(Error::configuration_with_context(
                format!("unknown commit strategy '{}'", other),
                ErrorContext::new()
                    .with_field_path("commit_strategy")
                    .with_details("expected one of: batch, streaming, individual")
                    .with_source("batch_config"),
            )),
        }
    }
}

/// Upper bound on `max_workers`; every worker may be an OS thread.
pub const MAX_WORKERS: usize = 1024;

/// Immutable per-invocation configuration.
///
/// Built once per top-level call and never mutated afterwards; builders consume
/// and return `Self`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub max_workers: usize,
    /// Hard wall-clock bound on waiting for pooled work.
    pub timeout: Duration,
    /// Extra attempts per item after the first failure.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub throttle_interval: Duration,
    pub enable_monitoring: bool,
    pub commit_strategy: CommitStrategy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_workers: 4,
            timeout: Duration::from_secs(300),
            max_retries: 0,
            retry_delay: Duration::from_secs(1),
            throttle_interval: Duration::ZERO,
            enable_monitoring: true,
            commit_strategy: CommitStrategy::Batch,
        }
    }
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_batch_size(mut self, s: usize) -> Self {
        self.batch_size = s;
        self
    }
    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.max_workers = n;
        self
    }
    pub fn with_timeout(mut self, t: Duration) -> Self {
        self.timeout = t;
        self
    }
    pub fn with_max_retries(mut self, r: u32) -> Self {
        self.max_retries = r;
        self
    }
    pub fn with_retry_delay(mut self, d: Duration) -> Self {
        self.retry_delay = d;
        self
    }
    pub fn with_throttle_interval(mut self, d: Duration) -> Self {
        self.throttle_interval = d;
        self
    }
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.enable_monitoring = enabled;
        self
    }
    pub fn with_commit_strategy(mut self, s: CommitStrategy) -> Self {
        self.commit_strategy = s;
        self
    }

    /// Defaults overridden by environment variables.
    ///
    /// Recognized keys:
    /// - `BATCH_ENGINE_BATCH_SIZE`
    /// - `BATCH_ENGINE_MAX_WORKERS`
    /// - `BATCH_ENGINE_TIMEOUT_MS`
    /// - `BATCH_ENGINE_MAX_RETRIES`
    /// - `BATCH_ENGINE_RETRY_DELAY_MS`
    /// - `BATCH_ENGINE_THROTTLE_MS`
    ///
    /// Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_parse::<usize>("BATCH_ENGINE_BATCH_SIZE") {
            cfg.batch_size = v;
        }
        if let Some(v) = env_parse::<usize>("BATCH_ENGINE_MAX_WORKERS") {
            cfg.max_workers = v;
        }
        if let Some(v) = env_parse::<u64>("BATCH_ENGINE_TIMEOUT_MS").filter(|ms| *ms > 0) {
            cfg.timeout = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u32>("BATCH_ENGINE_MAX_RETRIES") {
            cfg.max_retries = v;
        }
        if let Some(v) = env_parse::<u64>("BATCH_ENGINE_RETRY_DELAY_MS") {
            cfg.retry_delay = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("BATCH_ENGINE_THROTTLE_MS") {
            cfg.throttle_interval = Duration::from_millis(v);
        }
        cfg
    }

    /// Parse a YAML document. Missing keys fall back to defaults; durations are
    /// given in (fractional) seconds.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: BatchConfigFile = serde_yaml::from_str(yaml)?;
        let cfg = raw.into_config()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// `max_workers` clamped to `1..=MAX_WORKERS`, for configs that skipped
    /// [`validate`](Self::validate).
    pub(crate) fn worker_limit(&self) -> usize {
        self.max_workers.clamp(1, MAX_WORKERS)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be at least 1"));
        }
        if self.max_workers == 0 {
            return Err(invalid("max_workers", "must be at least 1"));
        }
        if self.max_workers > MAX_WORKERS {
            return Err(invalid(
                "max_workers",
                &format!("must not exceed {}", MAX_WORKERS),
            ));
        }
        if self.timeout.is_zero() {
            return Err(invalid("timeout", "must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> Error {
    Error::configuration_with_context(
        format!("{} {}", field, reason),
        ErrorContext::new()
            .with_field_path(field)
            .with_source("batch_config"),
    )
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

/// Convert a seconds value coming from an external request into a `Duration`.
pub(crate) fn secs_to_duration(field: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|e| {
        Error::configuration_with_context(
            format!("{} is not a valid duration", field),
            ErrorContext::new()
                .with_field_path(field)
                .with_details(format!("{}: {}", secs, e))
                .with_source("batch_config"),
        )
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BatchConfigFile {
    batch_size: Option<usize>,
    max_workers: Option<usize>,
    timeout: Option<f64>,
    max_retries: Option<u32>,
    retry_delay: Option<f64>,
    throttle_rate: Option<f64>,
    enable_monitoring: Option<bool>,
    commit_strategy: Option<CommitStrategy>,
}

impl BatchConfigFile {
    fn into_config(self) -> Result<BatchConfig> {
        let mut cfg = BatchConfig::default();
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.max_workers {
            cfg.max_workers = v;
        }
        if let Some(v) = self.timeout {
            cfg.timeout = secs_to_duration("timeout", v)?;
        }
        if let Some(v) = self.max_retries {
            cfg.max_retries = v;
        }
        if let Some(v) = self.retry_delay {
            cfg.retry_delay = secs_to_duration("retry_delay", v)?;
        }
        if let Some(v) = self.throttle_rate {
            cfg.throttle_interval = secs_to_duration("throttle_rate", v)?;
        }
        if let Some(v) = self.enable_monitoring {
            cfg.enable_monitoring = v;
        }
        if let Some(v) = self.commit_strategy {
            cfg.commit_strategy = v;
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_config_defaults() {
        let config = BatchConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.max_workers, 4);
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert_eq!(config.max_retries, 0);
        assert!(config.enable_monitoring);
        assert_eq!(config.commit_strategy, CommitStrategy::Batch);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_batch_config_builder() {
        let config = BatchConfig::new()
            .with_batch_size(5)
            .with_max_workers(2)
            .with_timeout(Duration::from_millis(250))
            .with_max_retries(3)
            .with_monitoring(false)
            .with_commit_strategy(CommitStrategy::Streaming);
        assert_eq!(config.batch_size, 5);
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.timeout, Duration::from_millis(250));
        assert_eq!(config.max_retries, 3);
        assert!(!config.enable_monitoring);
        assert_eq!(config.commit_strategy, CommitStrategy::Streaming);
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(BatchConfig::new().with_batch_size(0).validate().is_err());
        assert!(BatchConfig::new().with_max_workers(0).validate().is_err());
        let err = BatchConfig::new()
            .with_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("timeout")
        );
    }

    #[test]
    fn test_validate_caps_workers() {
        assert!(BatchConfig::new().with_max_workers(MAX_WORKERS).validate().is_ok());
        assert!(BatchConfig::new()
            .with_max_workers(MAX_WORKERS + 1)
            .validate()
            .is_err());
        assert_eq!(
            BatchConfig::new().with_max_workers(usize::MAX).worker_limit(),
            MAX_WORKERS
        );
    }

    #[test]
    fn test_commit_strategy_parse() {
        assert_eq!(
            "streaming".parse::<CommitStrategy>().unwrap(),
            CommitStrategy::Streaming
        );
        assert_eq!(
            " Individual ".parse::<CommitStrategy>().unwrap(),
            CommitStrategy::Individual
        );
        assert!("eventually".parse::<CommitStrategy>().is_err());
    }

    #[test]
    fn test_from_yaml_str() {
        let yaml = r#"
batch_size: 25
max_workers: 8
timeout: 1.5
retry_delay: 0.01
commit_strategy: streaming
"#;
        let config = BatchConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.timeout, Duration::from_millis(1500));
        assert_eq!(config.retry_delay, Duration::from_millis(10));
        assert_eq!(config.commit_strategy, CommitStrategy::Streaming);
        // untouched keys keep defaults
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn test_from_yaml_str_rejects_invalid() {
        assert!(BatchConfig::from_yaml_str("batch_size: 0").is_err());
        assert!(BatchConfig::from_yaml_str("timeout: -1.0").is_err());
        assert!(BatchConfig::from_yaml_str("batch_size: [").is_err());
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("BATCH_ENGINE_BATCH_SIZE", "7");
        std::env::set_var("BATCH_ENGINE_TIMEOUT_MS", "not-a-number");
        let config = BatchConfig::from_env();
        std::env::remove_var("BATCH_ENGINE_BATCH_SIZE");
        std::env::remove_var("BATCH_ENGINE_TIMEOUT_MS");
        assert_eq!(config.batch_size, 7);
        assert_eq!(config.timeout, Duration::from_secs(300));
    }
}
