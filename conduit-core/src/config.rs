//! Configuration types for the Conduit runtime
//!
//! Constructors and setters stay the primary interface; this module only
//! gathers the same knobs so an assembling application can load them from
//! `conduit.toml` and `CONDUIT_*` environment variables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ConduitError, Result};

/// Error substrings that mark a failed result as transient
pub const DEFAULT_RETRYABLE_PATTERNS: &[&str] = &[
    "timeout",
    "temporary failure",
    "connection refused",
    "network unreachable",
    "resource temporarily unavailable",
];

/// Input keys whose values are masked before they reach observers
pub const DEFAULT_MASK_KEYS: &[&str] = &[
    "api_key",
    "apikey",
    "token",
    "password",
    "passwd",
    "secret",
    "auth",
    "key",
    "credential",
    "private",
];

/// Main configuration for Conduit
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConduitConfig {
    /// Dispatcher configuration
    pub dispatcher: DispatcherConfig,

    /// Concurrent executor configuration
    pub executor: ExecutorConfig,

    /// Retry middleware configuration
    pub retry: RetryConfig,

    /// Rate limit middleware configuration
    pub rate_limit: RateLimitConfig,

    /// Cache middleware configuration
    pub cache: CacheConfig,

    /// Events middleware configuration
    pub events: EventsConfig,

    /// Performance middleware configuration
    pub performance: PerformanceConfig,

    /// Batch processor configuration
    pub batch: BatchConfig,
}

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Maximum parallel executions within one batch call
    pub max_parallel: usize,

    /// Timeout applied to each call (zero disables it)
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_parallel: 5,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Concurrent executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Worker count and admission gate size
    pub max_concurrency: usize,

    /// Task queue capacity (defaults to `max_concurrency * 10`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_size: Option<usize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            queue_size: None,
        }
    }
}

impl ExecutorConfig {
    /// Create a config for the given concurrency cap
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            queue_size: None,
        }
    }

    /// Override the queue capacity
    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = Some(queue_size);
        self
    }

    /// Effective queue capacity
    pub fn effective_queue_size(&self) -> usize {
        self.queue_size
            .unwrap_or(self.max_concurrency.max(1) * 10)
            .max(1)
    }
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts after the first one
    pub max_retries: u32,

    /// Fixed delay between attempts
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Case-sensitive substrings that make an error retryable
    pub retryable_patterns: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            retryable_patterns: DEFAULT_RETRYABLE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

/// Token bucket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Install the rate limit middleware in the standard stack
    pub enabled: bool,

    /// Refill interval (one token per interval)
    #[serde(with = "humantime_serde")]
    pub rate: Duration,

    /// Bucket capacity
    pub max_tokens: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rate: Duration::from_millis(100),
            max_tokens: 10,
        }
    }
}

/// Result cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Install the cache middleware in the standard stack
    pub enabled: bool,

    /// Entry lifetime
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Maximum cached entries
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: Duration::from_secs(300),
            max_entries: 10_000,
        }
    }
}

/// Events middleware configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Install the events middleware in the standard stack
    pub enabled: bool,

    /// Output longer than this many characters is truncated in events
    pub max_output_chars: usize,

    /// Case-insensitive key substrings whose values are masked
    pub mask_keys: Vec<String>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_output_chars: 20_000,
            mask_keys: DEFAULT_MASK_KEYS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Performance middleware configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Calls slower than this get a warning annotation
    #[serde(with = "humantime_serde")]
    pub threshold: Duration,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            threshold: Duration::from_secs(10),
        }
    }
}

/// Batch processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Items per batch
    pub batch_size: usize,

    /// Timeout for each batch
    #[serde(with = "humantime_serde")]
    pub batch_timeout: Duration,

    /// Pause inserted between consecutive batches
    #[serde(with = "humantime_serde")]
    pub pacing_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_timeout: Duration::from_secs(300),
            pacing_delay: Duration::from_millis(100),
        }
    }
}

impl ConduitConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. Configuration file (`conduit.toml`, then the path in `CONDUIT_CONFIG_PATH`)
    /// 3. Environment variable overrides (`CONDUIT_DISPATCHER__MAX_PARALLEL=8`)
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is invalid or the result fails validation.
    pub fn load() -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(ConduitConfig::default()))
            .merge(Toml::file("conduit.toml"));

        if let Ok(path) = std::env::var("CONDUIT_CONFIG_PATH") {
            figment = figment.merge(Toml::file(path));
        }

        let config: ConduitConfig = figment
            .merge(Env::prefixed("CONDUIT_").ignore(&["CONFIG_PATH"]).split("__"))
            .extract()
            .map_err(|e| {
                ConduitError::Configuration(format!("Failed to load configuration: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let path = path.as_ref();
        if !path.exists() {
            return Err(ConduitError::Configuration(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let config: ConduitConfig = Figment::from(Serialized::defaults(ConduitConfig::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| {
                ConduitError::Configuration(format!("Failed to load configuration file: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.dispatcher.max_parallel == 0 {
            return Err(ConduitError::Configuration(
                "dispatcher.max_parallel must be at least 1".to_string(),
            ));
        }
        if self.executor.max_concurrency == 0 {
            return Err(ConduitError::Configuration(
                "executor.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.executor.queue_size == Some(0) {
            return Err(ConduitError::Configuration(
                "executor.queue_size must be at least 1".to_string(),
            ));
        }
        if self.batch.batch_size == 0 {
            return Err(ConduitError::Configuration(
                "batch.batch_size must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.max_tokens == 0 {
            return Err(ConduitError::Configuration(
                "rate_limit.max_tokens must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.rate.is_zero() {
            return Err(ConduitError::Configuration(
                "rate_limit.rate must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ConduitConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.events.max_output_chars, 20_000);
        assert_eq!(config.retry.retryable_patterns.len(), 5);
        assert_eq!(config.executor.effective_queue_size(), 40);
    }

    #[test]
    fn test_queue_size_override() {
        let config = ExecutorConfig::new(2).with_queue_size(3);
        assert_eq!(config.effective_queue_size(), 3);
        assert_eq!(ExecutorConfig::new(2).effective_queue_size(), 20);
    }

    #[test]
    fn test_from_file_partial_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[dispatcher]
max_parallel = 8
timeout = "30s"

[retry]
max_retries = 1
retry_delay = "250ms"
"#
        )
        .unwrap();

        let config = ConduitConfig::from_file(file.path()).unwrap();

        assert_eq!(config.dispatcher.max_parallel, 8);
        assert_eq!(config.dispatcher.timeout, Duration::from_secs(30));
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.retry_delay, Duration::from_millis(250));
        // untouched sections keep their defaults
        assert_eq!(config.batch.batch_size, 10);
        assert_eq!(config.retry.retryable_patterns.len(), 5);
    }

    #[test]
    fn test_from_file_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[executor]\nmax_concurrency = 0").unwrap();

        let err = ConduitConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConduitError::Configuration(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = ConduitConfig::from_file("/definitely/not/here/conduit.toml").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
