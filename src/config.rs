//! Application configuration.
//!
//! Configuration is loaded once at process start and handed to each
//! component by reference; there are no cached global settings. Values come
//! from the environment with sensible defaults for local development.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Runtime configuration for the job lifecycle service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Deployment environment tag ("develop", "production", ...). Feeds the
    /// dispatcher's remote application name.
    pub environment: String,

    // Storage settings
    /// Postgres connection URL for the job store.
    pub database_url: String,

    // Queue settings
    /// Redis connection URL for the delivery queue.
    pub redis_url: String,
    /// Name of the delivery queue.
    pub queue_name: String,
    /// Maximum notices fetched per queue read.
    pub queue_read_batch: usize,
    /// How long a read-but-unacknowledged notice stays invisible.
    pub visibility_timeout: Duration,

    // Dispatch settings
    /// Base URL of the remote worker gateway.
    pub worker_gateway_url: String,

    // Recovery settings
    /// Age past which a `processing` job counts as stuck and a `pending`
    /// job counts as orphaned.
    pub stuck_timeout: Duration,
    /// Period of the recovery sweep.
    pub sweep_interval: Duration,

    /// Default log level when RUST_LOG is unset.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: "develop".to_string(),
            database_url: "postgres://localhost/jobforge".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            queue_name: "job_queue".to_string(),
            queue_read_batch: 10,
            visibility_timeout: Duration::from_secs(300),
            worker_gateway_url: "http://localhost:8040".to_string(),
            stuck_timeout: Duration::from_secs(15 * 60),
            sweep_interval: Duration::from_secs(15 * 60),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `ENVIRONMENT`: deployment tag (default: develop)
    /// - `DATABASE_URL`: Postgres connection URL (required)
    /// - `REDIS_URL`: Redis connection URL (default: redis://localhost:6379)
    /// - `JOB_QUEUE_NAME`: delivery queue name (default: job_queue)
    /// - `QUEUE_READ_BATCH`: notices per read (default: 10)
    /// - `QUEUE_VISIBILITY_TIMEOUT_SECS`: visibility timeout (default: 300)
    /// - `WORKER_GATEWAY_URL`: worker gateway base URL (default: http://localhost:8040)
    /// - `JOB_STUCK_TIMEOUT_MINUTES`: stuck/orphan threshold (default: 15)
    /// - `SWEEP_INTERVAL_MINUTES`: recovery sweep period (default: 15)
    /// - `LOG_LEVEL`: default log level (default: info)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `DATABASE_URL` is missing or any variable
    /// has an unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("ENVIRONMENT") {
            config.environment = val;
        }

        config.database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;

        if let Ok(val) = std::env::var("REDIS_URL") {
            config.redis_url = val;
        }

        if let Ok(val) = std::env::var("JOB_QUEUE_NAME") {
            config.queue_name = val;
        }

        if let Ok(val) = std::env::var("QUEUE_READ_BATCH") {
            config.queue_read_batch = parse_env_value(&val, "QUEUE_READ_BATCH")?;
        }

        if let Ok(val) = std::env::var("QUEUE_VISIBILITY_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "QUEUE_VISIBILITY_TIMEOUT_SECS")?;
            config.visibility_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("WORKER_GATEWAY_URL") {
            config.worker_gateway_url = val;
        }

        if let Ok(val) = std::env::var("JOB_STUCK_TIMEOUT_MINUTES") {
            let minutes: u64 = parse_env_value(&val, "JOB_STUCK_TIMEOUT_MINUTES")?;
            config.stuck_timeout = Duration::from_secs(minutes * 60);
        }

        if let Ok(val) = std::env::var("SWEEP_INTERVAL_MINUTES") {
            let minutes: u64 = parse_env_value(&val, "SWEEP_INTERVAL_MINUTES")?;
            config.sweep_interval = Duration::from_secs(minutes * 60);
        }

        if let Ok(val) = std::env::var("LOG_LEVEL") {
            config.log_level = val;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.environment.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "environment cannot be empty".to_string(),
            ));
        }

        if self.database_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "database_url cannot be empty".to_string(),
            ));
        }

        if self.redis_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "redis_url cannot be empty".to_string(),
            ));
        }

        if self.queue_name.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "queue_name cannot be empty".to_string(),
            ));
        }

        if self.queue_read_batch == 0 {
            return Err(ConfigError::ValidationFailed(
                "queue_read_batch must be greater than 0".to_string(),
            ));
        }

        if self.visibility_timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "visibility_timeout must be greater than 0".to_string(),
            ));
        }

        if self.worker_gateway_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "worker_gateway_url cannot be empty".to_string(),
            ));
        }

        if self.stuck_timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "stuck_timeout must be greater than 0".to_string(),
            ));
        }

        if self.sweep_interval.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "sweep_interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parses an environment variable value into the target type.
fn parse_env_value<T>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}
