use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::config::Config;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid max_ttl_hours_user: {0}. must be between 1 and max_ttl_hours_absolute")]
    InvalidUserTtlBound(u32),

    #[error("invalid max_ttl_hours_absolute: {0}. must be between 1 and 24")]
    InvalidAbsoluteTtlBound(u32),

    #[error("invalid log level: {0}. must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("database path cannot be empty")]
    EmptyDatabasePath,

    #[error("invalid max_connections: {0}. must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("invalid workflow max_attempts: {0}. cannot be 0")]
    InvalidMaxAttempts(u32),

    #[error(
        "invalid backoff configuration: initial_backoff_ms ({initial_ms}) must be less than \
         max_backoff_secs ({max_secs}) in milliseconds"
    )]
    InvalidBackoff { initial_ms: u64, max_secs: u64 },

    #[error("invalid sweeper poll_interval_secs: {0}. must be at least 1")]
    InvalidSweeperInterval(u64),

    #[error("configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (`Serialized`)
    /// 2. `config/orchestrator.yaml` (deployment config)
    /// 3. `config/local.yaml` (optional local overrides)
    /// 4. Environment variables (`ORCHESTRATOR_*` prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("config/orchestrator.yaml"))
            .merge(Yaml::file("config/local.yaml"))
            .merge(Env::prefixed("ORCHESTRATOR_").split("__"))
            .extract()
            .context("failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, skipping environment
    /// overrides. Used by tests and one-off tooling.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let guardrails = &config.guardrails;
        if guardrails.max_ttl_hours_absolute == 0 || guardrails.max_ttl_hours_absolute > 24 {
            return Err(ConfigError::InvalidAbsoluteTtlBound(guardrails.max_ttl_hours_absolute));
        }
        if guardrails.max_ttl_hours_user == 0
            || guardrails.max_ttl_hours_user > guardrails.max_ttl_hours_absolute
        {
            return Err(ConfigError::InvalidUserTtlBound(guardrails.max_ttl_hours_user));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        if config.workflow.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.workflow.max_attempts));
        }
        let max_backoff_ms = config.workflow.max_backoff_secs.saturating_mul(1000);
        if config.workflow.initial_backoff_ms >= max_backoff_ms {
            return Err(ConfigError::InvalidBackoff {
                initial_ms: config.workflow.initial_backoff_ms,
                max_secs: config.workflow.max_backoff_secs,
            });
        }

        if config.sweeper.poll_interval_secs == 0 {
            return Err(ConfigError::InvalidSweeperInterval(config.sweeper.poll_interval_secs));
        }

        Ok(())
    }
}
