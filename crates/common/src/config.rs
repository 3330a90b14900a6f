//! Tunables of the relay scheduler and the consumer retry policy.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while loading saga configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A variable was set but could not be parsed.
    #[error("Invalid value for {key}: {value:?}")]
    Unparsable { key: &'static str, value: String },

    /// A value parsed but is outside its allowed range.
    #[error("Out of range value for {key}: {reason}")]
    OutOfRange { key: &'static str, reason: String },
}

/// Relay scheduler settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Time between two relay ticks.
    pub tick_interval: Duration,
    /// Maximum number of pending rows loaded per tick.
    pub batch_size: usize,
    /// Failed publish attempts after which a row is marked FAILED.
    pub max_retry_count: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(2000),
            batch_size: 50,
            max_retry_count: 5,
        }
    }
}

/// Exponential backoff applied by consumers to transient failures.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub multiplier: f64,
    /// Upper bound for a single delay.
    pub max: Duration,
    /// Total delay budget after which the message is dead-lettered.
    pub max_elapsed: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(1000),
            multiplier: 2.0,
            max: Duration::from_millis(10_000),
            max_elapsed: Duration::from_millis(60_000),
        }
    }
}

/// Complete saga configuration.
///
/// Reads from environment variables:
/// - `SAGA_TICK_INTERVAL_MS` (default: `2000`)
/// - `SAGA_BATCH_SIZE` (default: `50`)
/// - `SAGA_MAX_RETRY_COUNT` (default: `5`)
/// - `SAGA_BACKOFF_INITIAL_MS` (default: `1000`)
/// - `SAGA_BACKOFF_MULTIPLIER` (default: `2.0`)
/// - `SAGA_BACKOFF_MAX_MS` (default: `10000`)
/// - `SAGA_BACKOFF_MAX_ELAPSED_MS` (default: `60000`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SagaConfig {
    pub relay: RelayConfig,
    pub backoff: BackoffConfig,
}

impl SagaConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let tick_ms = parse_or(&lookup, "SAGA_TICK_INTERVAL_MS", 2000u64)?;
        let batch_size = parse_or(&lookup, "SAGA_BATCH_SIZE", defaults.relay.batch_size)?;
        let max_retry_count =
            parse_or(&lookup, "SAGA_MAX_RETRY_COUNT", defaults.relay.max_retry_count)?;
        let initial_ms = parse_or(&lookup, "SAGA_BACKOFF_INITIAL_MS", 1000u64)?;
        let multiplier = parse_or(&lookup, "SAGA_BACKOFF_MULTIPLIER", defaults.backoff.multiplier)?;
        let max_ms = parse_or(&lookup, "SAGA_BACKOFF_MAX_MS", 10_000u64)?;
        let max_elapsed_ms = parse_or(&lookup, "SAGA_BACKOFF_MAX_ELAPSED_MS", 60_000u64)?;

        let config = Self {
            relay: RelayConfig {
                tick_interval: Duration::from_millis(tick_ms),
                batch_size,
                max_retry_count,
            },
            backoff: BackoffConfig {
                initial: Duration::from_millis(initial_ms),
                multiplier,
                max: Duration::from_millis(max_ms),
                max_elapsed: Duration::from_millis(max_elapsed_ms),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is within its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.tick_interval.is_zero() {
            return Err(out_of_range("SAGA_TICK_INTERVAL_MS", "must be greater than 0"));
        }
        if self.relay.batch_size == 0 {
            return Err(out_of_range("SAGA_BATCH_SIZE", "must be greater than 0"));
        }
        if self.relay.max_retry_count == 0 {
            return Err(out_of_range("SAGA_MAX_RETRY_COUNT", "must be greater than 0"));
        }
        if self.backoff.initial.is_zero() {
            return Err(out_of_range("SAGA_BACKOFF_INITIAL_MS", "must be greater than 0"));
        }
        if !(self.backoff.multiplier >= 1.0) {
            return Err(out_of_range("SAGA_BACKOFF_MULTIPLIER", "must be at least 1.0"));
        }
        if self.backoff.max < self.backoff.initial {
            return Err(out_of_range(
                "SAGA_BACKOFF_MAX_MS",
                "must not be below SAGA_BACKOFF_INITIAL_MS",
            ));
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Unparsable { key, value: raw }),
    }
}

fn out_of_range(key: &'static str, reason: &str) -> ConfigError {
    ConfigError::OutOfRange {
        key,
        reason: reason.to_string(),
    }
}
