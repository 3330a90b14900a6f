//! Process configuration loaded from environment variables.

use common::{ConfigError, SagaConfig};

/// Runtime configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address of the admin server (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `ORDER_DATABASE_URL` / `PAYMENT_DATABASE_URL` — PostgreSQL for each
///   ledger; both must be set, otherwise both ledgers run in memory
/// - `KAFKA_BROKERS` — bootstrap servers; unset means the in-memory broker
/// - `SAGA_PARTITIONS` — partitions per topic, one listener each (default: `3`)
/// - the `SAGA_*` tunables read by [`SagaConfig`]
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub order_database_url: Option<String>,
    pub payment_database_url: Option<String>,
    pub kafka_brokers: Option<String>,
    pub partitions: i32,
    pub saga: SagaConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let partitions = match lookup("SAGA_PARTITIONS") {
            None => defaults.partitions,
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Unparsable {
                key: "SAGA_PARTITIONS",
                value: raw,
            })?,
        };
        if partitions < 1 {
            return Err(ConfigError::OutOfRange {
                key: "SAGA_PARTITIONS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            order_database_url: lookup("ORDER_DATABASE_URL").filter(|url| !url.is_empty()),
            payment_database_url: lookup("PAYMENT_DATABASE_URL").filter(|url| !url.is_empty()),
            kafka_brokers: lookup("KAFKA_BROKERS").filter(|brokers| !brokers.is_empty()),
            partitions,
            saga: SagaConfig::from_lookup(&lookup)?,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns both database URLs when the ledgers should use PostgreSQL.
    pub fn database_urls(&self) -> Option<(&str, &str)> {
        match (&self.order_database_url, &self.payment_database_url) {
            (Some(orders), Some(payments)) => Some((orders.as_str(), payments.as_str())),
            _ => None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            order_database_url: None,
            payment_database_url: None,
            kafka_brokers: None,
            partitions: 3,
            saga: SagaConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(move |key| map.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = load(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.partitions, 3);
        assert!(config.database_urls().is_none());
        assert!(config.kafka_brokers.is_none());
        assert_eq!(config.saga, SagaConfig::default());
    }

    #[test]
    fn test_addr_formatting() {
        let config = load(&[("HOST", "127.0.0.1"), ("PORT", "8080")]).unwrap();
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_bad_port_falls_back() {
        let config = load(&[("PORT", "http")]).unwrap();
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_databases_need_both_urls() {
        let one = load(&[("ORDER_DATABASE_URL", "postgres://localhost/orders")]).unwrap();
        assert!(one.database_urls().is_none());

        let both = load(&[
            ("ORDER_DATABASE_URL", "postgres://localhost/orders"),
            ("PAYMENT_DATABASE_URL", "postgres://localhost/payments"),
        ])
        .unwrap();
        assert_eq!(
            both.database_urls(),
            Some(("postgres://localhost/orders", "postgres://localhost/payments"))
        );
    }

    #[test]
    fn test_saga_tunables_are_read() {
        let config = load(&[("SAGA_TICK_INTERVAL_MS", "500"), ("SAGA_BATCH_SIZE", "10")]).unwrap();
        assert_eq!(config.saga.relay.tick_interval, Duration::from_millis(500));
        assert_eq!(config.saga.relay.batch_size, 10);
    }

    #[test]
    fn test_invalid_partitions() {
        assert!(matches!(
            load(&[("SAGA_PARTITIONS", "zero")]),
            Err(ConfigError::Unparsable { .. })
        ));
        assert!(matches!(
            load(&[("SAGA_PARTITIONS", "0")]),
            Err(ConfigError::OutOfRange { .. })
        ));
    }
}
