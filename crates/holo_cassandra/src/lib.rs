//! Cassandra session layer for the HoloFusion query engine.
//!
//! A [`CassandraSession`] sits between the engine's table providers and a
//! CQL cluster. It:
//! - resolves keyspace and table names case-insensitively, rejecting
//!   ambiguous matches,
//! - rebuilds a table's ordered column layout from live schema plus the
//!   ordering/visibility document kept in the table comment,
//! - enumerates and encodes partition keys so scans can be split by
//!   partition,
//! - reads `system.size_estimates`.
//!
//! Every cluster call runs through one [`ResilientExecutor`] that retries
//! total-unavailability failures until a per-call deadline. The driver itself
//! is consumed through the [`ClusterClient`]/[`ClusterSession`] traits;
//! [`InMemoryCluster`] implements them in-process.

use std::time::Duration;

use anyhow::{Context, Result};

pub mod client;
pub mod cql;
pub mod error;
pub mod executor;
pub mod identity;
pub mod layout;
pub mod memory;
pub mod partition;
pub mod reconnection;
pub mod session;
pub mod size_estimates;
pub mod types;

pub use client::{
    ClusterClient, ClusterSession, ColumnMetadata, Host, IndexMetadata, KeyspaceMetadata,
    NativeType, PreparedStatement, ResultSet, Row, Statement, TableMetadata, TokenRange,
};
pub use error::{ClusterError, SessionError};
pub use executor::ResilientExecutor;
pub use layout::{
    CassandraTable, CassandraTableHandle, ColumnHandle, ExtraColumnMetadata, SchemaTableName,
    PRESTO_COMMENT_METADATA,
};
pub use memory::InMemoryCluster;
pub use partition::{CassandraPartition, TupleDomain, UNPARTITIONED};
pub use reconnection::{
    ConstantReconnectionPolicy, ExponentialReconnectionPolicy, ReconnectionPolicy,
    ReconnectionSchedule,
};
pub use session::CassandraSession;
pub use size_estimates::SizeEstimate;
pub use types::{CassandraType, CqlValue};

const DEFAULT_CONNECTOR_ID: &str = "cassandra";
const DEFAULT_NO_HOST_AVAILABLE_RETRY_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_RECONNECT_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_RECONNECT_MAX_DELAY_MS: u64 = 600_000;

/// Session settings, normally read from `HOLO_CASSANDRA_*` environment
/// variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CassandraSessionConfig {
    /// Connector id stamped on every table and column handle.
    pub connector_id: String,
    /// Per-call budget for retrying total-unavailability failures.
    pub no_host_available_retry_timeout: Duration,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl Default for CassandraSessionConfig {
    fn default() -> Self {
        Self {
            connector_id: DEFAULT_CONNECTOR_ID.to_string(),
            no_host_available_retry_timeout: Duration::from_millis(
                DEFAULT_NO_HOST_AVAILABLE_RETRY_TIMEOUT_MS,
            ),
            reconnect_base_delay: Duration::from_millis(DEFAULT_RECONNECT_BASE_DELAY_MS),
            reconnect_max_delay: Duration::from_millis(DEFAULT_RECONNECT_MAX_DELAY_MS),
        }
    }
}

impl CassandraSessionConfig {
    /// Builds config from environment variables with defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let connector_id = lookup("HOLO_CASSANDRA_CONNECTOR_ID")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_CONNECTOR_ID.to_string());
        let retry_timeout_ms = parse_u64(
            lookup("HOLO_CASSANDRA_NO_HOST_AVAILABLE_RETRY_TIMEOUT_MS"),
            DEFAULT_NO_HOST_AVAILABLE_RETRY_TIMEOUT_MS,
        )?;
        let base_delay_ms = parse_u64(
            lookup("HOLO_CASSANDRA_RECONNECT_BASE_DELAY_MS"),
            DEFAULT_RECONNECT_BASE_DELAY_MS,
        )?
        .max(1);
        let max_delay_ms = parse_u64(
            lookup("HOLO_CASSANDRA_RECONNECT_MAX_DELAY_MS"),
            DEFAULT_RECONNECT_MAX_DELAY_MS,
        )?
        .max(base_delay_ms);

        Ok(Self {
            connector_id,
            no_host_available_retry_timeout: Duration::from_millis(retry_timeout_ms),
            reconnect_base_delay: Duration::from_millis(base_delay_ms),
            reconnect_max_delay: Duration::from_millis(max_delay_ms),
        })
    }

    /// Exponential backoff policy for drivers built from this config.
    pub fn reconnection_policy(&self) -> ExponentialReconnectionPolicy {
        ExponentialReconnectionPolicy::new(self.reconnect_base_delay, self.reconnect_max_delay)
    }
}

/// Parses an optional `u64` with fallback default.
fn parse_u64(value: Option<String>, default_value: u64) -> Result<u64> {
    match value {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid u64 value: {raw}")),
        None => Ok(default_value),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<CassandraSessionConfig> {
        let vars = vars
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        CassandraSessionConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).expect("config");
        assert_eq!(config, CassandraSessionConfig::default());
        assert_eq!(config.connector_id, "cassandra");
        assert_eq!(
            config.no_host_available_retry_timeout,
            Duration::from_secs(60)
        );
    }

    #[test]
    fn overrides_are_parsed_and_delays_clamped() {
        let config = config_from(&[
            ("HOLO_CASSANDRA_CONNECTOR_ID", "cass-eu"),
            ("HOLO_CASSANDRA_NO_HOST_AVAILABLE_RETRY_TIMEOUT_MS", "250"),
            ("HOLO_CASSANDRA_RECONNECT_BASE_DELAY_MS", "0"),
            ("HOLO_CASSANDRA_RECONNECT_MAX_DELAY_MS", "0"),
        ])
        .expect("config");
        assert_eq!(config.connector_id, "cass-eu");
        assert_eq!(
            config.no_host_available_retry_timeout,
            Duration::from_millis(250)
        );
        let policy = config.reconnection_policy();
        assert_eq!(policy.base_delay(), Duration::from_millis(1));
        assert_eq!(policy.max_delay(), Duration::from_millis(1));
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = config_from(&[("HOLO_CASSANDRA_NO_HOST_AVAILABLE_RETRY_TIMEOUT_MS", "soon")])
            .expect_err("invalid");
        assert!(err.to_string().contains("invalid u64 value: soon"));
    }
}
