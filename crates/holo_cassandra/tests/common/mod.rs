#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use holo_cassandra::{
    CassandraSession, ColumnMetadata, ConstantReconnectionPolicy, Host, InMemoryCluster,
    NativeType, TableMetadata,
};
use tracing_subscriber::EnvFilter;

pub const KEYSPACE: &str = "app";

/// Installs a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// In-memory cluster plus a session bound to it.
pub struct TestHarness {
    pub cluster: InMemoryCluster,
    pub session: CassandraSession,
}

impl TestHarness {
    pub fn start() -> Self {
        Self::with_retry_timeout(Duration::from_millis(200))
    }

    /// Reconnects every 10ms and gives up on total unavailability after
    /// `retry_timeout`.
    pub fn with_retry_timeout(retry_timeout: Duration) -> Self {
        init_tracing();
        let cluster = InMemoryCluster::new().with_reconnection_policy(Arc::new(
            ConstantReconnectionPolicy::new(Duration::from_millis(10)),
        ));
        let session = CassandraSession::new("cassandra", Arc::new(cluster.clone()), retry_timeout);
        Self { cluster, session }
    }
}

pub fn table(
    keyspace: &str,
    name: &str,
    columns: &[(&str, &str)],
    partition_key: &[&str],
    clustering_columns: &[&str],
) -> TableMetadata {
    TableMetadata {
        keyspace: keyspace.to_string(),
        name: name.to_string(),
        columns: columns
            .iter()
            .map(|(column, native)| ColumnMetadata::new(*column, NativeType::new(*native)))
            .collect(),
        partition_key: partition_key.iter().map(|c| c.to_string()).collect(),
        clustering_columns: clustering_columns.iter().map(|c| c.to_string()).collect(),
        indexes: Vec::new(),
        comment: None,
    }
}

/// `users(id int, name text, email text)` keyed by `id`.
pub fn users_table(comment: Option<&str>) -> TableMetadata {
    let mut users = table(
        KEYSPACE,
        "users",
        &[("id", "int"), ("name", "text"), ("email", "text")],
        &["id"],
        &[],
    );
    users.comment = comment.map(str::to_string);
    users
}

/// `events(day int, bucket text, seq int, payload text)` keyed by
/// `(day, bucket)` and clustered by `seq`.
pub fn events_table() -> TableMetadata {
    table(
        KEYSPACE,
        "events",
        &[
            ("day", "int"),
            ("bucket", "text"),
            ("seq", "int"),
            ("payload", "text"),
        ],
        &["day", "bucket"],
        &["seq"],
    )
}

pub fn host(port: u16) -> Host {
    Host::new(SocketAddr::from(([10, 0, 0, 1], port)))
}
