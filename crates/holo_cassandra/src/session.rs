//! `CassandraSession`: the metadata and query surface handed to the engine's
//! connector.
//!
//! Every method goes through the session's single [`ResilientExecutor`], so
//! total-unavailability failures are retried up to the configured budget and
//! everything else surfaces immediately.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use datafusion::common::ScalarValue;
use tokio_util::sync::CancellationToken;

use crate::client::{ClusterClient, Host, PreparedStatement, ResultSet, Statement, TokenRange};
use crate::cql::valid_schema_name;
use crate::error::Result;
use crate::executor::ResilientExecutor;
use crate::identity::resolve_keyspace;
use crate::layout::{self, CassandraTable, ExtraColumnMetadata, SchemaTableName};
use crate::partition::{self, CassandraPartition};
use crate::size_estimates::{self, SizeEstimate};
use crate::types::CqlValue;
use crate::CassandraSessionConfig;

pub struct CassandraSession {
    connector_id: String,
    executor: ResilientExecutor,
}

impl CassandraSession {
    pub fn new(
        connector_id: impl Into<String>,
        client: Arc<dyn ClusterClient>,
        no_host_available_retry_timeout: Duration,
    ) -> Self {
        Self::with_cancellation(
            connector_id,
            client,
            no_host_available_retry_timeout,
            CancellationToken::new(),
        )
    }

    /// Builds a session that stops serving cluster calls once `shutdown`
    /// fires.
    pub fn with_cancellation(
        connector_id: impl Into<String>,
        client: Arc<dyn ClusterClient>,
        no_host_available_retry_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            connector_id: connector_id.into(),
            executor: ResilientExecutor::with_cancellation(
                client,
                no_host_available_retry_timeout,
                shutdown,
            ),
        }
    }

    pub fn from_config(client: Arc<dyn ClusterClient>, config: &CassandraSessionConfig) -> Self {
        Self::new(
            config.connector_id.clone(),
            client,
            config.no_host_available_retry_timeout,
        )
    }

    pub fn connector_id(&self) -> &str {
        &self.connector_id
    }

    pub fn executor(&self) -> &ResilientExecutor {
        &self.executor
    }

    /// Cancelling the returned token aborts the calls in flight; later calls
    /// run normally.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.executor.cancellation_token()
    }

    pub async fn partitioner(&self) -> Result<String> {
        self.executor
            .run(|session| async move { session.partitioner().await })
            .await
    }

    pub async fn token_ranges(&self) -> Result<BTreeSet<TokenRange>> {
        self.executor
            .run(|session| async move { session.token_ranges().await })
            .await
    }

    /// Replicas owning `range` in the keyspace named exactly `schema`.
    pub async fn replicas_for_range(
        &self,
        schema: &str,
        range: &TokenRange,
    ) -> Result<BTreeSet<Host>> {
        let keyspace = valid_schema_name(schema);
        let keyspace = keyspace.as_str();
        self.executor
            .run(|session| async move { session.replicas_for_range(keyspace, range).await })
            .await
    }

    /// Replicas owning the encoded partition key in the keyspace named
    /// exactly `schema`.
    pub async fn replicas_for_key(&self, schema: &str, partition_key: &[u8]) -> Result<BTreeSet<Host>> {
        let keyspace = valid_schema_name(schema);
        let keyspace = keyspace.as_str();
        self.executor
            .run(|session| async move { session.replicas_for_key(keyspace, partition_key).await })
            .await
    }

    pub async fn case_sensitive_schema_name(&self, schema: &str) -> Result<String> {
        Ok(resolve_keyspace(&self.executor, schema).await?.name)
    }

    /// Every keyspace name as stored, in cluster metadata order.
    pub async fn case_sensitive_schema_names(&self) -> Result<Vec<String>> {
        let keyspaces = self
            .executor
            .run(|session| async move { session.keyspaces().await })
            .await?;
        Ok(keyspaces.into_iter().map(|keyspace| keyspace.name).collect())
    }

    pub async fn case_sensitive_table_names(&self, schema: &str) -> Result<Vec<String>> {
        let keyspace = resolve_keyspace(&self.executor, schema).await?;
        Ok(keyspace.tables.into_iter().map(|table| table.name).collect())
    }

    pub async fn get_table(&self, schema_table: &SchemaTableName) -> Result<CassandraTable> {
        layout::build_table(&self.executor, &self.connector_id, schema_table).await
    }

    pub async fn get_partitions(
        &self,
        table: &CassandraTable,
        filter_prefix: &[ScalarValue],
    ) -> Result<Vec<CassandraPartition>> {
        partition::enumerate_partitions(&self.executor, table, filter_prefix).await
    }

    pub async fn execute(&self, statement: &Statement) -> Result<ResultSet> {
        self.executor
            .run(|session| async move { session.execute(statement).await })
            .await
    }

    pub async fn execute_cql(&self, cql: &str, values: Vec<CqlValue>) -> Result<ResultSet> {
        self.execute(&Statement::with_values(cql, values)).await
    }

    pub async fn prepare(&self, statement: &Statement) -> Result<PreparedStatement> {
        self.executor
            .run(|session| async move { session.prepare(statement).await })
            .await
    }

    pub async fn get_size_estimates(&self, keyspace: &str, table: &str) -> Result<Vec<SizeEstimate>> {
        size_estimates::get_size_estimates(&self.executor, keyspace, table).await
    }

    /// Renders a table comment carrying column order and visibility.
    pub fn column_metadata_comment(columns: &[ExtraColumnMetadata]) -> serde_json::Result<String> {
        layout::column_metadata_comment(columns)
    }
}

