//! Driver capability consumed by the session layer.
//!
//! The real CQL driver and the in-process [`InMemoryCluster`](crate::memory::InMemoryCluster)
//! both implement [`ClusterClient`]/[`ClusterSession`]. Everything they hand
//! back is plain data: metadata snapshots, raw result rows, topology values.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ClusterError;
use crate::reconnection::ReconnectionPolicy;
use crate::types::CqlValue;

/// Entry point of a cluster driver.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Opens a session. A `NoHostAvailable` failure here is retried by the
    /// executor like any other total-unavailability failure.
    async fn connect(&self) -> Result<Arc<dyn ClusterSession>, ClusterError>;

    /// Policy consulted for a fresh backoff schedule on every executor call.
    fn reconnection_policy(&self) -> Arc<dyn ReconnectionPolicy>;
}

/// One live session to the cluster. Implementations must be safe for
/// concurrent use.
#[async_trait]
pub trait ClusterSession: Send + Sync {
    /// Live keyspace metadata in driver order (unordered).
    async fn keyspaces(&self) -> Result<Vec<KeyspaceMetadata>, ClusterError>;

    /// Exact-name keyspace lookup.
    async fn keyspace(&self, name: &str) -> Result<Option<KeyspaceMetadata>, ClusterError> {
        Ok(self
            .keyspaces()
            .await?
            .into_iter()
            .find(|keyspace| keyspace.name == name))
    }

    async fn partitioner(&self) -> Result<String, ClusterError>;

    async fn token_ranges(&self) -> Result<BTreeSet<TokenRange>, ClusterError>;

    async fn replicas_for_range(
        &self,
        keyspace: &str,
        range: &TokenRange,
    ) -> Result<BTreeSet<Host>, ClusterError>;

    async fn replicas_for_key(
        &self,
        keyspace: &str,
        partition_key: &[u8],
    ) -> Result<BTreeSet<Host>, ClusterError>;

    async fn execute(&self, statement: &Statement) -> Result<ResultSet, ClusterError>;

    async fn prepare(&self, statement: &Statement) -> Result<PreparedStatement, ClusterError>;
}

/// Native type descriptor as reported by schema metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeType {
    pub name: String,
    pub type_arguments: Vec<NativeType>,
}

impl NativeType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_arguments: Vec::new(),
        }
    }

    pub fn with_arguments(name: impl Into<String>, type_arguments: Vec<NativeType>) -> Self {
        Self {
            name: name.into(),
            type_arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub name: String,
    pub native_type: NativeType,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, native_type: NativeType) -> Self {
        Self {
            name: name.into(),
            native_type,
        }
    }
}

/// Secondary index; `target` is the indexed column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetadata {
    pub name: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    /// Case-sensitive keyspace name.
    pub keyspace: String,
    /// Case-sensitive table name.
    pub name: String,
    /// Columns in native (driver) order.
    pub columns: Vec<ColumnMetadata>,
    /// Partition-key column names in declaration order.
    pub partition_key: Vec<String>,
    /// Clustering column names in clustering order.
    pub clustering_columns: Vec<String>,
    pub indexes: Vec<IndexMetadata>,
    pub comment: Option<String>,
}

impl TableMetadata {
    pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// Returns `true` when some secondary index targets `column`.
    pub fn is_indexed(&self, column: &str) -> bool {
        self.indexes.iter().any(|index| index.target == column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyspaceMetadata {
    pub name: String,
    pub tables: Vec<TableMetadata>,
}

impl KeyspaceMetadata {
    /// Exact-name table lookup.
    pub fn table(&self, name: &str) -> Option<&TableMetadata> {
        self.tables.iter().find(|table| table.name == name)
    }
}

/// Token range with opaque, partitioner-specific bounds.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenRange {
    pub start: String,
    pub end: String,
}

impl TokenRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Host {
    pub address: SocketAddr,
    pub datacenter: Option<String>,
    pub rack: Option<String>,
}

impl Host {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            datacenter: None,
            rack: None,
        }
    }
}

/// Simple statement with positional bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub cql: String,
    pub values: Vec<CqlValue>,
}

impl Statement {
    pub fn new(cql: impl Into<String>) -> Self {
        Self {
            cql: cql.into(),
            values: Vec::new(),
        }
    }

    pub fn with_values(cql: impl Into<String>, values: Vec<CqlValue>) -> Self {
        Self {
            cql: cql.into(),
            values,
        }
    }

    pub fn bind(mut self, value: CqlValue) -> Self {
        self.values.push(value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedStatement {
    pub id: Vec<u8>,
    pub cql: String,
}

/// Rows returned by a statement, cells kept as raw native-protocol bytes.
#[derive(Debug, Clone)]
pub struct ResultSet {
    pub columns: Arc<[String]>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Option<Bytes>>>) -> Self {
        let columns: Arc<[String]> = columns.into();
        let rows = rows
            .into_iter()
            .map(|cells| Row {
                columns: columns.clone(),
                cells,
            })
            .collect();
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[String]>,
    cells: Vec<Option<Bytes>>,
}

impl Row {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Raw cell bytes by position; `None` for a null cell or a missing index.
    pub fn bytes_unsafe(&self, index: usize) -> Option<&Bytes> {
        self.cells.get(index).and_then(Option::as_ref)
    }

    pub fn index_of(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|name| name == column)
    }

    /// Decodes a `text`/`varchar` cell by column name.
    pub fn get_string(&self, column: &str) -> Result<String, ClusterError> {
        let raw = self.required(column)?;
        String::from_utf8(raw.to_vec()).map_err(|err| {
            ClusterError::Decode(format!("column '{column}' is not valid utf-8: {err}"))
        })
    }

    /// Decodes a `bigint`/`counter` cell by column name.
    pub fn get_i64(&self, column: &str) -> Result<i64, ClusterError> {
        let raw = self.required(column)?;
        let bytes: [u8; 8] = raw.as_ref().try_into().map_err(|_| {
            ClusterError::Decode(format!(
                "column '{column}' has {} bytes, expected 8",
                raw.len()
            ))
        })?;
        Ok(i64::from_be_bytes(bytes))
    }

    fn required(&self, column: &str) -> Result<&Bytes, ClusterError> {
        let index = self
            .index_of(column)
            .ok_or_else(|| ClusterError::Decode(format!("result has no column '{column}'")))?;
        self.bytes_unsafe(index)
            .ok_or_else(|| ClusterError::Decode(format!("column '{column}' is null")))
    }
}
