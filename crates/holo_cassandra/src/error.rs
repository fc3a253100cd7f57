//! Error taxonomy for the Cassandra session layer.
//!
//! `ClusterError` is what the driver capability reports. `SessionError` is
//! what callers of this crate see: driver errors other than total
//! unavailability pass through unchanged as `SessionError::Cluster`.

use thiserror::Error;

/// Errors reported by a [`ClusterClient`](crate::client::ClusterClient) or
/// [`ClusterSession`](crate::client::ClusterSession) implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    /// No cluster host could be reached for this request.
    #[error("no host available: {0}")]
    NoHostAvailable(String),

    /// The cluster rejected or failed the statement.
    #[error("query failed: {0}")]
    Query(String),

    /// Establishing or using the connection failed for a reason other than
    /// total unavailability (auth, protocol negotiation, ...).
    #[error("connection error: {0}")]
    Connection(String),

    /// A cell or metadata payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Errors surfaced by the session layer.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("schema not found: {schema}")]
    SchemaNotFound { schema: String },

    #[error("table not found: {schema}.{table}")]
    TableNotFound { schema: String, table: String },

    /// Distinct case-sensitive names collapse to the same case-insensitive name.
    #[error("{0}")]
    AmbiguousIdentity(String),

    #[error("unsupported schema: {0}")]
    UnsupportedSchema(String),

    /// Total unavailability outlasted the retry budget. Carries the last
    /// driver diagnostic.
    #[error("cluster unavailable: {0}")]
    Unavailable(String),

    #[error("cluster call cancelled")]
    Cancelled,

    #[error("malformed column metadata in table comment {comment:?}: {source}")]
    MalformedColumnMetadata {
        comment: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid partition key: {0}")]
    InvalidPartitionKey(String),

    #[error("invalid filter value: {0}")]
    InvalidFilterValue(String),

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

impl SessionError {
    /// Returns `true` for not-found errors (schema or table).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SchemaNotFound { .. } | Self::TableNotFound { .. })
    }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
