//! Reader for the cluster-maintained `system.size_estimates` table.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::Row;
use crate::cql::Select;
use crate::error::{Result, SessionError};
use crate::executor::ResilientExecutor;
use crate::types::CqlValue;

pub const SYSTEM_KEYSPACE: &str = "system";
pub const SIZE_ESTIMATES_TABLE: &str = "size_estimates";

/// Per token range estimate for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeEstimate {
    pub range_start: String,
    pub range_end: String,
    /// Mean partition size in bytes.
    pub mean_partition_size: i64,
    pub partitions_count: i64,
}

impl SizeEstimate {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            range_start: row.get_string("range_start")?,
            range_end: row.get_string("range_end")?,
            mean_partition_size: row.get_i64("mean_partition_size")?,
            partitions_count: row.get_i64("partitions_count")?,
        })
    }
}

/// Fails unless the cluster exposes `system.size_estimates`.
pub async fn check_size_estimates_table_exists(executor: &ResilientExecutor) -> Result<()> {
    let system = executor
        .run(|session| async move { session.keyspace(SYSTEM_KEYSPACE).await })
        .await?
        .ok_or_else(|| {
            SessionError::UnsupportedSchema(format!(
                "cluster metadata has no '{SYSTEM_KEYSPACE}' keyspace"
            ))
        })?;
    if system.table(SIZE_ESTIMATES_TABLE).is_none() {
        return Err(SessionError::UnsupportedSchema(
            "Cassandra versions prior to 2.1.5 are not supported".to_string(),
        ));
    }
    Ok(())
}

/// Reads the estimates recorded for `keyspace.table`, in cluster order.
///
/// Names are case-sensitive, as stored.
pub async fn get_size_estimates(
    executor: &ResilientExecutor,
    keyspace: &str,
    table: &str,
) -> Result<Vec<SizeEstimate>> {
    check_size_estimates_table_exists(executor).await?;

    let statement = Select::columns([
        "range_start",
        "range_end",
        "mean_partition_size",
        "partitions_count",
    ])
    .from(SYSTEM_KEYSPACE, SIZE_ESTIMATES_TABLE)
    .where_eq("keyspace_name", CqlValue::Text(keyspace.to_string()))
    .where_eq("table_name", CqlValue::Text(table.to_string()))
    .build();
    let statement = &statement;
    let result = executor
        .run(|session| async move { session.execute(statement).await })
        .await?;

    let estimates = result
        .rows
        .iter()
        .map(SizeEstimate::from_row)
        .collect::<Result<Vec<_>>>()?;
    debug!(
        keyspace = %keyspace,
        table = %table,
        ranges = estimates.len(),
        "read size estimates"
    );
    Ok(estimates)
}
