//! Partition enumeration and partition-key encoding.
//!
//! A partition key is encoded the way the cluster hashes it: a single-column
//! key is the raw cell bytes, a composite key concatenates each component as
//! `i16` big-endian length, the bytes, then a `0x00` terminator.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use datafusion::common::ScalarValue;
use tracing::debug;

use crate::client::{Row, Statement};
use crate::cql::{valid_column_name, Select};
use crate::error::{Result, SessionError};
use crate::executor::ResilientExecutor;
use crate::layout::{CassandraTable, ColumnHandle};

pub const UNPARTITIONED_ID: &str = "<UNPARTITIONED>";

/// Sentinel partition covering the whole table.
pub static UNPARTITIONED: LazyLock<CassandraPartition> = LazyLock::new(|| CassandraPartition {
    key: Vec::new(),
    partition_id: UNPARTITIONED_ID.to_string(),
    tuple_domain: TupleDomain::All,
    unpartitioned: true,
});

/// Per-column fixed values constraining a partition, or no constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum TupleDomain {
    All,
    Fixed(BTreeMap<ColumnHandle, ScalarValue>),
}

impl TupleDomain {
    pub fn from_fixed_values(values: BTreeMap<ColumnHandle, ScalarValue>) -> Self {
        Self::Fixed(values)
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    pub fn fixed_values(&self) -> Option<&BTreeMap<ColumnHandle, ScalarValue>> {
        match self {
            Self::All => None,
            Self::Fixed(values) => Some(values),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CassandraPartition {
    key: Vec<u8>,
    partition_id: String,
    tuple_domain: TupleDomain,
    unpartitioned: bool,
}

impl CassandraPartition {
    /// Encoded partition key as the cluster hashes it.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Human-readable `col = literal AND ...` identity. Used for dedup and
    /// display only.
    pub fn partition_id(&self) -> &str {
        &self.partition_id
    }

    pub fn tuple_domain(&self) -> &TupleDomain {
        &self.tuple_domain
    }

    pub fn is_unpartitioned(&self) -> bool {
        self.unpartitioned
    }
}

/// Encodes partition-key components.
pub fn encode_partition_key(components: &[&[u8]]) -> Result<Vec<u8>> {
    if let [single] = components {
        return Ok(single.to_vec());
    }
    let capacity = components.iter().map(|c| c.len() + 3).sum();
    let mut key = Vec::with_capacity(capacity);
    for component in components {
        let len = i16::try_from(component.len()).map_err(|_| {
            SessionError::InvalidPartitionKey(format!(
                "partition key component of {} bytes exceeds {} bytes",
                component.len(),
                i16::MAX
            ))
        })?;
        key.extend_from_slice(&len.to_be_bytes());
        key.extend_from_slice(component);
        key.push(0);
    }
    Ok(key)
}

/// Lists the partitions of `table` restricted by `filter_prefix`, one value
/// per partition-key column.
///
/// Any prefix that does not pin every partition-key column yields
/// `[UNPARTITIONED]` without querying the cluster.
pub async fn enumerate_partitions(
    executor: &ResilientExecutor,
    table: &CassandraTable,
    filter_prefix: &[ScalarValue],
) -> Result<Vec<CassandraPartition>> {
    let partition_key_columns = table.partition_key_columns();
    if partition_key_columns.is_empty() || filter_prefix.len() != partition_key_columns.len() {
        debug!(
            table = %table.table_handle().schema_table_name(),
            key_columns = partition_key_columns.len(),
            prefix = filter_prefix.len(),
            "filter does not fix the partition key; scanning unpartitioned"
        );
        return Ok(vec![UNPARTITIONED.clone()]);
    }

    let statement = partition_key_query(table, &partition_key_columns, filter_prefix)?;
    let statement = &statement;
    let result = executor
        .run(|session| async move { session.execute(statement).await })
        .await?;
    encode_partitions(&partition_key_columns, &result.rows)
}

fn partition_key_query(
    table: &CassandraTable,
    columns: &[&ColumnHandle],
    filter_prefix: &[ScalarValue],
) -> Result<Statement> {
    let handle = table.table_handle();
    let mut select = Select::columns(columns.iter().map(|column| column.name.as_str()))
        .distinct()
        .from(&handle.schema_name, &handle.table_name);
    for (column, value) in columns.iter().zip(filter_prefix) {
        select = select.where_eq(&column.name, column.cassandra_type.to_native_value(value)?);
    }
    Ok(select.build())
}

/// Turns `SELECT DISTINCT <partition key>` rows into partitions, dropping
/// rows whose id was already seen.
pub fn encode_partitions(columns: &[&ColumnHandle], rows: &[Row]) -> Result<Vec<CassandraPartition>> {
    let mut seen = HashSet::with_capacity(rows.len());
    let mut partitions = Vec::with_capacity(rows.len());
    for row in rows {
        let mut components = Vec::with_capacity(columns.len());
        let mut values = BTreeMap::new();
        let mut partition_id = String::new();
        for (index, column) in columns.iter().enumerate() {
            let raw = row.bytes_unsafe(index).ok_or_else(|| {
                SessionError::InvalidPartitionKey(format!(
                    "partition key column '{}' is null",
                    column.name
                ))
            })?;
            values.insert(
                (*column).clone(),
                column.cassandra_type.partition_key_value(raw)?,
            );
            if index > 0 {
                partition_id.push_str(" AND ");
            }
            partition_id.push_str(&valid_column_name(&column.name));
            partition_id.push_str(" = ");
            partition_id.push_str(&column.cassandra_type.cql_literal(raw)?);
            components.push(&raw[..]);
        }
        let key = encode_partition_key(&components)?;
        if !seen.insert(partition_id.clone()) {
            continue;
        }
        partitions.push(CassandraPartition {
            key,
            partition_id,
            tuple_domain: TupleDomain::from_fixed_values(values),
            unpartitioned: false,
        });
    }
    Ok(partitions)
}
