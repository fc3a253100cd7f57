//! Table layout reconstruction: ordered column handles from live schema
//! merged with ordering/visibility metadata kept in the table comment.
//!
//! A table comment of the form `Presto Metadata:[{"name":"c","hidden":true}, ...]`
//! declares an explicit column order and hidden columns. Live columns the
//! document does not mention follow the declared ones in live order. Key
//! columns are pinned ahead of everything else: partition-key columns in
//! declaration order, then clustering columns in clustering order.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::{ColumnMetadata, TableMetadata};
use crate::error::{Result, SessionError};
use crate::executor::ResilientExecutor;
use crate::identity::{check_column_names, resolve_keyspace, resolve_table};
use crate::types::CassandraType;

/// Marker that prefixes the column metadata document in a table comment.
pub const PRESTO_COMMENT_METADATA: &str = "Presto Metadata:";

/// Arrow field metadata key set to `"true"` on hidden columns.
pub const HIDDEN_FIELD_METADATA_KEY: &str = "hidden";

/// Engine-facing `(schema, table)` identity, matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchemaTableName {
    pub schema_name: String,
    pub table_name: String,
}

impl SchemaTableName {
    pub fn new(schema_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            table_name: table_name.into(),
        }
    }
}

impl fmt::Display for SchemaTableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema_name, self.table_name)
    }
}

/// One entry of the comment metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraColumnMetadata {
    pub name: String,
    #[serde(default)]
    pub hidden: bool,
}

impl ExtraColumnMetadata {
    pub fn new(name: impl Into<String>, hidden: bool) -> Self {
        Self {
            name: name.into(),
            hidden,
        }
    }
}

/// Table identity with case-sensitive names as stored in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CassandraTableHandle {
    pub connector_id: String,
    pub schema_name: String,
    pub table_name: String,
}

impl CassandraTableHandle {
    pub fn schema_table_name(&self) -> SchemaTableName {
        SchemaTableName::new(self.schema_name.clone(), self.table_name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnHandle {
    pub connector_id: String,
    pub name: String,
    pub ordinal_position: usize,
    pub cassandra_type: CassandraType,
    /// Element types of a collection column; empty for scalars.
    pub type_arguments: Vec<CassandraType>,
    pub partition_key: bool,
    pub clustering_key: bool,
    pub indexed: bool,
    pub hidden: bool,
}

impl ColumnHandle {
    pub fn data_type(&self) -> DataType {
        self.cassandra_type.arrow_data_type()
    }

    /// Arrow field for this column. Key columns are non-nullable; hidden
    /// columns carry `hidden=true` field metadata.
    pub fn arrow_field(&self) -> Field {
        let nullable = !(self.partition_key || self.clustering_key);
        let field = Field::new(self.name.as_str(), self.data_type(), nullable);
        if self.hidden {
            field.with_metadata(HashMap::from([(
                HIDDEN_FIELD_METADATA_KEY.to_string(),
                "true".to_string(),
            )]))
        } else {
            field
        }
    }
}

/// Resolved table: handle plus column handles ordered by ordinal position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CassandraTable {
    table_handle: CassandraTableHandle,
    columns: Vec<ColumnHandle>,
}

impl CassandraTable {
    pub fn new(table_handle: CassandraTableHandle, mut columns: Vec<ColumnHandle>) -> Self {
        columns.sort_by_key(|column| column.ordinal_position);
        Self {
            table_handle,
            columns,
        }
    }

    pub fn table_handle(&self) -> &CassandraTableHandle {
        &self.table_handle
    }

    pub fn columns(&self) -> &[ColumnHandle] {
        &self.columns
    }

    pub fn visible_columns(&self) -> impl Iterator<Item = &ColumnHandle> {
        self.columns.iter().filter(|column| !column.hidden)
    }

    /// Partition-key columns in declaration order.
    pub fn partition_key_columns(&self) -> Vec<&ColumnHandle> {
        self.columns
            .iter()
            .filter(|column| column.partition_key)
            .collect()
    }

    /// Case-insensitive column lookup.
    pub fn column(&self, name: &str) -> Option<&ColumnHandle> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(name))
    }

    pub fn arrow_schema(&self) -> SchemaRef {
        Arc::new(Schema::new(
            self.columns
                .iter()
                .map(ColumnHandle::arrow_field)
                .collect::<Vec<_>>(),
        ))
    }
}

/// Resolves `schema_table` against live metadata and builds its layout.
pub async fn build_table(
    executor: &ResilientExecutor,
    connector_id: &str,
    schema_table: &SchemaTableName,
) -> Result<CassandraTable> {
    let keyspace = resolve_keyspace(executor, &schema_table.schema_name).await?;
    let table = resolve_table(&keyspace, &schema_table.table_name)?;
    layout_table(connector_id, table)
}

/// Builds ordered column handles for one table snapshot.
pub fn layout_table(connector_id: &str, table: &TableMetadata) -> Result<CassandraTable> {
    check_column_names(&table.columns)?;

    let extras = parse_column_metadata_comment(table.comment.as_deref())?.unwrap_or_default();
    let stale = extras
        .iter()
        .filter(|extra| table.column(&extra.name).is_none())
        .map(|extra| extra.name.as_str())
        .collect::<Vec<_>>();
    if !stale.is_empty() {
        warn!(
            keyspace = %table.keyspace,
            table = %table.name,
            columns = ?stale,
            "ignoring comment metadata for columns missing from live schema"
        );
    }
    let hidden = extras
        .iter()
        .filter(|extra| extra.hidden)
        .map(|extra| extra.name.as_str())
        .collect::<HashSet<_>>();

    let column_order = ordered_column_names(table, &extras)?;
    let ordinal = |name: &str| {
        column_order
            .iter()
            .position(|ordered| *ordered == name)
            .ok_or_else(|| {
                SessionError::UnsupportedSchema(format!(
                    "column '{name}' missing from layout of {}.{}",
                    table.keyspace, table.name
                ))
            })
    };

    let mut handles = Vec::with_capacity(table.columns.len());
    let mut key_columns = HashSet::new();
    for name in &table.partition_key {
        let column = key_column(table, name)?;
        key_columns.insert(name.as_str());
        handles.push(build_column_handle(
            connector_id,
            table,
            column,
            ColumnRole::PartitionKey,
            ordinal(name)?,
            hidden.contains(name.as_str()),
        )?);
    }
    for name in &table.clustering_columns {
        let column = key_column(table, name)?;
        key_columns.insert(name.as_str());
        handles.push(build_column_handle(
            connector_id,
            table,
            column,
            ColumnRole::ClusteringKey,
            ordinal(name)?,
            hidden.contains(name.as_str()),
        )?);
    }
    for column in &table.columns {
        if key_columns.contains(column.name.as_str()) {
            continue;
        }
        handles.push(build_column_handle(
            connector_id,
            table,
            column,
            ColumnRole::Regular,
            ordinal(&column.name)?,
            hidden.contains(column.name.as_str()),
        )?);
    }

    debug!(
        keyspace = %table.keyspace,
        table = %table.name,
        columns = handles.len(),
        hidden = hidden.len(),
        "built table layout"
    );

    let table_handle = CassandraTableHandle {
        connector_id: connector_id.to_string(),
        schema_name: table.keyspace.clone(),
        table_name: table.name.clone(),
    };
    Ok(CassandraTable::new(table_handle, handles))
}

/// Decodes the comment metadata document, if the comment carries one.
pub fn parse_column_metadata_comment(
    comment: Option<&str>,
) -> Result<Option<Vec<ExtraColumnMetadata>>> {
    let Some(document) = comment.and_then(|text| text.strip_prefix(PRESTO_COMMENT_METADATA)) else {
        return Ok(None);
    };
    serde_json::from_str::<Vec<ExtraColumnMetadata>>(document)
        .map(Some)
        .map_err(|source| SessionError::MalformedColumnMetadata {
            comment: comment.unwrap_or_default().to_string(),
            source,
        })
}

/// Renders a comment carrying the column metadata document.
pub fn column_metadata_comment(columns: &[ExtraColumnMetadata]) -> serde_json::Result<String> {
    Ok(format!(
        "{PRESTO_COMMENT_METADATA}{}",
        serde_json::to_string(columns)?
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnRole {
    PartitionKey,
    ClusteringKey,
    Regular,
}

/// Live column names in final ordinal order: key columns first, then the
/// rest in document order followed by undocumented columns in live order.
fn ordered_column_names<'a>(
    table: &'a TableMetadata,
    extras: &[ExtraColumnMetadata],
) -> Result<Vec<&'a str>> {
    let mut rank = HashMap::<&str, usize>::with_capacity(extras.len() + table.columns.len());
    for (index, extra) in extras.iter().enumerate() {
        rank.entry(extra.name.as_str()).or_insert(index);
    }
    for (index, column) in table.columns.iter().enumerate() {
        rank.entry(column.name.as_str())
            .or_insert(extras.len() + index);
    }

    let mut regular = table
        .columns
        .iter()
        .map(|column| column.name.as_str())
        .filter(|name| {
            !table.partition_key.iter().any(|key| key == name)
                && !table.clustering_columns.iter().any(|key| key == name)
        })
        .collect::<Vec<_>>();
    regular.sort_by_key(|name| rank.get(name).copied().unwrap_or(usize::MAX));

    let mut ordered = Vec::with_capacity(table.columns.len());
    for name in table.partition_key.iter().chain(&table.clustering_columns) {
        ordered.push(key_column(table, name)?.name.as_str());
    }
    ordered.extend(regular);
    Ok(ordered)
}

fn key_column<'a>(table: &'a TableMetadata, name: &str) -> Result<&'a ColumnMetadata> {
    table.column(name).ok_or_else(|| {
        SessionError::UnsupportedSchema(format!(
            "key column '{name}' missing from columns of {}.{}",
            table.keyspace, table.name
        ))
    })
}

fn build_column_handle(
    connector_id: &str,
    table: &TableMetadata,
    column: &ColumnMetadata,
    role: ColumnRole,
    ordinal_position: usize,
    hidden: bool,
) -> Result<ColumnHandle> {
    let (cassandra_type, type_arguments) = resolve_column_type(column)?;
    Ok(ColumnHandle {
        connector_id: connector_id.to_string(),
        name: column.name.clone(),
        ordinal_position,
        cassandra_type,
        type_arguments,
        partition_key: role == ColumnRole::PartitionKey,
        clustering_key: role == ColumnRole::ClusteringKey,
        indexed: table.is_indexed(&column.name),
        hidden,
    })
}

/// Maps a column's native type to its tag and, for collections, the tags of
/// its type arguments.
fn resolve_column_type(column: &ColumnMetadata) -> Result<(CassandraType, Vec<CassandraType>)> {
    let cassandra_type = CassandraType::from_native_name(&column.native_type.name);
    let arity = cassandra_type.type_argument_size();
    if arity == 0 {
        return Ok((cassandra_type, Vec::new()));
    }
    let arguments = &column.native_type.type_arguments;
    if !matches!(arity, 1 | 2) || arguments.len() != arity {
        return Err(SessionError::UnsupportedSchema(format!(
            "invalid type arguments for column '{}' of type {}: {:?}",
            column.name,
            cassandra_type,
            arguments
                .iter()
                .map(|argument| argument.name.as_str())
                .collect::<Vec<_>>()
        )));
    }
    let type_arguments = arguments
        .iter()
        .map(|argument| CassandraType::from_native_name(&argument.name))
        .collect();
    Ok((cassandra_type, type_arguments))
}
