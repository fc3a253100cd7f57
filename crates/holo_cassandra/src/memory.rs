//! In-process cluster implementing [`ClusterClient`] and [`ClusterSession`].
//!
//! Holds schema metadata, a token ring and table rows in memory and answers
//! the statement shapes this crate issues: `SELECT [DISTINCT] cols FROM
//! ks.table [WHERE col=? AND ...]` and `INSERT INTO ks.table (cols) VALUES
//! (?, ...)`, parsed with DataFusion's bundled SQL parser. Failure injection makes the next connects or requests fail with
//! `NoHostAvailable`.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use datafusion::sql::sqlparser::ast::{
    self, BinaryOperator, Distinct, Expr, Ident, Insert, ObjectName, Query, SelectItem, SetExpr,
    TableFactor, TableObject, Value, ValueWithSpan,
};
use datafusion::sql::sqlparser::dialect::GenericDialect;
use datafusion::sql::sqlparser::parser::Parser;

use crate::client::{
    ClusterClient, ClusterSession, ColumnMetadata, Host, KeyspaceMetadata, NativeType,
    PreparedStatement, ResultSet, Statement, TableMetadata, TokenRange,
};
use crate::error::ClusterError;
use crate::reconnection::{ExponentialReconnectionPolicy, ReconnectionPolicy};
use crate::size_estimates::{SizeEstimate, SIZE_ESTIMATES_TABLE, SYSTEM_KEYSPACE};
use crate::types::CqlValue;

pub const MURMUR3_PARTITIONER: &str = "org.apache.cassandra.dht.Murmur3Partitioner";

type ClusterResult<T> = std::result::Result<T, ClusterError>;

/// Cheaply cloneable handle; clones share the same cluster state.
#[derive(Clone)]
pub struct InMemoryCluster {
    shared: Arc<Shared>,
    reconnection_policy: Arc<dyn ReconnectionPolicy>,
}

struct Shared {
    state: Mutex<ClusterState>,
    connects: Arc<AtomicUsize>,
    failing_connects: AtomicUsize,
    failing_requests: AtomicUsize,
}

struct ClusterState {
    partitioner: String,
    keyspaces: Vec<KeyspaceMetadata>,
    rows: HashMap<(String, String), Vec<HashMap<String, Bytes>>>,
    ring: BTreeMap<TokenRange, BTreeSet<Host>>,
    executed: Vec<Statement>,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCluster {
    /// Empty Murmur3 cluster whose `system` keyspace carries `size_estimates`.
    pub fn new() -> Self {
        let system = KeyspaceMetadata {
            name: SYSTEM_KEYSPACE.to_string(),
            tables: vec![size_estimates_table()],
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ClusterState {
                    partitioner: MURMUR3_PARTITIONER.to_string(),
                    keyspaces: vec![system],
                    rows: HashMap::new(),
                    ring: BTreeMap::new(),
                    executed: Vec::new(),
                }),
                connects: Arc::new(AtomicUsize::new(0)),
                failing_connects: AtomicUsize::new(0),
                failing_requests: AtomicUsize::new(0),
            }),
            reconnection_policy: Arc::new(ExponentialReconnectionPolicy::default()),
        }
    }

    pub fn with_reconnection_policy(mut self, policy: Arc<dyn ReconnectionPolicy>) -> Self {
        self.reconnection_policy = policy;
        self
    }

    /// Adds an empty keyspace unless one with the same exact name exists.
    pub fn add_keyspace(&self, name: &str) {
        let mut state = self.shared.state();
        if !state.keyspaces.iter().any(|keyspace| keyspace.name == name) {
            state.keyspaces.push(KeyspaceMetadata {
                name: name.to_string(),
                tables: Vec::new(),
            });
        }
    }

    /// Adds or replaces a table, creating its keyspace when needed.
    pub fn add_table(&self, table: TableMetadata) {
        self.add_keyspace(&table.keyspace);
        let mut state = self.shared.state();
        let Some(keyspace) = state
            .keyspaces
            .iter_mut()
            .find(|keyspace| keyspace.name == table.keyspace)
        else {
            return;
        };
        keyspace.tables.retain(|existing| existing.name != table.name);
        keyspace.tables.push(table);
    }

    /// Removes a table and its rows. Returns `false` when it did not exist.
    pub fn drop_table(&self, keyspace: &str, table: &str) -> bool {
        let mut state = self.shared.state();
        state
            .rows
            .remove(&(keyspace.to_string(), table.to_string()));
        let Some(metadata) = state
            .keyspaces
            .iter_mut()
            .find(|candidate| candidate.name == keyspace)
        else {
            return false;
        };
        let before = metadata.tables.len();
        metadata.tables.retain(|existing| existing.name != table);
        metadata.tables.len() != before
    }

    /// Upserts one row keyed by its primary key columns.
    pub fn insert_row<'a>(
        &self,
        keyspace: &str,
        table: &str,
        cells: impl IntoIterator<Item = (&'a str, CqlValue)>,
    ) -> ClusterResult<()> {
        let (columns, values): (Vec<String>, Vec<CqlValue>) = cells
            .into_iter()
            .map(|(column, value)| (column.to_string(), value))
            .unzip();
        self.shared
            .state()
            .insert(keyspace, table, &columns, &values)
    }

    /// Records one `system.size_estimates` row for `keyspace.table`.
    pub fn add_size_estimate(
        &self,
        keyspace: &str,
        table: &str,
        estimate: SizeEstimate,
    ) -> ClusterResult<()> {
        self.insert_row(
            SYSTEM_KEYSPACE,
            SIZE_ESTIMATES_TABLE,
            [
                ("keyspace_name", CqlValue::Text(keyspace.to_string())),
                ("table_name", CqlValue::Text(table.to_string())),
                ("range_start", CqlValue::Text(estimate.range_start)),
                ("range_end", CqlValue::Text(estimate.range_end)),
                (
                    "mean_partition_size",
                    CqlValue::Bigint(estimate.mean_partition_size),
                ),
                ("partitions_count", CqlValue::Bigint(estimate.partitions_count)),
            ],
        )
    }

    /// Assigns replicas to a token range. Bounds are decimal tokens; a range
    /// owns `(start, end]` and wraps when `start >= end`.
    pub fn add_token_range(&self, range: TokenRange, replicas: impl IntoIterator<Item = Host>) {
        self.shared
            .state()
            .ring
            .entry(range)
            .or_default()
            .extend(replicas);
    }

    pub fn fail_next_connects_with_no_host(&self, count: usize) {
        self.shared.failing_connects.store(count, Ordering::SeqCst);
    }

    /// Makes the next `count` session requests (metadata, topology or
    /// statements) fail with `NoHostAvailable`.
    pub fn fail_next_requests_with_no_host(&self, count: usize) {
        self.shared.failing_requests.store(count, Ordering::SeqCst);
    }

    pub fn connect_count_handle(&self) -> Arc<AtomicUsize> {
        self.shared.connects.clone()
    }

    /// Statements passed to `execute`, oldest first.
    pub fn executed_statements(&self) -> Vec<Statement> {
        self.shared.state().executed.clone()
    }
}

#[async_trait]
impl ClusterClient for InMemoryCluster {
    async fn connect(&self) -> ClusterResult<Arc<dyn ClusterSession>> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.shared.failing_connects) {
            return Err(ClusterError::NoHostAvailable(
                "All host(s) tried for connection failed".to_string(),
            ));
        }
        Ok(Arc::new(InMemorySession {
            shared: self.shared.clone(),
        }))
    }

    fn reconnection_policy(&self) -> Arc<dyn ReconnectionPolicy> {
        self.reconnection_policy.clone()
    }
}

struct InMemorySession {
    shared: Arc<Shared>,
}

#[async_trait]
impl ClusterSession for InMemorySession {
    async fn keyspaces(&self) -> ClusterResult<Vec<KeyspaceMetadata>> {
        self.shared.check_available()?;
        Ok(self.shared.state().keyspaces.clone())
    }

    async fn partitioner(&self) -> ClusterResult<String> {
        self.shared.check_available()?;
        Ok(self.shared.state().partitioner.clone())
    }

    async fn token_ranges(&self) -> ClusterResult<BTreeSet<TokenRange>> {
        self.shared.check_available()?;
        Ok(self.shared.state().ring.keys().cloned().collect())
    }

    async fn replicas_for_range(
        &self,
        keyspace: &str,
        range: &TokenRange,
    ) -> ClusterResult<BTreeSet<Host>> {
        self.shared.check_available()?;
        let state = self.shared.state();
        if !state.has_keyspace(&unquote_identifier(keyspace)) {
            return Ok(BTreeSet::new());
        }
        Ok(state.ring.get(range).cloned().unwrap_or_default())
    }

    async fn replicas_for_key(
        &self,
        keyspace: &str,
        partition_key: &[u8],
    ) -> ClusterResult<BTreeSet<Host>> {
        self.shared.check_available()?;
        let state = self.shared.state();
        if !state.has_keyspace(&unquote_identifier(keyspace)) {
            return Ok(BTreeSet::new());
        }
        let token = token_of(partition_key);
        Ok(state
            .ring
            .iter()
            .find(|(range, _)| range_contains(range, token))
            .map(|(_, hosts)| hosts.clone())
            .unwrap_or_default())
    }

    async fn execute(&self, statement: &Statement) -> ClusterResult<ResultSet> {
        self.shared.check_available()?;
        let command = parse(&statement.cql)?;
        let mut state = self.shared.state();
        state.executed.push(statement.clone());
        match command {
            Command::Select(query) => state.select(&query, &statement.values),
            Command::Insert(query) => {
                if query.markers != statement.values.len() {
                    return Err(ClusterError::Query(format!(
                        "expected {} bound values, got {}",
                        query.markers,
                        statement.values.len()
                    )));
                }
                state.insert(&query.keyspace, &query.table, &query.columns, &statement.values)?;
                Ok(ResultSet::new(Vec::new(), Vec::new()))
            }
        }
    }

    async fn prepare(&self, statement: &Statement) -> ClusterResult<PreparedStatement> {
        self.shared.check_available()?;
        parse(&statement.cql)?;
        let mut hasher = DefaultHasher::new();
        statement.cql.hash(&mut hasher);
        Ok(PreparedStatement {
            id: hasher.finish().to_be_bytes().to_vec(),
            cql: statement.cql.clone(),
        })
    }
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ClusterState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> ClusterResult<()> {
        if take_one(&self.failing_requests) {
            return Err(ClusterError::NoHostAvailable(
                "All host(s) tried for query failed".to_string(),
            ));
        }
        Ok(())
    }
}

impl ClusterState {
    fn has_keyspace(&self, name: &str) -> bool {
        self.keyspaces.iter().any(|keyspace| keyspace.name == name)
    }

    fn table(&self, keyspace: &str, table: &str) -> ClusterResult<&TableMetadata> {
        self.keyspaces
            .iter()
            .find(|candidate| candidate.name == keyspace)
            .and_then(|candidate| candidate.table(table))
            .ok_or_else(|| ClusterError::Query(format!("unconfigured table {keyspace}.{table}")))
    }

    fn select(&self, query: &SelectQuery, values: &[CqlValue]) -> ClusterResult<ResultSet> {
        let table = self.table(&query.keyspace, &query.table)?;
        if values.len() != query.restrictions.len() {
            return Err(ClusterError::Query(format!(
                "expected {} bound values, got {}",
                query.restrictions.len(),
                values.len()
            )));
        }
        let columns = match &query.columns {
            Some(columns) => columns.clone(),
            None => table.columns.iter().map(|column| column.name.clone()).collect(),
        };
        for column in columns.iter().chain(&query.restrictions) {
            check_column(table, column)?;
        }
        if query.distinct && columns != table.partition_key {
            return Err(ClusterError::Query(
                "SELECT DISTINCT queries must only request partition key columns".to_string(),
            ));
        }

        let filters = query
            .restrictions
            .iter()
            .zip(values)
            .map(|(column, value)| (column.as_str(), value.serialize()))
            .collect::<Vec<_>>();
        let stored = self
            .rows
            .get(&(query.keyspace.clone(), query.table.clone()))
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for row in stored {
            let matches = filters.iter().all(|(column, wanted)| {
                row.get(*column)
                    .is_some_and(|cell| cell[..] == wanted[..])
            });
            if !matches {
                continue;
            }
            let cells = columns
                .iter()
                .map(|column| row.get(column).cloned())
                .collect::<Vec<_>>();
            if query.distinct && !seen.insert(cells.clone()) {
                continue;
            }
            rows.push(cells);
        }
        Ok(ResultSet::new(columns, rows))
    }

    fn insert(
        &mut self,
        keyspace: &str,
        table: &str,
        columns: &[String],
        values: &[CqlValue],
    ) -> ClusterResult<()> {
        let metadata = self.table(keyspace, table)?;
        if columns.len() != values.len() {
            return Err(ClusterError::Query(format!(
                "{} columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        for column in columns {
            check_column(metadata, column)?;
        }
        let primary_key = metadata
            .partition_key
            .iter()
            .chain(&metadata.clustering_columns)
            .cloned()
            .collect::<Vec<_>>();
        if let Some(missing) = primary_key.iter().find(|key| !columns.contains(*key)) {
            return Err(ClusterError::Query(format!(
                "Some primary key parts are missing: {missing}"
            )));
        }

        let row = columns
            .iter()
            .cloned()
            .zip(values.iter().map(|value| Bytes::from(value.serialize())))
            .collect::<HashMap<_, _>>();
        let rows = self
            .rows
            .entry((keyspace.to_string(), table.to_string()))
            .or_default();
        let same_key = |existing: &HashMap<String, Bytes>| {
            primary_key
                .iter()
                .all(|key| existing.get(key) == row.get(key))
        };
        match rows.iter_mut().find(|existing| same_key(existing)) {
            Some(existing) => existing.extend(row),
            None => rows.push(row),
        }
        Ok(())
    }
}

fn check_column(table: &TableMetadata, column: &str) -> ClusterResult<()> {
    if table.column(column).is_none() {
        return Err(ClusterError::Query(format!(
            "Undefined column name {column} in table {}.{}",
            table.keyspace, table.name
        )));
    }
    Ok(())
}

fn size_estimates_table() -> TableMetadata {
    let text = || NativeType::new("text");
    TableMetadata {
        keyspace: SYSTEM_KEYSPACE.to_string(),
        name: SIZE_ESTIMATES_TABLE.to_string(),
        columns: vec![
            ColumnMetadata::new("keyspace_name", text()),
            ColumnMetadata::new("table_name", text()),
            ColumnMetadata::new("range_start", text()),
            ColumnMetadata::new("range_end", text()),
            ColumnMetadata::new("mean_partition_size", NativeType::new("bigint")),
            ColumnMetadata::new("partitions_count", NativeType::new("bigint")),
        ],
        partition_key: vec!["keyspace_name".to_string()],
        clustering_columns: vec![
            "table_name".to_string(),
            "range_start".to_string(),
            "range_end".to_string(),
        ],
        indexes: Vec::new(),
        comment: None,
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn token_of(partition_key: &[u8]) -> i64 {
    let mut hasher = DefaultHasher::new();
    partition_key.hash(&mut hasher);
    hasher.finish() as i64
}

fn range_contains(range: &TokenRange, token: i64) -> bool {
    let (Ok(start), Ok(end)) = (range.start.parse::<i64>(), range.end.parse::<i64>()) else {
        return false;
    };
    if start < end {
        token > start && token <= end
    } else {
        token > start || token <= end
    }
}

/// Resolves a CQL identifier the way the cluster does: quoted names keep
/// their case, bare names are lower-cased.
fn unquote_identifier(name: &str) -> String {
    match name
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
    {
        Some(inner) => inner.replace("\"\"", "\""),
        _ => name.to_lowercase(),
    }
}

enum Command {
    Select(SelectQuery),
    Insert(InsertQuery),
}

struct SelectQuery {
    distinct: bool,
    /// `None` for `*`.
    columns: Option<Vec<String>>,
    keyspace: String,
    table: String,
    restrictions: Vec<String>,
}

struct InsertQuery {
    keyspace: String,
    table: String,
    columns: Vec<String>,
    markers: usize,
}

fn unsupported(cql: &str, detail: impl std::fmt::Display) -> ClusterError {
    ClusterError::Query(format!("{detail} in statement: {cql}"))
}

fn parse(cql: &str) -> ClusterResult<Command> {
    let mut statements = Parser::parse_sql(&GenericDialect {}, cql)
        .map_err(|err| unsupported(cql, format_args!("syntax error: {err}")))?;
    if statements.len() != 1 {
        return Err(unsupported(
            cql,
            format_args!("expected one statement, found {}", statements.len()),
        ));
    }
    match statements.remove(0) {
        ast::Statement::Query(query) => select_query(cql, &query).map(Command::Select),
        ast::Statement::Insert(insert) => insert_query(cql, &insert).map(Command::Insert),
        _ => Err(ClusterError::Query(format!("unsupported statement: {cql}"))),
    }
}

fn select_query(cql: &str, query: &Query) -> ClusterResult<SelectQuery> {
    if query.with.is_some()
        || query.order_by.is_some()
        || query.limit_clause.is_some()
        || query.fetch.is_some()
    {
        return Err(unsupported(cql, "only plain SELECT is supported"));
    }
    let SetExpr::Select(select) = query.body.as_ref() else {
        return Err(unsupported(cql, "only plain SELECT is supported"));
    };
    if select.having.is_some() || !select.sort_by.is_empty() {
        return Err(unsupported(cql, "only plain SELECT is supported"));
    }
    let distinct = match &select.distinct {
        None => false,
        Some(Distinct::Distinct) => true,
        Some(_) => return Err(unsupported(cql, "DISTINCT ON is not supported")),
    };

    let columns = match select.projection.as_slice() {
        [SelectItem::Wildcard(_)] => None,
        items => Some(
            items
                .iter()
                .map(|item| match item {
                    SelectItem::UnnamedExpr(Expr::Identifier(ident)) => Ok(normalize_ident(ident)),
                    other => Err(unsupported(cql, format_args!("unsupported selector {other}"))),
                })
                .collect::<ClusterResult<Vec<_>>>()?,
        ),
    };

    let [from] = select.from.as_slice() else {
        return Err(unsupported(cql, "expected exactly one table"));
    };
    if !from.joins.is_empty() {
        return Err(unsupported(cql, "joins are not supported"));
    }
    let TableFactor::Table { name, .. } = &from.relation else {
        return Err(unsupported(cql, "only base tables are supported"));
    };
    let (keyspace, table) = qualified_name(name)?;

    let mut restrictions = Vec::new();
    if let Some(selection) = &select.selection {
        collect_restrictions(cql, selection, &mut restrictions)?;
    }
    Ok(SelectQuery {
        distinct,
        columns,
        keyspace,
        table,
        restrictions,
    })
}

/// Flattens `col=? AND col=? ...` into the restricted column names.
fn collect_restrictions(cql: &str, expr: &Expr, out: &mut Vec<String>) -> ClusterResult<()> {
    match expr {
        Expr::BinaryOp { left, op, right } if *op == BinaryOperator::And => {
            collect_restrictions(cql, left, out)?;
            collect_restrictions(cql, right, out)
        }
        Expr::BinaryOp { left, op, right } if *op == BinaryOperator::Eq => {
            match (left.as_ref(), right.as_ref()) {
                (Expr::Identifier(ident), value) if is_bind_marker(value) => {
                    out.push(normalize_ident(ident));
                    Ok(())
                }
                _ => Err(unsupported(cql, format_args!("unsupported restriction {expr}"))),
            }
        }
        other => Err(unsupported(cql, format_args!("unsupported restriction {other}"))),
    }
}

fn insert_query(cql: &str, insert: &Insert) -> ClusterResult<InsertQuery> {
    let TableObject::TableName(name) = &insert.table else {
        return Err(unsupported(cql, "table functions are not supported"));
    };
    let (keyspace, table) = qualified_name(name)?;
    let columns = insert.columns.iter().map(normalize_ident).collect::<Vec<_>>();
    if columns.is_empty() {
        return Err(unsupported(cql, "INSERT requires a column list"));
    }
    let values = match insert.source.as_deref().map(|source| source.body.as_ref()) {
        Some(SetExpr::Values(values)) => values,
        _ => return Err(unsupported(cql, "only INSERT ... VALUES is supported")),
    };
    let [row] = values.rows.as_slice() else {
        return Err(unsupported(cql, "expected exactly one VALUES row"));
    };
    if !row.iter().all(is_bind_marker) {
        return Err(unsupported(cql, "INSERT values must be bind markers"));
    }
    if row.len() != columns.len() {
        return Err(unsupported(cql, "column count does not match value count"));
    }
    Ok(InsertQuery {
        keyspace,
        table,
        markers: row.len(),
        columns,
    })
}

fn is_bind_marker(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Value(ValueWithSpan {
            value: Value::Placeholder(marker),
            ..
        }) if marker == "?"
    )
}

fn qualified_name(name: &ObjectName) -> ClusterResult<(String, String)> {
    let parts = name
        .0
        .iter()
        .map(|part| part.as_ident().map(normalize_ident))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| ClusterError::Query(format!("invalid table name {name}")))?;
    match <[String; 2]>::try_from(parts) {
        Ok([keyspace, table]) => Ok((keyspace, table)),
        Err(parts) if parts.len() == 1 => Err(ClusterError::Query(
            "No keyspace has been specified".to_string(),
        )),
        Err(_) => Err(ClusterError::Query(format!("invalid table name {name}"))),
    }
}

/// Quoted identifiers keep their case; bare ones are lower-cased.
fn normalize_ident(ident: &Ident) -> String {
    if ident.quote_style.is_some() {
        ident.value.clone()
    } else {
        ident.value.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;

    fn events_table() -> TableMetadata {
        TableMetadata {
            keyspace: "Metrics".to_string(),
            name: "events".to_string(),
            columns: vec![
                ColumnMetadata::new("day", NativeType::new("int")),
                ColumnMetadata::new("seq", NativeType::new("int")),
                ColumnMetadata::new("payload", NativeType::new("text")),
            ],
            partition_key: vec!["day".to_string()],
            clustering_columns: vec!["seq".to_string()],
            indexes: Vec::new(),
            comment: None,
        }
    }

    fn host(port: u16) -> Host {
        Host::new(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    async fn session(cluster: &InMemoryCluster) -> Arc<dyn ClusterSession> {
        cluster.connect().await.expect("connect")
    }

    #[tokio::test]
    async fn select_distinct_returns_each_partition_once() {
        let cluster = InMemoryCluster::new();
        cluster.add_table(events_table());
        for (day, seq) in [(1, 1), (1, 2), (2, 1)] {
            cluster
                .insert_row(
                    "Metrics",
                    "events",
                    [
                        ("day", CqlValue::Int(day)),
                        ("seq", CqlValue::Int(seq)),
                        ("payload", CqlValue::Text(format!("{day}/{seq}"))),
                    ],
                )
                .expect("insert");
        }

        let result = session(&cluster)
            .await
            .execute(&Statement::new("SELECT DISTINCT day FROM \"Metrics\".events"))
            .await
            .expect("select");
        assert_eq!(result.len(), 2);

        let result = session(&cluster)
            .await
            .execute(&Statement::with_values(
                "SELECT payload FROM \"Metrics\".events WHERE day=? AND seq=?",
                vec![CqlValue::Int(1), CqlValue::Int(2)],
            ))
            .await
            .expect("select");
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows[0].get_string("payload").expect("payload"), "1/2");
    }

    #[tokio::test]
    async fn insert_upserts_by_primary_key() {
        let cluster = InMemoryCluster::new();
        cluster.add_table(events_table());
        let session = session(&cluster).await;
        let insert = "INSERT INTO \"Metrics\".events (day, seq, payload) VALUES (?, ?, ?)";
        for payload in ["first", "second"] {
            session
                .execute(&Statement::with_values(
                    insert,
                    vec![
                        CqlValue::Int(5),
                        CqlValue::Int(1),
                        CqlValue::Text(payload.to_string()),
                    ],
                ))
                .await
                .expect("insert");
        }

        let result = session
            .execute(&Statement::new("SELECT * FROM \"Metrics\".events"))
            .await
            .expect("select");
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows[0].get_string("payload").expect("payload"), "second");
        assert_eq!(cluster.executed_statements().len(), 3);
    }

    #[tokio::test]
    async fn distinct_over_non_key_columns_is_rejected() {
        let cluster = InMemoryCluster::new();
        cluster.add_table(events_table());
        let err = session(&cluster)
            .await
            .execute(&Statement::new("SELECT DISTINCT payload FROM \"Metrics\".events"))
            .await
            .expect_err("not a partition key");
        assert!(matches!(err, ClusterError::Query(_)));
    }

    #[tokio::test]
    async fn bare_identifiers_are_lower_cased() {
        let cluster = InMemoryCluster::new();
        cluster.add_table(events_table());
        let err = session(&cluster)
            .await
            .execute(&Statement::new("SELECT * FROM Metrics.events"))
            .await
            .expect_err("metrics != Metrics");
        assert!(err.to_string().contains("unconfigured table metrics.events"), "{err}");
    }

    #[tokio::test]
    async fn injected_request_failures_are_consumed_in_order() {
        let cluster = InMemoryCluster::new();
        let session = session(&cluster).await;
        cluster.fail_next_requests_with_no_host(1);
        assert!(matches!(
            session.partitioner().await,
            Err(ClusterError::NoHostAvailable(_))
        ));
        assert_eq!(session.partitioner().await.expect("second"), MURMUR3_PARTITIONER);
    }

    #[tokio::test]
    async fn replicas_follow_the_ring() {
        let cluster = InMemoryCluster::new();
        cluster.add_keyspace("Metrics");
        let low = TokenRange::new("0", i64::MIN.to_string());
        let high = TokenRange::new(i64::MIN.to_string(), "0");
        cluster.add_token_range(low.clone(), [host(9042)]);
        cluster.add_token_range(high.clone(), [host(9043)]);
        let session = session(&cluster).await;

        assert_eq!(
            session.replicas_for_range("\"Metrics\"", &low).await.expect("range"),
            BTreeSet::from([host(9042)])
        );
        assert!(session
            .replicas_for_range("metrics", &low)
            .await
            .expect("range")
            .is_empty());

        let replicas = session
            .replicas_for_key("\"Metrics\"", b"key")
            .await
            .expect("key");
        assert_eq!(replicas.len(), 1);
        assert_eq!(session.token_ranges().await.expect("ranges").len(), 2);
    }

    #[test]
    fn wrapping_range_covers_both_ends() {
        let wrap = TokenRange::new("100", "-100");
        assert!(range_contains(&wrap, 101));
        assert!(range_contains(&wrap, -100));
        assert!(!range_contains(&wrap, 0));
        assert!(range_contains(&TokenRange::new("0", "10"), 10));
        assert!(!range_contains(&TokenRange::new("0", "10"), 0));
    }

    #[test]
    fn unsupported_statements_are_query_errors() {
        assert!(matches!(
            parse("DELETE FROM ks.t"),
            Err(ClusterError::Query(ref msg)) if msg.starts_with("unsupported statement")
        ));
        assert!(matches!(
            parse("SELECT a FROM t"),
            Err(ClusterError::Query(ref msg)) if msg == "No keyspace has been specified"
        ));
        assert!(parse("SELECT a FROM ks.t WHERE a=1").is_err());
        assert!(parse("SELECT a FROM ks.t WHERE a>?").is_err());
        assert!(parse("SELECT a FROM ks.t ORDER BY a").is_err());
        assert!(parse("INSERT INTO ks.t (a, b) VALUES (?)").is_err());
        assert!(parse("INSERT INTO ks.t (a) VALUES (1)").is_err());
        assert!(parse("SELECT a FROM ks.t; SELECT b FROM ks.t").is_err());
    }

    #[test]
    fn select_keeps_quoted_case_and_lower_cases_bare_names() {
        let cql = "SELECT DISTINCT Day,\"Bucket\" FROM \"Metrics\".Events \
                   WHERE Day=? AND \"Bucket\"=?";
        let Ok(Command::Select(query)) = parse(cql) else {
            panic!("expected a select");
        };
        assert!(query.distinct);
        assert_eq!(
            query.columns,
            Some(vec!["day".to_string(), "Bucket".to_string()])
        );
        assert_eq!(query.keyspace, "Metrics");
        assert_eq!(query.table, "events");
        assert_eq!(query.restrictions, vec!["day", "Bucket"]);

        let Ok(Command::Select(query)) = parse("SELECT * FROM ks.t") else {
            panic!("expected a select");
        };
        assert!(!query.distinct);
        assert!(query.columns.is_none());
        assert!(query.restrictions.is_empty());
    }

    #[test]
    fn insert_counts_bind_markers() {
        let Ok(Command::Insert(query)) =
            parse("INSERT INTO ks.\"Events\" (day, \"Seq\") VALUES (?, ?)")
        else {
            panic!("expected an insert");
        };
        assert_eq!(query.keyspace, "ks");
        assert_eq!(query.table, "Events");
        assert_eq!(query.columns, vec!["day", "Seq"]);
        assert_eq!(query.markers, 2);
    }
}
