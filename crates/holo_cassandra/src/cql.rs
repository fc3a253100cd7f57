//! CQL identifier quoting and the small statement builder used by the
//! session layer.

use crate::client::Statement;
use crate::types::CqlValue;

/// Words the CQL grammar reserves; an identifier equal to one of these must
/// be quoted.
const RESERVED_KEYWORDS: &[&str] = &[
    "add", "allow", "alter", "and", "apply", "asc", "authorize", "batch", "begin", "by",
    "columnfamily", "create", "delete", "desc", "describe", "drop", "entries", "execute", "from",
    "full", "grant", "if", "in", "index", "infinity", "insert", "into", "keyspace", "limit",
    "modify", "nan", "norecursive", "not", "null", "of", "on", "or", "order", "primary", "rename",
    "replace", "revoke", "schema", "select", "set", "table", "to", "token", "truncate",
    "unlogged", "update", "use", "using", "where", "with",
];

pub fn valid_schema_name(name: &str) -> String {
    valid_identifier(name)
}

pub fn valid_table_name(name: &str) -> String {
    valid_identifier(name)
}

pub fn valid_column_name(name: &str) -> String {
    valid_identifier(name)
}

/// Returns `name` unchanged when it reads back identically unquoted,
/// otherwise double-quotes it.
pub fn valid_identifier(name: &str) -> String {
    if needs_quoting(name) {
        quote_identifier(name)
    } else {
        name.to_string()
    }
}

/// Double-quotes an identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn needs_quoting(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return true;
    };
    if !first.is_ascii_lowercase() {
        return true;
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
        return true;
    }
    RESERVED_KEYWORDS.binary_search(&name).is_ok()
}

/// `SELECT` statement builder with positional equality restrictions.
///
/// Names passed in are raw (case-sensitive) identifiers and are quoted as
/// needed when the statement is built.
#[derive(Debug, Clone)]
pub struct Select {
    distinct: bool,
    columns: Vec<String>,
    keyspace: String,
    table: String,
    restrictions: Vec<String>,
    values: Vec<CqlValue>,
}

impl Select {
    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            distinct: false,
            columns: columns
                .into_iter()
                .map(|column| valid_column_name(column.as_ref()))
                .collect(),
            keyspace: String::new(),
            table: String::new(),
            restrictions: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn from(mut self, keyspace: &str, table: &str) -> Self {
        self.keyspace = valid_schema_name(keyspace);
        self.table = valid_table_name(table);
        self
    }

    /// Adds `column = ?` bound to `value`.
    pub fn where_eq(mut self, column: &str, value: CqlValue) -> Self {
        self.restrictions
            .push(format!("{}=?", valid_column_name(column)));
        self.values.push(value);
        self
    }

    pub fn build(self) -> Statement {
        let projection = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(",")
        };
        let mut cql = format!(
            "SELECT {}{} FROM {}.{}",
            if self.distinct { "DISTINCT " } else { "" },
            projection,
            self.keyspace,
            self.table
        );
        if !self.restrictions.is_empty() {
            cql.push_str(" WHERE ");
            cql.push_str(&self.restrictions.join(" AND "));
        }
        Statement::with_values(cql, self.values)
    }
}
