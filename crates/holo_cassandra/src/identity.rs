//! Case-insensitive keyspace/table/column identity resolution.
//!
//! Candidates are always sorted by their case-sensitive name before matching
//! so ambiguity errors name the same pair on every run.

use std::collections::HashMap;

use crate::client::{ColumnMetadata, KeyspaceMetadata, TableMetadata};
use crate::error::{Result, SessionError};
use crate::executor::ResilientExecutor;

/// Outcome of a case-insensitive scan over sorted candidates.
#[derive(Debug, PartialEq, Eq)]
pub enum NameMatch<'a> {
    Missing,
    Unique(&'a str),
    /// First two colliding names, in sorted order.
    Ambiguous(&'a str, &'a str),
}

/// Scans `names` (sorted here) for a case-insensitive match of `wanted`.
pub fn find_case_insensitive<'a>(
    names: impl IntoIterator<Item = &'a str>,
    wanted: &str,
) -> NameMatch<'a> {
    let mut sorted = names.into_iter().collect::<Vec<_>>();
    sorted.sort_unstable();
    let wanted = wanted.to_lowercase();

    let mut found: Option<&'a str> = None;
    for name in sorted {
        if name.to_lowercase() != wanted {
            continue;
        }
        if let Some(first) = found {
            return NameMatch::Ambiguous(first, name);
        }
        found = Some(name);
    }
    found.map_or(NameMatch::Missing, NameMatch::Unique)
}

/// Fetches live keyspaces and resolves `name` case-insensitively.
pub async fn resolve_keyspace(executor: &ResilientExecutor, name: &str) -> Result<KeyspaceMetadata> {
    let keyspaces = executor
        .run(|session| async move { session.keyspaces().await })
        .await?;
    select_keyspace(keyspaces, name)
}

/// Picks the keyspace matching `name` from an already-fetched list.
pub fn select_keyspace(keyspaces: Vec<KeyspaceMetadata>, name: &str) -> Result<KeyspaceMetadata> {
    let matched = match find_case_insensitive(keyspaces.iter().map(|ks| ks.name.as_str()), name) {
        NameMatch::Missing => {
            return Err(SessionError::SchemaNotFound {
                schema: name.to_string(),
            })
        }
        NameMatch::Ambiguous(first, second) => {
            return Err(SessionError::AmbiguousIdentity(format!(
                "More than one keyspace has been found for the case insensitive schema name: {name} -> ({first}, {second})"
            )))
        }
        NameMatch::Unique(found) => found.to_string(),
    };
    keyspaces
        .into_iter()
        .find(|ks| ks.name == matched)
        .ok_or(SessionError::SchemaNotFound {
            schema: name.to_string(),
        })
}

/// Resolves a table of `keyspace` case-insensitively.
pub fn resolve_table<'a>(keyspace: &'a KeyspaceMetadata, name: &str) -> Result<&'a TableMetadata> {
    let not_found = || SessionError::TableNotFound {
        schema: keyspace.name.clone(),
        table: name.to_string(),
    };
    match find_case_insensitive(keyspace.tables.iter().map(|t| t.name.as_str()), name) {
        NameMatch::Missing => Err(not_found()),
        NameMatch::Ambiguous(first, second) => Err(SessionError::AmbiguousIdentity(format!(
            "More than one table has been found for the case insensitive table name: {name} -> ({first}, {second})"
        ))),
        NameMatch::Unique(found) => keyspace.table(found).ok_or_else(not_found),
    }
}

/// Fails when two columns collapse to the same lower-cased name.
pub fn check_column_names(columns: &[ColumnMetadata]) -> Result<()> {
    let mut by_lowercase = HashMap::<String, &str>::with_capacity(columns.len());
    for column in columns {
        let lowercase = column.name.to_lowercase();
        if let Some(existing) = by_lowercase.get(lowercase.as_str()) {
            return Err(SessionError::AmbiguousIdentity(format!(
                "More than one column has been found for the case insensitive column name: {lowercase} -> ({existing}, {})",
                column.name
            )));
        }
        by_lowercase.insert(lowercase, column.name.as_str());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::NativeType;

    fn keyspace(name: &str, tables: &[&str]) -> KeyspaceMetadata {
        KeyspaceMetadata {
            name: name.to_string(),
            tables: tables
                .iter()
                .map(|table| TableMetadata {
                    keyspace: name.to_string(),
                    name: table.to_string(),
                    columns: Vec::new(),
                    partition_key: Vec::new(),
                    clustering_columns: Vec::new(),
                    indexes: Vec::new(),
                    comment: None,
                })
                .collect(),
        }
    }

    #[test]
    fn resolution_ignores_case() {
        let keyspaces = vec![keyspace("Foo", &[]), keyspace("bar", &[])];
        for wanted in ["Foo", "foo", "FOO"] {
            let resolved = select_keyspace(keyspaces.clone(), wanted).expect("resolve");
            assert_eq!(resolved.name, "Foo");
        }
    }

    #[test]
    fn colliding_keyspaces_are_ambiguous_in_sorted_order() {
        let keyspaces = vec![keyspace("foo", &[]), keyspace("Foo", &[])];
        let err = select_keyspace(keyspaces, "foo").expect_err("ambiguous");
        let SessionError::AmbiguousIdentity(message) = err else {
            panic!("unexpected error: {err}");
        };
        assert!(message.ends_with("foo -> (Foo, foo)"), "{message}");
    }

    #[test]
    fn missing_keyspace_reports_searched_name() {
        let err = select_keyspace(vec![keyspace("bar", &[])], "Foo").expect_err("missing");
        assert!(matches!(err, SessionError::SchemaNotFound { ref schema } if schema == "Foo"));
    }

    #[test]
    fn table_not_found_carries_qualified_identity() {
        let ks = keyspace("Shop", &["orders"]);
        let err = resolve_table(&ks, "users").expect_err("missing");
        assert!(matches!(
            err,
            SessionError::TableNotFound { ref schema, ref table } if schema == "Shop" && table == "users"
        ));
        assert_eq!(resolve_table(&ks, "ORDERS").expect("found").name, "orders");
    }

    #[test]
    fn colliding_tables_are_ambiguous() {
        let ks = keyspace("shop", &["Orders", "orders", "ORDERS"]);
        let err = resolve_table(&ks, "orders").expect_err("ambiguous");
        assert!(err.to_string().ends_with("orders -> (ORDERS, Orders)"), "{err}");
    }

    #[test]
    fn colliding_columns_are_rejected() {
        let columns = vec![
            ColumnMetadata::new("Email", NativeType::new("text")),
            ColumnMetadata::new("id", NativeType::new("int")),
            ColumnMetadata::new("email", NativeType::new("text")),
        ];
        let err = check_column_names(&columns).expect_err("ambiguous");
        assert!(err.to_string().ends_with("email -> (Email, email)"), "{err}");
        assert!(check_column_names(&columns[..2]).is_ok());
    }
}
