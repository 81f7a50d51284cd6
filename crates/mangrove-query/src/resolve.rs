//! Name resolution between public query aliases and real database names.
//!
//! Query requests speak in public field names; the emitted SQL speaks in
//! real table and column names. A [`NameResolver`] owns that mapping, along
//! with the join graph and any access-control filters. Implementations
//! decide which names exist at all, which makes the resolver the place
//! where untrusted identifiers are vetted before they reach SQL.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use mangrove_sql::{FilterExpr, JoinKind};

/// A join needed to reach a table, ultimately relative to the base table.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    /// Real SQL name of the table to join
    pub table: String,
    /// SQL snippet for the join condition, if any
    pub condition: Option<String>,
    /// Join flavor; `None` defers to the query request
    pub kind: Option<JoinKind>,
}

impl JoinSpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            condition: None,
            kind: None,
        }
    }

    pub fn with_condition(table: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            condition: Some(condition.into()),
            kind: None,
        }
    }
}

/// A resolved table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableTranslation {
    /// Alias used in the emitted SQL; also the unique key for this table
    /// inside the translator
    pub alias: String,
    /// Real SQL table name
    pub table: String,
    /// Joins needed to use this table. Keys are arbitrary but must be
    /// consistent so the same table is never joined twice.
    pub joins: BTreeMap<String, JoinSpec>,
}

/// A resolved field.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnTranslation {
    /// Alias for this column in the emitted statement
    pub alias: String,
    /// SQL snippet used wherever the field is referenced
    pub selector: String,
    /// The table this column belongs to
    pub table: TableTranslation,
}

/// Maps public query names onto the database schema.
pub trait NameResolver {
    /// Resolve the base table alias, or `None` if no such table exists.
    fn base_table(&self, alias: &str) -> Option<TableTranslation>;

    /// Resolve a field alias (possibly `table.column` dotted) against the
    /// given base table, or `None` if no such field exists.
    fn field(&self, alias: &str, base_table: &str) -> Option<ColumnTranslation>;

    /// Filters to add to every translated query touching these tables.
    ///
    /// Useful for row-level permissions or hiding soft-deleted rows.
    fn extra_filters(&self, tables: &BTreeMap<String, TableTranslation>) -> Option<FilterExpr> {
        let _ = tables;
        None
    }
}

static TABLE_ALIAS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z_]+$").unwrap());
static FIELD_ALIAS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:([a-zA-Z_]+)\.)?([a-zA-Z_]+)$").unwrap());

/// Identity resolver, mostly for testing.
///
/// It assumes the public names match the schema exactly: any
/// syntactically valid key resolves to itself, and tables other than the
/// base are joined by name with no condition. Production code should use
/// a schema-aware resolver instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultResolver;

impl NameResolver for DefaultResolver {
    fn base_table(&self, alias: &str) -> Option<TableTranslation> {
        if !TABLE_ALIAS_RE.is_match(alias) {
            return None;
        }
        Some(TableTranslation {
            alias: alias.to_string(),
            table: alias.to_string(),
            joins: BTreeMap::new(),
        })
    }

    fn field(&self, alias: &str, base_table: &str) -> Option<ColumnTranslation> {
        let captures = FIELD_ALIAS_RE.captures(alias)?;
        let table = captures
            .get(1)
            .map(|m| m.as_str())
            .unwrap_or(base_table)
            .to_string();
        let mut joins = BTreeMap::new();
        if table != base_table {
            joins.insert(table.clone(), JoinSpec::new(table.clone()));
        }
        Some(ColumnTranslation {
            alias: alias.to_string(),
            selector: alias.to_string(),
            table: TableTranslation {
                alias: table.clone(),
                table,
                joins,
            },
        })
    }
}
