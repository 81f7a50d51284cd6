//! The decoded shape of a query request.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use mangrove_sql::JoinKind;

/// One selected field: either a plain field name or a single-entry mapping
/// of an aggregate directive (`"$max"`, `"$count"`, ...) to a field name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FieldSpec {
    Column(String),
    Aggregate(BTreeMap<String, String>),
}

impl From<&str> for FieldSpec {
    fn from(field: &str) -> Self {
        FieldSpec::Column(field.to_string())
    }
}

/// A Mango-style query request.
///
/// ```json
/// {
///     "fields": ["f_name", {"$max": "dob"}],
///     "selector": {"cvso.region": {"$eq": "north"}},
///     "sort": [{"l_name": "asc"}],
///     "limit": 25,
///     "skip": 50,
///     "join": "left"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryRequest {
    /// The fields to select; must not be empty
    pub fields: Vec<FieldSpec>,
    /// Filter selector tree
    #[serde(default)]
    pub selector: Option<Value>,
    /// A field name, `{field: "asc"|"desc"}` pair, or list of either
    #[serde(default)]
    pub sort: Option<Value>,
    /// A field name or list of field names to group by
    #[serde(default)]
    pub group: Option<Value>,
    /// Maximum number of rows to return
    #[serde(default)]
    pub limit: Option<i64>,
    /// Rows to skip before the first returned one; ignored without `limit`
    #[serde(default)]
    pub skip: Option<i64>,
    /// Join flavor used for tables pulled in by field references
    #[serde(default)]
    pub join: JoinKind,
}

impl QueryRequest {
    /// A request selecting the given fields with no other clauses.
    pub fn select<I>(fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<FieldSpec>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            selector: None,
            sort: None,
            group: None,
            limit: None,
            skip: None,
            join: JoinKind::default(),
        }
    }
}
