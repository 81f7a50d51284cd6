//! Filter expression model.
//!
//! A [`FilterExpr`] is a closed tree of comparisons, logical groups, and raw
//! fragments. Every tree supports two renderings:
//!
//! - [`FilterExpr::to_sql`]: a parameterized SQL fragment plus the `:name`
//!   parameters it binds.
//! - [`FilterExpr::matches`]: a boolean evaluation against an in-memory
//!   record, mirroring the SQL semantics. Raw SQL, params-only, and
//!   subquery nodes fail matching with a typed error rather than guessing.

use std::cmp::Ordering;
use std::collections::HashMap;

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};

use crate::error::{Result, SqlError};
use crate::statement::Statement;

/// Parameter mapping accumulated while rendering.
pub type Params = HashMap<String, Value>;

/// Generates parameter names that are unique within one render call.
///
/// Names look like `f_name_p0`, `f_name_p1`, ... — the column keeps the
/// generated SQL readable, the counter guarantees distinctness.
#[derive(Debug, Default)]
pub struct ParamNamer {
    next: u64,
}

impl ParamNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce a fresh parameter name derived from a column name.
    pub fn name(&mut self, column: &str) -> String {
        let base: String = column
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        let n = self.next;
        self.next += 1;
        if base.is_empty() {
            format!("p{n}")
        } else {
            format!("{base}_p{n}")
        }
    }
}

/// Split a column key into table and column parts.
///
/// `"claims.vet_id"` becomes `(Some("claims"), "vet_id")`; an undotted key
/// has no table part. For multi-dotted keys the first segment is the table
/// and the last is the column.
pub fn split_column(key: &str) -> (Option<&str>, &str) {
    let mut parts = key.split('.');
    let first = parts.next().unwrap_or(key);
    match key.rsplit_once('.') {
        Some((_, column)) => (Some(first), column),
        None => (None, key),
    }
}

/// Comparison operators supported by [`FilterExpr::Comparison`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    NotLike,
    /// LIKE with `%` wildcards added around the operand server-side
    LikeWithin,
    NotLikeWithin,
    In,
    NotIn,
    Between,
    Regexp,
    NotRegexp,
}

impl CompareOp {
    /// Parse the operator token used in shorthand filter keys.
    ///
    /// `=` is the implied default when a key has no operator token.
    pub fn from_shorthand(token: &str) -> Option<Self> {
        Some(match token {
            "=" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            "<" => CompareOp::Lt,
            "<=" => CompareOp::Lte,
            ">" => CompareOp::Gt,
            ">=" => CompareOp::Gte,
            "LIKE" => CompareOp::Like,
            "NOT_LIKE" => CompareOp::NotLike,
            "LIKE%%" => CompareOp::LikeWithin,
            "NOT_LIKE%%" => CompareOp::NotLikeWithin,
            "IN" => CompareOp::In,
            "NOT_IN" => CompareOp::NotIn,
            "BETWEEN" => CompareOp::Between,
            "REGEXP" => CompareOp::Regexp,
            "NOT_REGEXP" => CompareOp::NotRegexp,
            _ => return None,
        })
    }
}

/// A filter expression tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    /// A binary comparison of a column against an operand value
    Comparison {
        table: Option<String>,
        column: String,
        op: CompareOp,
        value: Value,
    },
    /// Parenthesized subgroup joined by AND
    And(Vec<FilterExpr>),
    /// Parenthesized subgroup joined by OR
    Or(Vec<FilterExpr>),
    /// Logical inversion of the inner filter
    Not(Box<FilterExpr>),
    /// A raw SQL fragment, optionally carrying its own parameters
    RawSql { sql: String, params: Params },
    /// An EXISTS condition over a subquery. The subquery is rendered lazily
    /// so its parameters share the enclosing render's namespace.
    Exists {
        subquery: Box<Statement>,
        params: Params,
    },
    /// No fragment at all, only parameters (pairs with a separate `RawSql`)
    Params(Params),
    /// A fixed `1` or `0` fragment
    Fixed(bool),
}

impl FilterExpr {
    /// Build a comparison, splitting a possibly-dotted column key.
    pub fn comparison(key: &str, op: CompareOp, value: Value) -> Self {
        let (table, column) = split_column(key);
        FilterExpr::Comparison {
            table: table.map(str::to_string),
            column: column.to_string(),
            op,
            value,
        }
    }

    /// A raw SQL fragment with no parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        FilterExpr::RawSql {
            sql: sql.into(),
            params: Params::new(),
        }
    }

    /// A raw SQL fragment carrying `:name` parameters.
    pub fn raw_with_params(sql: impl Into<String>, params: Params) -> Self {
        FilterExpr::RawSql {
            sql: sql.into(),
            params,
        }
    }

    /// Render to a parameterized SQL fragment with a fresh namer.
    ///
    /// Returns the fragment (`None` for params-only nodes) and the bound
    /// parameters. Use [`FilterExpr::render`] when several trees must share
    /// one parameter namespace.
    pub fn to_sql(&self) -> Result<(Option<String>, Params)> {
        let mut namer = ParamNamer::new();
        self.render(&mut namer)
    }

    /// Render to a parameterized SQL fragment using the caller's namer.
    pub fn render(&self, namer: &mut ParamNamer) -> Result<(Option<String>, Params)> {
        match self {
            FilterExpr::Comparison {
                table,
                column,
                op,
                value,
            } => render_comparison(table.as_deref(), column, *op, value, namer),
            FilterExpr::And(children) => render_group(children, " AND ", namer),
            FilterExpr::Or(children) => render_group(children, " OR ", namer),
            FilterExpr::Not(child) => {
                let (fragment, params) = child.render(namer)?;
                let fragment = fragment.map(|f| {
                    if f.starts_with('(') {
                        format!("NOT {f}")
                    } else {
                        format!("NOT ({f})")
                    }
                });
                Ok((fragment, params))
            }
            FilterExpr::RawSql { sql, params } => Ok((Some(sql.clone()), params.clone())),
            FilterExpr::Exists { subquery, params } => {
                let mut bound = params.clone();
                let fragment = subquery.render_fragment_with(namer, &mut bound)?;
                Ok((Some(format!("EXISTS ({fragment})")), bound))
            }
            FilterExpr::Params(params) => Ok((None, params.clone())),
            FilterExpr::Fixed(true) => Ok((Some("1".to_string()), Params::new())),
            FilterExpr::Fixed(false) => Ok((Some("0".to_string()), Params::new())),
        }
    }

    /// Test whether a record satisfies this filter.
    ///
    /// Columns are looked up by bare column name; the table part of a
    /// comparison is ignored, matching the flat shape of a fetched row.
    /// Missing columns behave as SQL NULL.
    pub fn matches(&self, record: &Map<String, Value>) -> Result<bool> {
        match self {
            FilterExpr::Comparison { column, op, value, .. } => {
                let field = record.get(column).unwrap_or(&Value::Null);
                match_comparison(field, *op, value)
            }
            FilterExpr::And(children) => {
                for child in children {
                    if !child.matches(record)? {
                        // Short circuit
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            FilterExpr::Or(children) => {
                if children.is_empty() {
                    return Ok(true);
                }
                for child in children {
                    if child.matches(record)? {
                        // Short circuit
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            FilterExpr::Not(child) => Ok(!child.matches(record)?),
            FilterExpr::RawSql { .. } => Err(SqlError::NotMatchable("raw SQL")),
            FilterExpr::Exists { .. } => Err(SqlError::NotMatchable("EXISTS subquery")),
            FilterExpr::Params(_) => Err(SqlError::NotMatchable("params-only")),
            FilterExpr::Fixed(value) => Ok(*value),
        }
    }
}

fn quoted_key(table: Option<&str>, column: &str) -> String {
    match table {
        Some(table) => format!("`{table}`.`{column}`"),
        None => format!("`{column}`"),
    }
}

fn render_comparison(
    table: Option<&str>,
    column: &str,
    op: CompareOp,
    value: &Value,
    namer: &mut ParamNamer,
) -> Result<(Option<String>, Params)> {
    let key = quoted_key(table, column);
    let mut params = Params::new();
    let fragment = match op {
        CompareOp::Eq if value.is_null() => format!("{key} IS NULL"),
        CompareOp::Ne if value.is_null() => format!("{key} IS NOT NULL"),
        CompareOp::Eq
        | CompareOp::Ne
        | CompareOp::Lt
        | CompareOp::Lte
        | CompareOp::Gt
        | CompareOp::Gte
        | CompareOp::Like
        | CompareOp::NotLike
        | CompareOp::Regexp
        | CompareOp::NotRegexp => {
            let keyword = match op {
                CompareOp::Eq => "=",
                CompareOp::Ne => "!=",
                CompareOp::Lt => "<",
                CompareOp::Lte => "<=",
                CompareOp::Gt => ">",
                CompareOp::Gte => ">=",
                CompareOp::Like => "LIKE",
                CompareOp::NotLike => "NOT LIKE",
                CompareOp::Regexp => "REGEXP",
                _ => "NOT REGEXP",
            };
            let name = namer.name(column);
            params.insert(name.clone(), value.clone());
            format!("{key} {keyword} :{name}")
        }
        CompareOp::LikeWithin | CompareOp::NotLikeWithin => {
            let keyword = if op == CompareOp::LikeWithin {
                "LIKE"
            } else {
                "NOT LIKE"
            };
            let name = namer.name(column);
            params.insert(name.clone(), value.clone());
            format!("{key} {keyword} CONCAT('%', :{name}, '%')")
        }
        CompareOp::Between => {
            let bounds = between_bounds(op, value)?;
            let name = namer.name(column);
            params.insert(format!("{name}_min"), bounds.0.clone());
            params.insert(format!("{name}_max"), bounds.1.clone());
            format!("{key} BETWEEN :{name}_min AND :{name}_max")
        }
        CompareOp::In | CompareOp::NotIn => {
            let items = value.as_array().ok_or_else(|| SqlError::InvalidOperand {
                op,
                expected: "a list of values",
                value: value.clone(),
            })?;
            if items.is_empty() {
                // A value can never be in an empty set: IN is always false,
                // NOT IN is always true.
                let fixed = if op == CompareOp::In { "0" } else { "1" };
                return Ok((Some(fixed.to_string()), params));
            }
            let name = namer.name(column);
            let placeholders: Vec<String> = items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let item_name = format!("{name}_{i}");
                    params.insert(item_name.clone(), item.clone());
                    format!(":{item_name}")
                })
                .collect();
            let keyword = if op == CompareOp::In { "IN" } else { "NOT IN" };
            format!("{key} {keyword} ({})", placeholders.join(", "))
        }
    };
    Ok((Some(fragment), params))
}

fn render_group(
    children: &[FilterExpr],
    separator: &str,
    namer: &mut ParamNamer,
) -> Result<(Option<String>, Params)> {
    if children.is_empty() {
        return Ok((Some("1".to_string()), Params::new()));
    }
    let mut fragments = Vec::new();
    let mut params = Params::new();
    for child in children {
        let (fragment, child_params) = child.render(namer)?;
        if let Some(fragment) = fragment {
            if !fragment.is_empty() {
                fragments.push(fragment);
            }
        }
        params.extend(child_params);
    }
    Ok((Some(format!("({})", fragments.join(separator))), params))
}

fn between_bounds(op: CompareOp, value: &Value) -> Result<(&Value, &Value)> {
    match value.as_array().map(Vec::as_slice) {
        Some([lo, hi]) => Ok((lo, hi)),
        _ => Err(SqlError::InvalidOperand {
            op,
            expected: "a two-element list",
            value: value.clone(),
        }),
    }
}

fn match_comparison(field: &Value, op: CompareOp, value: &Value) -> Result<bool> {
    match op {
        CompareOp::Eq => Ok(if value.is_null() {
            field.is_null()
        } else {
            loosely_equal(field, value)
        }),
        CompareOp::Ne => Ok(if value.is_null() {
            !field.is_null()
        } else {
            !loosely_equal(field, value)
        }),
        CompareOp::Lt => Ok(matches!(compare(field, value), Some(Ordering::Less))),
        CompareOp::Lte => Ok(matches!(
            compare(field, value),
            Some(Ordering::Less | Ordering::Equal)
        )),
        CompareOp::Gt => Ok(matches!(compare(field, value), Some(Ordering::Greater))),
        CompareOp::Gte => Ok(matches!(
            compare(field, value),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        CompareOp::Like | CompareOp::NotLike => {
            let pattern = text_operand(op, value)?;
            let matched = match scalar_text(field) {
                Some(text) => like_matches(&pattern, &text, None)?,
                None => false,
            };
            Ok(if op == CompareOp::Like { matched } else { !matched })
        }
        CompareOp::LikeWithin | CompareOp::NotLikeWithin => {
            let pattern = format!("%{}%", text_operand(op, value)?);
            let matched = match scalar_text(field) {
                Some(text) => like_matches(&pattern, &text, None)?,
                None => false,
            };
            Ok(if op == CompareOp::LikeWithin {
                matched
            } else {
                !matched
            })
        }
        CompareOp::In | CompareOp::NotIn => {
            let items = value.as_array().ok_or_else(|| SqlError::InvalidOperand {
                op,
                expected: "a list of values",
                value: value.clone(),
            })?;
            let contained = items.iter().any(|item| loosely_equal(field, item));
            Ok(if op == CompareOp::In {
                contained
            } else {
                !contained
            })
        }
        CompareOp::Between => {
            let (lo, hi) = between_bounds(op, value)?;
            Ok(matches!(
                compare(field, lo),
                Some(Ordering::Greater | Ordering::Equal)
            ) && matches!(
                compare(field, hi),
                Some(Ordering::Less | Ordering::Equal)
            ))
        }
        CompareOp::Regexp | CompareOp::NotRegexp => {
            let pattern = text_operand(op, value)?;
            let regex = Regex::new(&pattern).map_err(|e| SqlError::InvalidRegex {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            let matched = match scalar_text(field) {
                Some(text) => regex.is_match(&text),
                None => false,
            };
            Ok(if op == CompareOp::Regexp {
                matched
            } else {
                !matched
            })
        }
    }
}

/// Equality with numeric tolerance: integers and floats compare by value.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Ordering across scalar values; incomparable types yield `None`.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Render a scalar as text for LIKE/REGEXP matching.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn text_operand(op: CompareOp, value: &Value) -> Result<String> {
    scalar_text(value).ok_or_else(|| SqlError::InvalidOperand {
        op,
        expected: "a string",
        value: value.clone(),
    })
}

/// Convert a SQL LIKE pattern into an (unanchored) regex pattern.
///
/// `%` maps to any run of characters, `_` to any single character. An
/// optional escape character suppresses the wildcard meaning of the
/// character that follows it.
pub fn like_to_regex(pattern: &str, escape: Option<char>) -> String {
    let mut out = String::new();
    let mut escaped = false;
    for ch in pattern.chars() {
        if !escaped && ch == '%' {
            out.push_str(".*");
        } else if !escaped && ch == '_' {
            out.push('.');
        } else if !escaped && Some(ch) == escape {
            escaped = true;
        } else {
            out.push_str(&regex::escape(&ch.to_string()));
            escaped = false;
        }
    }
    out
}

/// Case-insensitive LIKE evaluation against a text value.
pub fn like_matches(pattern: &str, text: &str, escape: Option<char>) -> Result<bool> {
    let regex = RegexBuilder::new(&like_to_regex(pattern, escape))
        .case_insensitive(true)
        .build()
        .map_err(|e| SqlError::InvalidRegex {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;
    Ok(regex.is_match(text))
}
