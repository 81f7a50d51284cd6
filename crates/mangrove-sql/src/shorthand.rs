//! Compact mapping syntax for filters.
//!
//! Filters can be written as a JSON-shaped mapping whose keys are
//! `"column [operator] [label]"` strings and whose values are the operands:
//!
//! ```json
//! {"the_thing": "things", "value >": 1, "name LIKE%%": "song"}
//! ```
//!
//! The operator defaults to `=`. A trailing label is ignored; it only keeps
//! keys distinct when two filters would otherwise collide. Dotted columns
//! carry a table prefix (`"claims.vet_id"`).
//!
//! Keys starting with `@` are directives rather than columns:
//!
//! - `@sql`: the value is a raw SQL snippet, injected as-is. Never use this
//!   with user-supplied values.
//! - `@params`: the value is a mapping of parameters to merge into the
//!   output, typically bindings for an `@sql` snippet.
//! - `@or` / `@(or)`: the value is a nested filter mapping whose entries
//!   are OR'd together.
//! - `@and` / `@(and)` / `@()`: as above, AND'd (useful for grouping).
//!
//! Keys starting with `#` label subsets for [`to_multipart_sql`] and are
//! skipped everywhere else. A list of filter mappings flattens into one
//! combined filter, skipping null and empty elements.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::{Result, SqlError};
use crate::filter::{CompareOp, FilterExpr, ParamNamer, Params};

/// Parse a shorthand value into a single [`FilterExpr`].
///
/// `null` and empty mappings become a filter that accepts everything;
/// booleans become fixed filters; strings become raw SQL.
pub fn create(filters: &Value) -> Result<FilterExpr> {
    let mut parsed = parse_value(filters)?;
    match parsed.len() {
        0 => Ok(FilterExpr::Fixed(true)),
        1 => Ok(parsed.remove(0)),
        _ => Ok(FilterExpr::And(parsed)),
    }
}

/// Parse and render in one step.
pub fn to_sql(filters: &Value) -> Result<(Option<String>, Params)> {
    create(filters)?.to_sql()
}

/// Parse and match in one step.
pub fn matches(record: &Map<String, Value>, filters: &Value) -> Result<bool> {
    create(filters)?.matches(record)
}

/// Extended [`to_sql`] splitting out `#`-labeled subsets.
///
/// Returns one SQL fragment per subset, keyed by the `#` label, plus the
/// combined parameters for all of them. Entries without a label render
/// under the empty string key, which is always present.
pub fn to_multipart_sql(
    filters: &Map<String, Value>,
) -> Result<(HashMap<String, Option<String>>, Params)> {
    let mut base = Map::new();
    let mut subsets = Vec::new();
    for (key, value) in filters {
        if key.starts_with('#') {
            subsets.push((key.clone(), value));
        } else {
            base.insert(key.clone(), value.clone());
        }
    }
    let mut snippets = HashMap::new();
    let mut params = Params::new();
    // One namer across subsets keeps the merged parameter names distinct
    let mut namer = ParamNamer::new();
    let (sql, base_params) = create(&Value::Object(base))?.render(&mut namer)?;
    snippets.insert(String::new(), sql);
    params.extend(base_params);
    for (label, value) in subsets {
        let (sql, sub_params) = create(value)?.render(&mut namer)?;
        snippets.insert(label, sql);
        params.extend(sub_params);
    }
    Ok((snippets, params))
}

fn parse_value(value: &Value) -> Result<Vec<FilterExpr>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Bool(fixed) => Ok(vec![FilterExpr::Fixed(*fixed)]),
        Value::String(sql) => Ok(vec![FilterExpr::raw(sql.clone())]),
        Value::Array(elements) => {
            // A list of filter mappings flattens into one combined filter
            let mut parsed = Vec::new();
            for element in elements {
                if is_skippable(element) {
                    continue;
                }
                parsed.extend(parse_value(element)?);
            }
            Ok(parsed)
        }
        Value::Object(entries) => {
            let mut parsed = Vec::new();
            for (key, value) in entries {
                parse_entry(key, value, &mut parsed)?;
            }
            Ok(parsed)
        }
        Value::Number(_) => Err(SqlError::UnsupportedShorthand(value.clone())),
    }
}

/// Null and empty elements in a filter list carry no conditions.
fn is_skippable(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Bool(true) => false,
    }
}

fn parse_entry(key: &str, value: &Value, out: &mut Vec<FilterExpr>) -> Result<()> {
    if key.starts_with('#') {
        // Subset labels; to_multipart_sql pulls these out
        return Ok(());
    }
    let mut tokens = key.split_whitespace();
    let Some(head) = tokens.next() else {
        return Err(SqlError::UnsupportedShorthand(Value::String(key.to_string())));
    };
    if head.starts_with('@') {
        match head {
            "@sql" => {
                let sql = value
                    .as_str()
                    .ok_or_else(|| SqlError::UnsupportedShorthand(value.clone()))?;
                out.push(FilterExpr::raw(sql));
            }
            "@params" => {
                let entries = value
                    .as_object()
                    .ok_or_else(|| SqlError::UnsupportedShorthand(value.clone()))?;
                let params: Params = entries
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                out.push(FilterExpr::Params(params));
            }
            "@or" | "@(or)" => out.push(FilterExpr::Or(parse_value(value)?)),
            "@and" | "@(and)" | "@()" => out.push(FilterExpr::And(parse_value(value)?)),
            _ => return Err(SqlError::UnknownDirective(head.to_string())),
        }
        return Ok(());
    }
    // Normal column key; anything after the operator is an ignored label
    let op = match tokens.next() {
        None => CompareOp::Eq,
        Some(token) => CompareOp::from_shorthand(token)
            .ok_or_else(|| SqlError::UnknownOperator(token.to_string()))?,
    };
    out.push(FilterExpr::comparison(head, op, value.clone()));
    Ok(())
}
