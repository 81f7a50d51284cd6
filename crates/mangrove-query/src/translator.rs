//! Translation from query requests to SQL statements.
//!
//! The translator walks a [`QueryRequest`], resolving every public field
//! name through the [`NameResolver`] and collecting the joins those fields
//! pull in along the way. The output is a [`Statement`] ready to render;
//! nothing user-supplied reaches the SQL except through the resolver (for
//! names) or bound parameters (for values).

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use mangrove_sql::{FilterBuilder, SelectColumn, Statement};

use crate::error::{Result, TranslateError};
use crate::request::{FieldSpec, QueryRequest};
use crate::resolve::{JoinSpec, NameResolver, TableTranslation};

/// Plain selector keys: a field name, optionally dotted with a table.
static FIELD_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_]+(\.[a-zA-Z_]+)?$").unwrap());

/// Translate a query request against a base table in one call.
pub fn translate<R: NameResolver>(
    resolver: &R,
    request: &QueryRequest,
    base_table: &str,
) -> Result<Statement> {
    Translator::new(resolver).translate(request, base_table)
}

/// One translation pass.
///
/// A translator accumulates the joins and tables discovered while
/// resolving fields, so each instance should translate a single request.
pub struct Translator<'a, R: NameResolver> {
    resolver: &'a R,
    joins: BTreeMap<String, JoinSpec>,
    tables: BTreeMap<String, TableTranslation>,
}

impl<'a, R: NameResolver> Translator<'a, R> {
    pub fn new(resolver: &'a R) -> Self {
        Self {
            resolver,
            joins: BTreeMap::new(),
            tables: BTreeMap::new(),
        }
    }

    /// Build a SELECT statement for the request.
    pub fn translate(&mut self, request: &QueryRequest, base_table: &str) -> Result<Statement> {
        if request.fields.is_empty() {
            return Err(TranslateError::NoFields);
        }
        debug!(base_table, fields = request.fields.len(), "translating query");
        let columns = self.selected_columns(&request.fields, base_table)?;
        let translated = self
            .resolver
            .base_table(base_table)
            .ok_or_else(|| TranslateError::UnknownBaseTable(base_table.to_string()))?;
        self.joins.extend(translated.joins.clone());
        let mut statement = Statement::select();
        statement.columns(columns);
        // Both names come from the resolver, so they are safe to splice in
        statement.from(format!("{} AS `{base_table}`", translated.table));
        self.tables.insert(translated.alias.clone(), translated);
        if let Some(selector) = nonempty(&request.selector) {
            let builder = self.selector_filters(selector, base_table)?;
            statement.and_where(builder.build());
        }
        if let Some(sort) = nonempty(&request.sort) {
            let clause = self.order_by(sort, base_table)?;
            statement.order_by(clause);
        }
        if let Some(group) = nonempty(&request.group) {
            let clause = self.group_by(group, base_table)?;
            statement.group_by(clause);
        }
        match (request.skip, request.limit) {
            (Some(skip), Some(count)) => {
                statement.limit((skip, count));
            }
            (None, Some(count)) => {
                statement.limit(count);
            }
            // A skip without a limit has nothing to bound it; ignored
            _ => {}
        }
        self.attach_joins(&mut statement, request.join);
        if let Some(filter) = self.resolver.extra_filters(&self.tables) {
            statement.and_where(filter);
        }
        Ok(statement)
    }

    fn selected_columns(
        &mut self,
        fields: &[FieldSpec],
        base_table: &str,
    ) -> Result<Vec<SelectColumn>> {
        let mut columns = Vec::new();
        for field in fields {
            match field {
                FieldSpec::Column(name) => {
                    let selector = self.find_sql_name(base_table, name)?;
                    columns.push(SelectColumn::aliased(selector, name.clone()));
                }
                FieldSpec::Aggregate(entries) => {
                    // Normally a single entry, but nothing stops more
                    for (directive, name) in entries {
                        let alias = format!("{directive}.{name}");
                        let selector = self.find_sql_name(base_table, name)?;
                        columns.push(SelectColumn::aliased(
                            aggregate_expr(directive, &selector)?,
                            alias,
                        ));
                    }
                }
            }
        }
        Ok(columns)
    }

    /// Parse a selector tree into a filter builder.
    pub fn selector_filters(
        &mut self,
        selector: &Value,
        base_table: &str,
    ) -> Result<FilterBuilder> {
        let entries = selector
            .as_object()
            .ok_or_else(|| TranslateError::InvalidSelector {
                key: "selector".to_string(),
                value: selector.clone(),
            })?;
        self.walk_selector(entries, base_table, FilterBuilder::new(), None)
    }

    fn walk_selector(
        &mut self,
        entries: &Map<String, Value>,
        base_table: &str,
        mut builder: FilterBuilder,
        field: Option<&str>,
    ) -> Result<FilterBuilder> {
        for (key, value) in entries {
            builder = self.selector_entry(key, value, base_table, builder, field)?;
        }
        Ok(builder)
    }

    fn selector_entry(
        &mut self,
        key: &str,
        value: &Value,
        base_table: &str,
        mut builder: FilterBuilder,
        field: Option<&str>,
    ) -> Result<FilterBuilder> {
        match key {
            "$and" | "$or" | "$nand" | "$nor" => {
                let members = value
                    .as_array()
                    .ok_or_else(|| invalid_selector(key, value))?;
                builder = match key {
                    "$and" => builder.begin_and(),
                    "$or" => builder.begin_or(),
                    "$nand" => builder.begin_nand(),
                    _ => builder.begin_nor(),
                };
                for member in members {
                    let entries = member
                        .as_object()
                        .ok_or_else(|| invalid_selector(key, member))?;
                    builder = self.walk_selector(entries, base_table, builder, field)?;
                }
                Ok(builder.end())
            }
            // NOT is a NAND group with a single member
            "$not" => {
                let entries = value
                    .as_object()
                    .ok_or_else(|| invalid_selector(key, value))?;
                builder = builder.begin_nand();
                builder = self.walk_selector(entries, base_table, builder, field)?;
                Ok(builder.end())
            }
            "$eq" => {
                let name = self.operand_field(key, value, base_table, field)?;
                Ok(builder.eq(&name, value.clone()))
            }
            "$ne" | "$neq" => {
                let name = self.operand_field(key, value, base_table, field)?;
                Ok(builder.ne(&name, value.clone()))
            }
            "$lt" => {
                let name = self.operand_field(key, value, base_table, field)?;
                Ok(builder.lt(&name, value.clone()))
            }
            "$lte" => {
                let name = self.operand_field(key, value, base_table, field)?;
                Ok(builder.lte(&name, value.clone()))
            }
            "$gt" => {
                let name = self.operand_field(key, value, base_table, field)?;
                Ok(builder.gt(&name, value.clone()))
            }
            "$gte" => {
                let name = self.operand_field(key, value, base_table, field)?;
                Ok(builder.gte(&name, value.clone()))
            }
            "$in" => {
                let name = self.operand_field(key, value, base_table, field)?;
                Ok(builder.is_in(&name, value.clone()))
            }
            "$not-in" => {
                let name = self.operand_field(key, value, base_table, field)?;
                Ok(builder.not_in(&name, value.clone()))
            }
            "$like" => {
                let name = self.operand_field(key, value, base_table, field)?;
                Ok(builder.like(&name, value.clone()))
            }
            "$not-like" => {
                let name = self.operand_field(key, value, base_table, field)?;
                Ok(builder.not_like(&name, value.clone()))
            }
            // Contains is a LIKE with wildcards on both sides
            "$contains" => {
                let name = self.operand_field(key, value, base_table, field)?;
                Ok(builder.like_in(&name, value.clone()))
            }
            "$not-contains" => {
                let name = self.operand_field(key, value, base_table, field)?;
                Ok(builder.not_like_in(&name, value.clone()))
            }
            "$regex" => {
                let name = self.operand_field(key, value, base_table, field)?;
                Ok(builder.regex(&name, value.clone()))
            }
            "$not-regex" => {
                let name = self.operand_field(key, value, base_table, field)?;
                Ok(builder.not_regex(&name, value.clone()))
            }
            // The operand flips the polarity: {"$empty": false} means not-empty
            "$empty" => {
                let name = self.operand_field(key, value, base_table, field)?;
                Ok(if truthy(value) {
                    builder.is_empty(&name)
                } else {
                    builder.not_empty(&name)
                })
            }
            "$not-empty" => {
                let name = self.operand_field(key, value, base_table, field)?;
                Ok(if truthy(value) {
                    builder.not_empty(&name)
                } else {
                    builder.is_empty(&name)
                })
            }
            _ if FIELD_KEY_RE.is_match(key) => {
                // Nested fields extend the dotted path: {"cvso": {"f_name": ...}}
                let nested = match field {
                    Some(field) => format!("{field}.{key}"),
                    None => key.to_string(),
                };
                match value {
                    Value::Object(entries) => {
                        self.walk_selector(entries, base_table, builder, Some(&nested))
                    }
                    Value::Array(_) => Err(invalid_selector(key, value)),
                    // Scalars are implicit equality
                    _ => {
                        let name = self.find_sql_name(base_table, &nested)?;
                        Ok(builder.eq(&name, value.clone()))
                    }
                }
            }
            _ => Err(TranslateError::UnknownKey(key.to_string())),
        }
    }

    fn operand_field(
        &mut self,
        key: &str,
        value: &Value,
        base_table: &str,
        field: Option<&str>,
    ) -> Result<String> {
        let Some(field) = field else {
            return Err(TranslateError::OperatorOutsideField {
                key: key.to_string(),
                value: value.clone(),
            });
        };
        self.find_sql_name(base_table, field)
    }

    /// Build the body of an ORDER BY clause.
    pub fn order_by(&mut self, sort: &Value, base_table: &str) -> Result<String> {
        match sort {
            Value::String(field) => self.find_sql_name(base_table, field),
            Value::Array(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| self.order_by(item, base_table))
                    .collect::<Result<_>>()?;
                Ok(parts.join(", "))
            }
            Value::Object(entries) => {
                let mut parts = Vec::new();
                for (field, direction) in entries {
                    let selector = self.find_sql_name(base_table, field)?;
                    let keyword = match direction.as_str() {
                        Some("asc") => "ASC",
                        Some("desc") => "DESC",
                        _ => {
                            return Err(TranslateError::UnknownSortDirection(
                                direction.to_string(),
                            ))
                        }
                    };
                    parts.push(format!("{selector} {keyword}"));
                }
                Ok(parts.join(", "))
            }
            other => Err(TranslateError::InvalidSelector {
                key: "sort".to_string(),
                value: other.clone(),
            }),
        }
    }

    /// Build the body of a GROUP BY clause.
    pub fn group_by(&mut self, group: &Value, base_table: &str) -> Result<String> {
        match group {
            Value::String(field) => self.find_sql_name(base_table, field),
            Value::Array(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .map(|item| self.group_by(item, base_table))
                    .collect::<Result<_>>()?;
                Ok(parts.join(", "))
            }
            other => Err(TranslateError::InvalidGroupBy(other.clone())),
        }
    }

    /// Resolve a public field name, recording any joins it needs.
    fn find_sql_name(&mut self, base_table: &str, key: &str) -> Result<String> {
        let key = if key.contains('.') {
            key.to_string()
        } else {
            format!("{base_table}.{key}")
        };
        let column = self
            .resolver
            .field(&key, base_table)
            .ok_or_else(|| TranslateError::UnknownField(key.clone()))?;
        trace!(field = %key, selector = %column.selector, "resolved field");
        self.joins.extend(column.table.joins.clone());
        self.tables.insert(column.table.alias.clone(), column.table);
        Ok(column.selector)
    }

    fn attach_joins(&self, statement: &mut Statement, default_kind: mangrove_sql::JoinKind) {
        for (alias, join) in &self.joins {
            statement.join_with(
                join.kind.unwrap_or(default_kind),
                join.table.clone(),
                join.condition.clone(),
                Some(alias.clone()),
            );
        }
    }
}

fn aggregate_expr(directive: &str, selector: &str) -> Result<String> {
    Ok(match directive {
        "$value" => selector.to_string(),
        "$count" => format!("COUNT({selector})"),
        "$count-distinct" => format!("COUNT(DISTINCT {selector})"),
        "$concat" => format!("GROUP_CONCAT({selector} ORDER BY {selector} SEPARATOR ', ')"),
        "$concat-distinct" => {
            format!("GROUP_CONCAT(DISTINCT {selector} ORDER BY {selector} SEPARATOR ', ')")
        }
        "$distinct" => format!("DISTINCT {selector}"),
        "$sum" => format!("SUM({selector})"),
        "$avg" => format!("AVG({selector})"),
        "$min" => format!("MIN({selector})"),
        "$max" => format!("MAX({selector})"),
        _ => return Err(TranslateError::UnknownAggregate(directive.to_string())),
    })
}

fn invalid_selector(key: &str, value: &Value) -> TranslateError {
    TranslateError::InvalidSelector {
        key: key.to_string(),
        value: value.clone(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::Bool(true) => true,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Treat null and empty containers as absent, the way permissive request
/// encoders tend to emit them.
fn nonempty(value: &Option<Value>) -> Option<&Value> {
    value.as_ref().filter(|v| truthy(v))
}
