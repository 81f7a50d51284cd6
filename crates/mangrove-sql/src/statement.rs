//! Mutable SQL statement objects.
//!
//! A [`Statement`] captures the intent of a query in a machine-readable
//! shape so code can inspect and modify it before rendering. Rendering
//! produces MySQL-flavored SQL with `:name` placeholders; operand values are
//! always parameterized, table and column names never are (see the crate
//! docs for the injection caveat).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, SqlError};
use crate::filter::{FilterExpr, ParamNamer, Params};

/// Simple identifiers get backtick-quoted automatically; anything else is
/// assumed to be an expression and passed through.
static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]+(\.[a-zA-Z0-9_]+)*$").unwrap());

/// The verb of a [`Statement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    fn keyword(self) -> &'static str {
        match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT INTO",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE FROM",
        }
    }
}

/// Join flavor. Deserializes from the lowercase names used in query
/// requests (`"inner"`, `"left"`, `"right"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
}

impl JoinKind {
    pub fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
        }
    }
}

/// UNION flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnionKind {
    Distinct,
    All,
}

impl UnionKind {
    fn keyword(self) -> &'static str {
        match self {
            UnionKind::Distinct => "UNION",
            UnionKind::All => "UNION ALL",
        }
    }
}

/// The LIMIT clause, in the shapes callers actually use.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Limit {
    #[default]
    None,
    /// At most this many rows
    Count(i64),
    /// A raw SQL snippet
    Raw(String),
    /// Skip some rows, then take some
    SkipCount { skip: i64, count: i64 },
    /// Pagination shorthand; pages are 1-indexed
    Page { page: i64, count: i64 },
}

impl From<i64> for Limit {
    fn from(count: i64) -> Self {
        Limit::Count(count)
    }
}

impl From<(i64, i64)> for Limit {
    fn from((skip, count): (i64, i64)) -> Self {
        Limit::SkipCount { skip, count }
    }
}

impl From<&str> for Limit {
    fn from(raw: &str) -> Self {
        Limit::Raw(raw.to_string())
    }
}

impl From<String> for Limit {
    fn from(raw: String) -> Self {
        Limit::Raw(raw)
    }
}

/// One column (or expression) in a SELECT list.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectColumn {
    pub expr: String,
    pub alias: Option<String>,
}

impl SelectColumn {
    pub fn aliased(expr: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            alias: Some(alias.into()),
        }
    }

    fn render(&self) -> String {
        let expr = quote_ident(&self.expr);
        match &self.alias {
            Some(alias) => format!("{expr} AS `{alias}`"),
            None => expr,
        }
    }
}

impl From<&str> for SelectColumn {
    fn from(expr: &str) -> Self {
        Self {
            expr: expr.to_string(),
            alias: None,
        }
    }
}

impl From<String> for SelectColumn {
    fn from(expr: String) -> Self {
        Self { expr, alias: None }
    }
}

/// Backtick-quote dotted identifiers, leaving expressions and the literal
/// `NULL` untouched.
fn quote_ident(expr: &str) -> String {
    if expr == "NULL" || !IDENT_RE.is_match(expr) {
        return expr.to_string();
    }
    let quoted: Vec<String> = expr.split('.').map(|part| format!("`{part}`")).collect();
    quoted.join(".")
}

#[derive(Debug, Clone, PartialEq)]
struct Join {
    kind: JoinKind,
    table: String,
    condition: Option<String>,
    alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum SetValue {
    /// A raw SQL snippet such as `NOW()` or a pre-named placeholder
    Expr(String),
    /// A value bound through a generated parameter
    Param(Value),
}

/// A mutable SELECT/INSERT/UPDATE/DELETE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    kind: StatementKind,
    columns: Vec<SelectColumn>,
    table: Option<String>,
    joins: Vec<Join>,
    filters: Vec<FilterExpr>,
    having: Vec<FilterExpr>,
    values: Vec<(String, SetValue)>,
    order: Option<String>,
    group: Option<String>,
    limit: Limit,
    unions: Vec<(UnionKind, Statement)>,
}

impl Statement {
    fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            columns: vec![SelectColumn::from("*")],
            table: None,
            joins: Vec::new(),
            filters: Vec::new(),
            having: Vec::new(),
            values: Vec::new(),
            order: None,
            group: None,
            limit: Limit::None,
            unions: Vec::new(),
        }
    }

    /// Begin a SELECT of all columns. Narrow with [`Statement::columns`].
    pub fn select() -> Self {
        Self::new(StatementKind::Select)
    }

    pub fn insert(table: impl Into<String>) -> Self {
        let mut statement = Self::new(StatementKind::Insert);
        statement.table = Some(table.into());
        statement
    }

    pub fn update(table: impl Into<String>) -> Self {
        let mut statement = Self::new(StatementKind::Update);
        statement.table = Some(table.into());
        statement
    }

    pub fn delete(table: impl Into<String>) -> Self {
        let mut statement = Self::new(StatementKind::Delete);
        statement.table = Some(table.into());
        statement
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    /// Replace the SELECT column list.
    pub fn columns<I>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<SelectColumn>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Set the table (or raw FROM target, aliases included) to operate on.
    pub fn from(&mut self, table: impl Into<String>) -> &mut Self {
        self.table = Some(table.into());
        self
    }

    pub fn join(&mut self, table: impl Into<String>, on: impl Into<String>) -> &mut Self {
        self.join_with(JoinKind::Inner, table, Some(on.into()), None)
    }

    pub fn left_join(&mut self, table: impl Into<String>, on: impl Into<String>) -> &mut Self {
        self.join_with(JoinKind::Left, table, Some(on.into()), None)
    }

    pub fn right_join(&mut self, table: impl Into<String>, on: impl Into<String>) -> &mut Self {
        self.join_with(JoinKind::Right, table, Some(on.into()), None)
    }

    /// Join with full control over kind, condition, and alias.
    pub fn join_with(
        &mut self,
        kind: JoinKind,
        table: impl Into<String>,
        condition: Option<String>,
        alias: Option<String>,
    ) -> &mut Self {
        self.joins.push(Join {
            kind,
            table: table.into(),
            condition,
            alias,
        });
        self
    }

    /// Add a condition to the WHERE clause. Conditions accumulate with AND.
    pub fn and_where(&mut self, filter: FilterExpr) -> &mut Self {
        self.filters.push(filter);
        self
    }

    /// Add a raw SQL condition, optionally with the parameters it binds.
    pub fn and_where_sql(
        &mut self,
        sql: impl Into<String>,
        params: Option<Params>,
    ) -> &mut Self {
        self.filters.push(FilterExpr::raw(sql));
        if let Some(params) = params {
            self.filters.push(FilterExpr::Params(params));
        }
        self
    }

    /// Add a condition to the HAVING clause.
    pub fn and_having(&mut self, filter: FilterExpr) -> &mut Self {
        self.having.push(filter);
        self
    }

    pub fn and_having_sql(
        &mut self,
        sql: impl Into<String>,
        params: Option<Params>,
    ) -> &mut Self {
        self.having.push(FilterExpr::raw(sql));
        if let Some(params) = params {
            self.having.push(FilterExpr::Params(params));
        }
        self
    }

    /// Assign a column a raw SQL snippet in an INSERT or UPDATE.
    pub fn set(&mut self, column: impl Into<String>, expr: impl Into<String>) -> &mut Self {
        self.values.push((column.into(), SetValue::Expr(expr.into())));
        self
    }

    /// Assign a column a parameterized value in an INSERT or UPDATE.
    pub fn set_value(&mut self, column: impl Into<String>, value: Value) -> &mut Self {
        self.values.push((column.into(), SetValue::Param(value)));
        self
    }

    /// Set the raw ORDER BY clause body.
    pub fn order_by(&mut self, clause: impl Into<String>) -> &mut Self {
        self.order = Some(clause.into());
        self
    }

    /// Set the raw GROUP BY clause body.
    pub fn group_by(&mut self, clause: impl Into<String>) -> &mut Self {
        self.group = Some(clause.into());
        self
    }

    pub fn limit(&mut self, limit: impl Into<Limit>) -> &mut Self {
        self.limit = limit.into();
        self
    }

    /// Append a UNION member.
    ///
    /// ORDER BY and LIMIT belong to the whole union, so any set on the
    /// appended statement are hoisted onto this one. Union chains hanging
    /// off the appended statement are flattened in.
    pub fn union(&mut self, other: Statement) -> &mut Self {
        self.push_union(UnionKind::Distinct, other)
    }

    pub fn union_all(&mut self, other: Statement) -> &mut Self {
        self.push_union(UnionKind::All, other)
    }

    fn push_union(&mut self, kind: UnionKind, mut other: Statement) -> &mut Self {
        if other.order.is_some() {
            self.order = other.order.take();
        }
        if other.limit != Limit::None {
            self.limit = std::mem::take(&mut other.limit);
        }
        let tail = std::mem::take(&mut other.unions);
        self.unions.push((kind, other));
        self.unions.extend(tail);
        self
    }

    /// Render to SQL, appending bound parameters to `params`.
    pub fn render(&self, params: &mut Params) -> Result<String> {
        let mut namer = ParamNamer::new();
        let mut query = self.render_parts(&mut namer, params)?;
        for (kind, member) in &self.unions {
            query.push_str(kind.keyword());
            query.push(' ');
            query.push_str(&member.render_parts(&mut namer, params)?);
        }
        if matches!(self.kind, StatementKind::Select | StatementKind::Delete) {
            query.push_str(&self.render_order());
            query.push_str(&render_limit(&self.limit, params));
        }
        query.push(';');
        Ok(query)
    }

    /// Render as an embeddable fragment: no unions, ORDER BY, LIMIT, or
    /// trailing `;`. Used for subqueries such as `EXISTS (...)`.
    pub fn render_fragment(&self, params: &mut Params) -> Result<String> {
        let mut namer = ParamNamer::new();
        self.render_fragment_with(&mut namer, params)
    }

    /// Render as a fragment using the caller's namer, so embedded subqueries
    /// share one parameter namespace with the statement embedding them.
    pub(crate) fn render_fragment_with(
        &self,
        namer: &mut ParamNamer,
        params: &mut Params,
    ) -> Result<String> {
        let fragment = self.render_parts(namer, params)?;
        Ok(fragment.trim_end().to_string())
    }

    /// Render a query counting the rows this SELECT would produce without
    /// its LIMIT clause.
    ///
    /// Plain queries reuse the FROM/JOIN/WHERE clauses under a bare
    /// `COUNT(*)`; queries with unions or GROUP BY are wrapped as a
    /// subquery since their row count is not a plain table count.
    pub fn render_count(&self, params: &mut Params) -> Result<String> {
        if self.kind != StatementKind::Select {
            return Err(SqlError::CountNonSelect);
        }
        let mut namer = ParamNamer::new();
        if self.unions.is_empty() && self.group.is_none() {
            let table = self.table.as_deref().ok_or(SqlError::MissingTable("SELECT"))?;
            // Rendered into a local map so dropped clauses (the select list
            // may reference params the count does not) leave no orphans.
            let mut local = Params::new();
            let mut query = format!("SELECT COUNT(*) FROM {table} ");
            query.push_str(&self.render_joins());
            query.push_str(&self.render_filter_clause("WHERE", &self.filters, &mut namer, &mut local)?);
            query.push_str(&self.render_filter_clause("HAVING", &self.having, &mut namer, &mut local)?);
            local.retain(|name, _| param_is_used(&query, name));
            params.extend(local);
            query.push(';');
            Ok(query)
        } else {
            let mut query = self.render_count_parts(&mut namer, params)?;
            for (kind, member) in &self.unions {
                if member.kind != StatementKind::Select {
                    return Err(SqlError::CountNonSelect);
                }
                query.push_str(kind.keyword());
                query.push(' ');
                query.push_str(&member.render_count_parts(&mut namer, params)?);
            }
            Ok(format!("SELECT COUNT(*) FROM ({query}) AS for_count;"))
        }
    }

    fn render_parts(&self, namer: &mut ParamNamer, params: &mut Params) -> Result<String> {
        let mut query = self.render_main(namer, params)?;
        if self.kind == StatementKind::Select {
            query.push_str(&self.render_joins());
        }
        if self.kind != StatementKind::Insert {
            query.push_str(&self.render_filter_clause("WHERE", &self.filters, namer, params)?);
        }
        if self.kind == StatementKind::Select {
            query.push_str(&self.render_group());
            query.push_str(&self.render_filter_clause("HAVING", &self.having, namer, params)?);
        }
        Ok(query)
    }

    fn render_count_parts(&self, namer: &mut ParamNamer, params: &mut Params) -> Result<String> {
        let mut query = self.render_main(namer, params)?;
        query.push_str(&self.render_joins());
        query.push_str(&self.render_filter_clause("WHERE", &self.filters, namer, params)?);
        query.push_str(&self.render_group());
        query.push_str(&self.render_filter_clause("HAVING", &self.having, namer, params)?);
        Ok(query)
    }

    fn render_main(&self, namer: &mut ParamNamer, params: &mut Params) -> Result<String> {
        let table = self
            .table
            .as_deref()
            .ok_or(SqlError::MissingTable(self.kind.keyword()))?;
        match self.kind {
            StatementKind::Select => {
                let columns: Vec<String> = self.columns.iter().map(SelectColumn::render).collect();
                Ok(format!("SELECT {} FROM {table} ", columns.join(", ")))
            }
            StatementKind::Insert => {
                let mut query = format!("INSERT INTO {table} ");
                query.push_str(&self.render_values(namer, params)?);
                Ok(query)
            }
            StatementKind::Update => {
                let mut query = format!("UPDATE {table} ");
                query.push_str(&self.render_set(namer, params)?);
                Ok(query)
            }
            StatementKind::Delete => Ok(format!("DELETE FROM {table} ")),
        }
    }

    fn render_joins(&self) -> String {
        let mut query = String::new();
        for join in &self.joins {
            query.push_str(join.kind.keyword());
            query.push(' ');
            query.push_str(&join.table);
            query.push(' ');
            if let Some(alias) = &join.alias {
                query.push_str(&format!("AS `{alias}` "));
            }
            if let Some(condition) = &join.condition {
                query.push_str(&format!("ON {condition} "));
            }
        }
        query
    }

    fn render_values(&self, namer: &mut ParamNamer, params: &mut Params) -> Result<String> {
        if self.values.is_empty() {
            return Err(SqlError::MissingValues("VALUES"));
        }
        let mut keys = Vec::new();
        let mut values = Vec::new();
        for (column, value) in &self.values {
            keys.push(column.clone());
            values.push(self.render_set_value(column, value, namer, params));
        }
        Ok(format!(
            "({}) VALUES ({}) ",
            keys.join(", "),
            values.join(", ")
        ))
    }

    fn render_set(&self, namer: &mut ParamNamer, params: &mut Params) -> Result<String> {
        if self.values.is_empty() {
            return Err(SqlError::MissingValues("SET"));
        }
        let assignments: Vec<String> = self
            .values
            .iter()
            .map(|(column, value)| {
                format!(
                    "{column} = {}",
                    self.render_set_value(column, value, namer, params)
                )
            })
            .collect();
        Ok(format!("SET {} ", assignments.join(", ")))
    }

    fn render_set_value(
        &self,
        column: &str,
        value: &SetValue,
        namer: &mut ParamNamer,
        params: &mut Params,
    ) -> String {
        match value {
            SetValue::Expr(expr) => expr.clone(),
            SetValue::Param(value) => {
                let name = namer.name(column);
                params.insert(name.clone(), value.clone());
                format!(":{name}")
            }
        }
    }

    fn render_filter_clause(
        &self,
        keyword: &str,
        filters: &[FilterExpr],
        namer: &mut ParamNamer,
        params: &mut Params,
    ) -> Result<String> {
        let mut query = String::new();
        let mut keyword = keyword;
        for filter in filters {
            let (fragment, filter_params) = filter.render(namer)?;
            params.extend(filter_params);
            let Some(fragment) = fragment else { continue };
            if fragment.is_empty() {
                continue;
            }
            let fragment = if fragment.starts_with('(') {
                fragment
            } else {
                format!("({fragment})")
            };
            query.push_str(&format!("{keyword} {fragment} "));
            keyword = "AND";
        }
        Ok(query)
    }

    fn render_order(&self) -> String {
        match &self.order {
            Some(order) => format!("ORDER BY {order} "),
            None => String::new(),
        }
    }

    fn render_group(&self) -> String {
        match &self.group {
            Some(group) => format!("GROUP BY {group} "),
            None => String::new(),
        }
    }
}

fn render_limit(limit: &Limit, params: &mut Params) -> String {
    let (skip, count) = match limit {
        Limit::None => return String::new(),
        Limit::Raw(raw) => return format!("LIMIT {raw} "),
        Limit::Count(count) => (None, *count),
        Limit::SkipCount { skip, count } => (Some(*skip), *count),
        Limit::Page { page, count } => (Some((page - 1) * count), *count),
    };
    params.insert("limit_count".to_string(), Value::from(count));
    match skip {
        Some(skip) => {
            params.insert("limit_skip".to_string(), Value::from(skip));
            "LIMIT :limit_skip, :limit_count ".to_string()
        }
        None => "LIMIT :limit_count ".to_string(),
    }
}

/// True when `:name` appears in the query as a whole placeholder, not as a
/// prefix of a longer one.
fn param_is_used(query: &str, name: &str) -> bool {
    let needle = format!(":{name}");
    let mut search = query;
    while let Some(at) = search.find(&needle) {
        let rest = &search[at + needle.len()..];
        match rest.chars().next() {
            Some(c) if c.is_ascii_alphanumeric() || c == '_' => search = rest,
            _ => return true,
        }
    }
    false
}
