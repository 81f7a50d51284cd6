//! Fluent construction of [`FilterExpr`] trees.
//!
//! [`FilterBuilder`] accumulates comparisons into the current group and lets
//! callers open nested AND/OR/NAND/NOR subgroups. [`FilterBuilder::build`]
//! folds everything down to a single expression, collapsing trivial groups
//! along the way so the rendered SQL carries no redundant parentheses.

use serde_json::{json, Value};

use crate::filter::{CompareOp, FilterExpr, Params};
use crate::statement::Statement;

/// How the filters in a group combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    /// NOT (a AND b ...)
    Nand,
    /// NOT (a OR b ...)
    Nor,
}

#[derive(Debug)]
struct Frame {
    op: LogicalOp,
    filters: Vec<FilterExpr>,
}

impl Frame {
    fn new(op: LogicalOp) -> Self {
        Self {
            op,
            filters: Vec::new(),
        }
    }

    /// Fold the frame's filters into one expression.
    ///
    /// An empty group is a fixed true, so an empty branch under OR accepts
    /// everything rather than vanishing. A one-element AND/OR group is the
    /// element itself; a one-element NAND/NOR group is its negation.
    fn collapse(mut self) -> FilterExpr {
        match self.filters.len() {
            0 => FilterExpr::Fixed(true),
            1 => {
                let only = self.filters.remove(0);
                match self.op {
                    LogicalOp::And | LogicalOp::Or => only,
                    LogicalOp::Nand | LogicalOp::Nor => FilterExpr::Not(Box::new(only)),
                }
            }
            _ => match self.op {
                LogicalOp::And => FilterExpr::And(self.filters),
                LogicalOp::Or => FilterExpr::Or(self.filters),
                LogicalOp::Nand => FilterExpr::Not(Box::new(FilterExpr::And(self.filters))),
                LogicalOp::Nor => FilterExpr::Not(Box::new(FilterExpr::Or(self.filters))),
            },
        }
    }
}

/// Builder for nested filter groups.
///
/// ```
/// use mangrove_sql::FilterBuilder;
/// use serde_json::json;
///
/// let filter = FilterBuilder::new()
///     .eq("status", json!("open"))
///     .begin_or()
///     .gt("age", json!(21))
///     .is_empty("age")
///     .end()
///     .build();
/// let (sql, params) = filter.to_sql().unwrap();
/// assert!(sql.unwrap().starts_with("(`status` = "));
/// assert_eq!(params.len(), 3);
/// ```
#[derive(Debug)]
pub struct FilterBuilder {
    root: Frame,
    stack: Vec<Frame>,
}

impl Default for FilterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterBuilder {
    /// An empty builder whose top-level group joins with AND.
    pub fn new() -> Self {
        Self::with_op(LogicalOp::And)
    }

    /// An empty builder with an explicit top-level combinator.
    pub fn with_op(op: LogicalOp) -> Self {
        Self {
            root: Frame::new(op),
            stack: Vec::new(),
        }
    }

    fn current(&mut self) -> &mut Frame {
        self.stack.last_mut().unwrap_or(&mut self.root)
    }

    /// Add an already-built expression to the current group.
    pub fn filter(mut self, expr: FilterExpr) -> Self {
        self.current().filters.push(expr);
        self
    }

    fn compare(self, key: &str, op: CompareOp, value: Value) -> Self {
        self.filter(FilterExpr::comparison(key, op, value))
    }

    // Comparison shortcuts. Keys may be dotted (`table.column`).

    pub fn eq(self, key: &str, value: Value) -> Self {
        self.compare(key, CompareOp::Eq, value)
    }

    pub fn ne(self, key: &str, value: Value) -> Self {
        self.compare(key, CompareOp::Ne, value)
    }

    pub fn lt(self, key: &str, value: Value) -> Self {
        self.compare(key, CompareOp::Lt, value)
    }

    pub fn lte(self, key: &str, value: Value) -> Self {
        self.compare(key, CompareOp::Lte, value)
    }

    pub fn gt(self, key: &str, value: Value) -> Self {
        self.compare(key, CompareOp::Gt, value)
    }

    pub fn gte(self, key: &str, value: Value) -> Self {
        self.compare(key, CompareOp::Gte, value)
    }

    pub fn like(self, key: &str, value: Value) -> Self {
        self.compare(key, CompareOp::Like, value)
    }

    pub fn not_like(self, key: &str, value: Value) -> Self {
        self.compare(key, CompareOp::NotLike, value)
    }

    /// LIKE with `%` wildcards wrapped around the operand.
    pub fn like_in(self, key: &str, value: Value) -> Self {
        self.compare(key, CompareOp::LikeWithin, value)
    }

    pub fn not_like_in(self, key: &str, value: Value) -> Self {
        self.compare(key, CompareOp::NotLikeWithin, value)
    }

    pub fn is_in(self, key: &str, values: Value) -> Self {
        self.compare(key, CompareOp::In, values)
    }

    pub fn not_in(self, key: &str, values: Value) -> Self {
        self.compare(key, CompareOp::NotIn, values)
    }

    pub fn between(self, key: &str, low: Value, high: Value) -> Self {
        self.compare(key, CompareOp::Between, Value::Array(vec![low, high]))
    }

    pub fn regex(self, key: &str, pattern: Value) -> Self {
        self.compare(key, CompareOp::Regexp, pattern)
    }

    pub fn not_regex(self, key: &str, pattern: Value) -> Self {
        self.compare(key, CompareOp::NotRegexp, pattern)
    }

    /// NULL or empty string.
    pub fn is_empty(self, key: &str) -> Self {
        self.filter(FilterExpr::Or(vec![
            FilterExpr::comparison(key, CompareOp::Eq, Value::Null),
            FilterExpr::comparison(key, CompareOp::Eq, json!("")),
        ]))
    }

    /// Neither NULL nor empty string.
    pub fn not_empty(self, key: &str) -> Self {
        self.filter(FilterExpr::And(vec![
            FilterExpr::comparison(key, CompareOp::Ne, Value::Null),
            FilterExpr::comparison(key, CompareOp::Ne, json!("")),
        ]))
    }

    /// A raw SQL fragment with its `:name` parameters.
    pub fn sql(self, sql: impl Into<String>, params: Params) -> Self {
        self.filter(FilterExpr::raw_with_params(sql, params))
    }

    /// An `EXISTS (...)` condition over a subquery.
    ///
    /// The subquery renders along with the rest of the filter, so its
    /// parameter names stay distinct from the enclosing statement's;
    /// `params` supplies bindings for any raw placeholders the subquery
    /// references but does not bind itself.
    pub fn exists(self, subquery: &Statement, params: Option<Params>) -> Self {
        self.filter(FilterExpr::Exists {
            subquery: Box::new(subquery.clone()),
            params: params.unwrap_or_default(),
        })
    }

    // Group management

    pub fn begin_and(self) -> Self {
        self.begin(LogicalOp::And)
    }

    pub fn begin_or(self) -> Self {
        self.begin(LogicalOp::Or)
    }

    pub fn begin_nand(self) -> Self {
        self.begin(LogicalOp::Nand)
    }

    pub fn begin_nor(self) -> Self {
        self.begin(LogicalOp::Nor)
    }

    fn begin(mut self, op: LogicalOp) -> Self {
        self.stack.push(Frame::new(op));
        self
    }

    /// Close the innermost open group. A no-op at the top level.
    pub fn end(mut self) -> Self {
        if let Some(frame) = self.stack.pop() {
            let expr = frame.collapse();
            self.current().filters.push(expr);
        }
        self
    }

    /// True when at least one filter has been added at any level.
    pub fn has_filters(&self) -> bool {
        !self.root.filters.is_empty() || self.stack.iter().any(|f| !f.filters.is_empty())
    }

    /// Fold everything into one expression, closing any open groups.
    ///
    /// An entirely empty builder yields a filter that accepts everything.
    pub fn build(mut self) -> FilterExpr {
        while !self.stack.is_empty() {
            self = self.end();
        }
        self.root.collapse()
    }
}
