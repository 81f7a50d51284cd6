//! Error types for query translation.

use serde_json::Value;
use thiserror::Error;

/// Query translation error type
#[derive(Error, Debug)]
pub enum TranslateError {
    /// A query request with an empty field list
    #[error("no fields selected")]
    NoFields,

    /// The base table alias was rejected by the name resolver
    #[error("base table '{0}' not found")]
    UnknownBaseTable(String),

    /// A field alias was rejected by the name resolver
    #[error("key '{0}' is not a recognized field name")]
    UnknownField(String),

    /// An aggregate directive that is not recognized
    #[error("unknown or unsupported aggregate function: {0}")]
    UnknownAggregate(String),

    /// A comparison operator appearing outside any field context
    #[error("conditional operation {{{key}: {value}}} must be nested underneath a field")]
    OperatorOutsideField { key: String, value: Value },

    /// A selector key that is neither an operator, a group, nor a field
    #[error("unknown or unparsable key '{0}'")]
    UnknownKey(String),

    /// A selector value of the wrong shape for its key
    #[error("invalid selector value for '{key}': {value}")]
    InvalidSelector { key: String, value: Value },

    /// A sort direction other than `asc` or `desc`
    #[error("unknown sort direction '{0}'")]
    UnknownSortDirection(String),

    /// A group clause that is neither a field name nor a list of them
    #[error("invalid value for group: {0}")]
    InvalidGroupBy(Value),

    /// An error from the SQL layer
    #[error(transparent)]
    Sql(#[from] mangrove_sql::SqlError),
}

/// Result type for translation operations
pub type Result<T> = std::result::Result<T, TranslateError>;
