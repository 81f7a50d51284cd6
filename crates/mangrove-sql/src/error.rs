//! Error types for the SQL layer.

use serde_json::Value;
use thiserror::Error;

use crate::filter::CompareOp;

/// SQL layer error type
#[derive(Error, Debug)]
pub enum SqlError {
    /// A shorthand key used an operator token that is not recognized
    #[error("unknown filter operator '{0}'")]
    UnknownOperator(String),

    /// A shorthand directive key (`@...`) that is not recognized
    #[error("unknown filter directive '{0}'")]
    UnknownDirective(String),

    /// A value that cannot be interpreted as a filter source
    #[error("cannot interpret as filters: {0}")]
    UnsupportedShorthand(Value),

    /// An operator was given an operand of the wrong shape
    #[error("operator {op:?} expected {expected}, got {value}")]
    InvalidOperand {
        op: CompareOp,
        expected: &'static str,
        value: Value,
    },

    /// Raw SQL and params-only filters have no record-level meaning
    #[error("{0} filters cannot be used to match records")]
    NotMatchable(&'static str),

    /// A REGEXP operand failed to compile during record matching
    #[error("invalid regex pattern '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    /// Statement rendered without a table
    #[error("cannot build incomplete {0} statement, missing table")]
    MissingTable(&'static str),

    /// INSERT/UPDATE rendered without a value mapping
    #[error("cannot build incomplete statement, missing {0} clause")]
    MissingValues(&'static str),

    /// A count render was requested for something other than a SELECT
    #[error("can only render a count for SELECT statements")]
    CountNonSelect,
}

/// Result type for SQL layer operations
pub type Result<T> = std::result::Result<T, SqlError>;
