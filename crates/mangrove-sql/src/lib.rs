//! Filter algebra and generic SQL statement builder.
//!
//! This crate is the SQL half of Mangrove. It knows nothing about the
//! Mango-style query language; it provides the pieces the translator
//! assembles:
//!
//! - [`FilterExpr`]: a closed expression tree for WHERE/HAVING conditions.
//!   Every tree renders to a parameterized SQL fragment and (for everything
//!   except raw SQL) can also be matched directly against an in-memory
//!   record.
//! - [`FilterBuilder`]: a fluent builder for nested AND/OR/NAND/NOR groups.
//! - [`shorthand`]: a compact mapping syntax (`{"age >": 21}`) parsed into
//!   the same expression tree.
//! - [`Statement`]: a mutable SELECT/INSERT/UPDATE/DELETE statement object
//!   with joins, unions, grouping, and several limit shapes.
//!
//! Note that the statement builder *does not* protect table or column names
//! against SQL injection; those are expected to come from trusted code (in
//! Mangrove's case, the name translation layer). Only operand *values* are
//! parameterized.

pub mod builder;
pub mod error;
pub mod filter;
pub mod shorthand;
pub mod statement;

pub use builder::{FilterBuilder, LogicalOp};
pub use error::{Result, SqlError};
pub use filter::{split_column, CompareOp, FilterExpr, ParamNamer, Params};
pub use statement::{JoinKind, Limit, SelectColumn, Statement, StatementKind, UnionKind};
