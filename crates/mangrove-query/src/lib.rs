//! Mango-inspired query language translated to SQL statements.
//!
//! This crate is the query half of Mangrove. A [`QueryRequest`] carries the
//! Mango-style selector, field list, sort, group, and limit clauses
//! documented by CouchDB's `_find` endpoint; [`translate`] turns one into a
//! [`mangrove_sql::Statement`] against a base table.
//!
//! Field and table names in a request are public aliases, never spliced
//! into SQL directly. A [`NameResolver`] maps them onto the real schema and
//! rejects the ones that do not exist, which is what makes translating
//! untrusted requests safe. The bundled [`DefaultResolver`] is an identity
//! mapping for tests and prototypes.

pub mod error;
pub mod request;
pub mod resolve;
pub mod translator;

pub use error::{Result, TranslateError};
pub use request::{FieldSpec, QueryRequest};
pub use resolve::{ColumnTranslation, DefaultResolver, JoinSpec, NameResolver, TableTranslation};
pub use translator::{translate, Translator};
