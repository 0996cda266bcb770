#![forbid(unsafe_code)]
//! Helper types and functions shared by the sql_db_meta introspector
//!
//! Provides the [`TryFromRow`] trait which converts from a [`postgres::Row`]. It is implemented for single JSON column rows
//! and a derive macro is provided for catalog row structs
//!
//! Also contains identifier quoting helpers used whenever a catalog name is spliced into a statement
//!
//! Reexports [`postgres::Error`] as SqlError (the Result::Err of the return from [`TryFromRow::from_row`]) and [`postgres::Row`]
//!
//! [`postgres::Error`]: https://docs.rs/postgres/0.19/postgres/struct.Error.html
//! [`postgres::Row`]: https://docs.rs/postgres/0.19/postgres/row/struct.Row.html
//! [`TryFromRow::from_row`]: ./trait.TryFromRow.html#tymethod.from_row
//! [`TryFromRow`]: ./trait.TryFromRow.html

//reexports
pub use sql_db_meta_derive::*;
pub use postgres::types::{FromSql, ToSql};
pub use postgres::{Error as SqlError, Row};
pub use serde_json;

/// The `TryFromRow` trait and its JSON implementation
mod try_from_row;
pub use try_from_row::TryFromRow;

/// Quotes a single SQL identifier, doubling any embedded quote
///
/// ```
/// assert_eq!(sql_db_meta_core::quote_ident("users"), "\"users\"");
/// assert_eq!(sql_db_meta_core::quote_ident("we\"ird"), "\"we\"\"ird\"");
/// ```
pub fn quote_ident(ident: &str) -> String {
	format!("\"{}\"", ident.replace('"', "\"\""))
}

/// A schema qualified, quoted name like `"public"."users"`
pub fn qualified_name(schema: &str, name: &str) -> String {
	format!("{}.{}", quote_ident(schema), quote_ident(name))
}

/// The `schema.name` key every catalog entity is stored under
pub fn entity_key(schema: &str, name: &str) -> String {
	format!("{}.{}", schema, name)
}
