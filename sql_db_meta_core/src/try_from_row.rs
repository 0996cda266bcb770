use super::{Row, SqlError};


/// Converts from a [`postgres::Row`]. Catalog row structs get an implementation from the derive macro
///
/// [`postgres::Row`]: https://docs.rs/postgres/0.19/postgres/row/struct.Row.html
pub trait TryFromRow: Sized {
	fn from_row(row: &Row) -> Result<Self, SqlError>;
}

/// Reads the single `to_jsonb` / `row_to_json` column of a row
impl TryFromRow for serde_json::Value {
	fn from_row(row: &Row) -> Result<Self, SqlError> {
		row.try_get(0)
	}
}
