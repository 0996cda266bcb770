//! Translates flat list request parameters into predicates, ordering and pagination
//!
//! Keys are either a reserved control key (`limit`, `offset`, `order_by`, `order_dir`) or
//! `column` / `column[op]`. Keys naming no real column and unknown operators are dropped.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sql_db_meta_core::{qualified_name, quote_ident};
use tracing::debug;

use crate::{
	error::{Error, Result},
	invoke::SqlExecutor,
	sql_tree::TableMetadata,
};

const RESERVED_KEYS: [&str; 4] = ["limit", "offset", "order_by", "order_dir"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
	Eq,
	Neq,
	Gt,
	Gte,
	Lt,
	Lte,
	Like,
	ILike,
	In,
	NotIn,
	IsNull,
}

impl Operator {
	pub fn parse(s: &str) -> Option<Operator> {
		use Operator::*;
		let op = match s.to_ascii_lowercase().as_str() {
			"eq" => Eq,
			"neq" | "ne" => Neq,
			"gt" => Gt,
			"gte" | "ge" => Gte,
			"lt" => Lt,
			"lte" | "le" => Lte,
			"like" => Like,
			"ilike" => ILike,
			"in" => In,
			"notin" | "nin" => NotIn,
			"isnull" => IsNull,
			_ => return None,
		};
		Some(op)
	}

	fn sql(self) -> &'static str {
		use Operator::*;
		match self {
			Eq => "=",
			Neq => "<>",
			Gt => ">",
			Gte => ">=",
			Lt => "<",
			Lte => "<=",
			Like => "LIKE",
			ILike => "ILIKE",
			In => "IN",
			NotIn => "NOT IN",
			IsNull => "IS NULL",
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterValue {
	Single(String),
	List(Vec<String>),
	/// `true` for IS NULL, `false` for IS NOT NULL
	Null(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
	pub column: String,
	/// Declared type of the column, used to cast the bound text
	pub sql_type: String,
	pub op: Operator,
	pub value: FilterValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
	Asc,
	Desc,
}

impl Default for Direction {
	fn default() -> Self {
		Direction::Asc
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ordering {
	pub column: String,
	pub direction: Direction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
	pub predicates: Vec<Predicate>,
	pub order: Option<Ordering>,
	pub limit: Option<u64>,
	pub offset: Option<u64>,
}

/// A rendered statement and its text parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundStatement {
	pub sql: String,
	pub params: Vec<Option<String>>,
}

/// Splits `status[neq]` into the column and operator; a bare key is equality
fn split_key(key: &str) -> Option<(&str, Operator)> {
	match key.strip_suffix(']').and_then(|k| k.split_once('[')) {
		Some((column, op)) => Operator::parse(op).map(|op| (column, op)),
		None if key.contains('[') => None,
		None => Some((key, Operator::Eq)),
	}
}

fn value_text(value: &Value) -> Option<String> {
	match value {
		Value::Null => None,
		Value::String(s) => Some(s.clone()),
		Value::Array(items) => Some(items.iter().filter_map(value_text).collect::<Vec<_>>().join(",")),
		other => Some(other.to_string()),
	}
}

fn non_negative(value: &Value) -> Option<u64> {
	match value {
		Value::Number(n) => n.as_u64(),
		Value::String(s) => s.trim().parse::<u64>().ok(),
		_ => None,
	}
}

/// Builds the filter spec for `table` from request parameters
pub fn translate(table: &TableMetadata, request: &Map<String, Value>) -> FilterSpec {
	let mut spec = FilterSpec::default();

	spec.limit = request.get("limit").and_then(non_negative);
	spec.offset = request.get("offset").and_then(non_negative);

	let direction = match request.get("order_dir").and_then(value_text) {
		Some(dir) if dir.eq_ignore_ascii_case("desc") => Direction::Desc,
		_ => Direction::Asc,
	};
	spec.order = request
		.get("order_by")
		.and_then(value_text)
		.filter(|column| table.has_column(column))
		.map(|column| Ordering { column, direction });

	for (key, value) in request.iter().filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str())) {
		let (column, op) = match split_key(key) {
			Some(parsed) => parsed,
			None => {
				debug!("dropping filter {} with an unknown operator", key);
				continue;
			},
		};
		let column = match table.column(column) {
			Some(column) => column,
			None => {
				debug!("dropping filter on unknown field {} of {}", key, table.key());
				continue;
			},
		};
		if let Some(value) = filter_value(op, value) {
			spec.predicates.push(Predicate {
				column: column.name.clone(),
				sql_type: column.sql_type.clone(),
				op: match value {
					FilterValue::Null(_) => Operator::IsNull,
					_ => op,
				},
				value,
			});
		}
	}
	spec
}

fn filter_value(op: Operator, value: &Value) -> Option<FilterValue> {
	match op {
		Operator::IsNull => match value_text(value)?.to_ascii_lowercase().as_str() {
			"true" => Some(FilterValue::Null(true)),
			"false" => Some(FilterValue::Null(false)),
			_ => None,
		},
		Operator::In | Operator::NotIn => {
			let values: Vec<String> = value_text(value)?
				.split(',')
				.map(str::trim)
				.filter(|v| !v.is_empty())
				.map(str::to_owned)
				.collect();
			if values.is_empty() {
				None
			} else {
				Some(FilterValue::List(values))
			}
		},
		Operator::Eq if value.is_null() => Some(FilterValue::Null(true)),
		Operator::Neq if value.is_null() => Some(FilterValue::Null(false)),
		_ => value_text(value).map(FilterValue::Single),
	}
}

/// `$n` bound as text and cast to `sql_type`, or left as text when the type is unknown
pub(crate) fn text_placeholder(n: usize, sql_type: &str) -> String {
	match sql_type.trim() {
		"" => format!("${}::text", n),
		sql_type => format!("${}::text::{}", n, sql_type),
	}
}

impl FilterSpec {
	pub fn has_predicates(&self) -> bool {
		!self.predicates.is_empty()
	}

	/// Update and delete must never run unfiltered
	pub fn require_predicates(&self) -> Result<()> {
		if self.has_predicates() {
			Ok(())
		} else {
			Err(Error::BadRequest("no filters provided".to_owned()))
		}
	}

	/// `WHERE ...` for the predicates, numbering placeholders after `params`
	fn where_clause(&self, params: &mut Vec<Option<String>>) -> String {
		if self.predicates.is_empty() {
			return String::new();
		}
		let mut placeholder = |text: &str, sql_type: &str| {
			params.push(Some(text.to_owned()));
			text_placeholder(params.len(), sql_type)
		};
		let conditions: Vec<String> = self
			.predicates
			.iter()
			.map(|p| {
				let column = quote_ident(&p.column);
				match (&p.value, p.op) {
					(FilterValue::Null(true), _) => format!("{} IS NULL", column),
					(FilterValue::Null(false), _) => format!("{} IS NOT NULL", column),
					(FilterValue::List(values), op) => {
						let list: Vec<String> = values.iter().map(|v| placeholder(v, &p.sql_type)).collect();
						format!("{} {} ({})", column, op.sql(), list.join(", "))
					},
					(FilterValue::Single(value), op @ Operator::Like) | (FilterValue::Single(value), op @ Operator::ILike) => {
						format!("{}::text {} {}", column, op.sql(), placeholder(value, "text"))
					},
					(FilterValue::Single(value), op) => format!("{} {} {}", column, op.sql(), placeholder(value, &p.sql_type)),
				}
			})
			.collect();
		format!(" WHERE {}", conditions.join(" AND "))
	}

	/// Renders a select returning each row as one JSON object
	pub fn to_select(&self, table: &TableMetadata) -> BoundStatement {
		let mut params = Vec::new();
		let mut sql = format!("SELECT to_jsonb(t) FROM {} AS t", qualified_name(&table.schema, &table.name));
		sql.push_str(&self.where_clause(&mut params));
		if let Some(order) = &self.order {
			let direction = match order.direction {
				Direction::Asc => "ASC",
				Direction::Desc => "DESC",
			};
			sql.push_str(&format!(" ORDER BY {} {}", quote_ident(&order.column), direction));
		}
		if let Some(limit) = self.limit {
			sql.push_str(&format!(" LIMIT {}", limit));
		}
		if let Some(offset) = self.offset {
			sql.push_str(&format!(" OFFSET {}", offset));
		}
		BoundStatement { sql, params }
	}

	/// Renders a delete of the matching rows; views and unfiltered requests are rejected
	pub fn to_delete(&self, table: &TableMetadata) -> Result<BoundStatement> {
		if table.is_view {
			return Err(Error::BadRequest(format!("{} is a view", table.key())));
		}
		self.require_predicates()?;
		let mut params = Vec::new();
		let mut sql = format!("DELETE FROM {}", qualified_name(&table.schema, &table.name));
		sql.push_str(&self.where_clause(&mut params));
		Ok(BoundStatement { sql, params })
	}

	pub fn fetch<E: SqlExecutor + ?Sized>(&self, table: &TableMetadata, executor: &mut E) -> Result<Vec<Value>> {
		let statement = self.to_select(table);
		executor.query_json(&statement.sql, &statement.params)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{sql_tree::ColumnMetadata, type_map::map_type};
	use serde_json::json;

	fn orders() -> TableMetadata {
		let column = |name: &str, sql_type: &str| ColumnMetadata {
			name: name.into(),
			sql_type: sql_type.into(),
			type_schema: "pg_catalog".into(),
			type_name: sql_type.into(),
			semantic: map_type(sql_type, None, true),
			nullable: true,
			is_primary_key: false,
			is_enum: false,
			foreign_key: None,
			default: None,
			comment: None,
		};
		TableMetadata {
			name: "orders".into(),
			schema: "app".into(),
			columns: vec![column("id", "integer"), column("status", "text"), column("shipped_at", "timestamp with time zone")],
			primary_key_columns: vec!["id".into()],
			is_view: false,
			comment: None,
		}
	}

	fn request(value: Value) -> Map<String, Value> {
		match value {
			Value::Object(map) => map,
			_ => Map::new(),
		}
	}

	#[test]
	fn operator_suffixes() {
		assert_eq!(split_key("status"), Some(("status", Operator::Eq)));
		assert_eq!(split_key("id[gte]"), Some(("id", Operator::Gte)));
		assert_eq!(split_key("id[between]"), None);
		assert_eq!(split_key("id[gte"), None);
	}

	#[test]
	fn negative_and_garbage_pagination_is_ignored() {
		let spec = translate(&orders(), &request(json!({"limit": -1, "offset": "ten"})));
		assert_eq!(spec.limit, None);
		assert_eq!(spec.offset, None);
	}

	#[test]
	fn order_by_must_name_a_column() {
		let spec = translate(&orders(), &request(json!({"order_by": "nope", "order_dir": "desc"})));
		assert_eq!(spec.order, None);

		let spec = translate(&orders(), &request(json!({"order_by": "id", "order_dir": "DESC"})));
		assert_eq!(spec.order.map(|o| o.direction), Some(Direction::Desc));
	}

	#[test]
	fn isnull_and_null_equality() {
		let spec = translate(&orders(), &request(json!({"shipped_at[isnull]": "false", "status": null})));
		assert_eq!(spec.predicates.len(), 2);
		assert!(spec.predicates.iter().all(|p| p.op == Operator::IsNull));
		let select = spec.to_select(&orders());
		assert!(select.sql.contains(r#""shipped_at" IS NOT NULL"#));
		assert!(select.sql.contains(r#""status" IS NULL"#));
		assert!(select.params.is_empty());
	}

	#[test]
	fn pattern_matches_compare_as_text() {
		let spec = translate(&orders(), &request(json!({"status[ilike]": "%ship%"})));
		let select = spec.to_select(&orders());
		assert_eq!(
			select.sql,
			r#"SELECT to_jsonb(t) FROM "app"."orders" AS t WHERE "status"::text ILIKE $1::text::text"#
		);
		assert_eq!(select.params, vec![Some("%ship%".to_owned())]);
	}

	#[test]
	fn unfiltered_delete_is_rejected() {
		let spec = translate(&orders(), &request(json!({"unknown": 1, "limit": 5})));
		let err = spec.to_delete(&orders()).unwrap_err();
		assert!(matches!(err, Error::BadRequest(ref m) if m == "no filters provided"));

		let spec = translate(&orders(), &request(json!({"id": 3})));
		let delete = spec.to_delete(&orders()).unwrap();
		assert_eq!(delete.sql, r#"DELETE FROM "app"."orders" WHERE "id" = $1::text::integer"#);
		assert_eq!(delete.params, vec![Some("3".to_owned())]);
	}

	#[test]
	fn empty_membership_list_is_dropped() {
		let spec = translate(&orders(), &request(json!({"status[in]": " , "})));
		assert!(!spec.has_predicates());
	}

	#[test]
	fn blank_types_are_not_cast() {
		assert_eq!(text_placeholder(2, ""), "$2::text");
		assert_eq!(text_placeholder(1, " integer "), "$1::text::integer");
	}
}
