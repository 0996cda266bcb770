//! Data driven record shapes for tables, views and routine inputs/outputs
//!
//! One [`RecordShape`] is built per entity when it is needed. `validate` checks an incoming
//! payload against it and `serialize` turns a fetched JSON row into the declared output.
use heck::CamelCase;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
	error::{Error, Result},
	sql_tree::{FunctionParameter, ReturnColumn, TableMetadata},
	type_map::{map_type, ScalarKind, SemanticType},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
	pub name: String,
	pub ty: SemanticType,
	/// Declared SQL type, used for placeholder casts
	pub sql_type: String,
	pub nullable: bool,
	/// Must be present in a payload
	pub required: bool,
	/// Default expression, left for the database to evaluate
	pub default: Option<String>,
}

impl FieldSpec {
	pub fn from_parameter(p: &FunctionParameter) -> FieldSpec {
		FieldSpec {
			name: p.name.clone(),
			ty: p.semantic(),
			sql_type: p.sql_type.clone(),
			nullable: true,
			required: !p.has_default,
			default: p.default_value.clone(),
		}
	}

	pub fn from_return_column(c: &ReturnColumn) -> FieldSpec {
		FieldSpec {
			name: c.name.clone(),
			ty: map_type(&c.sql_type, None, true),
			sql_type: c.sql_type.clone(),
			nullable: true,
			required: false,
			default: None,
		}
	}

	/// The synthetic `result` field of routines returning a single value
	pub fn result(sql_type: &str) -> FieldSpec {
		FieldSpec {
			name: "result".to_owned(),
			ty: map_type(sql_type, None, true),
			sql_type: sql_type.to_owned(),
			nullable: true,
			required: false,
			default: None,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordShape {
	pub name: String,
	pub fields: Vec<FieldSpec>,
}

/// `("public", "users", "")` → `PublicUsers`, `("public", "add_user", "input")` → `PublicAddUserInput`
pub fn shape_name(schema: &str, name: &str, suffix: &str) -> String {
	let mut raw = format!("{}_{}", schema, name);
	if !suffix.is_empty() {
		raw.push('_');
		raw.push_str(suffix);
	}
	raw.to_camel_case()
}

impl RecordShape {
	pub fn new(name: String, fields: Vec<FieldSpec>) -> RecordShape {
		RecordShape { name, fields }
	}

	/// A column is required when it is NOT NULL and has no default
	pub fn for_table(table: &TableMetadata) -> RecordShape {
		let fields = table
			.columns
			.iter()
			.map(|c| FieldSpec {
				name: c.name.clone(),
				ty: c.semantic.clone(),
				sql_type: c.sql_type.clone(),
				nullable: c.nullable,
				required: !c.nullable && c.default.is_none(),
				default: c.default.clone(),
			})
			.collect();
		RecordShape::new(shape_name(&table.schema, &table.name, ""), fields)
	}

	pub fn field(&self, name: &str) -> Option<&FieldSpec> {
		self.fields.iter().find(|f| f.name == name)
	}

	/// Whether the shape is the single synthetic `result` field
	pub fn is_single_result(&self) -> bool {
		self.fields.len() == 1 && self.fields[0].name == "result"
	}

	/// Checks a payload against the shape and coerces string encoded values
	///
	/// Absent optional fields stay absent so the database applies its defaults
	pub fn validate(&self, payload: &Value) -> Result<Map<String, Value>> {
		let object = match payload {
			Value::Object(object) => object,
			Value::Null => return self.validate(&Value::Object(Map::new())),
			_ => return Err(Error::BadRequest(format!("{} expects a JSON object", self.name))),
		};
		if let Some(unknown) = object.keys().find(|k| self.field(k).is_none()) {
			return Err(Error::BadRequest(format!("unknown field {}", unknown)));
		}

		let mut validated = Map::new();
		for field in &self.fields {
			match object.get(&field.name) {
				None if field.required => {
					return Err(Error::BadRequest(format!("missing required field {}", field.name)))
				},
				None => (),
				Some(Value::Null) if !field.nullable => {
					return Err(Error::BadRequest(format!("field {} may not be null", field.name)))
				},
				Some(value) => {
					let coerced = coerce(&field.ty, value)
						.ok_or_else(|| Error::BadRequest(format!("invalid value for field {}: {}", field.name, value)))?;
					validated.insert(field.name.clone(), coerced);
				},
			}
		}
		Ok(validated)
	}

	/// Shapes a fetched row: declared fields only, missing ones as null
	pub fn serialize(&self, row: &Value) -> Value {
		let object = row.as_object();
		let shaped = self
			.fields
			.iter()
			.map(|field| {
				let value = object.and_then(|o| o.get(&field.name)).unwrap_or(&Value::Null);
				(field.name.clone(), shape_value(&field.ty, value))
			})
			.collect();
		Value::Object(shaped)
	}
}

fn coerce(ty: &SemanticType, value: &Value) -> Option<Value> {
	if value.is_null() {
		return Some(Value::Null);
	}
	match ty {
		SemanticType::Structured(_) => Some(value.clone()),
		SemanticType::Array(item) => match value {
			Value::Array(items) => items.iter().map(|v| coerce(item, v)).collect::<Option<Vec<_>>>().map(Value::Array),
			Value::String(s) if s.starts_with('{') => Some(value_from_array_literal(item, s)),
			_ => None,
		},
		SemanticType::Scalar(kind) => coerce_scalar(*kind, value),
	}
}

fn coerce_scalar(kind: ScalarKind, value: &Value) -> Option<Value> {
	match (kind, value) {
		(k, Value::Number(n)) if k.is_integer() => n.as_i64().map(Value::from),
		(k, Value::String(s)) if k.is_integer() => s.trim().parse::<i64>().ok().map(Value::from),
		(k, Value::Number(_)) if k.is_numeric() => Some(value.clone()),
		// numeric keeps its text so no precision is lost
		(ScalarKind::Numeric, Value::String(s)) => s.trim().parse::<f64>().ok().map(|_| value.clone()),
		(k, Value::String(s)) if k.is_numeric() => s.trim().parse::<f64>().ok().map(Value::from),
		(ScalarKind::Boolean, Value::Bool(_)) => Some(value.clone()),
		(ScalarKind::Boolean, Value::String(s)) => match s.to_ascii_lowercase().as_str() {
			"true" | "t" | "1" => Some(Value::Bool(true)),
			"false" | "f" | "0" => Some(Value::Bool(false)),
			_ => None,
		},
		(ScalarKind::Text, Value::Number(_)) | (ScalarKind::Text, Value::Bool(_)) => Some(Value::String(value.to_string())),
		(_, Value::String(_)) => Some(value.clone()),
		_ => None,
	}
}

fn shape_value(ty: &SemanticType, value: &Value) -> Value {
	match (ty, value) {
		(SemanticType::Array(item), Value::String(s)) if s.starts_with('{') => value_from_array_literal(item, s),
		(SemanticType::Array(item), Value::Array(items)) => Value::Array(items.iter().map(|v| shape_value(item, v)).collect()),
		_ => value.clone(),
	}
}

fn value_from_array_literal(item: &SemanticType, literal: &str) -> Value {
	Value::Array(
		split_array_literal(literal)
			.into_iter()
			.map(|element| match element {
				None => Value::Null,
				Some(text) => match item {
					SemanticType::Scalar(kind) => coerce_scalar(*kind, &Value::String(text.clone())).unwrap_or(Value::String(text)),
					// elements of a literal are text, so structured ones are JSON source
					SemanticType::Structured(_) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
					_ => shape_value(item, &Value::String(text)),
				},
			})
			.collect(),
	)
}

/// Splits a one dimensional array literal like `{a,"b c",NULL}`
pub fn split_array_literal(literal: &str) -> Vec<Option<String>> {
	let inner = literal.trim();
	let inner = inner.strip_prefix('{').and_then(|s| s.strip_suffix('}')).unwrap_or(inner);
	if inner.is_empty() {
		return Vec::new();
	}

	let mut elements = Vec::new();
	let mut current = String::new();
	let mut quoted = false;
	let mut was_quoted = false;
	let mut chars = inner.chars();
	while let Some(c) = chars.next() {
		match c {
			'\\' if quoted => {
				if let Some(escaped) = chars.next() {
					current.push(escaped);
				}
			},
			'"' => {
				quoted = !quoted;
				was_quoted = true;
			},
			',' if !quoted => {
				elements.push(finish_element(&mut current, was_quoted));
				was_quoted = false;
			},
			_ => current.push(c),
		}
	}
	elements.push(finish_element(&mut current, was_quoted));
	elements
}

fn finish_element(current: &mut String, was_quoted: bool) -> Option<String> {
	let element = std::mem::take(current);
	if !was_quoted && element.trim().eq_ignore_ascii_case("null") {
		None
	} else if was_quoted {
		Some(element)
	} else {
		Some(element.trim().to_owned())
	}
}

/// Text form of a JSON value for a `$n::text::<type>` placeholder, `None` is SQL NULL
pub fn to_sql_text(ty: &SemanticType, value: &Value) -> Option<String> {
	match (ty, value) {
		(_, Value::Null) => None,
		(SemanticType::Structured(_), _) => Some(value.to_string()),
		(_, Value::String(s)) => Some(s.clone()),
		(SemanticType::Array(item), Value::Array(items)) => {
			let elements: Vec<String> = items
				.iter()
				.map(|v| match to_sql_text(item, v) {
					None => "NULL".to_owned(),
					Some(text) => format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\"")),
				})
				.collect();
			Some(format!("{{{}}}", elements.join(",")))
		},
		_ => Some(value.to_string()),
	}
}
