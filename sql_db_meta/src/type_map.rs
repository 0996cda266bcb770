//! Maps SQL type names to semantic type descriptors
//!
//! Classification ignores type modifiers, quoting and schema qualification, so
//! `character varying(20)`, `"varchar"` and `pg_catalog.varchar` all map the
//! same way. Names outside the known catalog map to [`ScalarKind::Text`].
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// The fixed set of scalar shapes a column or parameter can take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
	SmallInt,
	Integer,
	BigInt,
	Real,
	Double,
	Numeric,
	Text,
	Boolean,
	Date,
	Time,
	Timestamp,
	TimestampTz,
	Interval,
	Uuid,
	Bytes,
}

impl ScalarKind {
	pub fn is_integer(self) -> bool {
		matches!(self, ScalarKind::SmallInt | ScalarKind::Integer | ScalarKind::BigInt)
	}

	pub fn is_numeric(self) -> bool {
		self.is_integer() || matches!(self, ScalarKind::Real | ScalarKind::Double | ScalarKind::Numeric)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
	One,
	Many,
}

/// The partially known shape of a JSON payload
///
/// `fields` is empty when no sample was available; the payload is then opaque key/value data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredSchema {
	pub cardinality: Cardinality,
	pub fields: Vec<StructuredField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredField {
	pub name: String,
	pub ty: SemanticType,
}

impl StructuredSchema {
	pub fn opaque() -> Self {
		StructuredSchema {
			cardinality: Cardinality::One,
			fields: Vec::new(),
		}
	}

	pub fn is_many(&self) -> bool {
		self.cardinality == Cardinality::Many
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum SemanticType {
	Scalar(ScalarKind),
	Array(Box<SemanticType>),
	Structured(StructuredSchema),
}

impl SemanticType {
	pub fn text() -> Self {
		SemanticType::Scalar(ScalarKind::Text)
	}

	pub fn array_of(item: SemanticType) -> Self {
		SemanticType::Array(Box::new(item))
	}

	/// Whether a value of this type is produced as a list (arrays and many-structured payloads)
	pub fn is_list(&self) -> bool {
		match self {
			SemanticType::Array(_) => true,
			SemanticType::Structured(s) => s.is_many(),
			SemanticType::Scalar(_) => false,
		}
	}
}

/// Translates a SQL type name, optionally refined by a sample value, into a [`SemanticType`]
///
/// Never fails: an unknown type name is classified as text. The sample only refines the shape of
/// structured payloads, and a null sample is ignored.
pub fn map_type(raw_sql_type: &str, sample_value: Option<&Value>, nullable: bool) -> SemanticType {
	let sample = match sample_value {
		Some(Value::Null) => {
			if !nullable {
				debug!("null sample for NOT NULL type {}, ignoring it", raw_sql_type);
			}
			None
		},
		other => other,
	};
	map_normalized(&normalize(raw_sql_type), sample)
}

/// Refines an already mapped descriptor with a sample value
///
/// Used when the declared type is no longer at hand (domains are mapped through their base type).
/// Scalars are returned unchanged.
pub fn refine(semantic: &SemanticType, sample: &Value) -> SemanticType {
	match (semantic, sample) {
		(_, Value::Null) => semantic.clone(),
		(SemanticType::Structured(_), _) => SemanticType::Structured(structured_from_sample(Some(sample))),
		(SemanticType::Array(item), Value::Array(items)) => match items.first() {
			Some(first) => SemanticType::array_of(refine(item, first)),
			None => semantic.clone(),
		},
		_ => semantic.clone(),
	}
}

/// Whether `raw_sql_type` is part of the recognized catalog (arrays of known types included)
pub fn is_known_type(raw_sql_type: &str) -> bool {
	let name = normalize(raw_sql_type);
	match strip_array(&name) {
		Some(element) => is_known_type(element),
		None => is_structured(&name) || base_kind(&name).is_some(),
	}
}

fn map_normalized(name: &str, sample: Option<&Value>) -> SemanticType {
	if let Some(element) = strip_array(name) {
		let element_sample = match sample {
			Some(Value::Array(items)) => items.first(),
			_ => None,
		};
		return SemanticType::array_of(map_normalized(element, element_sample));
	}
	if is_structured(name) {
		return SemanticType::Structured(structured_from_sample(sample));
	}
	SemanticType::Scalar(base_kind(name).unwrap_or(ScalarKind::Text))
}

/// Lowercases, drops modifiers in parentheses, quotes and schema qualification, and collapses whitespace
fn normalize(raw: &str) -> String {
	let mut unmodified = String::with_capacity(raw.len());
	let mut depth = 0usize;
	for c in raw.chars() {
		match c {
			'(' => depth += 1,
			')' => depth = depth.saturating_sub(1),
			'"' => (),
			_ if depth == 0 => unmodified.extend(c.to_lowercase()),
			_ => (),
		}
	}
	let collapsed = unmodified.split_whitespace().collect::<Vec<_>>().join(" ");
	let collapsed = collapsed.replace(" []", "[]");
	match collapsed.rsplit_once('.') {
		Some((_, unqualified)) => unqualified.to_owned(),
		None => collapsed,
	}
}

/// The element type name if `name` is spelled as an array
fn strip_array(name: &str) -> Option<&str> {
	// `[]` or a sized `[3]`, one level at a time
	if let Some(open) = name.strip_suffix(']').and_then(|s| s.rfind('[')) {
		let size = &name[open + 1..name.len() - 1];
		if size.bytes().all(|b| b.is_ascii_digit()) {
			return Some(name[..open].trim_end());
		}
	}
	if let Some(element) = name.strip_suffix(" array") {
		return Some(element.trim_end());
	}
	match name.strip_prefix('_') {
		Some(element) if !element.is_empty() => Some(element),
		_ => None,
	}
}

fn is_structured(name: &str) -> bool {
	matches!(name, "json" | "jsonb")
}

fn base_kind(name: &str) -> Option<ScalarKind> {
	use ScalarKind::*;
	let kind = match name {
		"smallint" | "int2" | "smallserial" | "serial2" => SmallInt,
		"integer" | "int" | "int4" | "serial" | "serial4" => Integer,
		"bigint" | "int8" | "bigserial" | "serial8" | "oid" => BigInt,
		"real" | "float4" => Real,
		"double precision" | "float8" | "float" => Double,
		"numeric" | "decimal" | "money" => Numeric,
		"text" | "varchar" | "character varying" | "char" | "character" | "bpchar" | "name" | "citext" => Text,
		"boolean" | "bool" => Boolean,
		"date" => Date,
		"time" | "time without time zone" | "time with time zone" | "timetz" => Time,
		"timestamp" | "timestamp without time zone" => Timestamp,
		"timestamptz" | "timestamp with time zone" => TimestampTz,
		"interval" => Interval,
		"uuid" => Uuid,
		"bytea" => Bytes,
		_ => return None,
	};
	Some(kind)
}

fn structured_from_sample(sample: Option<&Value>) -> StructuredSchema {
	match sample {
		Some(Value::Array(items)) => StructuredSchema {
			cardinality: Cardinality::Many,
			fields: items.iter().find_map(Value::as_object).map(infer_fields).unwrap_or_default(),
		},
		Some(Value::Object(map)) => StructuredSchema {
			cardinality: Cardinality::One,
			fields: infer_fields(map),
		},
		_ => StructuredSchema::opaque(),
	}
}

fn infer_fields(map: &serde_json::Map<String, Value>) -> Vec<StructuredField> {
	map.iter()
		.map(|(name, value)| StructuredField {
			name: name.clone(),
			ty: infer_value(value),
		})
		.collect()
}

fn infer_value(value: &Value) -> SemanticType {
	match value {
		Value::Bool(_) => SemanticType::Scalar(ScalarKind::Boolean),
		Value::Number(n) if n.is_i64() || n.is_u64() => SemanticType::Scalar(ScalarKind::BigInt),
		Value::Number(_) => SemanticType::Scalar(ScalarKind::Double),
		Value::Null | Value::String(_) => SemanticType::text(),
		Value::Object(_) => SemanticType::Structured(structured_from_sample(Some(value))),
		Value::Array(items) => match items.first() {
			Some(Value::Object(_)) => SemanticType::Structured(structured_from_sample(Some(value))),
			Some(first) => SemanticType::array_of(infer_value(first)),
			None => SemanticType::array_of(SemanticType::text()),
		},
	}
}
