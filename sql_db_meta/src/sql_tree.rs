//! A simple model of the introspected parts of a PostgreSQL database
//!
//! Every entity is keyed by `schema.name`. Tables and views share [`TableMetadata`]
//! and are told apart by `is_view`; functions, procedures and triggers share
//! [`FunctionMetadata`] and are told apart by `object_category`.
use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};
use sql_db_meta_core::entity_key;

use crate::type_map::SemanticType;

/// Target of a foreign key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnReference {
	pub schema: String,
	pub table: String,
	pub column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
	pub name: String,
	/// The type as the catalog formats it, e.g. `character varying(20)`
	pub sql_type: String,
	/// Schema of the column's underlying type
	pub type_schema: String,
	/// Bare name of the column's underlying type
	pub type_name: String,
	pub semantic: SemanticType,
	pub nullable: bool,
	pub is_primary_key: bool,
	pub is_enum: bool,
	pub foreign_key: Option<ColumnReference>,
	pub default: Option<String>,
	pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
	pub name: String,
	pub schema: String,
	pub columns: Vec<ColumnMetadata>,
	pub primary_key_columns: Vec<String>,
	pub is_view: bool,
	pub comment: Option<String>,
}

impl TableMetadata {
	pub fn key(&self) -> String {
		entity_key(&self.schema, &self.name)
	}

	pub fn column(&self, name: &str) -> Option<&ColumnMetadata> {
		self.columns.iter().find(|c| c.name == name)
	}

	pub fn has_column(&self, name: &str) -> bool {
		self.column(name).is_some()
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumInfo {
	pub name: String,
	pub schema: String,
	/// Labels in catalog declaration order
	pub values: Vec<String>,
}

impl EnumInfo {
	pub fn key(&self) -> String {
		entity_key(&self.schema, &self.name)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParameterMode {
	In,
	Out,
	InOut,
	Variadic,
}

impl Default for ParameterMode {
	fn default() -> Self {
		ParameterMode::In
	}
}

impl ParameterMode {
	pub fn parse(token: &str) -> Option<Self> {
		match token.to_uppercase().as_str() {
			"IN" => Some(ParameterMode::In),
			"OUT" => Some(ParameterMode::Out),
			"INOUT" => Some(ParameterMode::InOut),
			"VARIADIC" => Some(ParameterMode::Variadic),
			_ => None,
		}
	}

	/// Whether the caller supplies a value for a parameter in this mode
	pub fn is_input(self) -> bool {
		self != ParameterMode::Out
	}

	/// Whether the routine reports a value back through a parameter in this mode
	pub fn is_output(self) -> bool {
		matches!(self, ParameterMode::Out | ParameterMode::InOut)
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionParameter {
	pub name: String,
	/// Declared type, e.g. `integer` or `text[]`
	#[serde(rename = "type")]
	pub sql_type: String,
	pub mode: ParameterMode,
	pub has_default: bool,
	/// The default expression exactly as the catalog prints it
	pub default_value: Option<String>,
}

impl FunctionParameter {
	pub fn semantic(&self) -> SemanticType {
		crate::type_map::map_type(&self.sql_type, None, true)
	}
}

/// A named, typed output column of a `TABLE(...)` return grammar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnColumn {
	pub name: String,
	#[serde(rename = "type")]
	pub sql_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKind {
	Scalar,
	Table,
	SetReturning,
	Aggregate,
	Window,
}

impl FunctionKind {
	pub fn returns_rows(self) -> bool {
		matches!(self, FunctionKind::Table | FunctionKind::SetReturning)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectCategory {
	Function,
	Procedure,
	Trigger,
}

impl ObjectCategory {
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"function" => Some(ObjectCategory::Function),
			"procedure" => Some(ObjectCategory::Procedure),
			"trigger" => Some(ObjectCategory::Trigger),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Volatility {
	Immutable,
	Stable,
	Volatile,
}

impl Volatility {
	/// Reads `pg_proc.provolatile`
	pub fn from_code(code: &str) -> Self {
		match code {
			"i" => Volatility::Immutable,
			"s" => Volatility::Stable,
			_ => Volatility::Volatile,
		}
	}
}

impl Default for Volatility {
	fn default() -> Self {
		Volatility::Volatile
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerTiming {
	#[serde(rename = "BEFORE")]
	Before,
	#[serde(rename = "AFTER")]
	After,
	#[serde(rename = "INSTEAD OF")]
	InsteadOf,
}

impl fmt::Display for TriggerTiming {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			TriggerTiming::Before => "BEFORE",
			TriggerTiming::After => "AFTER",
			TriggerTiming::InsteadOf => "INSTEAD OF",
		})
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerEvent {
	Insert,
	Update,
	Delete,
	Truncate,
}

impl TriggerEvent {
	pub fn parse(token: &str) -> Option<Self> {
		match token.to_uppercase().as_str() {
			"INSERT" => Some(TriggerEvent::Insert),
			"UPDATE" => Some(TriggerEvent::Update),
			"DELETE" => Some(TriggerEvent::Delete),
			"TRUNCATE" => Some(TriggerEvent::Truncate),
			_ => None,
		}
	}
}

/// One trigger that fires a trigger routine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerBinding {
	pub timing: TriggerTiming,
	pub events: BTreeSet<TriggerEvent>,
	pub table_schema: String,
	pub table_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionMetadata {
	pub name: String,
	pub schema: String,
	pub kind: FunctionKind,
	pub object_category: ObjectCategory,
	/// The argument list exactly as the catalog prints it
	pub arguments: String,
	pub parameters: Vec<FunctionParameter>,
	pub return_type: String,
	/// Non-empty only for `TABLE(...)` return grammars
	pub return_columns: Vec<ReturnColumn>,
	pub is_strict: bool,
	pub volatility: Volatility,
	pub security_definer: bool,
	pub returns_set: bool,
	pub description: Option<String>,
	/// The aggregated `BEFORE INSERT OR UPDATE ON s.t; ...` description of the bound triggers
	pub trigger_events: Option<String>,
	pub triggers: Vec<TriggerBinding>,
}

impl FunctionMetadata {
	pub fn key(&self) -> String {
		entity_key(&self.schema, &self.name)
	}

	pub fn inputs(&self) -> impl Iterator<Item = &FunctionParameter> {
		self.parameters.iter().filter(|p| p.mode.is_input())
	}

	pub fn outputs(&self) -> impl Iterator<Item = &FunctionParameter> {
		self.parameters.iter().filter(|p| p.mode.is_output())
	}
}
