#![allow(dead_code)]
use std::collections::BTreeMap;

use serde_json::Value;
use sql_db_meta::{
	invoke::SqlExecutor,
	signature::{classify_kind, parse_parameters, parse_return_columns},
	sql_tree::*,
	type_map::map_type,
	Error,
	Introspector,
	Result,
};

/// An in-memory catalog
#[derive(Debug, Clone, Default)]
pub struct FakeCatalog {
	pub schemas: Vec<String>,
	pub tables: BTreeMap<String, Vec<TableMetadata>>,
	pub enums: BTreeMap<String, Vec<EnumInfo>>,
	pub functions: BTreeMap<String, Vec<FunctionMetadata>>,
	pub samples: BTreeMap<String, Value>,
	/// Schemas whose relation listing fails with a per-entity error
	pub broken_schemas: Vec<String>,
	/// Drop the connection when routines are read
	pub lose_connection_on_routines: bool,
	pub calls: Vec<String>,
}

impl FakeCatalog {
	pub fn with_schemas(schemas: &[&str]) -> FakeCatalog {
		FakeCatalog {
			schemas: schemas.iter().map(|s| s.to_string()).collect(),
			..FakeCatalog::default()
		}
	}

	pub fn add_table(&mut self, table: TableMetadata) {
		self.tables.entry(table.schema.clone()).or_default().push(table);
	}

	pub fn add_enum(&mut self, schema: &str, name: &str, values: &[&str]) {
		self.enums.entry(schema.to_owned()).or_default().push(EnumInfo {
			name: name.into(),
			schema: schema.into(),
			values: values.iter().map(|v| v.to_string()).collect(),
		});
	}

	pub fn add_function(&mut self, f: FunctionMetadata) {
		self.functions.entry(f.schema.clone()).or_default().push(f);
	}
}

impl Introspector for FakeCatalog {
	fn get_schemas(&mut self) -> Result<Vec<String>> {
		self.calls.push("schemas".into());
		Ok(self.schemas.clone())
	}

	fn get_tables(&mut self, schema: &str) -> Result<Vec<TableMetadata>> {
		self.calls.push(format!("tables {}", schema));
		if self.broken_schemas.iter().any(|s| s == schema) {
			return Err(Error::Catalog {
				entity: format!("relations of {}", schema),
				source: "permission denied".into(),
			});
		}
		Ok(self.tables.get(schema).cloned().unwrap_or_default())
	}

	fn get_enums(&mut self, schema: &str) -> Result<BTreeMap<String, EnumInfo>> {
		self.calls.push(format!("enums {}", schema));
		Ok(self
			.enums
			.get(schema)
			.into_iter()
			.flatten()
			.map(|e| (e.name.clone(), e.clone()))
			.collect())
	}

	fn get_functions(&mut self, schema: &str) -> Result<Vec<FunctionMetadata>> {
		self.calls.push(format!("functions {}", schema));
		if self.lose_connection_on_routines {
			return Err(Error::Connection("server closed the connection unexpectedly".into()));
		}
		Ok(self.functions.get(schema).cloned().unwrap_or_default())
	}

	fn sample_row(&mut self, schema: &str, name: &str) -> Result<Option<Value>> {
		Ok(self.samples.get(&format!("{}.{}", schema, name)).cloned())
	}
}

pub fn column(name: &str, sql_type: &str) -> ColumnMetadata {
	ColumnMetadata {
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
	}
}

pub fn table(schema: &str, name: &str, columns: Vec<ColumnMetadata>) -> TableMetadata {
	TableMetadata {
		name: name.into(),
		schema: schema.into(),
		primary_key_columns: columns.iter().filter(|c| c.is_primary_key).map(|c| c.name.clone()).collect(),
		columns,
		is_view: false,
		comment: None,
	}
}

pub fn routine(schema: &str, name: &str, arguments: &str, return_type: &str, category: ObjectCategory) -> FunctionMetadata {
	let returns_set = return_type.starts_with("TABLE") || return_type.starts_with("SETOF");
	FunctionMetadata {
		name: name.into(),
		schema: schema.into(),
		kind: classify_kind(return_type, returns_set, "f"),
		object_category: category,
		arguments: arguments.into(),
		parameters: parse_parameters(arguments),
		return_type: return_type.into(),
		return_columns: parse_return_columns(return_type),
		is_strict: false,
		volatility: Volatility::Volatile,
		security_definer: false,
		returns_set,
		description: None,
		trigger_events: None,
		triggers: Vec::new(),
	}
}

/// Records statements and answers with canned rows
#[derive(Debug, Default)]
pub struct FakeExecutor {
	pub rows: Vec<Value>,
	pub statements: Vec<(String, Vec<Option<String>>)>,
}

impl SqlExecutor for FakeExecutor {
	fn query_json(&mut self, sql: &str, params: &[Option<String>]) -> Result<Vec<Value>> {
		self.statements.push((sql.to_owned(), params.to_vec()));
		Ok(self.rows.clone())
	}

	fn execute(&mut self, sql: &str, params: &[Option<String>]) -> Result<u64> {
		self.statements.push((sql.to_owned(), params.to_vec()));
		Ok(0)
	}
}
