//! Reads the live catalog into the [`sql_tree`](crate::sql_tree) model
use std::collections::BTreeMap;

use postgres::{Client, NoTls, Statement};
use serde_json::Value;
use sql_db_meta_core::*;
use tracing::warn;

use crate::{
	error::{skip_non_fatal, Error, Result},
	pg_select_types::*,
	signature::{classify_kind, parse_parameters, parse_return_columns, parse_trigger_bindings},
	sql_tree::*,
	type_map::map_type,
};

/// The catalog operations the metadata cache is built from
///
/// Only a lost connection makes these fail outright. A single table or routine that cannot be read
/// is logged and left out of the result.
pub trait Introspector {
	/// Every user schema
	fn get_schemas(&mut self) -> Result<Vec<String>>;

	/// Tables and views of a schema, told apart by [`TableMetadata::is_view`]
	fn get_tables(&mut self, schema: &str) -> Result<Vec<TableMetadata>>;

	/// Enumerated types of a schema keyed by bare name
	fn get_enums(&mut self, schema: &str) -> Result<BTreeMap<String, EnumInfo>>;

	/// Functions, procedures and trigger functions of a schema
	fn get_functions(&mut self, schema: &str) -> Result<Vec<FunctionMetadata>>;

	/// One row of a table or view as a JSON object
	fn sample_row(&mut self, schema: &str, name: &str) -> Result<Option<Value>>;
}

/// [`Introspector`] over a postgres connection with every catalog query prepared up front
pub struct PgIntrospector {
	client: Client,
	schemas_stmt: Statement,
	relations_stmt: Statement,
	columns_stmt: Statement,
	enums_stmt: Statement,
	functions_stmt: Statement,
}

impl PgIntrospector {
	/// Prepares the catalog queries; a broken query is a catalog error, a dropped client a connection error
	pub fn new(mut client: Client) -> Result<PgIntrospector> {
		let mut prepare = |query: &str| client.prepare(query).map_err(|e| Error::catalog("prepare", e));
		let schemas_stmt = prepare(GET_SCHEMAS)?;
		let relations_stmt = prepare(GET_RELATIONS)?;
		let columns_stmt = prepare(GET_COLUMNS)?;
		let enums_stmt = prepare(GET_ENUMS)?;
		let functions_stmt = prepare(GET_FUNCTIONS)?;
		Ok(PgIntrospector {
			client,
			schemas_stmt,
			relations_stmt,
			columns_stmt,
			enums_stmt,
			functions_stmt,
		})
	}

	pub fn connect(conn_string: &str) -> Result<PgIntrospector> {
		let client = Client::connect(conn_string, NoTls).map_err(|e| Error::Connection(Box::new(e)))?;
		PgIntrospector::new(client)
	}

	/// The underlying client, for executing routines and filtered selects
	pub fn client_mut(&mut self) -> &mut Client {
		&mut self.client
	}

	pub fn into_client(self) -> Client {
		self.client
	}

	fn table_from_relation(&mut self, schema: &str, relation: GetRelations) -> Result<TableMetadata> {
		let entity = entity_key(schema, &relation.name);
		let columns: Vec<ColumnMetadata> = self
			.get_columns(relation.oid)
			.map_err(|e| Error::catalog(entity, e))?
			.into_iter()
			.map(column_from_row)
			.collect();
		let primary_key_columns = columns.iter().filter(|c| c.is_primary_key).map(|c| c.name.clone()).collect();

		Ok(TableMetadata {
			name: relation.name,
			schema: schema.to_owned(),
			columns,
			primary_key_columns,
			is_view: relation.is_view,
			comment: relation.comment,
		})
	}
}

impl Introspector for PgIntrospector {
	fn get_schemas(&mut self) -> Result<Vec<String>> {
		let schemas = self.query_schemas().map_err(|e| Error::catalog("schemas", e))?;
		Ok(schemas.into_iter().map(|s| s.name).collect())
	}

	fn get_tables(&mut self, schema: &str) -> Result<Vec<TableMetadata>> {
		let relations = self
			.get_relations(schema)
			.map_err(|e| Error::catalog(format!("relations of {}", schema), e))?;

		let mut tables = Vec::with_capacity(relations.len());
		for relation in relations {
			let entity = entity_key(schema, &relation.name);
			let table = self.table_from_relation(schema, relation);
			if let Some(table) = skip_non_fatal(&entity, table)? {
				tables.push(table);
			}
		}
		Ok(tables)
	}

	fn get_enums(&mut self, schema: &str) -> Result<BTreeMap<String, EnumInfo>> {
		let enums = self
			.query_enums(schema)
			.map_err(|e| Error::catalog(format!("enums of {}", schema), e))?;
		Ok(enums
			.into_iter()
			.map(|e| {
				let info = EnumInfo {
					name: e.name.clone(),
					schema: schema.to_owned(),
					values: e.labels,
				};
				(e.name, info)
			})
			.collect())
	}

	fn get_functions(&mut self, schema: &str) -> Result<Vec<FunctionMetadata>> {
		let rows = self
			.client
			.query(&self.functions_stmt, &[&schema])
			.map_err(|e| Error::catalog(format!("routines of {}", schema), e))?;

		Ok(rows
			.iter()
			.filter_map(|row| match GetFunctions::from_row(row) {
				Ok(f) => Some(function_from_row(schema, f)),
				Err(e) => {
					warn!("skipping unreadable routine row in {}: {}", schema, e);
					None
				},
			})
			.collect())
	}

	fn sample_row(&mut self, schema: &str, name: &str) -> Result<Option<Value>> {
		let query = format!("SELECT to_jsonb(t) FROM {} AS t LIMIT 1", qualified_name(schema, name));
		let row = self
			.client
			.query_opt(query.as_str(), &[])
			.map_err(|e| Error::catalog(entity_key(schema, name), e))?;
		row.as_ref()
			.map(Value::from_row)
			.transpose()
			.map_err(|e| Error::catalog(entity_key(schema, name), e))
	}
}

/// Wrappers on SQL select statements
impl PgIntrospector {
	fn query_schemas(&mut self) -> Result<Vec<GetSchemas>, SqlError> {
		self.client
			.query(&self.schemas_stmt, &[])?
			.iter()
			.map(TryFromRow::from_row)
			.collect()
	}
	fn get_relations(&mut self, schema: &str) -> Result<Vec<GetRelations>, SqlError> {
		self.client
			.query(&self.relations_stmt, &[&schema])?
			.iter()
			.map(TryFromRow::from_row)
			.collect()
	}
	fn get_columns(&mut self, class_id: u32) -> Result<Vec<GetColumns>, SqlError> {
		self.client
			.query(&self.columns_stmt, &[&class_id])?
			.iter()
			.map(TryFromRow::from_row)
			.collect()
	}
	fn query_enums(&mut self, schema: &str) -> Result<Vec<GetEnums>, SqlError> {
		self.client
			.query(&self.enums_stmt, &[&schema])?
			.iter()
			.map(TryFromRow::from_row)
			.collect()
	}
}

/// Domains are classified through their base type
pub(crate) fn column_from_row(row: GetColumns) -> ColumnMetadata {
	let semantic = map_type(row.domain_base.as_deref().unwrap_or(&row.sql_type), None, row.nullable);
	let foreign_key = match (row.fk_schema, row.fk_table, row.fk_column) {
		(Some(schema), Some(table), Some(column)) => Some(ColumnReference { schema, table, column }),
		_ => None,
	};
	ColumnMetadata {
		name: row.name,
		sql_type: row.sql_type,
		type_schema: row.type_schema,
		type_name: row.type_name,
		semantic,
		nullable: row.nullable,
		is_primary_key: row.is_primary_key,
		is_enum: row.is_enum,
		foreign_key,
		default: row.default_value,
		comment: row.comment,
	}
}

pub(crate) fn function_from_row(schema: &str, row: GetFunctions) -> FunctionMetadata {
	let object_category = ObjectCategory::parse(&row.object_type).unwrap_or_else(|| {
		warn!("unknown object type {} for {}.{}, treating it as a function", row.object_type, schema, row.name);
		ObjectCategory::Function
	});
	let triggers = row.trigger_events.as_deref().map(parse_trigger_bindings).unwrap_or_default();

	FunctionMetadata {
		kind: classify_kind(&row.return_type, row.returns_set, &row.prokind),
		parameters: parse_parameters(&row.arguments),
		return_columns: parse_return_columns(&row.return_type),
		name: row.name,
		schema: schema.to_owned(),
		object_category,
		arguments: row.arguments,
		return_type: row.return_type,
		is_strict: row.is_strict,
		volatility: Volatility::from_code(&row.volatility),
		security_definer: row.security_definer,
		returns_set: row.returns_set,
		description: row.description,
		trigger_events: row.trigger_events,
		triggers,
	}
}
