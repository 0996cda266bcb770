//! Plans and runs calls of stored functions and procedures
//!
//! A [`RoutinePlan`] carries the input shape (one field per IN/INOUT/VARIADIC parameter), the
//! output shape and whether results come back as a list. Statements are always parameterized:
//! the routine name is quoted and every value is bound as text and cast to the declared type.
use postgres::{types::ToSql, Client};
use serde::Serialize;
use serde_json::{json, Map, Value};
use sql_db_meta_core::{entity_key, qualified_name, quote_ident, TryFromRow};
use tracing::debug;

use crate::{
	cache::Snapshot,
	error::{Error, Result},
	filter::{text_placeholder, BoundStatement},
	record::{shape_name, to_sql_text, FieldSpec, RecordShape},
	signature::setof_target,
	sql_tree::{FunctionMetadata, ObjectCategory, ParameterMode},
	type_map::SemanticType,
};

/// The seam to whatever runs statements; text parameters, JSON rows
pub trait SqlExecutor {
	/// Runs a statement whose single column is a JSON object per row
	fn query_json(&mut self, sql: &str, params: &[Option<String>]) -> Result<Vec<Value>>;

	/// Runs a statement for its effect, returning the affected row count
	fn execute(&mut self, sql: &str, params: &[Option<String>]) -> Result<u64>;
}

fn as_sql_params(params: &[Option<String>]) -> Vec<&(dyn ToSql + Sync)> {
	params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

impl SqlExecutor for Client {
	fn query_json(&mut self, sql: &str, params: &[Option<String>]) -> Result<Vec<Value>> {
		self.query(sql, &as_sql_params(params))
			.map_err(|e| Error::execution(sql, e))?
			.iter()
			.map(|row| Value::from_row(row).map_err(|e| Error::execution(sql, e)))
			.collect()
	}

	fn execute(&mut self, sql: &str, params: &[Option<String>]) -> Result<u64> {
		Client::execute(self, sql, &as_sql_params(params)).map_err(|e| Error::execution(sql, e))
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutinePlan {
	pub schema: String,
	pub name: String,
	pub category: ObjectCategory,
	pub input: RecordShape,
	pub output: RecordShape,
	/// Results are always a list, even for zero or one row
	pub returns_list: bool,
	parameters: Vec<PlannedParameter>,
}

#[derive(Debug, Clone, Serialize)]
struct PlannedParameter {
	name: String,
	sql_type: String,
	mode: ParameterMode,
	has_default: bool,
}

impl RoutinePlan {
	/// `snapshot` resolves `SETOF relation` and composite return types to relation columns
	pub fn new(routine: &FunctionMetadata, snapshot: &Snapshot) -> Result<RoutinePlan> {
		if routine.object_category == ObjectCategory::Trigger {
			return Err(Error::BadRequest(format!("{} is a trigger function and cannot be invoked", routine.key())));
		}
		let input = RecordShape::new(
			shape_name(&routine.schema, &routine.name, "input"),
			routine.inputs().map(FieldSpec::from_parameter).collect(),
		);
		let output = RecordShape::new(shape_name(&routine.schema, &routine.name, "output"), output_fields(routine, snapshot));
		let parameters = routine
			.parameters
			.iter()
			.map(|p| PlannedParameter {
				name: p.name.clone(),
				sql_type: p.sql_type.clone(),
				mode: p.mode,
				has_default: p.has_default,
			})
			.collect();

		Ok(RoutinePlan {
			schema: routine.schema.clone(),
			name: routine.name.clone(),
			category: routine.object_category,
			input,
			output,
			returns_list: routine.returns_set || routine.kind.returns_rows(),
			parameters,
		})
	}

	pub fn key(&self) -> String {
		entity_key(&self.schema, &self.name)
	}

	/// Validates `args` and renders the call
	///
	/// Arguments are positional until the first omitted defaulted parameter, named after it
	pub fn statement(&self, args: &Value) -> Result<BoundStatement> {
		let args = self.input.validate(args)?;
		let is_procedure = self.category == ObjectCategory::Procedure;

		let mut params = Vec::new();
		let mut arguments = Vec::new();
		let mut named = false;
		for p in &self.parameters {
			let value = if p.mode == ParameterMode::Out {
				// procedures take a placeholder for OUT, functions leave them out
				if !is_procedure {
					continue;
				}
				"NULL".to_owned()
			} else {
				match args.get(&p.name) {
					Some(value) => {
						let ty = self.input.field(&p.name).map(|f| f.ty.clone()).unwrap_or_else(SemanticType::text);
						params.push(to_sql_text(&ty, value));
						text_placeholder(params.len(), &p.sql_type)
					},
					None if p.has_default => {
						named = true;
						continue;
					},
					None => return Err(Error::BadRequest(format!("missing required field {}", p.name))),
				}
			};
			let variadic = if p.mode == ParameterMode::Variadic { "VARIADIC " } else { "" };
			if named {
				arguments.push(format!("{}{} => {}", variadic, quote_ident(&p.name), value));
			} else {
				arguments.push(format!("{}{}", variadic, value));
			}
		}

		let call = format!("{}({})", qualified_name(&self.schema, &self.name), arguments.join(", "));
		let sql = if is_procedure {
			format!("CALL {}", call)
		} else {
			format!("SELECT row_to_json(r) FROM (SELECT * FROM {}) AS r", call)
		};
		Ok(BoundStatement { sql, params })
	}

	/// Runs the routine and shapes its result
	pub fn invoke<E: SqlExecutor + ?Sized>(&self, executor: &mut E, args: &Value) -> Result<Value> {
		let statement = self.statement(args)?;
		debug!("invoking {}: {}", self.key(), statement.sql);
		if self.category == ObjectCategory::Procedure {
			executor.execute(&statement.sql, &statement.params)?;
			return Ok(json!({
				"status": "success",
				"message": format!("procedure {} executed", self.key()),
			}));
		}
		let rows = executor.query_json(&statement.sql, &statement.params)?;
		Ok(self.shape(rows))
	}

	/// Maps result rows onto the output shape
	pub fn shape(&self, rows: Vec<Value>) -> Value {
		if self.returns_list || rows.len() > 1 {
			return Value::Array(rows.iter().map(|row| self.shape_row(row)).collect());
		}
		match rows.first() {
			Some(row) => self.shape_row(row),
			None => self.output.serialize(&Value::Null),
		}
	}

	fn shape_row(&self, row: &Value) -> Value {
		if self.output.is_single_result() {
			return match row.as_object() {
				// a composite the output shape could not resolve is reported whole
				Some(columns) if columns.len() > 1 => row.clone(),
				Some(columns) => {
					let value = columns.values().next().cloned().unwrap_or(Value::Null);
					let mut result = Map::new();
					result.insert("result".to_owned(), value);
					self.output.serialize(&Value::Object(result))
				},
				None => self.output.serialize(&json!({ "result": row })),
			};
		}
		self.output.serialize(row)
	}
}

/// `TABLE(...)` columns, then two or more OUT parameters, then a cached relation, then `result`
fn output_fields(routine: &FunctionMetadata, snapshot: &Snapshot) -> Vec<FieldSpec> {
	if !routine.return_columns.is_empty() {
		return routine.return_columns.iter().map(FieldSpec::from_return_column).collect();
	}
	let outputs: Vec<_> = routine.outputs().collect();
	if outputs.len() > 1 {
		return outputs.into_iter().map(FieldSpec::from_parameter).map(as_output).collect();
	}
	let target = setof_target(&routine.return_type).unwrap_or(&routine.return_type);
	if let Some(relation) = snapshot.relation_by_type_name(&routine.schema, target) {
		return relation.columns.iter().map(|c| FieldSpec {
			name: c.name.clone(),
			ty: c.semantic.clone(),
			sql_type: c.sql_type.clone(),
			nullable: true,
			required: false,
			default: None,
		}).collect();
	}
	match outputs.first() {
		Some(out) => vec![FieldSpec::result(&out.sql_type)],
		None => vec![FieldSpec::result(target)],
	}
}

fn as_output(mut field: FieldSpec) -> FieldSpec {
	field.required = false;
	field.default = None;
	field
}
