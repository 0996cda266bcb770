//! The metadata cache every higher layer reads from
//!
//! A build runs four stages against an [`Introspector`]: tables, enums, views, then routines.
//! The result is one immutable [`Snapshot`] that is published with a single atomic swap, so a
//! reader sees either the previous load or the new one and never a mix. A failed build leaves the
//! published snapshot untouched. Reloads are serialized; a second caller waits for the first.
use std::{
	collections::{BTreeMap, BTreeSet},
	fmt,
	sync::Arc,
};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sql_db_meta_core::entity_key;
use tracing::{debug, info};

use crate::{
	connection::Introspector,
	error::{skip_non_fatal, Error, Result},
	invoke::RoutinePlan,
	record::RecordShape,
	sql_tree::*,
	type_map::refine,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
	/// Schemas to load; empty means every user schema
	pub include_schemas: Vec<String>,
	/// `table` or `schema.table` names to leave out
	pub exclude_tables: Vec<String>,
	pub load_routines: bool,
	/// Refine structured column types from one sample row per relation
	pub sample_rows: bool,
}

impl Default for CacheConfig {
	fn default() -> Self {
		CacheConfig {
			include_schemas: Vec::new(),
			exclude_tables: Vec::new(),
			load_routines: true,
			sample_rows: true,
		}
	}
}

impl CacheConfig {
	fn is_excluded(&self, table: &TableMetadata) -> bool {
		let key = table.key();
		self.exclude_tables.iter().any(|e| *e == table.name || *e == key)
	}
}

/// Anything stored in the cache, tagged by what it is
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "metadata", rename_all = "snake_case")]
pub enum Entity {
	Table(TableMetadata),
	View(TableMetadata),
	Enum(EnumInfo),
	Function(FunctionMetadata),
	Procedure(FunctionMetadata),
	Trigger(FunctionMetadata),
}

/// Everything loaded for one schema, keyed by bare name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaMetadata {
	pub name: String,
	pub tables: BTreeMap<String, TableMetadata>,
	pub views: BTreeMap<String, TableMetadata>,
	pub enums: BTreeMap<String, EnumInfo>,
	pub functions: BTreeMap<String, FunctionMetadata>,
	pub procedures: BTreeMap<String, FunctionMetadata>,
	pub triggers: BTreeMap<String, FunctionMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaStats {
	pub schema: String,
	pub tables: usize,
	pub views: usize,
	pub enums: usize,
	pub functions: usize,
	pub procedures: usize,
	pub triggers: usize,
}

impl SchemaStats {
	fn add(&mut self, other: &SchemaStats) {
		self.tables += other.tables;
		self.views += other.views;
		self.enums += other.enums;
		self.functions += other.functions;
		self.procedures += other.procedures;
		self.triggers += other.triggers;
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
	pub schemas: Vec<SchemaStats>,
	pub total: SchemaStats,
}

impl fmt::Display for CacheStats {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(
			f,
			"{:<24} {:>7} {:>7} {:>7} {:>9} {:>10} {:>8}",
			"schema", "tables", "views", "enums", "functions", "procedures", "triggers"
		)?;
		for s in self.schemas.iter().chain(std::iter::once(&self.total)) {
			writeln!(
				f,
				"{:<24} {:>7} {:>7} {:>7} {:>9} {:>10} {:>8}",
				s.schema, s.tables, s.views, s.enums, s.functions, s.procedures, s.triggers
			)?;
		}
		Ok(())
	}
}

/// One complete load, keyed by `schema.name`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Snapshot {
	pub schemas: Vec<String>,
	pub tables: BTreeMap<String, TableMetadata>,
	pub views: BTreeMap<String, TableMetadata>,
	pub enums: BTreeMap<String, EnumInfo>,
	pub functions: BTreeMap<String, FunctionMetadata>,
	pub procedures: BTreeMap<String, FunctionMetadata>,
	pub triggers: BTreeMap<String, FunctionMetadata>,
}

/// Inserts, keeping the later entity when a key repeats
fn insert_last<T>(map: &mut BTreeMap<String, T>, key: String, value: T, what: &str) {
	if map.insert(key.clone(), value).is_some() {
		debug!("{} {} loaded twice, keeping the later one", what, key);
	}
}

/// Copies into `out` every entry of `map` in `schema`, keyed by bare name
fn by_schema<T: Clone>(map: &BTreeMap<String, T>, schema: &str, out: &mut BTreeMap<String, T>) {
	let prefix = format!("{}.", schema);
	for (key, value) in map.range(prefix.clone()..) {
		match key.strip_prefix(&prefix) {
			// keys sharing the prefix are contiguous
			Some(name) => {
				out.insert(name.to_owned(), value.clone());
			},
			None => break,
		}
	}
}

impl Snapshot {
	/// Runs all four stages; only fatal errors abort
	pub fn load<I: Introspector + ?Sized>(config: &CacheConfig, introspector: &mut I) -> Result<Snapshot> {
		let mut snapshot = Snapshot::default();
		snapshot.schemas = if config.include_schemas.is_empty() {
			introspector.get_schemas()?
		} else {
			config.include_schemas.clone()
		};

		let views = snapshot.load_tables(config, introspector)?;
		snapshot.load_enums(introspector)?;
		snapshot.load_views(config, introspector, views)?;
		if config.load_routines {
			snapshot.load_routines(introspector)?;
		}
		Ok(snapshot)
	}

	/// Loads tables, handing back the views for their own stage
	fn load_tables<I: Introspector + ?Sized>(&mut self, config: &CacheConfig, introspector: &mut I) -> Result<Vec<TableMetadata>> {
		let mut views = Vec::new();
		for schema in self.schemas.clone() {
			let relations = match skip_non_fatal(&format!("tables of {}", schema), introspector.get_tables(&schema))? {
				Some(relations) => relations,
				None => continue,
			};
			for mut table in relations.into_iter().filter(|t| !config.is_excluded(t)) {
				if table.is_view {
					views.push(table);
					continue;
				}
				if config.sample_rows {
					apply_sample(introspector, &mut table)?;
				}
				debug!("loaded table {}", table.key());
				insert_last(&mut self.tables, table.key(), table, "table");
			}
		}
		info!("loaded {} tables", self.tables.len());
		Ok(views)
	}

	/// Loads the enums of every loaded schema, plus enums of other schemas that columns use
	fn load_enums<I: Introspector + ?Sized>(&mut self, introspector: &mut I) -> Result<()> {
		for schema in self.schemas.clone() {
			if let Some(enums) = skip_non_fatal(&format!("enums of {}", schema), introspector.get_enums(&schema))? {
				for info in enums.into_values() {
					debug!("loaded enum {}", info.key());
					insert_last(&mut self.enums, info.key(), info, "enum");
				}
			}
		}

		// enum columns whose type lives outside the loaded schemas
		let mut foreign: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
		for column in self.tables.values().flat_map(|t| t.columns.iter()).filter(|c| c.is_enum) {
			if !self.enums.contains_key(&entity_key(&column.type_schema, &column.type_name)) {
				foreign.entry(column.type_schema.clone()).or_default().insert(column.type_name.clone());
			}
		}
		for (schema, names) in foreign {
			if let Some(enums) = skip_non_fatal(&format!("enums of {}", schema), introspector.get_enums(&schema))? {
				for info in enums.into_values().filter(|e| names.contains(&e.name)) {
					debug!("loaded referenced enum {}", info.key());
					insert_last(&mut self.enums, info.key(), info, "enum");
				}
			}
		}
		info!("loaded {} enums", self.enums.len());
		Ok(())
	}

	fn load_views<I: Introspector + ?Sized>(
		&mut self,
		config: &CacheConfig,
		introspector: &mut I,
		views: Vec<TableMetadata>,
	) -> Result<()> {
		for mut view in views {
			if config.sample_rows {
				apply_sample(introspector, &mut view)?;
			}
			debug!("loaded view {}", view.key());
			insert_last(&mut self.views, view.key(), view, "view");
		}
		info!("loaded {} views", self.views.len());
		Ok(())
	}

	fn load_routines<I: Introspector + ?Sized>(&mut self, introspector: &mut I) -> Result<()> {
		for schema in self.schemas.clone() {
			let routines = match skip_non_fatal(&format!("routines of {}", schema), introspector.get_functions(&schema))? {
				Some(routines) => routines,
				None => continue,
			};
			for routine in routines {
				let key = routine.key();
				debug!("loaded {:?} {}", routine.object_category, key);
				match routine.object_category {
					ObjectCategory::Function => insert_last(&mut self.functions, key, routine, "function"),
					ObjectCategory::Procedure => insert_last(&mut self.procedures, key, routine, "procedure"),
					ObjectCategory::Trigger => insert_last(&mut self.triggers, key, routine, "trigger"),
				}
			}
		}
		info!(
			"loaded {} functions, {} procedures, {} triggers",
			self.functions.len(),
			self.procedures.len(),
			self.triggers.len()
		);
		Ok(())
	}

	/// Looks in tables, views, enums, functions, procedures and triggers, in that order
	pub fn get(&self, schema: &str, name: &str) -> Option<Entity> {
		let key = entity_key(schema, name);
		if let Some(t) = self.tables.get(&key) {
			return Some(Entity::Table(t.clone()));
		}
		if let Some(v) = self.views.get(&key) {
			return Some(Entity::View(v.clone()));
		}
		if let Some(e) = self.enums.get(&key) {
			return Some(Entity::Enum(e.clone()));
		}
		if let Some(f) = self.functions.get(&key) {
			return Some(Entity::Function(f.clone()));
		}
		if let Some(p) = self.procedures.get(&key) {
			return Some(Entity::Procedure(p.clone()));
		}
		self.triggers.get(&key).map(|t| Entity::Trigger(t.clone()))
	}

	/// A table or view
	pub fn relation(&self, schema: &str, name: &str) -> Option<&TableMetadata> {
		let key = entity_key(schema, name);
		self.tables.get(&key).or_else(|| self.views.get(&key))
	}

	/// Resolves a possibly qualified type name like `users` or `app.users` to a relation
	pub fn relation_by_type_name(&self, default_schema: &str, type_name: &str) -> Option<&TableMetadata> {
		let unquoted = type_name.trim().replace('"', "");
		match unquoted.split_once('.') {
			Some((schema, name)) => self.relation(schema, name),
			None => self.relation(default_schema, &unquoted),
		}
	}

	pub fn routine(&self, schema: &str, name: &str) -> Option<&FunctionMetadata> {
		let key = entity_key(schema, name);
		self.functions
			.get(&key)
			.or_else(|| self.procedures.get(&key))
			.or_else(|| self.triggers.get(&key))
	}

	pub fn has_schema(&self, schema: &str) -> bool {
		self.schemas.iter().any(|s| s == schema)
	}

	pub fn list_by_schema(&self, schema: &str) -> Option<SchemaMetadata> {
		if !self.has_schema(schema) {
			return None;
		}
		let mut out = SchemaMetadata {
			name: schema.to_owned(),
			..SchemaMetadata::default()
		};
		by_schema(&self.tables, schema, &mut out.tables);
		by_schema(&self.views, schema, &mut out.views);
		by_schema(&self.enums, schema, &mut out.enums);
		by_schema(&self.functions, schema, &mut out.functions);
		by_schema(&self.procedures, schema, &mut out.procedures);
		by_schema(&self.triggers, schema, &mut out.triggers);
		Some(out)
	}

	pub fn stats(&self) -> CacheStats {
		let mut stats = CacheStats::default();
		stats.total.schema = "total".to_owned();
		for schema in &self.schemas {
			if let Some(m) = self.list_by_schema(schema) {
				let s = SchemaStats {
					schema: schema.clone(),
					tables: m.tables.len(),
					views: m.views.len(),
					enums: m.enums.len(),
					functions: m.functions.len(),
					procedures: m.procedures.len(),
					triggers: m.triggers.len(),
				};
				stats.total.add(&s);
				stats.schemas.push(s);
			}
		}
		// enums pulled in from schemas that were not loaded themselves
		let loaded_enums: usize = stats.schemas.iter().map(|s| s.enums).sum();
		stats.total.enums += self.enums.len().saturating_sub(loaded_enums);
		stats
	}
}

/// Refines structured column types from one sample row; a missing sample changes nothing
fn apply_sample<I: Introspector + ?Sized>(introspector: &mut I, table: &mut TableMetadata) -> Result<()> {
	let key = table.key();
	let sample = skip_non_fatal(&format!("sample of {}", key), introspector.sample_row(&table.schema, &table.name))?.flatten();
	if let Some(Value::Object(row)) = sample {
		for column in &mut table.columns {
			if let Some(value) = row.get(&column.name) {
				column.semantic = refine(&column.semantic, value);
			}
		}
	}
	Ok(())
}

/// Process wide metadata with an explicit lifecycle: built once, replaced wholesale by [`reload`]
///
/// [`reload`]: MetadataCache::reload
pub struct MetadataCache {
	config: CacheConfig,
	snapshot: ArcSwap<Snapshot>,
	reload_lock: Mutex<()>,
}

impl MetadataCache {
	/// The initial synchronous build
	pub fn build<I: Introspector + ?Sized>(config: CacheConfig, introspector: &mut I) -> Result<MetadataCache> {
		let snapshot = Snapshot::load(&config, introspector)?;
		info!("metadata cache built: {} schemas", snapshot.schemas.len());
		Ok(MetadataCache {
			config,
			snapshot: ArcSwap::from_pointee(snapshot),
			reload_lock: Mutex::new(()),
		})
	}

	/// Rebuilds and publishes a new snapshot; on error the current one stays authoritative
	pub fn reload<I: Introspector + ?Sized>(&self, introspector: &mut I) -> Result<Arc<Snapshot>> {
		let _guard = self.reload_lock.lock();
		info!("reloading metadata cache");
		let snapshot = Arc::new(Snapshot::load(&self.config, introspector)?);
		self.snapshot.store(Arc::clone(&snapshot));
		info!("metadata cache reloaded: {} schemas", snapshot.schemas.len());
		Ok(snapshot)
	}

	pub fn config(&self) -> &CacheConfig {
		&self.config
	}

	/// The current snapshot; stays consistent for as long as it is held
	pub fn snapshot(&self) -> Arc<Snapshot> {
		self.snapshot.load_full()
	}

	pub fn get(&self, schema: &str, name: &str) -> Result<Entity> {
		self.snapshot
			.load()
			.get(schema, name)
			.ok_or_else(|| Error::NotFound(entity_key(schema, name)))
	}

	pub fn list_by_schema(&self, schema: &str) -> Result<SchemaMetadata> {
		self.snapshot
			.load()
			.list_by_schema(schema)
			.ok_or_else(|| Error::NotFound(format!("schema {}", schema)))
	}

	pub fn all_schemas(&self) -> Vec<String> {
		self.snapshot.load().schemas.clone()
	}

	pub fn stats(&self) -> CacheStats {
		self.snapshot.load().stats()
	}

	/// The typed record shape of a table or view
	pub fn record_shape(&self, schema: &str, name: &str) -> Result<RecordShape> {
		self.snapshot
			.load()
			.relation(schema, name)
			.map(RecordShape::for_table)
			.ok_or_else(|| Error::NotFound(entity_key(schema, name)))
	}

	/// The invocation plan of a function or procedure
	pub fn plan_routine(&self, schema: &str, name: &str) -> Result<RoutinePlan> {
		let snapshot = self.snapshot.load();
		let routine = snapshot
			.routine(schema, name)
			.ok_or_else(|| Error::NotFound(entity_key(schema, name)))?;
		RoutinePlan::new(routine, &snapshot)
	}
}
