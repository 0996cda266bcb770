//! Connects to a PostgreSQL database and builds a typed, reloadable model of its catalog
//!
//! The model drives generated record access, metadata and routine invocation endpoints:
//! - [`type_map`] classifies SQL type names into [`SemanticType`](type_map::SemanticType)s
//! - [`connection`] reads schemas, tables, views, enums and routines through an [`Introspector`]
//! - [`cache`] holds the loaded [`Snapshot`](cache::Snapshot) behind an atomic swap
//! - [`filter`] turns list request parameters into parameterized selects
//! - [`invoke`] plans and runs calls of functions and procedures

pub mod cache;

pub mod connection;

pub mod error;

pub mod filter;

pub mod invoke;

pub mod logging;

pub mod pg_select_types;

pub mod record;

pub mod signature;

pub mod sql_tree;

pub mod type_map;

use std::path::PathBuf;

use structopt::StructOpt;

pub use cache::{CacheConfig, Entity, MetadataCache};
pub use connection::{Introspector, PgIntrospector};
pub use error::{Error, ErrorKind, Result};

#[derive(Debug, StructOpt)]
#[structopt(name = "sql_db_meta", about = "Introspects a PostgreSQL catalog and prints the loaded metadata")]
pub struct Opt {
	/// String to connect to database, see tokio_postgres::Config for details
	#[structopt(name = "CONN_STRING")]
	pub conn_string: String,

	/// Schema to load, may be repeated; every user schema when omitted
	#[structopt(short = "s", long = "schema", number_of_values = 1)]
	pub schemas: Vec<String>,

	/// Table to skip, as `table` or `schema.table`, may be repeated
	#[structopt(long = "exclude-table", number_of_values = 1)]
	pub exclude_tables: Vec<String>,

	/// Skip loading functions, procedures and triggers
	#[structopt(long)]
	pub no_functions: bool,

	/// Do not sample a row per relation to refine JSON column shapes
	#[structopt(long)]
	pub no_samples: bool,

	/// Log at debug level
	#[structopt(short, long)]
	pub debug: bool,

	/// Print the full snapshot as JSON instead of the statistics table
	#[structopt(long)]
	pub json: bool,

	/// Output file, stdout if not present
	#[structopt(parse(from_os_str))]
	pub output: Option<PathBuf>,
}

impl Opt {
	pub fn get_client(&self) -> Result<PgIntrospector> {
		PgIntrospector::connect(&self.conn_string)
	}

	pub fn cache_config(&self) -> CacheConfig {
		CacheConfig {
			include_schemas: self.schemas.clone(),
			exclude_tables: self.exclude_tables.clone(),
			load_routines: !self.no_functions,
			sample_rows: !self.no_samples,
		}
	}

	pub fn log_config(&self) -> logging::LogConfig {
		if self.debug {
			logging::LogConfig::debug()
		} else {
			logging::LogConfig::default()
		}
	}
}
