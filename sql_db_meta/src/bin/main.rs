use std::{fs::File, io::Write, process};

use structopt::StructOpt;
use thiserror::Error;
use tracing::error;
use sql_db_meta::{
	logging::init_logging,
	MetadataCache,
	Opt,
};

#[derive(Debug, Error)]
enum Failure {
	#[error(transparent)]
	Metadata(#[from] sql_db_meta::Error),

	#[error("failed to serialize metadata: {0}")]
	Serialize(#[from] serde_json::Error),

	#[error("failed to write output: {0}")]
	Write(#[from] std::io::Error),
}

impl Failure {
	/// 1 when the catalog could not be loaded, 2 when the output could not be produced
	fn exit_code(&self) -> i32 {
		match self {
			Failure::Metadata(_) => 1,
			Failure::Serialize(_) | Failure::Write(_) => 2,
		}
	}
}

fn run(opt: &Opt) -> Result<(), Failure> {
	let mut client = opt.get_client()?;
	let cache = MetadataCache::build(opt.cache_config(), &mut client)?;

	let output = if opt.json {
		serde_json::to_string_pretty(&*cache.snapshot())?
	} else {
		cache.stats().to_string()
	};

	match &opt.output {
		Some(path) => File::create(path)?.write_all(output.as_bytes())?,
		None => std::io::stdout().write_all(output.as_bytes())?,
	}
	Ok(())
}

fn main() {
	let opt = Opt::from_args();
	init_logging(&opt.log_config());

	if let Err(e) = run(&opt) {
		error!("{}", e);
		process::exit(e.exit_code());
	}
}
