//! Installs the process wide `tracing` subscriber
//!
//! Level priority: an explicit [`LogConfig::level`], then `RUST_LOG`, then `sql_db_meta=info`.
//! Output always goes to stderr so stdout stays free for the printed metadata.
use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOGGING_INITIALIZED: OnceLock<()> = OnceLock::new();

const DEFAULT_FILTER: &str = "sql_db_meta=info";

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
	/// "off", "error", "warn", "info", "debug" or "trace"
	pub level: Option<String>,
	pub ansi: bool,
}

impl LogConfig {
	pub fn debug() -> LogConfig {
		LogConfig {
			level: Some("debug".to_owned()),
			ansi: false,
		}
	}
}

fn filter_directive(level: Option<&str>) -> Option<String> {
	match level {
		Some(level) if level.eq_ignore_ascii_case("off") => None,
		Some(level) => Some(format!("sql_db_meta={}", level.to_lowercase())),
		None => Some(std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_owned())),
	}
}

/// Only the first call per process does anything
pub fn init_logging(config: &LogConfig) {
	LOGGING_INITIALIZED.get_or_init(|| {
		let directive = match filter_directive(config.level.as_deref()) {
			Some(directive) => directive,
			None => return,
		};
		let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

		tracing_subscriber::registry()
			.with(filter)
			.with(fmt::layer().with_writer(std::io::stderr).with_target(false).with_ansi(config.ansi))
			.try_init()
			.ok();
	});
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn explicit_level_wins() {
		assert_eq!(filter_directive(Some("DEBUG")).as_deref(), Some("sql_db_meta=debug"));
	}

	#[test]
	fn off_disables_the_subscriber() {
		assert_eq!(filter_directive(Some("off")), None);
	}

	#[test]
	fn init_twice_is_a_no_op() {
		init_logging(&LogConfig::default());
		init_logging(&LogConfig::debug());
	}
}
