//! Error taxonomy of the introspection core
use thiserror::Error;
use tracing::warn;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while introspecting, caching or executing
#[derive(Debug, Error)]
pub enum Error {
	/// The catalog could not be reached at all. Fatal for a build or reload
	#[error("database connection failed: {0}")]
	Connection(#[source] BoxError),

	/// A single catalog entity could not be read. Build stages log and skip these
	#[error("catalog query for {entity} failed: {source}")]
	Catalog {
		entity: String,
		#[source]
		source: BoxError,
	},

	#[error("{0} not found")]
	NotFound(String),

	#[error("bad request: {0}")]
	BadRequest(String),

	#[error("execution of {routine} failed: {source}")]
	Execution {
		routine: String,
		#[source]
		source: BoxError,
	},
}

/// Coarse classification for the consuming HTTP layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	NotFound,
	BadRequest,
	Internal,
}

impl ErrorKind {
	pub fn status_code(self) -> u16 {
		match self {
			ErrorKind::NotFound => 404,
			ErrorKind::BadRequest => 400,
			ErrorKind::Internal => 500,
		}
	}
}

impl Error {
	pub fn kind(&self) -> ErrorKind {
		match self {
			Error::NotFound(_) => ErrorKind::NotFound,
			Error::BadRequest(_) => ErrorKind::BadRequest,
			Error::Connection(_) | Error::Catalog { .. } | Error::Execution { .. } => ErrorKind::Internal,
		}
	}

	/// Only a lost or unusable connection aborts a cache build
	pub fn is_fatal(&self) -> bool {
		matches!(self, Error::Connection(_))
	}

	/// Wraps a postgres error raised while reading one catalog entity
	///
	/// If the client has gone away the error is promoted to [`Error::Connection`]
	pub fn catalog(entity: impl Into<String>, e: postgres::Error) -> Self {
		if e.is_closed() {
			Error::Connection(Box::new(e))
		} else {
			Error::Catalog {
				entity: entity.into(),
				source: Box::new(e),
			}
		}
	}

	/// Wraps a postgres error raised while running a routine or a filtered select
	pub fn execution(routine: impl Into<String>, e: postgres::Error) -> Self {
		if e.is_closed() {
			Error::Connection(Box::new(e))
		} else {
			Error::Execution {
				routine: routine.into(),
				source: Box::new(e),
			}
		}
	}
}

/// Logs and swallows a per-entity failure, passing fatal ones through
pub(crate) fn skip_non_fatal<T>(entity: &str, result: Result<T>) -> Result<Option<T>> {
	match result {
		Ok(value) => Ok(Some(value)),
		Err(e) if e.is_fatal() => Err(e),
		Err(e) => {
			warn!("skipping {}: {}", entity, e);
			Ok(None)
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn kinds_map_to_http_classes() {
		assert_eq!(Error::NotFound("schema app".into()).kind().status_code(), 404);
		assert_eq!(Error::BadRequest("no filters provided".into()).kind().status_code(), 400);
		assert_eq!(Error::Connection("refused".into()).kind().status_code(), 500);
	}

	#[test]
	fn only_connection_errors_are_fatal() {
		assert!(Error::Connection("refused".into()).is_fatal());
		let per_entity = Error::Catalog {
			entity: "public.users".into(),
			source: "relation does not exist".into(),
		};
		assert!(!per_entity.is_fatal());
	}

	#[test]
	fn non_fatal_errors_are_skipped() {
		let skipped: Result<Option<u8>> = skip_non_fatal("app.broken", Err(Error::NotFound("app.broken".into())));
		assert!(matches!(skipped, Ok(None)));

		let fatal: Result<Option<u8>> = skip_non_fatal("app.users", Err(Error::Connection("reset".into())));
		assert!(matches!(fatal, Err(Error::Connection(_))));
	}
}
