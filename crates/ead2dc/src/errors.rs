//! Error types for the ead2dc library.
//!
//! A single error enum covers every failure mode of the build pipeline and the
//! OAI-PMH responder:
//! - Network and ArchivesSpace API errors
//! - Database operations
//! - Static repository (de)serialization
//! - Configuration and reference parsing
//!
//! Record-level problems (an unresolvable archival object, a malformed reference) are
//! not surfaced through this type at all: the builder logs them and moves on. Anything
//! that does come back as an [`Ead2dcError`] from [`crate::pipeline::rebuild`] aborted
//! the build before the previous static repository was replaced.
//!
//! # Examples
//!
//! ```no_run
//! use ead2dc::{clients::ArchivesSpace, config::Config, errors::Ead2dcError};
//!
//! # async fn example() -> Result<(), Ead2dcError> {
//! let config = Config::default();
//! let client = ead2dc::clients::ArchivesSpaceClient::new(&config.archivesspace)?;
//! match client.get("/repositories/2/archival_objects/1").await {
//!   Err(e) if e.is_not_found() => println!("no such record"),
//!   Err(e) => return Err(e),
//!   Ok(json) => println!("{json}"),
//! }
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

/// Errors that can occur while building or serving the static repository.
#[derive(Error, Debug)]
pub enum Ead2dcError {
  /// A network request to the ArchivesSpace API failed.
  ///
  /// This covers connection failures, timeouts, TLS errors and non-success
  /// status codes that were not otherwise classified.
  #[error(transparent)]
  Network(#[from] reqwest::Error),

  /// The requested record does not exist in ArchivesSpace.
  ///
  /// The string parameter holds the API path that returned `404`.
  #[error("Record not found: {0}")]
  NotFound(String),

  /// The ArchivesSpace API rejected our credentials.
  #[error("ArchivesSpace authentication failed")]
  Unauthorized,

  /// The ArchivesSpace API returned something we could not make sense of.
  #[error("API error: {0}")]
  ApiError(String),

  /// A record reference did not look like `/repositories/{n}/{kind}/{id}`.
  #[error("Invalid record reference: {0}")]
  InvalidReference(String),

  /// A resumption token could not be decoded.
  #[error("Invalid resumption token")]
  InvalidToken,

  /// Another rebuild holds the lock file next to the output document.
  #[error("A build is already in progress (lock file {0} exists)")]
  BuildInProgress(std::path::PathBuf),

  /// The configuration is unusable.
  #[error("Configuration error: {0}")]
  Config(String),

  /// A JSON payload did not match the expected shape.
  #[error(transparent)]
  Json(#[from] serde_json::Error),

  /// The static repository could not be parsed.
  #[error(transparent)]
  XmlDe(#[from] quick_xml::DeError),

  /// The static repository could not be written.
  #[error(transparent)]
  Xml(#[from] quick_xml::Error),

  /// A configuration file could not be parsed.
  #[error(transparent)]
  Toml(#[from] toml::de::Error),

  /// Failed to parse a URL.
  #[error(transparent)]
  InvalidUrl(#[from] url::ParseError),

  /// A SQLite operation failed.
  #[error(transparent)]
  Sqlite(#[from] rusqlite::Error),

  /// An async SQLite operation failed.
  #[error(transparent)]
  AsyncSqlite(#[from] tokio_rusqlite::Error),

  /// A file system operation failed.
  #[error(transparent)]
  Path(#[from] std::io::Error),

  /// The database is missing a row the schema seeds on creation.
  #[error("Database not initialized")]
  DatabaseNotInitialized,
}

impl Ead2dcError {
  /// Checks if this error is a `404` from the ArchivesSpace API.
  pub fn is_not_found(&self) -> bool {
    match self {
      Ead2dcError::NotFound(_) => true,
      Ead2dcError::Network(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
      _ => false,
    }
  }

  /// Checks if retrying the same request could succeed.
  ///
  /// Timeouts, connection failures and `5xx` responses are retryable. Client errors,
  /// parse failures and authentication failures are not.
  pub fn is_retryable(&self) -> bool {
    match self {
      Ead2dcError::Network(e) =>
        e.is_timeout()
          || e.is_connect()
          || e.status().map(|status| status.is_server_error()).unwrap_or(false),
      _ => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_not_found_classification() {
    assert!(Ead2dcError::NotFound("/repositories/2/archival_objects/1".into()).is_not_found());
    assert!(!Ead2dcError::Unauthorized.is_not_found());
    assert!(!Ead2dcError::InvalidToken.is_retryable());
    assert!(!Ead2dcError::ApiError("boom".into()).is_retryable());
  }
}
