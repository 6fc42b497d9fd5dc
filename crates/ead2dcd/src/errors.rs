//! Error types for the ead2dcd CLI application.
//!
//! This module provides one error type covering every failure mode of the CLI:
//! - User interaction errors
//! - Build, database and configuration errors from the library
//! - File system operations, including binding the HTTP listener
//! - Pattern matching errors while removing database files
//!
//! All variants are transparent, so the underlying message is what the user sees.

use thiserror::Error;

/// Errors that can occur during CLI operations.
#[derive(Error, Debug)]
pub enum Ead2dcdErrors {
  /// Errors from user interaction dialogs
  #[error(transparent)]
  Dialoguer(#[from] dialoguer::Error),

  /// Errors from the underlying ead2dc library
  #[error(transparent)]
  Ead2dc(#[from] ead2dc::errors::Ead2dcError),

  /// File system and IO operation errors
  #[error(transparent)]
  IO(#[from] std::io::Error),

  /// Glob pattern matching errors
  #[error(transparent)]
  Glob(#[from] glob::PatternError),
}
