//! Publishes ArchivesSpace digital content as an OAI-PMH static repository.
//!
//! The crate is split into an offline build and an online responder:
//! - [`correlate`] walks every digital object in a repository and maps archival objects
//!   to the collections and digital objects they belong to
//! - [`builder`] resolves each archival object's metadata and turns it into a Dublin Core
//!   record, accumulating per-collection statistics along the way
//! - [`pipeline`] ties both together and atomically replaces the static XML file and the
//!   collection table
//! - [`oai`] answers OAI-PMH requests from the static file and the table of included
//!   collections
//!
//! # Example
//! ```rust,no_run
//! use ead2dc::{
//!   clients::ArchivesSpaceClient,
//!   config::Config,
//!   database::Database,
//!   pipeline::{rebuild, BuildOptions},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!   let config = Config::load(&Config::default_path())?;
//!   let client = ArchivesSpaceClient::new(&config.archivesspace)?;
//!   let db = Database::open(&config.paths.database).await?;
//!
//!   let report = rebuild(&client, &db, &config, &BuildOptions::default()).await?;
//!   println!("{} records written to {}", report.records, report.output.display());
//!
//!   Ok(())
//! }
//! ```

#![warn(missing_docs, clippy::missing_docs_in_private_items)]
use std::{
  collections::{BTreeMap, BTreeSet},
  path::{Path, PathBuf},
};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};
#[cfg(test)] use tracing_test::traced_test;

pub mod builder;
pub mod classify;
pub mod clients;
pub mod config;
pub mod correlate;
pub mod database;
pub mod errors;
pub mod files;
pub mod format;
pub mod models;
pub mod oai;
pub mod pipeline;
pub mod refs;
pub mod repository;
#[cfg(test)] mod tests;

use clients::ArchivesSpace;
use errors::Ead2dcError;
use refs::RecordRef;
