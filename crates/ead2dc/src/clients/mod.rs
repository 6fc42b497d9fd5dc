//! Access to the ArchivesSpace backend API.
//!
//! The build pipeline never talks to HTTP directly. It goes through the
//! [`ArchivesSpace`] trait, which exposes the two operations the correlator and the
//! record builder need:
//! - [`ArchivesSpace::get`] fetches one record as JSON
//! - [`ArchivesSpace::get_page`] fetches one page of a paginated listing
//!
//! [`ArchivesSpaceClient`] implements the trait against a live backend. Tests plug in
//! an in-memory implementation instead.
//!
//! # Examples
//!
//! ```no_run
//! use ead2dc::{
//!   clients::{fetch, ArchivesSpace, ArchivesSpaceClient},
//!   config::ApiSettings,
//!   models::DigitalObject,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ArchivesSpaceClient::new(&ApiSettings::default())?;
//!
//! let page = client.get_page("/repositories/2/digital_objects", 1).await?;
//! println!("page {} of {}", page.this_page, page.last_page);
//!
//! let object: DigitalObject = fetch(&client, "/repositories/2/digital_objects/1").await?;
//! println!("{} file versions", object.file_versions.len());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub mod aspace;

pub use aspace::ArchivesSpaceClient;

use super::*;

/// One page of a paginated ArchivesSpace listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Page {
  /// The 1-based number of this page
  pub this_page: u32,
  /// The number of the last page; `0` for an empty listing
  pub last_page: u32,
  /// Records on this page
  pub results:   Vec<Value>,
}

impl Page {
  /// Whether another page follows page `requested`.
  ///
  /// Compares the number that was asked for, since `this_page` is absent from some
  /// listings.
  pub fn has_next(&self, requested: u32) -> bool { requested < self.last_page }
}

/// A source of ArchivesSpace records.
#[async_trait]
pub trait ArchivesSpace: Send + Sync {
  /// Fetches a single record by path, e.g. `/repositories/2/resources/30`.
  ///
  /// The path may carry a query string such as `?resolve[]=ancestors`.
  async fn get(&self, path: &str) -> Result<Value, Ead2dcError>;

  /// Fetches page `page` (1-based) of a paginated listing such as
  /// `/repositories/2/digital_objects`.
  async fn get_page(&self, path: &str, page: u32) -> Result<Page, Ead2dcError>;
}

/// Fetches a record and deserializes it into `T`.
pub async fn fetch<T, A>(api: &A, path: &str) -> Result<T, Ead2dcError>
where
  T: DeserializeOwned,
  A: ArchivesSpace + ?Sized, {
  let json = api.get(path).await?;
  trace!("Fetched {path}: {json}");
  Ok(serde_json::from_value(json)?)
}
