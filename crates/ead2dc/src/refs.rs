//! Typed ArchivesSpace record references.
//!
//! ArchivesSpace links records to each other with JSON objects of the form
//! `{"ref": "/repositories/2/archival_objects/1234"}`. This module parses those paths
//! into a [`RecordRef`] so callers can match on the record kind instead of comparing
//! string prefixes.
//!
//! # Examples
//!
//! ```
//! use ead2dc::refs::{RecordKind, RecordRef};
//!
//! let aref: RecordRef = "/repositories/2/resources/30".parse().unwrap();
//! assert_eq!(aref.kind, RecordKind::Resource);
//! assert_eq!(aref.set_spec(), "resource_30");
//! assert_eq!(aref.to_string(), "/repositories/2/resources/30");
//! ```

use std::{fmt, str::FromStr};

use lazy_static::lazy_static;
use regex::Regex;

use super::*;

/// The kinds of ArchivesSpace records the pipeline distinguishes.
///
/// Variant order is significant: it is part of [`RecordRef`]'s ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordKind {
  /// A finding aid, i.e. a collection that can own a set
  Resource,
  /// An accession record; may be named as a digital object's collection
  Accession,
  /// A described component inside a resource
  ArchivalObject,
  /// A record pointing at digitized surrogates
  DigitalObject,
}

impl RecordKind {
  /// The plural path segment ArchivesSpace uses for this kind.
  pub fn path_segment(&self) -> &'static str {
    match self {
      RecordKind::Resource => "resources",
      RecordKind::Accession => "accessions",
      RecordKind::ArchivalObject => "archival_objects",
      RecordKind::DigitalObject => "digital_objects",
    }
  }

  /// The singular name used in OAI set specs and the `typ` column.
  pub fn singular(&self) -> &'static str {
    match self {
      RecordKind::Resource => "resource",
      RecordKind::Accession => "accession",
      RecordKind::ArchivalObject => "archival_object",
      RecordKind::DigitalObject => "digital_object",
    }
  }

  /// Parses a plural path segment.
  fn from_segment(segment: &str) -> Option<Self> {
    match segment {
      "resources" => Some(RecordKind::Resource),
      "accessions" => Some(RecordKind::Accession),
      "archival_objects" => Some(RecordKind::ArchivalObject),
      "digital_objects" => Some(RecordKind::DigitalObject),
      _ => None,
    }
  }
}

/// A parsed `/repositories/{repository}/{kind}/{id}` reference.
///
/// Ordering is by repository, kind, then numeric id, so maps keyed by `RecordRef`
/// iterate in a stable, human-sensible order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordRef {
  /// Repository number
  pub repository: u32,
  /// Record kind
  pub kind:       RecordKind,
  /// Record id within the repository
  pub id:         u64,
}

impl RecordRef {
  /// Creates a reference from its parts.
  pub fn new(repository: u32, kind: RecordKind, id: u64) -> Self { Self { repository, kind, id } }

  /// Whether this reference names a collection (resource or accession).
  pub fn is_collection(&self) -> bool {
    matches!(self.kind, RecordKind::Resource | RecordKind::Accession)
  }

  /// The OAI set spec for a collection, e.g. `resource_30`.
  pub fn set_spec(&self) -> String { format!("{}_{}", self.kind.singular(), self.id) }

  /// The collection number stored in the `collno` column.
  pub fn collection_number(&self) -> String { self.id.to_string() }
}

impl fmt::Display for RecordRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "/repositories/{}/{}/{}", self.repository, self.kind.path_segment(), self.id)
  }
}

impl FromStr for RecordRef {
  type Err = Ead2dcError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    lazy_static! {
      static ref RECORD_PATH: Regex =
        Regex::new(r"^/repositories/(\d+)/([a-z_]+)/(\d+)/?$").unwrap();
    }

    let invalid = || Ead2dcError::InvalidReference(s.to_owned());
    let caps = RECORD_PATH.captures(s.trim()).ok_or_else(invalid)?;
    let kind = RecordKind::from_segment(&caps[2]).ok_or_else(invalid)?;
    let repository = caps[1].parse().map_err(|_| invalid())?;
    let id = caps[3].parse().map_err(|_| invalid())?;
    Ok(RecordRef { repository, kind, id })
  }
}

impl Serialize for RecordRef {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for RecordRef {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}

/// Parses a set spec such as `resource_30` back into its kind and collection number.
pub fn parse_set_spec(set_spec: &str) -> Option<(RecordKind, &str)> {
  let (kind, number) = set_spec.rsplit_once('_')?;
  let kind = match kind {
    "resource" => RecordKind::Resource,
    "accession" => RecordKind::Accession,
    _ => return None,
  };
  (!number.is_empty() && number.bytes().all(|b| b.is_ascii_digit())).then_some((kind, number))
}
