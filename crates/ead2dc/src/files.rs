//! Selection of the published file URIs that become `dc:identifier` elements.
//!
//! A digital object's file versions are filtered in this order:
//! 1. unpublished versions are dropped
//! 2. versions whose use statement is excluded (e.g. `URL-Redirected`) are dropped
//! 3. duplicates are removed and the rest sorted
//! 4. only `http` and `https` URIs survive
//! 5. when the same URI is listed as both `Persistent-URL` and `Web-Access`, the
//!    `Persistent-URL` entry is dropped
//! 6. URIs on excluded hosts (e.g. `github.com`) are dropped
//!
//! A version without a use statement is treated as `Web-Access`.

use std::collections::BTreeSet;

use url::Url;

use super::*;
use crate::{
  classify::{domain_of, HostCategory},
  config::BuildSettings,
  models::DigitalObject,
};

/// Use statement assumed when a file version has none.
pub const DEFAULT_USE_STATEMENT: &str = "Web-Access";

/// A file URI that survived filtering, with its use statement.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublishedFileUri {
  /// The file location
  pub uri:           String,
  /// The use statement, e.g. `Web-Access`
  pub use_statement: String,
}

impl PublishedFileUri {
  /// Creates a new published file URI.
  pub fn new(uri: impl Into<String>, use_statement: impl Into<String>) -> Self {
    Self { uri: uri.into(), use_statement: use_statement.into() }
  }

  /// The `type` attribute of the `dc:identifier`; `unknown` for a blank use statement.
  pub fn identifier_type(&self) -> &str {
    if self.use_statement.trim().is_empty() {
      "unknown"
    } else {
      &self.use_statement
    }
  }

  /// Thumbnails are published but left out of host statistics.
  pub fn is_thumbnail(&self) -> bool { self.use_statement.to_lowercase().contains("thumbnail") }

  /// The host category used for collection statistics.
  pub fn host_category(&self, caltech_hosts: &[String]) -> HostCategory {
    domain_of(&self.uri)
      .map(|domain| HostCategory::classify(&domain, caltech_hosts))
      .unwrap_or(HostCategory::Other)
  }
}

/// Collects the published file URIs of a set of digital objects.
///
/// The result is sorted and free of duplicates. An empty result means the archival
/// object these digital objects belong to must not be published.
pub fn published_file_uris<'a>(
  objects: impl IntoIterator<Item = &'a DigitalObject>,
  settings: &BuildSettings,
) -> Vec<PublishedFileUri> {
  let candidates = objects
    .into_iter()
    .flat_map(DigitalObject::all_file_versions)
    .filter(|version| version.publish == Some(true))
    .filter_map(|version| {
      let use_statement = version.use_statement.as_deref().unwrap_or(DEFAULT_USE_STATEMENT);
      if settings.use_exclude.iter().any(|excluded| excluded == use_statement) {
        return None;
      }
      Some(PublishedFileUri::new(version.file_uri.clone()?, use_statement))
    })
    .filter(|file| is_web_uri(&file.uri))
    .collect::<BTreeSet<_>>();

  let superseded = candidates
    .iter()
    .filter(|file| file.use_statement == "Persistent-URL")
    .filter(|file| candidates.contains(&PublishedFileUri::new(file.uri.clone(), "Web-Access")))
    .cloned()
    .collect::<BTreeSet<_>>();

  candidates
    .into_iter()
    .filter(|file| !superseded.contains(file))
    .filter(|file| {
      let excluded = domain_of(&file.uri)
        .map(|domain| settings.host_exclude.iter().any(|host| *host == domain))
        .unwrap_or(false);
      if excluded {
        trace!("Dropping file URI on excluded host: {}", file.uri);
      }
      !excluded
    })
    .collect()
}

/// Whether the URI parses with an `http` or `https` scheme.
fn is_web_uri(uri: &str) -> bool {
  Url::parse(uri).map(|url| matches!(url.scheme(), "http" | "https")).unwrap_or(false)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn object(file_versions: serde_json::Value) -> DigitalObject {
    serde_json::from_value(json!({
      "uri": "/repositories/2/digital_objects/1",
      "publish": true,
      "suppressed": false,
      "file_versions": file_versions
    }))
    .unwrap()
  }

  #[test]
  fn test_filters_unpublished_excluded_and_non_web() {
    let settings = BuildSettings::default();
    let obj = object(json!([
      { "file_uri": "http://example.org/x", "publish": true, "use_statement": "Web-Access" },
      { "file_uri": "http://example.org/hidden", "publish": false },
      { "file_uri": "http://example.org/redirect", "publish": true, "use_statement": "URL-Redirected" },
      { "file_uri": "ftp://example.org/file", "publish": true },
      { "file_uri": "file:///tmp/local", "publish": true },
      { "publish": true, "use_statement": "Web-Access" }
    ]));
    assert_eq!(published_file_uris([&obj], &settings), vec![PublishedFileUri::new(
      "http://example.org/x",
      "Web-Access"
    )]);
  }

  #[test]
  fn test_missing_use_statement_defaults_to_web_access() {
    let obj = object(json!([{ "file_uri": "https://example.org/a", "publish": true }]));
    let files = published_file_uris([&obj], &BuildSettings::default());
    assert_eq!(files[0].use_statement, DEFAULT_USE_STATEMENT);
  }

  #[test]
  fn test_persistent_url_superseded_by_web_access() {
    let obj = object(json!([
      { "file_uri": "https://resolver.caltech.edu/a", "publish": true, "use_statement": "Persistent-URL" },
      { "file_uri": "https://resolver.caltech.edu/a", "publish": true, "use_statement": "Web-Access" },
      { "file_uri": "https://resolver.caltech.edu/b", "publish": true, "use_statement": "Persistent-URL" }
    ]));
    let files = published_file_uris([&obj], &BuildSettings::default());
    assert_eq!(files, vec![
      PublishedFileUri::new("https://resolver.caltech.edu/a", "Web-Access"),
      PublishedFileUri::new("https://resolver.caltech.edu/b", "Persistent-URL"),
    ]);
  }

  #[test]
  fn test_deduplicates_across_objects_and_representative() {
    let mut first = object(json!([
      { "file_uri": "https://archive.org/details/x", "publish": true }
    ]));
    first.representative_file_version = first.file_versions.first().cloned();
    let second = object(json!([
      { "file_uri": "https://archive.org/details/x", "publish": true },
      { "file_uri": "https://github.com/caltechlibrary/x", "publish": true }
    ]));
    let files = published_file_uris([&first, &second], &BuildSettings::default());
    assert_eq!(files, vec![PublishedFileUri::new("https://archive.org/details/x", "Web-Access")]);
  }

  #[test]
  fn test_identifier_type_and_thumbnail() {
    assert_eq!(PublishedFileUri::new("http://a.org/x", "").identifier_type(), "unknown");
    assert_eq!(PublishedFileUri::new("http://a.org/x", "Web-Access").identifier_type(), "Web-Access");
    assert!(PublishedFileUri::new("http://a.org/x", "image-thumbnail").is_thumbnail());
    assert!(!PublishedFileUri::new("http://a.org/x", "Web-Access").is_thumbnail());
  }
}
