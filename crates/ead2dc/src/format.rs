//! Text normalization for values copied from ArchivesSpace into Dublin Core.
//!
//! ArchivesSpace text fields frequently carry stray line breaks, doubled spaces and
//! leading or trailing blanks (extents in particular are assembled from three
//! independent fields). These helpers normalize such values before they are written
//! into the static repository so that two builds from the same data produce identical
//! output.
//!
//! # Examples
//!
//! ```
//! use ead2dc::format;
//!
//! assert_eq!(format::collapse_whitespace("  Scope\n and   content "), "Scope and content");
//!
//! let parts = [Some("2".to_string()), None, Some(" boxes ".to_string())];
//! assert_eq!(format::join_nonempty(&parts), "2 boxes");
//! ```

/// Collapses every run of whitespace into a single space and trims both ends.
pub fn collapse_whitespace(text: &str) -> String {
  text.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Joins the present, non-blank parts with single spaces.
///
/// Each part is whitespace-normalized with [`collapse_whitespace`] first.
pub fn join_nonempty<'a>(parts: impl IntoIterator<Item = &'a Option<String>>) -> String {
  parts
    .into_iter()
    .flatten()
    .map(|part| collapse_whitespace(part))
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}

/// Returns the last path segment of an identifier, e.g. `1234` for
/// `collections.archives.caltech.edu/repositories/2/archival_objects/1234`.
///
/// Used to keep request logs short.
pub fn identifier_tail(identifier: &str) -> &str {
  identifier.rsplit('/').next().unwrap_or(identifier)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_collapse_whitespace() {
    assert_eq!(collapse_whitespace("Hello World"), "Hello World");
    assert_eq!(collapse_whitespace("  padded  "), "padded");
    assert_eq!(collapse_whitespace("line\nbreak\tand  tabs"), "line break and tabs");
    assert_eq!(collapse_whitespace(""), "");
  }

  #[test]
  fn test_join_nonempty() {
    let parts = [Some("1".to_string()), Some("  ".to_string()), Some("folder".to_string())];
    assert_eq!(join_nonempty(&parts), "1 folder");
    assert_eq!(join_nonempty(&[None, None]), "");
  }

  #[test]
  fn test_identifier_tail() {
    assert_eq!(
      identifier_tail("collections.archives.caltech.edu/repositories/2/archival_objects/1234"),
      "1234"
    );
    assert_eq!(identifier_tail("plain"), "plain");
  }
}
