//! Controlled vocabularies: host categories for collection statistics and the mapping
//! from ArchivesSpace digital object types to the DCMI Type vocabulary.

use std::fmt;

use url::Url;

use super::*;

/// Where a digital object's file is hosted, for collection statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostCategory {
  /// Servers operated by Caltech (see `build.caltech_hosts`)
  CaltechLibrary,
  /// archive.org
  InternetArchive,
  /// youtube.com and youtu.be
  YouTube,
  /// Anything else
  Other,
}

impl HostCategory {
  /// Every category, in column order.
  pub const ALL: [HostCategory; 4] =
    [HostCategory::CaltechLibrary, HostCategory::InternetArchive, HostCategory::YouTube, HostCategory::Other];

  /// Classifies a registrable domain (see [`domain_of`]).
  pub fn classify(domain: &str, caltech_hosts: &[String]) -> Self {
    match domain {
      d if caltech_hosts.iter().any(|h| h == d) => HostCategory::CaltechLibrary,
      "archive.org" => HostCategory::InternetArchive,
      "youtube.com" | "youtu.be" => HostCategory::YouTube,
      _ => HostCategory::Other,
    }
  }

  /// The `collections` column holding this category's count.
  pub fn column(&self) -> &'static str {
    match self {
      HostCategory::CaltechLibrary => "caltechlibrary",
      HostCategory::InternetArchive => "internetarchive",
      HostCategory::YouTube => "youtube",
      HostCategory::Other => "other",
    }
  }
}

impl fmt::Display for HostCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.column()) }
}

/// The last two labels of a URL's host, without port: `archive.org` for
/// `https://ia800.us.archive.org:443/x`.
///
/// Returns `None` for URLs without a host.
pub fn domain_of(file_uri: &str) -> Option<String> {
  let url = Url::parse(file_uri).ok()?;
  let host = url.host_str()?;
  let labels = host.split('.').collect::<Vec<_>>();
  Some(labels[labels.len().saturating_sub(2)..].join("."))
}

/// The DCMI type assigned when no digital object carries a mappable type.
pub const DEFAULT_DC_TYPE: &str = "text";

/// Maps an ArchivesSpace `digital_object_type` to a DCMI type term.
///
/// Both the enumeration labels (`Moving Image`) and their stored values
/// (`moving_image`) are accepted. Unmapped values return `None`.
pub fn dc_type(digital_object_type: &str) -> Option<&'static str> {
  let mapped = match digital_object_type {
    "Cartographic" | "cartographic" => "stillImage",
    "Mixed Materials" | "mixed_materials" => "collection",
    "Moving Image" | "moving_image" => "movingimage",
    "Notated Music" | "notated_music" => "stillimage",
    "Software, Multimedia" | "software_multimedia" => "software",
    "Sound Recording" | "Sound Recording (Musical)" | "Sound Recording (Non-musical)" => "sound",
    "sound_recording" | "sound_recording_musical" | "sound_recording_nonmusical" => "sound",
    "Still Image" | "stillimage" | "still_image" | "StillImage" => "stillimage",
    "Text" | "text" => "text",
    _ => return None,
  };
  Some(mapped)
}

/// The `type_*` statistics bucket a DCMI type term is counted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeBucket {
  /// `text`
  Text,
  /// `stillimage`, `stillImage`
  StillImage,
  /// `movingimage`
  MovingImage,
  /// `sound`
  Sound,
  /// everything else (`collection`, `software`)
  Other,
}

impl TypeBucket {
  /// Every bucket, in column order.
  pub const ALL: [TypeBucket; 5] =
    [TypeBucket::Text, TypeBucket::StillImage, TypeBucket::MovingImage, TypeBucket::Sound, TypeBucket::Other];

  /// Buckets a DCMI type term.
  pub fn of(dc_type: &str) -> Self {
    match dc_type.to_lowercase().as_str() {
      "text" => TypeBucket::Text,
      "stillimage" => TypeBucket::StillImage,
      "movingimage" => TypeBucket::MovingImage,
      "sound" => TypeBucket::Sound,
      _ => TypeBucket::Other,
    }
  }

  /// The `collections` column holding this bucket's count.
  pub fn column(&self) -> &'static str {
    match self {
      TypeBucket::Text => "type_text",
      TypeBucket::StillImage => "type_stillimage",
      TypeBucket::MovingImage => "type_movingimage",
      TypeBucket::Sound => "type_sound",
      TypeBucket::Other => "type_other",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn caltech() -> Vec<String> { vec!["caltech.edu".to_string(), "californiarevealed.org".to_string()] }

  #[test]
  fn test_domain_of() {
    assert_eq!(domain_of("https://ia800.us.archive.org:443/x.mp4").as_deref(), Some("archive.org"));
    assert_eq!(domain_of("http://resolver.caltech.edu/CaltechAUTHORS:1").as_deref(), Some("caltech.edu"));
    assert_eq!(domain_of("https://youtu.be/abc").as_deref(), Some("youtu.be"));
    assert_eq!(domain_of("http://localhost/x").as_deref(), Some("localhost"));
    assert_eq!(domain_of("not a url"), None);
    assert_eq!(domain_of("mailto:someone@example.org"), None);
  }

  #[test]
  fn test_host_category() {
    assert_eq!(HostCategory::classify("caltech.edu", &caltech()), HostCategory::CaltechLibrary);
    assert_eq!(HostCategory::classify("californiarevealed.org", &caltech()), HostCategory::CaltechLibrary);
    assert_eq!(HostCategory::classify("archive.org", &caltech()), HostCategory::InternetArchive);
    assert_eq!(HostCategory::classify("youtube.com", &caltech()), HostCategory::YouTube);
    assert_eq!(HostCategory::classify("youtu.be", &caltech()), HostCategory::YouTube);
    assert_eq!(HostCategory::classify("example.org", &caltech()), HostCategory::Other);
  }

  #[test]
  fn test_dc_type_mapping() {
    assert_eq!(dc_type("Moving Image"), Some("movingimage"));
    assert_eq!(dc_type("moving_image"), Some("movingimage"));
    assert_eq!(dc_type("Cartographic"), Some("stillImage"));
    assert_eq!(dc_type("Sound Recording (Non-musical)"), Some("sound"));
    assert_eq!(dc_type("Text"), Some("text"));
    assert_eq!(dc_type("three dimensional object"), None);
  }

  #[test]
  fn test_type_bucket() {
    assert_eq!(TypeBucket::of("stillImage"), TypeBucket::StillImage);
    assert_eq!(TypeBucket::of("movingimage"), TypeBucket::MovingImage);
    assert_eq!(TypeBucket::of("software"), TypeBucket::Other);
    assert_eq!(TypeBucket::of("text").column(), "type_text");
  }
}
