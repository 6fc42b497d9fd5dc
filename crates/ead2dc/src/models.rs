//! ArchivesSpace JSON record shapes consumed by the pipeline.
//!
//! Only the attributes the correlator and the record builder read are modelled;
//! everything else in the API's JSON is ignored. Every field is optional or defaulted
//! because ArchivesSpace omits empty attributes rather than sending `null`.

use super::*;

/// A `{"ref": "..."}` link to another record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Link {
  /// Target path, e.g. `/repositories/2/archival_objects/1`
  #[serde(rename = "ref")]
  pub reference: Option<String>,
}

impl Link {
  /// Parses the link target, if present and well formed.
  pub fn record_ref(&self) -> Result<RecordRef, Ead2dcError> {
    self
      .reference
      .as_deref()
      .ok_or_else(|| Ead2dcError::InvalidReference("<missing ref>".to_string()))?
      .parse()
  }
}

/// One file version of a digital object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileVersion {
  /// Location of the digitized file
  pub file_uri:      Option<String>,
  /// Whether the file version is published
  pub publish:       Option<bool>,
  /// Use-statement category, e.g. `Web-Access` or `image-thumbnail`
  pub use_statement: Option<String>,
}

/// A digital object as listed by `/repositories/{n}/digital_objects`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DigitalObject {
  /// Path of this digital object
  pub uri:                         String,
  /// Publication flag; only `Some(true)` qualifies
  pub publish:                     Option<bool>,
  /// Suppression flag; only `Some(false)` qualifies
  pub suppressed:                  Option<bool>,
  /// Collections (resources or accessions) the object belongs to
  #[serde(default)]
  pub collection:                  Vec<Link>,
  /// Records that link to this digital object as an instance
  #[serde(default)]
  pub linked_instances:            Vec<Link>,
  /// File versions
  #[serde(default)]
  pub file_versions:               Vec<FileVersion>,
  /// Representative file version, when one is flagged
  pub representative_file_version: Option<FileVersion>,
  /// Controlled-vocabulary object type, e.g. `moving_image` or `Moving Image`
  pub digital_object_type:         Option<String>,
}

impl DigitalObject {
  /// Published and not suppressed.
  pub fn is_public(&self) -> bool { self.publish == Some(true) && self.suppressed == Some(false) }

  /// All file versions, including the representative one if present.
  pub fn all_file_versions(&self) -> impl Iterator<Item = &FileVersion> {
    self.file_versions.iter().chain(self.representative_file_version.iter())
  }
}

/// A resolved ancestor of an archival object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ancestor {
  /// Hierarchy level, e.g. `series` or `collection`
  pub level:    Option<String>,
  /// The resolved ancestor record, present when requested with `resolve[]=ancestors`
  #[serde(rename = "_resolved")]
  pub resolved: Option<Titled>,
}

/// Any resolved record where only the title matters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Titled {
  /// Record title
  pub title: Option<String>,
}

/// A subject link, resolved with `resolve[]=subjects`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubjectLink {
  /// The resolved subject
  #[serde(rename = "_resolved")]
  pub resolved: Option<ResolvedSubject>,
}

/// The parts of a subject record we publish.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolvedSubject {
  /// Subject heading
  pub title:  Option<String>,
  /// Vocabulary source, e.g. `lcsh`
  pub source: Option<String>,
}

/// A date sub-record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DateEntry {
  /// Normalized begin date
  pub begin:      Option<String>,
  /// Free-text expression
  pub expression: Option<String>,
}

/// An extent sub-record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extent {
  /// Quantity, e.g. `2`
  pub number:           Option<String>,
  /// Unit, e.g. `photographs`
  pub extent_type:      Option<String>,
  /// Free-text physical details
  pub physical_details: Option<String>,
}

impl Extent {
  /// `number extent_type physical_details`, whitespace-normalized.
  pub fn statement(&self) -> String {
    format::join_nonempty([&self.number, &self.extent_type, &self.physical_details])
  }
}

/// An archival object fetched with its ancestors and subjects resolved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchivalObject {
  /// Path of this archival object
  pub uri:            String,
  /// Title; may be absent when only dates describe the component
  pub title:          Option<String>,
  /// Title assembled by ArchivesSpace from title and dates
  pub display_string: Option<String>,
  /// Ordered ancestors, nearest first
  #[serde(default)]
  pub ancestors:      Vec<Ancestor>,
  /// Subject links
  #[serde(default)]
  pub subjects:       Vec<SubjectLink>,
  /// Dates
  #[serde(default)]
  pub dates:          Vec<DateEntry>,
  /// Extents
  #[serde(default)]
  pub extents:        Vec<Extent>,
  /// Local component identifier
  pub component_id:   Option<String>,
  /// Creation timestamp
  pub create_time:    Option<String>,
  /// Last system modification timestamp
  pub system_mtime:   Option<String>,
  /// Last user modification timestamp
  pub user_mtime:     Option<String>,
}

impl ArchivalObject {
  /// The path suffix asking ArchivesSpace to resolve the linked records we publish.
  pub const RESOLVE_QUERY: &'static str = "?resolve[]=ancestors&resolve[]=digital_object\
                                            &resolve[]=linked_agents&resolve[]=repository\
                                            &resolve[]=subjects&resolve[]=top_container";

  /// Title to publish, falling back to the display string.
  pub fn display_title(&self) -> Option<&str> {
    self.title.as_deref().or(self.display_string.as_deref()).filter(|t| !t.trim().is_empty())
  }

  /// The record datestamp: the date part of the latest of the three timestamps.
  ///
  /// Timestamps are ISO 8601 strings, so the lexical maximum is the latest one.
  pub fn datestamp(&self) -> Option<NaiveDate> {
    [&self.create_time, &self.system_mtime, &self.user_mtime]
      .into_iter()
      .flatten()
      .max()
      .and_then(|latest| latest.get(..10))
      .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
  }

  /// Resolved ancestor titles with their level.
  pub fn ancestor_titles(&self) -> Vec<(String, Option<String>)> {
    self
      .ancestors
      .iter()
      .filter_map(|a| {
        let title = a.resolved.as_ref()?.title.clone()?;
        Some((title, a.level.clone()))
      })
      .collect()
  }

  /// Resolved subject headings with their source.
  pub fn subject_headings(&self) -> Vec<(String, Option<String>)> {
    self
      .subjects
      .iter()
      .filter_map(|s| {
        let resolved = s.resolved.as_ref()?;
        Some((resolved.title.clone()?, resolved.source.clone()))
      })
      .collect()
  }

  /// Non-empty begin dates.
  pub fn begin_dates(&self) -> Vec<String> {
    self.dates.iter().filter_map(|d| d.begin.clone()).filter(|d| !d.trim().is_empty()).collect()
  }

  /// Non-empty extent statements.
  pub fn extent_statements(&self) -> Vec<String> {
    self.extents.iter().map(Extent::statement).filter(|e| !e.is_empty()).collect()
  }
}

/// A note attached to a collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Note {
  /// Note type, e.g. `abstract` or `scopecontent`
  #[serde(rename = "type")]
  pub note_type:      Option<String>,
  /// `note_singlepart` or `note_multipart`
  pub jsonmodel_type: Option<String>,
  /// Publication flag
  pub publish:        Option<bool>,
  /// Content strings of a single-part note
  #[serde(default)]
  pub content:        serde_json::Value,
  /// Sub-notes of a multi-part note
  #[serde(default)]
  pub subnotes:       Vec<SubNote>,
}

/// A sub-note of a multi-part note.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubNote {
  /// Text content
  #[serde(default)]
  pub content: serde_json::Value,
}

/// A collection record (resource or accession).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Collection {
  /// Path of this collection
  pub uri:        String,
  /// Collection title
  pub title:      Option<String>,
  /// Notes, used to derive the set description
  #[serde(default)]
  pub notes:      Vec<Note>,
  /// Publication flag
  pub publish:    Option<bool>,
  /// Suppression flag
  pub suppressed: Option<bool>,
}

impl Collection {
  /// Whether the collection is published and not suppressed.
  pub fn is_published(&self) -> bool { self.publish == Some(true) && self.suppressed != Some(true) }

  /// Builds a set description from published `abstract` and `scopecontent` notes.
  ///
  /// Single-part notes contribute their first content string, multi-part notes the
  /// content of their first sub-note; single-part text comes first.
  pub fn description(&self) -> String {
    let described = || {
      self.notes.iter().filter(|n| {
        n.publish == Some(true)
          && matches!(n.note_type.as_deref(), Some("scopecontent") | Some("abstract"))
      })
    };

    let singlepart = described()
      .filter(|n| n.jsonmodel_type.as_deref() == Some("note_singlepart"))
      .filter_map(|n| first_text(&n.content))
      .collect::<Vec<_>>()
      .join(" ");
    let multipart = described()
      .filter(|n| n.jsonmodel_type.as_deref() == Some("note_multipart"))
      .filter_map(|n| n.subnotes.first().and_then(|s| first_text(&s.content)))
      .collect::<Vec<_>>()
      .join(" ");

    format::collapse_whitespace(&format!("{singlepart} {multipart}"))
  }
}

/// The first string in a JSON string or array of strings.
fn first_text(value: &serde_json::Value) -> Option<String> {
  match value {
    serde_json::Value::String(s) => Some(s.clone()),
    serde_json::Value::Array(items) => items.first().and_then(|v| v.as_str()).map(str::to_owned),
    _ => None,
  }
}
