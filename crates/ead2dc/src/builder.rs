//! Turns correlated archival objects into Dublin Core records.
//!
//! For every archival object in a [`CorrelationMap`] the builder fetches the object
//! with its ancestors and subjects resolved, fetches its digital objects, filters
//! their file versions down to published web URIs and emits one [`Record`]. Along the
//! way it accumulates [`CollectionStats`] for every owning collection.
//!
//! Problems with a single archival object do not abort the build: the object is
//! logged and skipped. A rejected login does.

use std::collections::HashMap;

use super::*;
use crate::{
  classify::{self, HostCategory, TypeBucket, DEFAULT_DC_TYPE},
  clients::fetch,
  config::{BuildSettings, Config, RepositorySettings},
  correlate::{CorrelationEntry, CorrelationMap},
  files::{published_file_uris, PublishedFileUri},
  models::{ArchivalObject, DigitalObject},
  repository::{DcIdentifier, DcSubject, DcTitle, DublinCore, Header, Record},
};

/// Per-collection counters written to the `collections` table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionStats {
  /// Published archival objects
  pub archival_objects: u64,
  /// Published file URIs by host category, thumbnails excluded
  pub hosts:            BTreeMap<HostCategory, u64>,
  /// Records by DCMI type bucket
  pub types:            BTreeMap<TypeBucket, u64>,
  /// Latest record datestamp
  pub last_edit:        Option<NaiveDate>,
}

impl CollectionStats {
  /// Count for one host category.
  pub fn host_count(&self, category: HostCategory) -> u64 {
    self.hosts.get(&category).copied().unwrap_or(0)
  }

  /// Count for one type bucket.
  pub fn type_count(&self, bucket: TypeBucket) -> u64 { self.types.get(&bucket).copied().unwrap_or(0) }

  /// Total over all host categories.
  pub fn digital_objects(&self) -> u64 { self.hosts.values().sum() }
}

/// Result of building every record of a correlation map.
#[derive(Debug, Clone, Default)]
pub struct BuildOutput {
  /// Records, ordered by archival object
  pub records: Vec<Record>,
  /// Statistics keyed by collection
  pub stats:   BTreeMap<RecordRef, CollectionStats>,
  /// Archival objects skipped because of errors or missing file URIs
  pub skipped: usize,
}

/// Builds records, caching digital objects for the lifetime of the builder.
pub struct RecordBuilder<'a, A: ArchivesSpace + ?Sized> {
  /// Record source
  api:             &'a A,
  /// Filtering rules
  build:           &'a BuildSettings,
  /// Identifier prefix and rights
  repository:      &'a RepositorySettings,
  /// Digital objects fetched so far
  digital_objects: HashMap<RecordRef, DigitalObject>,
}

impl<'a, A: ArchivesSpace + ?Sized> RecordBuilder<'a, A> {
  /// Creates a builder reading from `api` with the given configuration.
  pub fn new(api: &'a A, config: &'a Config) -> Self {
    Self {
      api,
      build: &config.build,
      repository: &config.repository,
      digital_objects: HashMap::new(),
    }
  }

  /// Builds records for every archival object in `map`.
  ///
  /// With a `limit`, only the first `limit` archival objects are processed.
  pub async fn build_all(
    &mut self,
    map: &CorrelationMap,
    limit: Option<usize>,
  ) -> Result<BuildOutput, Ead2dcError> {
    let mut output = BuildOutput::default();
    let archival_objects = map.by_archival_object();
    let total = limit.map_or(archival_objects.len(), |limit| limit.min(archival_objects.len()));
    info!("Building records for {total} archival objects");

    for (processed, (archival_object, entry)) in archival_objects.iter().take(total).enumerate() {
      if processed > 0 && processed % 500 == 0 {
        info!("Processed {processed} of {total} archival objects");
      }

      let Some(built) = self.build_record(*archival_object, entry).await? else {
        output.skipped += 1;
        continue;
      };
      for collection in &entry.collections {
        output.stats.entry(*collection).or_default().add(&built);
      }
      output.records.push(built.record);
    }

    info!("Built {} records, skipped {}", output.records.len(), output.skipped);
    Ok(output)
  }

  /// Builds the record of one archival object.
  ///
  /// Returns `Ok(None)`, after logging a warning, when the object cannot be resolved
  /// or has no published file URIs. Only a rejected login is an error.
  pub async fn build_record(
    &mut self,
    archival_object: RecordRef,
    entry: &CorrelationEntry,
  ) -> Result<Option<BuiltRecord>, Ead2dcError> {
    let path = format!("{archival_object}{}", ArchivalObject::RESOLVE_QUERY);
    let metadata: ArchivalObject = match fetch(self.api, &path).await {
      Ok(metadata) => metadata,
      Err(Ead2dcError::Unauthorized) => return Err(Ead2dcError::Unauthorized),
      Err(e) => {
        warn!("Skipping archival object {archival_object}: {e}");
        return Ok(None);
      },
    };
    let Some(datestamp) = metadata.datestamp() else {
      warn!("Skipping archival object {archival_object}: no modification timestamps");
      return Ok(None);
    };

    let mut objects = Vec::new();
    for digital_object in &entry.digital_objects {
      if let Some(object) = self.digital_object(*digital_object).await? {
        objects.push(object);
      }
    }

    let files = published_file_uris(objects.iter(), self.build);
    if files.is_empty() {
      warn!("Skipping archival object {archival_object}: no published file URIs");
      return Ok(None);
    }

    let types = dc_types(&objects);
    let record = Record {
      header:   Header {
        identifier: format!("{}{archival_object}", self.repository.identifier_prefix),
        datestamp:  datestamp.format("%Y-%m-%d").to_string(),
        set_specs:  entry.collections.iter().map(RecordRef::set_spec).collect(),
      },
      metadata: self.dublin_core(&metadata, &files, &types),
    };
    trace!("Built record {}", record.header.identifier);

    Ok(Some(BuiltRecord {
      hosts: files
        .iter()
        .filter(|file| !file.is_thumbnail())
        .map(|file| file.host_category(&self.build.caltech_hosts))
        .collect(),
      types: types.iter().map(|dc_type| TypeBucket::of(dc_type)).collect(),
      datestamp,
      record,
    }))
  }

  /// Returns a digital object, fetching it on first use.
  async fn digital_object(
    &mut self,
    reference: RecordRef,
  ) -> Result<Option<DigitalObject>, Ead2dcError> {
    if let Some(object) = self.digital_objects.get(&reference) {
      return Ok(Some(object.clone()));
    }
    match fetch::<DigitalObject, A>(self.api, &reference.to_string()).await {
      Ok(object) => {
        self.digital_objects.insert(reference, object.clone());
        Ok(Some(object))
      },
      Err(Ead2dcError::Unauthorized) => Err(Ead2dcError::Unauthorized),
      Err(e) => {
        warn!("Could not fetch digital object {reference}: {e}");
        Ok(None)
      },
    }
  }

  /// Assembles the Dublin Core payload.
  fn dublin_core(
    &self,
    metadata: &ArchivalObject,
    files: &[PublishedFileUri],
    types: &[&'static str],
  ) -> DublinCore {
    let mut titles = vec![DcTitle {
      level: None,
      value: format::collapse_whitespace(metadata.display_title().unwrap_or_default()),
    }];
    titles.extend(metadata.ancestor_titles().into_iter().map(|(title, level)| DcTitle {
      level: level.filter(|l| !l.is_empty()),
      value: format::collapse_whitespace(&title),
    }));

    let mut identifiers = files
      .iter()
      .map(|file| DcIdentifier {
        scheme:  Some("URI".to_string()),
        id_type: Some(file.identifier_type().to_string()),
        value:   file.uri.clone(),
      })
      .collect::<Vec<_>>();
    if let Some(component_id) = metadata.component_id.as_deref().filter(|id| !id.trim().is_empty()) {
      identifiers.push(DcIdentifier {
        scheme:  None,
        id_type: Some("localid".to_string()),
        value:   component_id.trim().to_string(),
      });
    }

    DublinCore {
      titles,
      identifiers,
      dates: metadata.begin_dates().iter().map(|d| format::collapse_whitespace(d)).collect(),
      formats: metadata.extent_statements(),
      types: types.iter().map(|t| t.to_string()).collect(),
      subjects: metadata
        .subject_headings()
        .into_iter()
        .map(|(heading, source)| DcSubject {
          source: source.filter(|s| !s.is_empty()),
          value:  format::collapse_whitespace(&heading),
        })
        .collect(),
      rights: Some(format::collapse_whitespace(&self.repository.rights)),
    }
  }
}

/// A record with the facts the statistics need.
#[derive(Debug, Clone)]
pub struct BuiltRecord {
  /// The record
  pub record:    Record,
  /// Record datestamp
  pub datestamp: NaiveDate,
  /// Host category of every non-thumbnail file URI
  pub hosts:     Vec<HostCategory>,
  /// Type bucket of every `dc:type`
  pub types:     Vec<TypeBucket>,
}

impl CollectionStats {
  /// Accounts for one more record of the collection.
  pub fn add(&mut self, built: &BuiltRecord) {
    self.archival_objects += 1;
    for host in &built.hosts {
      *self.hosts.entry(*host).or_default() += 1;
    }
    for bucket in &built.types {
      *self.types.entry(*bucket).or_default() += 1;
    }
    self.last_edit = self.last_edit.max(Some(built.datestamp));
  }
}

/// Distinct DCMI types of a set of digital objects, defaulting to `text`.
pub fn dc_types(objects: &[DigitalObject]) -> Vec<&'static str> {
  let mapped = objects
    .iter()
    .filter_map(|object| object.digital_object_type.as_deref())
    .filter_map(classify::dc_type)
    .collect::<BTreeSet<_>>();
  if mapped.is_empty() {
    vec![DEFAULT_DC_TYPE]
  } else {
    mapped.into_iter().collect()
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn object(value: serde_json::Value) -> DigitalObject { serde_json::from_value(value).unwrap() }

  #[test]
  fn test_dc_types() {
    assert_eq!(dc_types(&[]), vec!["text"]);
    assert_eq!(dc_types(&[object(json!({ "uri": "/repositories/2/digital_objects/1" }))]), vec![
      "text"
    ]);
    assert_eq!(
      dc_types(&[
        object(json!({ "uri": "/repositories/2/digital_objects/1", "digital_object_type": "moving_image" })),
        object(json!({ "uri": "/repositories/2/digital_objects/2", "digital_object_type": "Moving Image" })),
        object(json!({ "uri": "/repositories/2/digital_objects/3", "digital_object_type": "unmapped" })),
      ]),
      vec!["movingimage"]
    );
  }

  #[test]
  fn test_collection_stats() {
    let built = BuiltRecord {
      record:    Record::default(),
      datestamp: NaiveDate::from_ymd_opt(2021, 3, 4).unwrap(),
      hosts:     vec![HostCategory::InternetArchive, HostCategory::InternetArchive, HostCategory::Other],
      types:     vec![TypeBucket::Sound],
    };
    let mut later = built.clone();
    later.datestamp = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();

    let mut stats = CollectionStats::default();
    stats.add(&later);
    stats.add(&built);

    assert_eq!(stats.archival_objects, 2);
    assert_eq!(stats.host_count(HostCategory::InternetArchive), 4);
    assert_eq!(stats.host_count(HostCategory::YouTube), 0);
    assert_eq!(stats.digital_objects(), 6);
    assert_eq!(stats.type_count(TypeBucket::Sound), 2);
    assert_eq!(stats.last_edit, NaiveDate::from_ymd_opt(2022, 1, 1));
  }
}
