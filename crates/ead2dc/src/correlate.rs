//! Correlation of digital objects with the archival objects and collections they
//! belong to.
//!
//! ArchivesSpace records the link between a digital object and the archival object it
//! digitizes on the digital object (`linked_instances`), together with the collections
//! it belongs to (`collection`). Walking every digital object once therefore yields the
//! full picture, which is kept as
//!
//! ```text
//! collection -> archival object -> { digital objects }
//! ```
//!
//! and inverted on demand into the per-archival-object view the record builder needs.
//! All associations have set semantics, so a digital object seen twice, or an archival
//! object reached through several digital objects, is recorded once.

use super::*;
use crate::{
  clients::Page,
  models::DigitalObject,
  refs::RecordKind,
};

/// Everything the builder needs to know about one archival object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationEntry {
  /// Collections owning the archival object
  pub collections:     BTreeSet<RecordRef>,
  /// Qualifying digital objects linked to the archival object
  pub digital_objects: BTreeSet<RecordRef>,
}

/// Counters collected while correlating.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelationStats {
  /// Digital objects examined
  pub scanned:    usize,
  /// Digital objects that are published, not suppressed and in a collection
  pub qualifying: usize,
  /// References (or whole listing entries) that could not be parsed
  pub malformed:  usize,
  /// Collection references naming an accession rather than a resource
  pub accessions: usize,
}

/// The nested `collection -> archival object -> digital objects` map.
#[derive(Debug, Clone, Default)]
pub struct CorrelationMap {
  /// Associations keyed by collection
  by_collection: BTreeMap<RecordRef, BTreeMap<RecordRef, BTreeSet<RecordRef>>>,
  /// Counters
  pub stats:     CorrelationStats,
}

impl CorrelationMap {
  /// Creates an empty map.
  pub fn new() -> Self { Self::default() }

  /// Records one (collection, archival object, digital object) association.
  pub fn insert(
    &mut self,
    collection: RecordRef,
    archival_object: RecordRef,
    digital_object: RecordRef,
  ) {
    self
      .by_collection
      .entry(collection)
      .or_default()
      .entry(archival_object)
      .or_default()
      .insert(digital_object);
  }

  /// Folds one digital object into the map.
  ///
  /// Objects that are unpublished, suppressed or in no collection are ignored. Only
  /// resource collections and archival-object instances are recorded; malformed
  /// references are counted and skipped.
  pub fn observe(&mut self, object: &DigitalObject) {
    self.stats.scanned += 1;
    if !object.is_public() || object.collection.is_empty() {
      return;
    }

    let digital_object = match object.uri.parse::<RecordRef>() {
      Ok(digital_object) => digital_object,
      Err(e) => {
        debug!("Skipping digital object: {e}");
        self.stats.malformed += 1;
        return;
      },
    };
    self.stats.qualifying += 1;

    let mut collections = Vec::new();
    for link in &object.collection {
      match link.record_ref() {
        Ok(collection) if collection.kind == RecordKind::Resource => collections.push(collection),
        Ok(collection) if collection.kind == RecordKind::Accession => self.stats.accessions += 1,
        Ok(other) => {
          debug!("Unexpected collection reference {other} on {digital_object}");
          self.stats.malformed += 1;
        },
        Err(e) => {
          debug!("Bad collection reference on {digital_object}: {e}");
          self.stats.malformed += 1;
        },
      }
    }

    for link in &object.linked_instances {
      let instance = match link.record_ref() {
        Ok(instance) => instance,
        Err(e) => {
          debug!("Bad linked instance on {digital_object}: {e}");
          self.stats.malformed += 1;
          continue;
        },
      };
      if instance.kind != RecordKind::ArchivalObject {
        continue;
      }
      for collection in &collections {
        self.insert(*collection, instance, digital_object);
      }
    }
  }

  /// Folds one page of the digital object listing into the map.
  ///
  /// Entries that do not deserialize as digital objects are counted as malformed.
  pub fn observe_page(&mut self, page: &Page) {
    for entry in &page.results {
      match serde_json::from_value::<DigitalObject>(entry.clone()) {
        Ok(object) => self.observe(&object),
        Err(e) => {
          warn!("Skipping unreadable digital object on page {}: {e}", page.this_page);
          self.stats.scanned += 1;
          self.stats.malformed += 1;
        },
      }
    }
  }

  /// Collections with at least one correlated archival object, in order.
  pub fn collections(&self) -> impl Iterator<Item = &RecordRef> { self.by_collection.keys() }

  /// The archival objects of one collection with their digital objects.
  pub fn collection(
    &self,
    collection: &RecordRef,
  ) -> Option<&BTreeMap<RecordRef, BTreeSet<RecordRef>>> {
    self.by_collection.get(collection)
  }

  /// Inverts the map into `archival object -> (collections, digital objects)`.
  pub fn by_archival_object(&self) -> BTreeMap<RecordRef, CorrelationEntry> {
    let mut inverted: BTreeMap<RecordRef, CorrelationEntry> = BTreeMap::new();
    for (collection, archival_objects) in &self.by_collection {
      for (archival_object, digital_objects) in archival_objects {
        let entry = inverted.entry(*archival_object).or_default();
        entry.collections.insert(*collection);
        entry.digital_objects.extend(digital_objects.iter().copied());
      }
    }
    inverted
  }

  /// Number of distinct archival objects.
  pub fn len(&self) -> usize {
    self.by_collection.values().flat_map(BTreeMap::keys).collect::<BTreeSet<_>>().len()
  }

  /// Whether no archival object was correlated.
  pub fn is_empty(&self) -> bool { self.by_collection.is_empty() }
}

/// Builds a map from an in-memory sequence of digital objects.
pub fn from_digital_objects<'a>(objects: impl IntoIterator<Item = &'a DigitalObject>) -> CorrelationMap {
  let mut map = CorrelationMap::new();
  for object in objects {
    map.observe(object);
  }
  map
}

/// Walks every digital object of a repository, one page at a time.
///
/// Each page is folded into the map before the next one is requested, so the listing
/// is never held in memory as a whole.
pub async fn correlate<A: ArchivesSpace + ?Sized>(
  api: &A,
  repository: u32,
) -> Result<CorrelationMap, Ead2dcError> {
  let path = format!("/repositories/{repository}/digital_objects");
  let mut map = CorrelationMap::new();
  let mut page_number = 1;

  loop {
    let page = api.get_page(&path, page_number).await?;
    debug!("Correlating page {} of {} ({} objects)", page_number, page.last_page, page.results.len());
    map.observe_page(&page);
    if !page.has_next(page_number) {
      break;
    }
    page_number += 1;
  }

  let stats = map.stats;
  info!(
    "Correlated {} archival objects in {} collections from {} digital objects ({} qualifying)",
    map.len(),
    map.by_collection.len(),
    stats.scanned,
    stats.qualifying
  );
  if stats.malformed > 0 {
    warn!("Skipped {} malformed references while correlating", stats.malformed);
  }
  if stats.accessions > 0 {
    debug!("Ignored {} accession collection references", stats.accessions);
  }
  Ok(map)
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn digital_object(value: serde_json::Value) -> DigitalObject { serde_json::from_value(value).unwrap() }

  fn aref(path: &str) -> RecordRef { path.parse().unwrap() }

  #[test]
  fn test_set_semantics() {
    let object = digital_object(json!({
      "uri": "/repositories/2/digital_objects/1",
      "publish": true, "suppressed": false,
      "collection": [ { "ref": "/repositories/2/resources/30" } ],
      "linked_instances": [
        { "ref": "/repositories/2/archival_objects/100" },
        { "ref": "/repositories/2/archival_objects/100" }
      ]
    }));
    let map = from_digital_objects([&object, &object]);

    let by_ao = map.by_archival_object();
    assert_eq!(by_ao.len(), 1);
    let entry = &by_ao[&aref("/repositories/2/archival_objects/100")];
    assert_eq!(entry.collections.len(), 1);
    assert_eq!(entry.digital_objects.len(), 1);
    assert_eq!(map.stats.scanned, 2);
  }

  #[test]
  fn test_filters_unpublished_and_orphans() {
    let hidden = digital_object(json!({
      "uri": "/repositories/2/digital_objects/1", "publish": true, "suppressed": true,
      "collection": [ { "ref": "/repositories/2/resources/30" } ],
      "linked_instances": [ { "ref": "/repositories/2/archival_objects/100" } ]
    }));
    let orphan = digital_object(json!({
      "uri": "/repositories/2/digital_objects/2", "publish": true, "suppressed": false,
      "linked_instances": [ { "ref": "/repositories/2/archival_objects/101" } ]
    }));
    let map = from_digital_objects([&hidden, &orphan]);
    assert!(map.is_empty());
    assert_eq!(map.stats.qualifying, 0);
  }

  #[test]
  fn test_resources_only_and_malformed_counted() {
    let object = digital_object(json!({
      "uri": "/repositories/2/digital_objects/3", "publish": true, "suppressed": false,
      "collection": [
        { "ref": "/repositories/2/resources/30" },
        { "ref": "/repositories/2/accessions/4" },
        { "ref": "garbage" }
      ],
      "linked_instances": [
        { "ref": "/repositories/2/archival_objects/100" },
        { "ref": "/repositories/2/resources/30" },
        { "ref": "/repositories/2/archival_objects/" },
        {}
      ]
    }));
    let map = from_digital_objects([&object]);

    assert_eq!(map.collections().copied().collect::<Vec<_>>(), vec![aref(
      "/repositories/2/resources/30"
    )]);
    assert_eq!(map.len(), 1);
    assert_eq!(map.stats.accessions, 1);
    assert_eq!(map.stats.malformed, 3);
  }

  #[test]
  fn test_inversion_merges_collections() {
    let first = digital_object(json!({
      "uri": "/repositories/2/digital_objects/1", "publish": true, "suppressed": false,
      "collection": [ { "ref": "/repositories/2/resources/30" } ],
      "linked_instances": [ { "ref": "/repositories/2/archival_objects/100" } ]
    }));
    let second = digital_object(json!({
      "uri": "/repositories/2/digital_objects/2", "publish": true, "suppressed": false,
      "collection": [ { "ref": "/repositories/2/resources/31" } ],
      "linked_instances": [ { "ref": "/repositories/2/archival_objects/100" } ]
    }));
    let map = from_digital_objects([&first, &second]);

    let entry = &map.by_archival_object()[&aref("/repositories/2/archival_objects/100")];
    assert_eq!(entry.collections.iter().map(RecordRef::set_spec).collect::<Vec<_>>(), vec![
      "resource_30",
      "resource_31"
    ]);
    assert_eq!(entry.digital_objects.len(), 2);
    assert_eq!(map.collection(&aref("/repositories/2/resources/31")).map(BTreeMap::len), Some(1));
  }
}
