use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::tempdir;

use super::*;
use crate::{
  builder::RecordBuilder,
  clients::Page,
  config::Config,
  correlate::correlate,
  database::Database,
  oai::{respond, OaiRequest, ResponderSettings, ResumptionToken},
  pipeline::{rebuild, BuildOptions},
  repository::StaticRepository,
};

/// ArchivesSpace backed by a map of JSON records.
struct MemoryArchivesSpace {
  /// Records by path
  records:   HashMap<String, Value>,
  /// Paths that answer with a rejected login
  denied:    Vec<String>,
  /// Digital objects per listing page
  page_size: usize,
  /// Every path passed to `get`
  fetched:   Mutex<Vec<String>>,
  /// Whether listing pages report their own number
  echo_page: bool,
}

impl MemoryArchivesSpace {
  fn new() -> Self {
    Self {
      records:   HashMap::new(),
      denied:    Vec::new(),
      page_size: 2,
      fetched:   Mutex::new(Vec::new()),
      echo_page: true,
    }
  }

  fn with(mut self, record: Value) -> Self {
    let uri = record["uri"].as_str().unwrap().to_string();
    self.records.insert(uri, record);
    self
  }

  fn without(mut self, path: &str) -> Self {
    self.records.remove(path);
    self
  }

  fn without_page_numbers(mut self) -> Self {
    self.echo_page = false;
    self
  }

  fn deny(mut self, path: &str) -> Self {
    self.denied.push(path.to_string());
    self
  }

  fn digital_objects(&self) -> Vec<&Value> {
    let mut objects =
      self.records.iter().filter(|(uri, _)| uri.contains("/digital_objects/")).collect::<Vec<_>>();
    objects.sort_by_key(|(uri, _)| uri.to_string());
    objects.into_iter().map(|(_, record)| record).collect()
  }

  fn fetch_count(&self, path: &str) -> usize {
    self.fetched.lock().unwrap().iter().filter(|fetched| fetched.as_str() == path).count()
  }
}

#[async_trait]
impl ArchivesSpace for MemoryArchivesSpace {
  async fn get(&self, path: &str) -> Result<Value, Ead2dcError> {
    let path = path.split('?').next().unwrap_or(path);
    self.fetched.lock().unwrap().push(path.to_string());
    if self.denied.iter().any(|denied| denied == path) {
      return Err(Ead2dcError::Unauthorized);
    }
    self.records.get(path).cloned().ok_or_else(|| Ead2dcError::NotFound(path.to_string()))
  }

  async fn get_page(&self, _path: &str, page: u32) -> Result<Page, Ead2dcError> {
    let objects = self.digital_objects();
    let last_page = objects.len().div_ceil(self.page_size) as u32;
    let results = objects
      .chunks(self.page_size)
      .nth(page.saturating_sub(1) as usize)
      .map(|chunk| chunk.iter().map(|v| (*v).clone()).collect())
      .unwrap_or_default();
    let this_page = if self.echo_page { page } else { 0 };
    Ok(Page { this_page, last_page, results })
  }
}

fn collection(id: u64, title: &str) -> Value {
  json!({
    "uri": format!("/repositories/2/resources/{id}"),
    "title": title,
    "publish": true,
    "suppressed": false,
    "notes": [
      { "type": "abstract", "jsonmodel_type": "note_singlepart", "publish": true,
        "content": ["Letters and  photographs."] }
    ]
  })
}

fn archival_object(id: u64) -> Value {
  json!({
    "uri": format!("/repositories/2/archival_objects/{id}"),
    "title": format!("Item {id}"),
    "component_id": format!("C-{id}"),
    "create_time": "2019-01-01T08:00:00Z",
    "system_mtime": format!("2023-06-{:02}T10:00:00Z", id % 100),
    "user_mtime": "2021-02-02T00:00:00Z",
    "ancestors": [ { "level": "collection", "_resolved": { "title": "Papers" } } ],
    "subjects": [ { "_resolved": { "title": "Seismology", "source": "lcsh" } } ],
    "dates": [ { "begin": "1921" } ],
    "extents": [ { "number": "2", "extent_type": "photographs" } ]
  })
}

fn digital_object(id: u64, collection: u64, archival_objects: &[u64], use_statement: &str) -> Value {
  json!({
    "uri": format!("/repositories/2/digital_objects/{id}"),
    "publish": true,
    "suppressed": false,
    "collection": [ { "ref": format!("/repositories/2/resources/{collection}") } ],
    "linked_instances": archival_objects
      .iter()
      .map(|ao| json!({ "ref": format!("/repositories/2/archival_objects/{ao}") }))
      .collect::<Vec<_>>(),
    "file_versions": [
      { "file_uri": format!("http://example.org/{id}"), "publish": true, "use_statement": use_statement }
    ]
  })
}

/// Collection 30 with one digital object per archival object.
fn collection_30(archival_objects: u64) -> MemoryArchivesSpace {
  let mut api = MemoryArchivesSpace::new().with(collection(30, "Papers of A"));
  for id in 1..=archival_objects {
    api = api.with(archival_object(100 + id)).with(digital_object(id, 30, &[100 + id], "Web-Access"));
  }
  api
}

fn test_config(dir: &Path) -> Config {
  let mut config = Config::default();
  config.paths.database = dir.join("ead2dc.db");
  config.paths.xml = dir.join("caltecharchives.xml");
  config
}

fn today() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 5, 6).unwrap() }

#[tokio::test]
async fn test_single_web_access_record() -> anyhow::Result<()> {
  let api = collection_30(1);
  let config = Config::default();

  let map = correlate(&api, 2).await?;
  let output = RecordBuilder::new(&api, &config).build_all(&map, None).await?;

  assert_eq!(output.records.len(), 1);
  let record = &output.records[0];
  assert_eq!(
    record.header.identifier,
    "collections.archives.caltech.edu/repositories/2/archival_objects/101"
  );
  assert_eq!(record.header.set_specs, vec!["resource_30"]);
  assert_eq!(record.header.datestamp, "2023-06-01");

  let web = &record.metadata.identifiers[0];
  assert_eq!(web.value, "http://example.org/1");
  assert_eq!(web.id_type.as_deref(), Some("Web-Access"));
  assert_eq!(web.scheme.as_deref(), Some("URI"));
  assert_eq!(record.metadata.identifiers[1].value, "C-101");
  assert_eq!(record.metadata.types, vec!["text"]);
  assert_eq!(record.metadata.titles[1].level.as_deref(), Some("collection"));
  assert_eq!(record.metadata.formats, vec!["2 photographs"]);

  let stats = &output.stats[&"/repositories/2/resources/30".parse::<RecordRef>()?];
  assert_eq!(stats.archival_objects, 1);
  assert_eq!(stats.host_count(classify::HostCategory::Other), 1);
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_redirected_file_is_skipped() -> anyhow::Result<()> {
  let api = MemoryArchivesSpace::new()
    .with(collection(30, "Papers of A"))
    .with(archival_object(101))
    .with(digital_object(1, 30, &[101], "URL-Redirected"));
  let config = Config::default();

  let map = correlate(&api, 2).await?;
  assert_eq!(map.len(), 1);
  let output = RecordBuilder::new(&api, &config).build_all(&map, None).await?;

  assert!(output.records.is_empty());
  assert_eq!(output.skipped, 1);
  assert!(logs_contain("Skipping archival object /repositories/2/archival_objects/101"));
  Ok(())
}

#[tokio::test]
async fn test_moving_image_type() -> anyhow::Result<()> {
  let mut film = digital_object(1, 30, &[101], "Web-Access");
  film["digital_object_type"] = json!("Moving Image");
  let api = MemoryArchivesSpace::new().with(collection(30, "Films")).with(archival_object(101)).with(film);
  let config = Config::default();

  let map = correlate(&api, 2).await?;
  let output = RecordBuilder::new(&api, &config).build_all(&map, None).await?;
  assert_eq!(output.records[0].metadata.types, vec!["movingimage"]);
  Ok(())
}

#[tokio::test]
async fn test_shared_digital_object_fetched_once() -> anyhow::Result<()> {
  let api = MemoryArchivesSpace::new()
    .with(collection(30, "Papers of A"))
    .with(archival_object(101))
    .with(archival_object(102))
    .with(digital_object(1, 30, &[101, 102], "Web-Access"));
  let config = Config::default();

  let map = correlate(&api, 2).await?;
  let output = RecordBuilder::new(&api, &config).build_all(&map, None).await?;

  assert_eq!(output.records.len(), 2);
  assert_eq!(api.fetch_count("/repositories/2/digital_objects/1"), 1);
  Ok(())
}

#[tokio::test]
async fn test_unknown_identifier_gives_empty_get_record() -> anyhow::Result<()> {
  let api = collection_30(1);
  let config = Config::default();
  let map = correlate(&api, 2).await?;
  let output = RecordBuilder::new(&api, &config).build_all(&map, None).await?;
  let repository = StaticRepository { records: output.records, ..Default::default() };

  let request = OaiRequest {
    verb: Some("GetRecord".to_string()),
    identifier: Some("collections.archives.caltech.edu/repositories/2/archival_objects/999".to_string()),
    ..Default::default()
  };
  let included = BTreeSet::from(["30".to_string()]);
  let xml = respond(&repository, &included, &request, &ResponderSettings::from(&config), today())?;

  assert!(xml.contains("<GetRecord"));
  assert!(!xml.contains("<record>"));
  Ok(())
}

#[tokio::test]
async fn test_resumption_over_five_records() -> anyhow::Result<()> {
  let api = collection_30(5);
  let config = Config::default();
  let map = correlate(&api, 2).await?;
  let output = RecordBuilder::new(&api, &config).build_all(&map, None).await?;
  let expected = output.records.iter().map(|r| r.header.identifier.clone()).collect::<Vec<_>>();
  let repository = StaticRepository { records: output.records, ..Default::default() };

  let included = BTreeSet::from(["30".to_string()]);
  let settings = ResponderSettings { base_url: "https://example.org/oai".to_string(), max_records: 2 };
  let mut request = OaiRequest { verb: Some("ListRecords".to_string()), ..Default::default() };
  let mut harvested = Vec::new();

  for (cursor, count) in [(2, 2), (4, 2)] {
    let xml = respond(&repository, &included, &request, &settings, today())?;
    let parsed = StaticRepository::from_xml(&xml)?;
    assert_eq!(parsed.records.len(), count);
    harvested.extend(parsed.records.into_iter().map(|r| r.header.identifier));

    let token = ResumptionToken { cursor, ..Default::default() }.encode();
    assert!(xml.contains(&format!(r#"<resumptionToken cursor="{cursor}">{token}</resumptionToken>"#)));
    request.resumption_token = Some(token);
  }

  let xml = respond(&repository, &included, &request, &settings, today())?;
  let parsed = StaticRepository::from_xml(&xml)?;
  harvested.extend(parsed.records.into_iter().map(|r| r.header.identifier));
  assert!(xml.contains(r#"<resumptionToken cursor="5"/>"#));

  assert_eq!(harvested, expected);
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_rebuild_publishes_and_filters() -> anyhow::Result<()> {
  let dir = tempdir()?;
  let config = test_config(dir.path());
  let db = Database::open(&config.paths.database).await?;
  let api = collection_30(3).with(collection(31, "Films")).with(archival_object(201)).with(digital_object(
    9,
    31,
    &[201],
    "Web-Access",
  ));

  let report = rebuild(&api, &db, &config, &BuildOptions::default()).await?;
  assert_eq!(report.records, 4);
  assert_eq!(report.collections, 2);
  assert_eq!(report.earliest, "2023-06-01");
  assert!(config.paths.xml.exists());
  assert!(!dir.path().join("caltecharchives.xml.tmp").exists());
  assert!(!dir.path().join("caltecharchives.xml.lock").exists());

  let repository = StaticRepository::load(&config.paths.xml).await?;
  assert_eq!(repository.identify.earliest_datestamp, "2023-06-01");
  assert_eq!(repository.sets.len(), 2);
  assert_eq!(repository.sets[0].set_name, "Papers of A");
  assert_eq!(repository.sets[0].description, "Letters and photographs.");
  assert_eq!(db.earliest_datestamp().await?, "2023-06-01");

  let request = OaiRequest { verb: Some("ListIdentifiers".to_string()), ..Default::default() };
  let settings = ResponderSettings::from(&config);
  let xml = respond(&repository, &db.included_collections().await?, &request, &settings, today())?;
  assert!(!xml.contains("<header>"));

  db.set_included(vec!["31".to_string()], true).await?;
  let xml = respond(&repository, &db.included_collections().await?, &request, &settings, today())?;
  assert_eq!(xml.matches("<header>").count(), 1);
  assert!(xml.contains("archival_objects/201"));
  Ok(())
}

#[tokio::test]
async fn test_rebuild_is_idempotent() -> anyhow::Result<()> {
  let dir = tempdir()?;
  let config = test_config(dir.path());
  let db = Database::open(&config.paths.database).await?;
  let api = collection_30(4);

  rebuild(&api, &db, &config, &BuildOptions::default()).await?;
  let first = std::fs::read(&config.paths.xml)?;
  let first_rows = db.list_collections().await?;

  rebuild(&api, &db, &config, &BuildOptions::default()).await?;
  assert_eq!(std::fs::read(&config.paths.xml)?, first);
  assert_eq!(db.list_collections().await?, first_rows);
  Ok(())
}

#[tokio::test]
async fn test_rebuild_with_limit() -> anyhow::Result<()> {
  let dir = tempdir()?;
  let config = test_config(dir.path());
  let db = Database::open(&config.paths.database).await?;

  let report = rebuild(&collection_30(5), &db, &config, &BuildOptions { limit: Some(2) }).await?;
  assert_eq!(report.records, 2);
  Ok(())
}

#[tokio::test]
async fn test_rejected_login_keeps_previous_build() -> anyhow::Result<()> {
  let dir = tempdir()?;
  let config = test_config(dir.path());
  let db = Database::open(&config.paths.database).await?;

  rebuild(&collection_30(2), &db, &config, &BuildOptions::default()).await?;
  let published = std::fs::read(&config.paths.xml)?;

  let api = collection_30(3).deny("/repositories/2/archival_objects/102");
  let result = rebuild(&api, &db, &config, &BuildOptions::default()).await;
  assert!(matches!(result, Err(Ead2dcError::Unauthorized)));
  assert_eq!(std::fs::read(&config.paths.xml)?, published);
  assert_eq!(db.list_collections().await?[0].stats.archival_objects, 2);
  assert!(!dir.path().join("caltecharchives.xml.lock").exists());
  Ok(())
}

#[tokio::test]
async fn test_missing_collection_uses_path_as_title() -> anyhow::Result<()> {
  let dir = tempdir()?;
  let config = test_config(dir.path());
  let db = Database::open(&config.paths.database).await?;
  let api = MemoryArchivesSpace::new().with(archival_object(101)).with(digital_object(1, 30, &[101], "Web-Access"));

  rebuild(&api, &db, &config, &BuildOptions::default()).await?;
  let rows = db.list_collections().await?;
  assert_eq!(rows[0].title, "/repositories/2/resources/30");
  Ok(())
}

#[tokio::test]
async fn test_listing_without_page_numbers_terminates() -> anyhow::Result<()> {
  let api = collection_30(5).without_page_numbers();

  let map = correlate(&api, 2).await?;
  assert_eq!(map.len(), 5);
  Ok(())
}

#[traced_test]
#[tokio::test]
async fn test_missing_archival_object_is_skipped() -> anyhow::Result<()> {
  let api = collection_30(3).without("/repositories/2/archival_objects/102");
  let config = Config::default();

  let map = correlate(&api, 2).await?;
  assert_eq!(map.len(), 3);
  let output = RecordBuilder::new(&api, &config).build_all(&map, None).await?;

  assert_eq!(output.records.len(), 2);
  assert_eq!(output.skipped, 1);
  assert!(output.records.iter().all(|r| !r.header.identifier.ends_with("archival_objects/102")));
  assert!(logs_contain("Skipping archival object /repositories/2/archival_objects/102"));
  Ok(())
}

#[tokio::test]
async fn test_rebuild_withdraws_unpublished_collections() -> anyhow::Result<()> {
  let dir = tempdir()?;
  let config = test_config(dir.path());
  let db = Database::open(&config.paths.database).await?;

  let mut hidden = collection(31, "Hidden papers");
  hidden["publish"] = json!(false);
  hidden["suppressed"] = json!(true);
  let mut shared = digital_object(8, 30, &[102], "Web-Access");
  shared["collection"] = json!([
    { "ref": "/repositories/2/resources/30" },
    { "ref": "/repositories/2/resources/31" }
  ]);
  let api = collection_30(1)
    .with(hidden)
    .with(archival_object(102))
    .with(shared)
    .with(archival_object(201))
    .with(digital_object(9, 31, &[201], "Web-Access"));

  let report = rebuild(&api, &db, &config, &BuildOptions::default()).await?;
  assert_eq!(report.records, 2);
  assert_eq!(report.skipped, 1);
  assert_eq!(report.collections, 1);

  let repository = StaticRepository::load(&config.paths.xml).await?;
  assert_eq!(repository.sets.iter().map(|s| s.set_spec.as_str()).collect::<Vec<_>>(), vec![
    "resource_30"
  ]);
  assert!(repository.records.iter().all(|r| r.header.set_specs == vec!["resource_30"]));
  assert!(!repository.records.iter().any(|r| r.header.identifier.ends_with("archival_objects/201")));

  let rows = db.list_collections().await?;
  assert_eq!(rows.len(), 1);
  assert_eq!(rows[0].number(), "30");
  Ok(())
}
