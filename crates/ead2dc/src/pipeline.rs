//! The offline rebuild: correlate, build, publish.
//!
//! [`rebuild`] runs the whole job under a [`BuildLock`]. The new XML document is
//! written to a temporary sibling of the configured path and only renamed over the
//! previous one after the collection table has been committed, so a failed build
//! leaves the published repository untouched.

use std::{
  ffi::OsString,
  fs::{self, OpenOptions},
  io::{ErrorKind, Write},
};

use super::*;
use crate::{
  builder::RecordBuilder,
  clients::fetch,
  config::Config,
  correlate::correlate,
  database::{CollectionRow, Database},
  models::Collection,
  repository::{Identify, MetadataFormat, OaiSet, StaticRepository},
};

/// Datestamp used when neither the build nor the database knows a better one.
pub const FALLBACK_EARLIEST: &str = "1970-01-01";

/// Knobs for a single build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
  /// Stop after this many archival objects
  pub limit: Option<usize>,
}

/// What a finished build produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
  /// Records written
  pub records:     usize,
  /// Archival objects skipped
  pub skipped:     usize,
  /// Collections written to the database
  pub collections: usize,
  /// `earliestDatestamp` of the new document
  pub earliest:    String,
  /// The published document
  pub output:      PathBuf,
}

/// Guard ensuring only one build writes a given document at a time.
///
/// The lock is a `<xml>.lock` file created exclusively; it is removed when the guard
/// is dropped.
#[derive(Debug)]
pub struct BuildLock {
  /// Lock file path
  path: PathBuf,
}

impl BuildLock {
  /// Takes the lock for the document at `xml`.
  ///
  /// # Errors
  ///
  /// [`Ead2dcError::BuildInProgress`] when another build holds the lock.
  pub fn acquire(xml: &Path) -> Result<Self, Ead2dcError> {
    let path = sibling(xml, ".lock");
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      fs::create_dir_all(parent)?;
    }
    let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
      Ok(file) => file,
      Err(e) if e.kind() == ErrorKind::AlreadyExists => return Err(Ead2dcError::BuildInProgress(path)),
      Err(e) => return Err(e.into()),
    };
    writeln!(file, "{}", std::process::id())?;
    debug!("Acquired build lock {}", path.display());
    Ok(Self { path })
  }

  /// Path of the lock file.
  pub fn path(&self) -> &Path { &self.path }
}

impl Drop for BuildLock {
  fn drop(&mut self) {
    if let Err(e) = fs::remove_file(&self.path) {
      warn!("Could not remove build lock {}: {e}", self.path.display());
    }
  }
}

/// `path` with `suffix` appended to its file name.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
  let mut name = OsString::from(path.as_os_str());
  name.push(suffix);
  PathBuf::from(name)
}

/// Rebuilds the static repository and the collection table.
///
/// # Errors
///
/// Fails without touching the published document when the lock is held, the API
/// rejects the credentials or cannot be listed, or the database or file system fail.
pub async fn rebuild<A: ArchivesSpace + ?Sized>(
  api: &A,
  db: &Database,
  config: &Config,
  options: &BuildOptions,
) -> Result<BuildReport, Ead2dcError> {
  let output = config.paths.xml.clone();
  let _lock = BuildLock::acquire(&output)?;
  info!("Rebuilding {}", output.display());

  let map = correlate(api, config.archivesspace.repository).await?;
  let built = RecordBuilder::new(api, config).build_all(&map, options.limit).await?;

  let mut sets = Vec::new();
  let mut rows = Vec::new();
  let mut withdrawn = BTreeSet::new();
  for (reference, stats) in &built.stats {
    let Some((title, description)) = describe_collection(api, reference).await? else {
      withdrawn.insert(reference.set_spec());
      continue;
    };
    sets.push(OaiSet {
      set_spec:    reference.set_spec(),
      set_name:    title.clone(),
      description: description.clone(),
    });
    rows.push(CollectionRow {
      reference: *reference,
      title,
      description,
      included: false,
      stats: stats.clone(),
    });
  }

  let mut records = built.records;
  let mut skipped = built.skipped;
  if !withdrawn.is_empty() {
    let before = records.len();
    for record in &mut records {
      record.header.set_specs.retain(|set_spec| !withdrawn.contains(set_spec));
    }
    records.retain(|record| !record.header.set_specs.is_empty());
    skipped += before - records.len();
    info!(
      "Dropped {} records of {} unpublished or suppressed collections",
      before - records.len(),
      withdrawn.len()
    );
  }

  let earliest = match records.iter().map(|r| r.header.datestamp.as_str()).min() {
    Some(earliest) => earliest.to_string(),
    None => db.earliest_datestamp().await.unwrap_or_else(|_| FALLBACK_EARLIEST.to_string()),
  };

  let repository = StaticRepository {
    identify:         Identify::new(&config.repository, earliest.clone()),
    metadata_formats: vec![MetadataFormat::oai_dc()],
    sets,
    records,
  };

  let temporary = sibling(&output, ".tmp");
  tokio::fs::write(&temporary, repository.to_xml()?).await?;

  let collections = match db.replace_collections(rows, earliest.clone()).await {
    Ok(collections) => collections,
    Err(e) => {
      let _ = tokio::fs::remove_file(&temporary).await;
      return Err(e);
    },
  };
  tokio::fs::rename(&temporary, &output).await?;

  let report = BuildReport {
    records: repository.records.len(),
    skipped,
    collections,
    earliest,
    output,
  };
  info!(
    "Wrote {} records in {} collections to {} ({} skipped)",
    report.records,
    report.collections,
    report.output.display(),
    report.skipped
  );
  Ok(report)
}

/// Title and set description of a collection.
///
/// A collection that cannot be fetched is described by its path. An unpublished or
/// suppressed collection gives `None`.
async fn describe_collection<A: ArchivesSpace + ?Sized>(
  api: &A,
  reference: &RecordRef,
) -> Result<Option<(String, String)>, Ead2dcError> {
  match fetch::<Collection, A>(api, &reference.to_string()).await {
    Ok(collection) if !collection.is_published() => {
      debug!("Withdrawing unpublished or suppressed collection {reference}");
      Ok(None)
    },
    Ok(collection) => {
      let title = collection
        .title
        .as_deref()
        .map(format::collapse_whitespace)
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| reference.to_string());
      Ok(Some((title, collection.description())))
    },
    Err(Ead2dcError::Unauthorized) => Err(Ead2dcError::Unauthorized),
    Err(e) => {
      warn!("Could not fetch collection {reference}: {e}");
      Ok(Some((reference.to_string(), String::new())))
    },
  }
}

#[cfg(test)]
mod tests {
  use tempfile::tempdir;

  use super::*;

  #[test]
  fn test_lock_is_exclusive() {
    let dir = tempdir().unwrap();
    let xml = dir.path().join("repo.xml");

    let lock = BuildLock::acquire(&xml).unwrap();
    assert_eq!(lock.path(), dir.path().join("repo.xml.lock"));
    assert!(matches!(BuildLock::acquire(&xml), Err(Ead2dcError::BuildInProgress(_))));

    drop(lock);
    assert!(!dir.path().join("repo.xml.lock").exists());
    assert!(BuildLock::acquire(&xml).is_ok());
  }

  #[test]
  fn test_sibling_appends_suffix() {
    assert_eq!(sibling(Path::new("/data/caltecharchives.xml"), ".tmp"), PathBuf::from(
      "/data/caltecharchives.xml.tmp"
    ));
  }
}
