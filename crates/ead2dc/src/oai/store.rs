//! In-memory copy of the static repository.

use std::{sync::Arc, time::SystemTime};

use tokio::sync::RwLock;

use super::*;

/// The parsed document together with the modification time it was read at.
#[derive(Debug)]
struct Snapshot {
  /// File modification time when parsed
  modified:   SystemTime,
  /// Parsed document
  repository: Arc<StaticRepository>,
}

/// Serves the static repository, re-reading it when a rebuild replaced the file.
///
/// Readers get an [`Arc`] to a complete document; a reload swaps the whole snapshot
/// and never mutates one that is in use.
#[derive(Debug)]
pub struct SnapshotStore {
  /// Document location
  path:     PathBuf,
  /// Last snapshot
  snapshot: RwLock<Option<Snapshot>>,
}

impl SnapshotStore {
  /// Creates a store for the document at `path`. Nothing is read until the first
  /// [`SnapshotStore::current`].
  pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into(), snapshot: RwLock::new(None) } }

  /// Document location.
  pub fn path(&self) -> &Path { &self.path }

  /// The current document.
  ///
  /// # Errors
  ///
  /// [`Ead2dcError::Path`] when the file does not exist (no build has run yet), or a
  /// parse error when it is not a static repository.
  pub async fn current(&self) -> Result<Arc<StaticRepository>, Ead2dcError> {
    let modified = tokio::fs::metadata(&self.path).await?.modified()?;

    if let Some(snapshot) = self.snapshot.read().await.as_ref() {
      if snapshot.modified == modified {
        return Ok(Arc::clone(&snapshot.repository));
      }
    }

    let mut guard = self.snapshot.write().await;
    if let Some(snapshot) = guard.as_ref() {
      if snapshot.modified == modified {
        return Ok(Arc::clone(&snapshot.repository));
      }
    }

    let repository = Arc::new(StaticRepository::load(&self.path).await?);
    info!("Loaded {} records from {}", repository.records.len(), self.path.display());
    *guard = Some(Snapshot { modified, repository: Arc::clone(&repository) });
    Ok(repository)
  }
}

#[cfg(test)]
mod tests {
  use tempfile::tempdir;

  use super::*;
  use crate::{config::RepositorySettings, repository::Identify};

  #[tokio::test]
  async fn test_missing_file() {
    let dir = tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("missing.xml"));
    assert!(matches!(store.current().await, Err(Ead2dcError::Path(_))));
  }

  #[tokio::test]
  async fn test_reload_on_change() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("repo.xml");
    let mut repository = StaticRepository {
      identify: Identify::new(&RepositorySettings::default(), "2020-01-01"),
      ..Default::default()
    };
    std::fs::write(&path, repository.to_xml()?)?;

    let store = SnapshotStore::new(&path);
    let first = store.current().await?;
    assert_eq!(first.identify.earliest_datestamp, "2020-01-01");
    assert!(Arc::ptr_eq(&first, &store.current().await?));

    repository.identify.earliest_datestamp = "2019-01-01".to_string();
    std::fs::write(&path, repository.to_xml()?)?;
    let file = std::fs::File::options().write(true).open(&path)?;
    file.set_modified(SystemTime::now() + std::time::Duration::from_secs(5))?;

    let second = store.current().await?;
    assert_eq!(second.identify.earliest_datestamp, "2019-01-01");
    assert_eq!(first.identify.earliest_datestamp, "2020-01-01");
    Ok(())
  }
}
