//! SQLite storage for collection statistics, the inclusion table and request logs.
//!
//! The schema (see `migrations/init.sql`) has four tables:
//! - `collections`: one row per collection with digital content, replaced on every build
//!   except for the operator-controlled `incl` flag
//! - `logs`: one row per OAI-PMH request
//! - `dates`: the repository's `earliestDatestamp`
//! - `last_update`: when the XML was last built (`xml`) and the selection last changed
//!   (`col`)

use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;

use super::*;
use crate::{
  builder::CollectionStats,
  classify::{HostCategory, TypeBucket},
};

/// `last_update` key for builds.
pub const LAST_UPDATE_XML: &str = "xml";
/// `last_update` key for selection changes.
pub const LAST_UPDATE_COLLECTIONS: &str = "col";

/// One row of the `collections` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRow {
  /// The collection record, stored in `collid`
  pub reference:   RecordRef,
  /// `colltitle`
  pub title:       String,
  /// `description`
  pub description: String,
  /// `incl`
  pub included:    bool,
  /// Counters and `last_edit`
  pub stats:       CollectionStats,
}

impl CollectionRow {
  /// `collno`, e.g. `30`.
  pub fn number(&self) -> String { self.reference.collection_number() }
}

/// One row of the `logs` table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestLog {
  /// Request timestamp
  pub date:       String,
  /// `verb` parameter
  pub verb:       Option<String>,
  /// Requested set
  pub set:        Option<String>,
  /// Last path segment of the `identifier` parameter
  pub identifier: Option<String>,
  /// Lower datestamp bound
  pub from:       Option<String>,
  /// Upper datestamp bound
  pub until:      Option<String>,
}

/// Database handle for ead2dc
pub struct Database {
  conn: Connection,
}

impl Database {
  /// Open or create a database at the specified path
  pub async fn open(path: impl AsRef<Path>) -> Result<Self, Ead2dcError> {
    let conn = Connection::open(path.as_ref()).await?;

    conn
      .call(|conn| {
        conn.execute_batch(include_str!(concat!(
          env!("CARGO_MANIFEST_DIR"),
          "/migrations/init.sql"
        )))?;
        Ok(())
      })
      .await?;

    Ok(Self { conn })
  }

  /// Collection numbers whose records are served.
  pub async fn included_collections(&self) -> Result<BTreeSet<String>, Ead2dcError> {
    self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare_cached("SELECT collno FROM collections WHERE incl")?;
        let numbers = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(numbers.collect::<Result<BTreeSet<_>, _>>()?)
      })
      .await
      .map_err(Ead2dcError::from)
  }

  /// Replaces the collection table with the result of a build.
  ///
  /// Each collection keeps the `incl` flag it had before; new collections start
  /// excluded. The earliest datestamp and the build time are recorded in the same
  /// transaction.
  pub async fn replace_collections(
    &self,
    rows: Vec<CollectionRow>,
    earliest: String,
  ) -> Result<usize, Ead2dcError> {
    let updated = timestamp();
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let previous = {
          let mut stmt = tx.prepare_cached("SELECT collno, incl FROM collections")?;
          let flags = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?)))?;
          flags.collect::<Result<BTreeMap<_, _>, _>>()?
        };

        tx.execute("DELETE FROM collections", [])?;
        {
          let mut stmt = tx.prepare_cached(
            "INSERT INTO collections (
                collid, collno, colltitle, description, aocount, docount, incl,
                caltechlibrary, internetarchive, youtube, other, typ,
                type_text, type_stillimage, type_movingimage, type_sound, type_other, last_edit
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
          )?;

          for row in &rows {
            let number = row.number();
            let included = previous.get(&number).copied().unwrap_or(false);
            let stats = &row.stats;
            stmt.execute(params![
              row.reference.to_string(),
              number,
              &row.title,
              &row.description,
              stats.archival_objects as i64,
              stats.digital_objects() as i64,
              included,
              stats.host_count(HostCategory::CaltechLibrary) as i64,
              stats.host_count(HostCategory::InternetArchive) as i64,
              stats.host_count(HostCategory::YouTube) as i64,
              stats.host_count(HostCategory::Other) as i64,
              row.reference.kind.singular(),
              stats.type_count(TypeBucket::Text) as i64,
              stats.type_count(TypeBucket::StillImage) as i64,
              stats.type_count(TypeBucket::MovingImage) as i64,
              stats.type_count(TypeBucket::Sound) as i64,
              stats.type_count(TypeBucket::Other) as i64,
              stats.last_edit,
            ])?;
          }
        }

        tx.execute("UPDATE dates SET earliest = ?1", params![earliest])?;
        tx.execute(
          "INSERT INTO last_update (fn, dt) VALUES (?1, ?2)
           ON CONFLICT(fn) DO UPDATE SET dt = excluded.dt",
          params![LAST_UPDATE_XML, updated],
        )?;

        tx.commit()?;
        Ok(rows.len())
      })
      .await
      .map_err(Ead2dcError::from)
  }

  /// All collections, most digital objects first.
  pub async fn list_collections(&self) -> Result<Vec<CollectionRow>, Ead2dcError> {
    self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT collid, colltitle, description, incl, aocount,
                  caltechlibrary, internetarchive, youtube, other,
                  type_text, type_stillimage, type_movingimage, type_sound, type_other, last_edit
           FROM collections
           ORDER BY docount DESC, CAST(collno AS INTEGER)",
        )?;

        let rows = stmt.query_map([], |row| {
          let count = |idx: usize| row.get::<_, i64>(idx).map(|n| n.max(0) as u64);
          let hosts = HostCategory::ALL
            .iter()
            .zip(5..)
            .map(|(category, idx)| Ok((*category, count(idx)?)))
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
          let types = TypeBucket::ALL
            .iter()
            .zip(9..)
            .map(|(bucket, idx)| Ok((*bucket, count(idx)?)))
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;

          Ok((row.get::<_, String>(0)?, CollectionRow {
            reference:   RecordRef::new(0, refs::RecordKind::Resource, 0),
            title:       row.get(1)?,
            description: row.get(2)?,
            included:    row.get(3)?,
            stats:       CollectionStats {
              archival_objects: count(4)?,
              hosts,
              types,
              last_edit: row.get(14)?,
            },
          }))
        })?;

        let mut result = Vec::new();
        for row in rows {
          let (collid, mut row) = row?;
          match collid.parse() {
            Ok(reference) => {
              row.reference = reference;
              result.push(row);
            },
            Err(e) => warn!("Ignoring collection row: {e}"),
          }
        }
        Ok(result)
      })
      .await
      .map_err(Ead2dcError::from)
  }

  /// Sets the `incl` flag of the given collection numbers.
  ///
  /// Returns the number of rows changed; unknown numbers are ignored.
  pub async fn set_included(&self, numbers: Vec<String>, included: bool) -> Result<usize, Ead2dcError> {
    let updated = timestamp();
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
          let mut stmt = tx.prepare_cached("UPDATE collections SET incl = ?1 WHERE collno = ?2")?;
          for number in &numbers {
            changed += stmt.execute(params![included, number])?;
          }
        }
        touch(&tx, LAST_UPDATE_COLLECTIONS, &updated)?;
        tx.commit()?;
        Ok(changed)
      })
      .await
      .map_err(Ead2dcError::from)
  }

  /// Includes exactly the given collection numbers and excludes every other one.
  pub async fn select_collections(&self, numbers: Vec<String>) -> Result<usize, Ead2dcError> {
    let updated = timestamp();
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("UPDATE collections SET incl = 0", [])?;
        let mut selected = 0;
        {
          let mut stmt = tx.prepare_cached("UPDATE collections SET incl = 1 WHERE collno = ?1")?;
          for number in &numbers {
            selected += stmt.execute(params![number])?;
          }
        }
        touch(&tx, LAST_UPDATE_COLLECTIONS, &updated)?;
        tx.commit()?;
        Ok(selected)
      })
      .await
      .map_err(Ead2dcError::from)
  }

  /// The stored `earliestDatestamp`.
  pub async fn earliest_datestamp(&self) -> Result<String, Ead2dcError> {
    self
      .conn
      .call(|conn| {
        Ok(conn.query_row("SELECT earliest FROM dates LIMIT 1", [], |row| row.get(0)).optional()?)
      })
      .await?
      .ok_or(Ead2dcError::DatabaseNotInitialized)
  }

  /// When `name` (`xml` or `col`) was last updated.
  pub async fn last_update(&self, name: &str) -> Result<Option<String>, Ead2dcError> {
    let name = name.to_string();
    self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row("SELECT dt FROM last_update WHERE fn = ?1", params![name], |row| row.get(0))
            .optional()?,
        )
      })
      .await
      .map_err(Ead2dcError::from)
  }

  /// Appends a request to the log.
  pub async fn log_request(&self, entry: RequestLog) -> Result<(), Ead2dcError> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO logs (date, verb, setname, identifier, datefrom, dateuntil)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          params![entry.date, entry.verb, entry.set, entry.identifier, entry.from, entry.until],
        )?;
        Ok(())
      })
      .await
      .map_err(Ead2dcError::from)
  }

  /// The most recent requests, newest first.
  pub async fn recent_requests(&self, limit: usize) -> Result<Vec<RequestLog>, Ead2dcError> {
    self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT date, verb, setname, identifier, datefrom, dateuntil
           FROM logs ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
          Ok(RequestLog {
            date:       row.get(0)?,
            verb:       row.get(1)?,
            set:        row.get(2)?,
            identifier: row.get(3)?,
            from:       row.get(4)?,
            until:      row.get(5)?,
          })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
      })
      .await
      .map_err(Ead2dcError::from)
  }
}

/// Records `updated` as the last update of `name`.
fn touch(conn: &rusqlite::Connection, name: &str, updated: &str) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO last_update (fn, dt) VALUES (?1, ?2)
     ON CONFLICT(fn) DO UPDATE SET dt = excluded.dt",
    params![name, updated],
  )?;
  Ok(())
}

/// Current time as stored in `last_update`.
fn timestamp() -> String { Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string() }
