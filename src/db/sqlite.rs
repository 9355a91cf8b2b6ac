//! SQLite backend implementation.
//!
//! The scanner and the playlist each own one `SqliteDb` on the same file.
//! WAL mode lets the reader proceed while the writer commits; every write
//! touches one row (or one batch of deletes) inside its own transaction.

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::schema::{MIGRATIONS, SCHEMA, SCHEMA_VERSION};
use super::{Candidate, ImageMetadata, ImageRecord, Ordering, Predicate, UpsertOutcome};
use crate::error::StorageResult;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const RECORD_COLUMNS: &str = r#"
    file_id, path, last_modified,
    orientation, width, height, is_portrait,
    exif_datetime, f_number, exposure_time, iso, focal_length,
    make, model, lens, rating,
    latitude, longitude, location,
    title, caption, tags
"#;

pub struct SqliteDb {
    conn: Connection,
}

impl SqliteDb {
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "store opened");
        Ok(Self { conn })
    }

    pub fn initialize(&self) -> StorageResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        self.run_migrations()?;
        Ok(())
    }

    fn run_migrations(&self) -> StorageResult<()> {
        let stored: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        for (version, migration) in MIGRATIONS {
            if *version <= stored {
                continue;
            }
            // A crash between ALTER and the version bump leaves columns
            // that already exist; those errors are harmless.
            if let Err(e) = self.conn.execute(migration, []) {
                debug!(version, error = %e, "migration step skipped");
            }
        }

        if stored < SCHEMA_VERSION {
            self.conn
                .pragma_update(None, "user_version", SCHEMA_VERSION)?;
            info!(from = stored, to = SCHEMA_VERSION, "store schema upgraded");
        } else if stored > SCHEMA_VERSION {
            info!(
                stored,
                supported = SCHEMA_VERSION,
                "store written by a newer version; extra columns ignored"
            );
        }
        Ok(())
    }

    pub fn schema_version(&self) -> StorageResult<i64> {
        Ok(self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?)
    }

    // ========================================================================
    // Scanner operations (sole writer)
    // ========================================================================

    /// Insert an unseen path, rewrite a path whose fingerprint changed,
    /// leave everything else untouched.
    pub fn upsert(
        &self,
        path: &Path,
        last_modified: f64,
        meta: &ImageMetadata,
    ) -> StorageResult<UpsertOutcome> {
        let path_str = path.to_string_lossy().to_string();
        let tx = self.conn.unchecked_transaction()?;

        let existing: Option<(i64, f64)> = tx
            .query_row(
                "SELECT file_id, last_modified FROM images WHERE path = ?",
                [path_str.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let exif_datetime = meta.exif_datetime.unwrap_or(last_modified);

        let outcome = match existing {
            Some((file_id, stored)) if stored == last_modified => UpsertOutcome::Unchanged(file_id),
            Some((file_id, _)) => {
                tx.execute(
                    r#"
                    UPDATE images SET
                        last_modified = ?,
                        orientation = ?, width = ?, height = ?, is_portrait = ?,
                        exif_datetime = ?, f_number = ?, exposure_time = ?, iso = ?, focal_length = ?,
                        make = ?, model = ?, lens = ?, rating = ?,
                        latitude = ?, longitude = ?, location = ?,
                        title = ?, caption = ?, tags = ?
                    WHERE file_id = ?
                    "#,
                    rusqlite::params![
                        last_modified,
                        meta.orientation,
                        meta.width,
                        meta.height,
                        meta.is_portrait(),
                        exif_datetime,
                        meta.f_number,
                        meta.exposure_time,
                        meta.iso,
                        meta.focal_length,
                        meta.make,
                        meta.model,
                        meta.lens,
                        meta.rating,
                        meta.latitude,
                        meta.longitude,
                        meta.location,
                        meta.title,
                        meta.caption,
                        meta.tags,
                        file_id,
                    ],
                )?;
                UpsertOutcome::Updated(file_id)
            }
            None => {
                tx.execute(
                    r#"
                    INSERT INTO images (
                        path, last_modified,
                        orientation, width, height, is_portrait,
                        exif_datetime, f_number, exposure_time, iso, focal_length,
                        make, model, lens, rating,
                        latitude, longitude, location,
                        title, caption, tags
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                    rusqlite::params![
                        path_str,
                        last_modified,
                        meta.orientation,
                        meta.width,
                        meta.height,
                        meta.is_portrait(),
                        exif_datetime,
                        meta.f_number,
                        meta.exposure_time,
                        meta.iso,
                        meta.focal_length,
                        meta.make,
                        meta.model,
                        meta.lens,
                        meta.rating,
                        meta.latitude,
                        meta.longitude,
                        meta.location,
                        meta.title,
                        meta.caption,
                        meta.tags,
                    ],
                )?;
                UpsertOutcome::Inserted(tx.last_insert_rowid())
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    /// Path → fingerprint for every stored record, loaded once per pass.
    pub fn fingerprints(&self) -> StorageResult<HashMap<PathBuf, f64>> {
        let mut stmt = self.conn.prepare("SELECT path, last_modified FROM images")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((PathBuf::from(row.get::<_, String>(0)?), row.get::<_, f64>(1)?))
            })?
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(rows)
    }

    /// Delete records under `root` whose path was not observed during the
    /// just-completed walk. Only call after a full, uncancelled pass.
    pub fn remove_missing(&self, root: &Path, seen: &HashSet<PathBuf>) -> StorageResult<usize> {
        let stale: Vec<i64> = self
            .all_paths()?
            .into_iter()
            .filter(|(_, path)| path.starts_with(root) && !seen.contains(path))
            .map(|(file_id, _)| file_id)
            .collect();
        self.delete_ids(&stale)
    }

    pub fn all_paths(&self) -> StorageResult<Vec<(i64, PathBuf)>> {
        let mut stmt = self.conn.prepare("SELECT file_id, path FROM images")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, PathBuf::from(row.get::<_, String>(1)?)))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn delete_ids(&self, ids: &[i64]) -> StorageResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.unchecked_transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM images WHERE file_id = ?")?;
            for id in ids {
                deleted += stmt.execute([id])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    /// Records with coordinates but no resolved locality.
    pub fn records_missing_location(&self) -> StorageResult<Vec<(i64, f64, f64)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT file_id, latitude, longitude
            FROM images
            WHERE latitude IS NOT NULL AND longitude IS NOT NULL AND location IS NULL
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_location(&self, file_id: i64, location: &str) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE images SET location = ? WHERE file_id = ?",
            rusqlite::params![location, file_id],
        )?;
        Ok(())
    }

    // ========================================================================
    // Reader operations
    // ========================================================================

    /// Ids (and portrait flags) of records matching every predicate, in the
    /// requested order. Sort keys naming unknown columns are skipped.
    pub fn query(&self, predicates: &[Predicate], ordering: &Ordering) -> StorageResult<Vec<Candidate>> {
        let mut sql = String::from("SELECT file_id, is_portrait FROM images WHERE ");
        let mut params: Vec<Value> = Vec::new();
        Predicate::And(predicates.to_vec()).compile(&mut sql, &mut params);

        let mut order_terms: Vec<String> = Vec::new();
        if let Ordering::Keys { recent_after, keys } = ordering {
            if let Some(threshold) = recent_after {
                order_terms.push("(last_modified > ?) DESC".to_string());
                params.push(Value::Real(*threshold));
            }
            let columns = self.columns()?;
            for key in keys {
                if columns.contains(&key.column) {
                    let direction = if key.descending { "DESC" } else { "ASC" };
                    order_terms.push(format!("\"{}\" {}", key.column, direction));
                }
            }
        }
        if order_terms.is_empty() {
            order_terms.push("file_id ASC".to_string());
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&order_terms.join(", "));

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                Ok(Candidate {
                    file_id: row.get(0)?,
                    is_portrait: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get(&self, file_id: i64) -> StorageResult<Option<ImageRecord>> {
        let sql = format!("SELECT {} FROM images WHERE file_id = ?", RECORD_COLUMNS);
        let record = self
            .conn
            .query_row(&sql, [file_id], row_to_record)
            .optional()?;
        Ok(record)
    }

    /// Column names of the images table, as introspected from the store.
    pub fn columns(&self) -> StorageResult<BTreeSet<String>> {
        let mut stmt = self.conn.prepare("PRAGMA table_info(images)")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(names)
    }

    pub fn count(&self) -> StorageResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?)
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ImageRecord> {
    Ok(ImageRecord {
        file_id: row.get(0)?,
        path: PathBuf::from(row.get::<_, String>(1)?),
        last_modified: row.get(2)?,
        is_portrait: row.get(6)?,
        exif_datetime: row.get(7)?,
        meta: ImageMetadata {
            orientation: row.get(3)?,
            width: row.get(4)?,
            height: row.get(5)?,
            exif_datetime: Some(row.get(7)?),
            f_number: row.get(8)?,
            exposure_time: row.get(9)?,
            iso: row.get(10)?,
            focal_length: row.get(11)?,
            make: row.get(12)?,
            model: row.get(13)?,
            lens: row.get(14)?,
            rating: row.get(15)?,
            latitude: row.get(16)?,
            longitude: row.get(17)?,
            location: row.get(18)?,
            title: row.get(19)?,
            caption: row.get(20)?,
            tags: row.get(21)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Column, SortKey};
    use tempfile::tempdir;

    fn open_store(dir: &Path) -> SqliteDb {
        let db = SqliteDb::open(&dir.join("cache.db3")).unwrap();
        db.initialize().unwrap();
        db
    }

    fn landscape() -> ImageMetadata {
        ImageMetadata {
            width: 40,
            height: 30,
            ..Default::default()
        }
    }

    fn portrait() -> ImageMetadata {
        ImageMetadata {
            width: 30,
            height: 40,
            ..Default::default()
        }
    }

    #[test]
    fn test_upsert_assigns_ids_once() {
        let dir = tempdir().unwrap();
        let db = open_store(dir.path());

        let first = db.upsert(Path::new("/pics/a.jpg"), 100.0, &landscape()).unwrap();
        let second = db.upsert(Path::new("/pics/b.jpg"), 100.0, &landscape()).unwrap();
        assert!(matches!(first, UpsertOutcome::Inserted(_)));
        assert_ne!(first.file_id(), second.file_id());

        let again = db.upsert(Path::new("/pics/a.jpg"), 100.0, &portrait()).unwrap();
        assert_eq!(again, UpsertOutcome::Unchanged(first.file_id()));
        // Unchanged fingerprint: the new metadata was not written.
        assert!(!db.get(first.file_id()).unwrap().unwrap().is_portrait);

        let changed = db.upsert(Path::new("/pics/a.jpg"), 200.0, &portrait()).unwrap();
        assert_eq!(changed, UpsertOutcome::Updated(first.file_id()));
        let record = db.get(first.file_id()).unwrap().unwrap();
        assert!(record.is_portrait);
        assert_eq!(record.last_modified, 200.0);
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let dir = tempdir().unwrap();
        let db = open_store(dir.path());

        let a = db.upsert(Path::new("/pics/a.jpg"), 1.0, &landscape()).unwrap().file_id();
        db.delete_ids(&[a]).unwrap();
        let b = db.upsert(Path::new("/pics/a.jpg"), 1.0, &landscape()).unwrap().file_id();
        assert!(b > a);
    }

    #[test]
    fn test_exif_datetime_falls_back_to_mtime() {
        let dir = tempdir().unwrap();
        let db = open_store(dir.path());

        let id = db.upsert(Path::new("/pics/a.jpg"), 1234.0, &landscape()).unwrap().file_id();
        assert_eq!(db.get(id).unwrap().unwrap().exif_datetime, 1234.0);
    }

    #[test]
    fn test_remove_missing_only_under_root() {
        let dir = tempdir().unwrap();
        let db = open_store(dir.path());

        db.upsert(Path::new("/pics/keep.jpg"), 1.0, &landscape()).unwrap();
        db.upsert(Path::new("/pics/gone.jpg"), 1.0, &landscape()).unwrap();
        db.upsert(Path::new("/other/elsewhere.jpg"), 1.0, &landscape()).unwrap();

        let seen: HashSet<PathBuf> = [PathBuf::from("/pics/keep.jpg")].into_iter().collect();
        let removed = db.remove_missing(Path::new("/pics"), &seen).unwrap();

        assert_eq!(removed, 1);
        let paths: Vec<PathBuf> = db.all_paths().unwrap().into_iter().map(|(_, p)| p).collect();
        assert!(paths.contains(&PathBuf::from("/pics/keep.jpg")));
        assert!(paths.contains(&PathBuf::from("/other/elsewhere.jpg")));
        assert!(!paths.contains(&PathBuf::from("/pics/gone.jpg")));
    }

    #[test]
    fn test_query_filters_and_sorts() {
        let dir = tempdir().unwrap();
        let db = open_store(dir.path());

        let mut paris = landscape();
        paris.location = Some("Paris, France".to_string());
        db.upsert(Path::new("/pics/b.jpg"), 1.0, &paris).unwrap();
        db.upsert(Path::new("/pics/a.jpg"), 2.0, &paris).unwrap();
        db.upsert(Path::new("/pics/c.jpg"), 3.0, &landscape()).unwrap();
        db.upsert(Path::new("/elsewhere/d.jpg"), 4.0, &paris).unwrap();

        let predicates = vec![
            Predicate::path_under(Path::new("/pics")),
            Predicate::like(Column::Location, "paris"),
        ];
        let ordering = Ordering::Keys {
            recent_after: None,
            keys: vec![SortKey::asc("path")],
        };
        let rows = db.query(&predicates, &ordering).unwrap();
        let paths: Vec<PathBuf> = rows
            .iter()
            .map(|c| db.get(c.file_id).unwrap().unwrap().path)
            .collect();
        assert_eq!(paths, vec![PathBuf::from("/pics/a.jpg"), PathBuf::from("/pics/b.jpg")]);
    }

    #[test]
    fn test_query_skips_unknown_sort_columns() {
        let dir = tempdir().unwrap();
        let db = open_store(dir.path());
        db.upsert(Path::new("/pics/b.jpg"), 1.0, &landscape()).unwrap();
        db.upsert(Path::new("/pics/a.jpg"), 1.0, &landscape()).unwrap();

        let ordering = Ordering::Keys {
            recent_after: None,
            keys: vec![SortKey::asc("no_such_column; DROP TABLE images"), SortKey::asc("path")],
        };
        let rows = db.query(&[], &ordering).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(db.get(rows[0].file_id).unwrap().unwrap().path, PathBuf::from("/pics/a.jpg"));
    }

    #[test]
    fn test_recent_first() {
        let dir = tempdir().unwrap();
        let db = open_store(dir.path());
        db.upsert(Path::new("/pics/a.jpg"), 10.0, &landscape()).unwrap();
        let recent = db.upsert(Path::new("/pics/b.jpg"), 1000.0, &landscape()).unwrap().file_id();

        let ordering = Ordering::Keys {
            recent_after: Some(500.0),
            keys: vec![SortKey::asc("path")],
        };
        let rows = db.query(&[], &ordering).unwrap();
        assert_eq!(rows[0].file_id, recent);
    }

    #[test]
    fn test_columns_and_schema_version() {
        let dir = tempdir().unwrap();
        let db = open_store(dir.path());
        let columns = db.columns().unwrap();
        for name in ["file_id", "path", "exif_datetime", "is_portrait", "title", "caption", "tags"] {
            assert!(columns.contains(name), "missing column {name}");
        }
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_opens_store_from_newer_version() {
        let dir = tempdir().unwrap();
        {
            let db = open_store(dir.path());
            db.conn
                .execute("ALTER TABLE images ADD COLUMN future_field TEXT", [])
                .unwrap();
            db.conn
                .pragma_update(None, "user_version", SCHEMA_VERSION + 3)
                .unwrap();
            db.upsert(Path::new("/pics/a.jpg"), 1.0, &landscape()).unwrap();
        }

        let db = open_store(dir.path());
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION + 3);
        assert_eq!(db.count().unwrap(), 1);
        let id = db.upsert(Path::new("/pics/b.jpg"), 1.0, &landscape()).unwrap().file_id();
        assert!(db.get(id).unwrap().is_some());
    }

    #[test]
    fn test_upgrades_version_one_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.db3");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(SCHEMA).unwrap();
            conn.pragma_update(None, "user_version", 1).unwrap();
        }

        let db = SqliteDb::open(&path).unwrap();
        db.initialize().unwrap();
        assert!(db.columns().unwrap().contains("tags"));
        assert_eq!(db.schema_version().unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_missing_location_roundtrip() {
        let dir = tempdir().unwrap();
        let db = open_store(dir.path());
        let mut meta = landscape();
        meta.latitude = Some(48.85);
        meta.longitude = Some(2.35);
        let id = db.upsert(Path::new("/pics/a.jpg"), 1.0, &meta).unwrap().file_id();

        assert_eq!(db.records_missing_location().unwrap(), vec![(id, 48.85, 2.35)]);
        db.set_location(id, "Paris").unwrap();
        assert!(db.records_missing_location().unwrap().is_empty());
        assert_eq!(db.get(id).unwrap().unwrap().meta.location.as_deref(), Some("Paris"));
    }
}
