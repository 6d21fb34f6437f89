//! SQLite-backed metadata store at `<dir>/library.db`.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, info};

use super::MetadataStore;
use crate::domain::photo::{ExifInfo, PhotoInfo};
use crate::error::{Error, Result};

/// Database file inside the metadata directory
pub const DATABASE_FILE: &str = "library.db";

const COMPONENT: &str = "metadata store";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS photos (
        seq         INTEGER PRIMARY KEY AUTOINCREMENT,
        id          TEXT NOT NULL UNIQUE,
        file_name   TEXT NOT NULL,
        exif_json   TEXT NOT NULL DEFAULT '{}',
        thumbnail   TEXT NOT NULL DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS settings (
        key         TEXT PRIMARY KEY,
        value       TEXT NOT NULL
    );
";

struct Bound {
    dir: PathBuf,
    conn: Mutex<Connection>,
}

/// Metadata store keeping records and settings in one SQLite file
#[derive(Default)]
pub struct SqliteMetadataStore {
    bound: Option<Bound>,
}

impl std::fmt::Debug for SqliteMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteMetadataStore")
            .field("dir", &self.dir())
            .finish()
    }
}

type Row = (String, String, String, String);

impl SqliteMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dir(&self) -> Option<&Path> {
        self.bound.as_ref().map(|b| b.dir.as_path())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        let bound = self.bound.as_ref().ok_or(Error::NotOpened(COMPONENT))?;
        // a panic while holding the lock leaves the connection usable
        Ok(bound.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    fn to_photo(row: Row) -> Result<PhotoInfo> {
        let (id, file_name, exif_json, thumbnail) = row;
        let exif: ExifInfo = serde_json::from_str(&exif_json)?;
        Ok(PhotoInfo::new(id, file_name, exif, thumbnail))
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

impl MetadataStore for SqliteMetadataStore {
    fn open(&mut self, dir: &Path) -> Result<()> {
        if self.dir() == Some(dir) {
            return Ok(());
        }
        self.close();

        std::fs::create_dir_all(dir)?;
        let conn = Connection::open(dir.join(DATABASE_FILE))?;
        conn.execute_batch(SCHEMA)?;

        info!(dir = %dir.display(), "Metadata store opened");
        self.bound = Some(Bound {
            dir: dir.to_path_buf(),
            conn: Mutex::new(conn),
        });
        Ok(())
    }

    fn close(&mut self) {
        if let Some(bound) = self.bound.take() {
            info!(dir = %bound.dir.display(), "Metadata store closed");
        }
    }

    fn is_opened(&self) -> bool {
        self.bound.is_some()
    }

    fn insert(&self, photo: &PhotoInfo) -> Result<()> {
        let exif_json = serde_json::to_string(&photo.exif_info)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO photos (id, file_name, exif_json, thumbnail) VALUES (?1, ?2, ?3, ?4)",
            params![photo.id, photo.file_name, exif_json, photo.thumbnail],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                Error::AlreadyExists(format!("photo {}", photo.id))
            } else {
                e.into()
            }
        })?;
        debug!(id = %photo.id, "Photo record inserted");
        Ok(())
    }

    fn update(&self, photo: &PhotoInfo) -> Result<()> {
        let exif_json = serde_json::to_string(&photo.exif_info)?;
        let changed = self.conn()?.execute(
            "UPDATE photos SET file_name = ?2, exif_json = ?3, thumbnail = ?4 WHERE id = ?1",
            params![photo.id, photo.file_name, exif_json, photo.thumbnail],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("photo {}", photo.id)));
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let changed = self
            .conn()?
            .execute("DELETE FROM photos WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn query(&self, id: &str) -> Result<PhotoInfo> {
        let row = self
            .conn()?
            .query_row(
                "SELECT id, file_name, exif_json, thumbnail FROM photos WHERE id = ?1",
                params![id],
                read_row,
            )
            .optional()?;
        match row {
            Some(row) => Self::to_photo(row),
            None => Err(Error::NotFound(format!("photo {}", id))),
        }
    }

    fn query_all(&self) -> Result<Vec<PhotoInfo>> {
        let rows: Vec<Row> = {
            let conn = self.conn()?;
            let mut stmt =
                conn.prepare("SELECT id, file_name, exif_json, thumbnail FROM photos ORDER BY seq")?;
            let mapped = stmt.query_map([], read_row)?;
            let rows = mapped.collect::<rusqlite::Result<Vec<Row>>>()?;
            rows
        };
        rows.into_iter().map(Self::to_photo).collect()
    }

    fn get_by_key(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn()?
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set_by_key(&self, key: &str, value: &str) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}
