pub mod repositories;

use crate::model::ParseError;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use repositories::PhotoRepository;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Could not open catalog {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Database query error: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Corrupt catalog row {row_id}: {source}")]
    Corrupt {
        row_id: i64,
        #[source]
        source: ParseError,
    },
}

/// The persistent photo catalog: one SQLite file holding the `photos` table.
pub struct Catalog {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Catalog {
    /// Open (or create) the catalog at `path` and bring its schema up to date.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        let conn = Connection::open(path).map_err(|source| CatalogError::Open {
            path: path.to_string_lossy().to_string(),
            source,
        })?;

        let catalog = Catalog {
            conn,
            path: Some(path.to_path_buf()),
        };
        catalog.init_schema()?;

        log::info!("Catalog opened at {}", path.display());
        Ok(catalog)
    }

    /// A throwaway catalog with the full schema.
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        let catalog = Catalog {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        catalog.init_schema()?;
        Ok(catalog)
    }

    fn init_schema(&self) -> Result<(), CatalogError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS photos (
                file_name   TEXT,
                path        TEXT,
                size        INTEGER,
                mtime       TEXT,
                timestamp   TEXT,
                checksum    TEXT,
                pixel_size  TEXT,
                exif_size   TEXT,
                rebuilt     TEXT
            )",
            [],
        )?;

        // Catalogs written before run markers existed lack `rebuilt`.
        if !self.has_column("photos", "rebuilt")? {
            log::info!("Adding rebuilt column to existing catalog");
            self.conn
                .execute("ALTER TABLE photos ADD COLUMN rebuilt TEXT", [])?;
        }

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS photos_idx ON photos (file_name, path, size, mtime)",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    fn has_column(&self, table: &str, column: &str) -> Result<bool, CatalogError> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", table))?;
        let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
        for name in names {
            if name? == column {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Trade durability for speed: a crash mid-run may lose the last writes.
    pub fn set_fast_writes(&self, enabled: bool) -> Result<(), CatalogError> {
        let mode = if enabled { "OFF" } else { "FULL" };
        self.conn.pragma_update(None, "synchronous", mode)?;
        Ok(())
    }

    /// Queries over the `photos` table.
    pub fn photos(&self) -> PhotoRepository<'_> {
        PhotoRepository::new(&self.conn)
    }

    /// File backing this catalog. `None` when it lives in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Value stored under `key` in the catalog settings, if any.
    pub fn setting(&self, key: &str) -> Result<Option<String>, CatalogError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT value FROM settings WHERE key = ?1")?;
        let mut rows = stmt.query_map([key], |row| row.get::<_, String>(0))?;
        let value = rows.next().transpose()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<(), CatalogError> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog").field("path", &self.path).finish()
    }
}
