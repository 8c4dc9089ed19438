use super::{CatalogError, Repository};
use crate::model::{CatalogEntry, Dimension, Identity, LazyFields, ParseError, Timestamp};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

/// A (file_name, checksum) pair shared by rows at more than one path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DuplicateKey {
    pub file_name: String,
    pub checksum: String,
}

/// A `photos` row as stored, before the text columns are parsed.
struct PhotoRow {
    row_id: i64,
    file_name: String,
    path: String,
    size: u64,
    mtime: String,
    timestamp: Option<String>,
    checksum: Option<String>,
    pixel_size: Option<String>,
    exif_size: Option<String>,
    rebuilt: Option<String>,
}

impl PhotoRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(PhotoRow {
            row_id: row.get(0)?,
            file_name: row.get(1)?,
            path: row.get(2)?,
            size: row.get(3)?,
            mtime: row.get(4)?,
            timestamp: row.get(5)?,
            checksum: row.get(6)?,
            pixel_size: row.get(7)?,
            exif_size: row.get(8)?,
            rebuilt: row.get(9)?,
        })
    }

    fn into_entry(self) -> Result<CatalogEntry, CatalogError> {
        let row_id = self.row_id;
        let corrupt = |source: ParseError| CatalogError::Corrupt { row_id, source };

        Ok(CatalogEntry {
            row_id,
            identity: Identity {
                file_name: self.file_name,
                directory_path: self.path,
                size: self.size,
                modified_time: self.mtime.parse().map_err(corrupt)?,
            },
            lazy: lazy_fields(
                row_id,
                self.timestamp.as_deref(),
                self.checksum,
                self.pixel_size.as_deref(),
                self.exif_size.as_deref(),
            )?,
            last_seen: Timestamp::parse_optional(self.rebuilt.as_deref().unwrap_or(""))
                .map_err(corrupt)?,
        })
    }
}

fn lazy_fields(
    row_id: i64,
    timestamp: Option<&str>,
    checksum: Option<String>,
    pixel_size: Option<&str>,
    exif_size: Option<&str>,
) -> Result<LazyFields, CatalogError> {
    let corrupt = |source: ParseError| CatalogError::Corrupt { row_id, source };

    Ok(LazyFields {
        capture_time: Timestamp::parse_optional(timestamp.unwrap_or("")).map_err(corrupt)?,
        checksum: checksum.filter(|c| !c.is_empty()),
        pixel_size: Dimension::parse_optional(pixel_size.unwrap_or("")).map_err(corrupt)?,
        exif_size: Dimension::parse_optional(exif_size.unwrap_or("")).map_err(corrupt)?,
    })
}

/// Every query the sync and dedupe passes issue against `photos`.
pub struct PhotoRepository<'a> {
    conn: &'a Connection,
}

impl Repository for PhotoRepository<'_> {
    fn conn(&self) -> &Connection {
        self.conn
    }
}

impl<'a> PhotoRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Exact match on all four identity columns.
    pub fn find_by_identity(
        &self,
        identity: &Identity,
    ) -> Result<Option<(i64, LazyFields)>, CatalogError> {
        let rows = self.query_rows(
            "SELECT rowid, timestamp, checksum, pixel_size, exif_size FROM photos
             WHERE file_name = ?1 AND path = ?2 AND size = ?3 AND mtime = ?4
             ORDER BY rowid LIMIT 1",
            params![
                identity.file_name,
                identity.directory_path,
                identity.size,
                identity.modified_time.to_string()
            ],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            },
        )?;

        rows.into_iter()
            .next()
            .map(|(row_id, timestamp, checksum, pixel, exif)| -> Result<_, CatalogError> {
                let lazy = lazy_fields(
                    row_id,
                    timestamp.as_deref(),
                    checksum,
                    pixel.as_deref(),
                    exif.as_deref(),
                )?;
                Ok((row_id, lazy))
            })
            .transpose()
    }

    /// Insert a new row and return its rowid. Absent lazy fields are stored
    /// as empty text (`"0,0"` for dimensions).
    pub fn insert(
        &self,
        identity: &Identity,
        lazy: &LazyFields,
        marker: Timestamp,
    ) -> Result<i64, CatalogError> {
        self.execute(
            "INSERT INTO photos (file_name, path, size, mtime, timestamp, checksum, pixel_size, exif_size, rebuilt)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                identity.file_name,
                identity.directory_path,
                identity.size,
                identity.modified_time.to_string(),
                Timestamp::optional_text(lazy.capture_time),
                lazy.checksum.clone().unwrap_or_default(),
                Dimension::optional_text(lazy.pixel_size),
                Dimension::optional_text(lazy.exif_size),
                marker.to_string(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Refresh the run marker of a row. Nothing else about it changes.
    pub fn touch(&self, row_id: i64, marker: Timestamp) -> Result<(), CatalogError> {
        self.execute(
            "UPDATE photos SET rebuilt = ?1 WHERE rowid = ?2",
            params![marker.to_string(), row_id],
        )?;
        Ok(())
    }

    /// (file_name, checksum) pairs present at two or more distinct paths,
    /// in order of first insertion. Rows without a checksum never qualify.
    pub fn duplicate_keys(&self) -> Result<Vec<DuplicateKey>, CatalogError> {
        self.query_rows(
            "SELECT file_name, checksum FROM photos
             WHERE checksum IS NOT NULL AND checksum <> ''
             GROUP BY file_name, checksum
             HAVING COUNT(DISTINCT path) > 1
             ORDER BY MIN(rowid)",
            [],
            |row| {
                Ok(DuplicateKey {
                    file_name: row.get(0)?,
                    checksum: row.get(1)?,
                })
            },
        )
    }

    /// Every row sharing `file_name` and `checksum`, oldest first.
    pub fn find_by_name_and_checksum(
        &self,
        file_name: &str,
        checksum: &str,
    ) -> Result<Vec<CatalogEntry>, CatalogError> {
        self.query_rows(
            "SELECT rowid, file_name, path, size, mtime, timestamp, checksum, pixel_size, exif_size, rebuilt
             FROM photos WHERE file_name = ?1 AND checksum = ?2 ORDER BY rowid",
            params![file_name, checksum],
            PhotoRow::from_row,
        )?
        .into_iter()
        .map(PhotoRow::into_entry)
        .collect()
    }

    /// Forget every row describing one physical copy.
    pub fn delete_copy(
        &self,
        file_name: &str,
        path: &str,
        checksum: &str,
    ) -> Result<usize, CatalogError> {
        self.execute(
            "DELETE FROM photos WHERE file_name = ?1 AND path = ?2 AND checksum = ?3",
            params![file_name, path, checksum],
        )
    }

    /// The whole catalog in insertion order.
    pub fn all(&self) -> Result<Vec<CatalogEntry>, CatalogError> {
        self.query_rows(
            "SELECT rowid, file_name, path, size, mtime, timestamp, checksum, pixel_size, exif_size, rebuilt
             FROM photos ORDER BY rowid",
            [],
            PhotoRow::from_row,
        )?
        .into_iter()
        .map(PhotoRow::into_entry)
        .collect()
    }

    /// Rows not observed by the run tagged `marker` (or any later one).
    pub fn stale(&self, marker: Timestamp) -> Result<Vec<CatalogEntry>, CatalogError> {
        self.query_rows(
            "SELECT rowid, file_name, path, size, mtime, timestamp, checksum, pixel_size, exif_size, rebuilt
             FROM photos WHERE rebuilt IS NULL OR rebuilt = '' OR rebuilt < ?1 ORDER BY rowid",
            params![marker.to_string()],
            PhotoRow::from_row,
        )?
        .into_iter()
        .map(PhotoRow::into_entry)
        .collect()
    }

    /// Marker of the most recent run recorded in the catalog.
    pub fn latest_marker(&self) -> Result<Option<Timestamp>, CatalogError> {
        let latest: Option<String> =
            self.conn
                .query_row("SELECT MAX(rebuilt) FROM photos", [], |row| row.get(0))?;
        Timestamp::parse_optional(latest.as_deref().unwrap_or(""))
            .map_err(|source| CatalogError::Corrupt { row_id: 0, source })
    }

    /// Distinct lengths of the fingerprints stored so far.
    pub fn checksum_lengths(&self) -> Result<Vec<usize>, CatalogError> {
        let lengths: Vec<i64> = self.query_rows(
            "SELECT DISTINCT LENGTH(checksum) FROM photos
             WHERE checksum IS NOT NULL AND checksum <> '' ORDER BY 1",
            [],
            |row| row.get(0),
        )?;
        Ok(lengths.into_iter().map(|len| len as usize).collect())
    }

    pub fn count(&self) -> Result<i64, CatalogError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM photos", [], |row| row.get(0))?)
    }
}
