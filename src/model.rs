use chrono::{DateTime, Datelike, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::SystemTime;
use thiserror::Error;

/// Catalog form, `2013-04-10 12:30:05.000`. The sub-second part is always `.000`.
const CANONICAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
/// EXIF form, `2013:04:10 12:30:05`.
const EXIF_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown timestamp format: {0}")]
    Timestamp(String),

    #[error("invalid dimension: {0}")]
    Dimension(String),
}

/// A wall-clock time with second precision and no timezone.
///
/// Ordering is lexicographic over (year, month, day, hour, minute, second).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    pub fn second(&self) -> u32 {
        self.0.second()
    }

    /// Parse a catalog column that may be empty. Empty means "absent".
    pub fn parse_optional(s: &str) -> Result<Option<Self>, ParseError> {
        if s.trim().is_empty() {
            Ok(None)
        } else {
            s.parse().map(Some)
        }
    }

    /// Render an optional timestamp the way the catalog stores it.
    pub fn optional_text(ts: Option<Timestamp>) -> String {
        ts.map(|t| t.to_string()).unwrap_or_default()
    }
}

impl From<NaiveDateTime> for Timestamp {
    fn from(dt: NaiveDateTime) -> Self {
        Self(dt.with_nanosecond(0).unwrap_or(dt))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from(dt.naive_utc())
    }
}

impl From<SystemTime> for Timestamp {
    fn from(t: SystemTime) -> Self {
        Self::from(DateTime::<Utc>::from(t))
    }
}

impl FromStr for Timestamp {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches('\0');
        NaiveDateTime::parse_from_str(trimmed, CANONICAL_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(trimmed, EXIF_FORMAT))
            .map(Self::from)
            .map_err(|_| ParseError::Timestamp(s.to_string()))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.000",
            self.year(),
            self.month(),
            self.day(),
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        ts.to_string()
    }
}

impl TryFrom<String> for Timestamp {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Width x height in pixels. Text form is `"<width>,<height>"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dimension {
    pub width: u32,
    pub height: u32,
}

impl Dimension {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// `"0,0"` and the empty string both mean "unknown".
    pub fn parse_optional(s: &str) -> Result<Option<Self>, ParseError> {
        if s.trim().is_empty() {
            return Ok(None);
        }
        let dim: Dimension = s.parse()?;
        Ok((dim != Dimension::default()).then_some(dim))
    }

    pub fn optional_text(dim: Option<Dimension>) -> String {
        dim.unwrap_or_default().to_string()
    }
}

impl FromStr for Dimension {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(',')
            .ok_or_else(|| ParseError::Dimension(s.to_string()))?;
        let width = w
            .trim()
            .parse()
            .map_err(|_| ParseError::Dimension(s.to_string()))?;
        let height = h
            .trim()
            .parse()
            .map_err(|_| ParseError::Dimension(s.to_string()))?;
        Ok(Self { width, height })
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.width, self.height)
    }
}

/// The natural key of a catalog entry. Two observations with equal
/// identities refer to the same file state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub file_name: String,
    pub directory_path: String,
    pub size: u64,
    pub modified_time: Timestamp,
}

impl Identity {
    pub fn full_path(&self) -> PathBuf {
        PathBuf::from(&self.directory_path).join(&self.file_name)
    }
}

/// Fields computed once, on first observation of an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LazyFields {
    pub capture_time: Option<Timestamp>,
    pub checksum: Option<String>,
    pub pixel_size: Option<Dimension>,
    pub exif_size: Option<Dimension>,
}

/// One catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub row_id: i64,
    pub identity: Identity,
    pub lazy: LazyFields,
    /// `None` only for rows written before run markers existed.
    pub last_seen: Option<Timestamp>,
}
