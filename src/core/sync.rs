use crate::config::Config;
use crate::core::exif::{ExifExtractor, Metadata, MetadataExtractor};
use crate::core::hash::{ContentHasher, HashAlgorithm, MmapHasher};
use crate::core::probe;
use crate::core::scanner::{DirectoryScanner, ScanError};
use crate::database::{Catalog, CatalogError};
use crate::model::{Identity, LazyFields, Timestamp};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures that end a run. Everything else is logged and counted.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Catalog was built with {cataloged}; refusing to add {requested} fingerprints")]
    AlgorithmMismatch {
        requested: HashAlgorithm,
        cataloged: String,
    },
}

const ALGORITHM_SETTING: &str = "hash_algorithm";

/// Make sure `algorithm` is the one the catalog's fingerprints were made with,
/// recording it on first use.
///
/// Fingerprints from different algorithms never compare equal, so a mixed
/// catalog would silently stop finding duplicates. Catalogs that predate the
/// setting are judged by the length of the fingerprints they already hold.
pub fn check_algorithm(catalog: &Catalog, algorithm: HashAlgorithm) -> Result<(), SyncError> {
    match catalog.setting(ALGORITHM_SETTING)? {
        Some(name) if name == algorithm.to_string() => return Ok(()),
        Some(name) => {
            return Err(SyncError::AlgorithmMismatch {
                requested: algorithm,
                cataloged: name,
            });
        }
        None => {}
    }

    let expected = algorithm.hex_len();
    if let Some(found) = catalog
        .photos()
        .checksum_lengths()?
        .into_iter()
        .find(|&len| len != expected)
    {
        return Err(SyncError::AlgorithmMismatch {
            requested: algorithm,
            cataloged: format!("{}-character fingerprints", found),
        });
    }

    catalog.set_setting(ALGORITHM_SETTING, &algorithm.to_string())?;
    Ok(())
}

/// Outcome of synchronizing one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// No matching identity: metadata and fingerprint computed, row inserted.
    New(i64),
    /// Matching identity: only the run marker was refreshed.
    Known(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub marker: Timestamp,
    pub discovered: usize,
    pub new: usize,
    pub known: usize,
    /// Files that could not be probed after enumeration.
    pub skipped: usize,
    pub extraction_failures: usize,
    pub hash_failures: usize,
}

impl SyncReport {
    fn new(marker: Timestamp) -> Self {
        Self {
            marker,
            discovered: 0,
            new: 0,
            known: 0,
            skipped: 0,
            extraction_failures: 0,
            hash_failures: 0,
        }
    }
}

/// Brings the catalog in line with a directory tree.
///
/// A run first enumerates and probes the whole tree, then walks the probed
/// files in scan order. Files whose identity is already cataloged only get
/// their run marker refreshed; everything else is extracted, hashed and
/// inserted. Rows are never deleted here.
pub struct SyncEngine<'a, E = ExifExtractor, H = MmapHasher> {
    catalog: &'a Catalog,
    extractor: E,
    hasher: H,
    reserved: Vec<PathBuf>,
    extensions: Option<Vec<String>>,
    algorithm: Option<HashAlgorithm>,
    progress: ProgressBar,
}

impl<'a> SyncEngine<'a> {
    /// Engine with the EXIF extractor, SHA-1 hashing and no filters.
    pub fn new(catalog: &'a Catalog) -> Self {
        Self::with_components(catalog, ExifExtractor::new(), MmapHasher::default())
    }

    /// Engine for `root` as configured: hash algorithm, extension filter and
    /// the catalog's own files excluded from the walk. Runs refuse to start if
    /// the catalog was built with another hash algorithm.
    pub fn from_config(catalog: &'a Catalog, config: &Config, root: &Path) -> Self {
        let mut engine = Self::with_components(
            catalog,
            ExifExtractor::new(),
            MmapHasher::new(config.hash_algorithm),
        )
        .with_reserved(config.reserved_paths(root))
        .with_extensions(config.extensions.clone());
        engine.algorithm = Some(config.hash_algorithm);
        engine
    }
}

impl<'a, E, H> SyncEngine<'a, E, H>
where
    E: MetadataExtractor,
    H: ContentHasher,
{
    /// Engine with caller-supplied extraction and hashing.
    pub fn with_components(catalog: &'a Catalog, extractor: E, hasher: H) -> Self {
        Self {
            catalog,
            extractor,
            hasher,
            reserved: Vec::new(),
            extensions: None,
            algorithm: None,
            progress: ProgressBar::hidden(),
        }
    }

    /// Paths the walk must never yield.
    pub fn with_reserved(mut self, paths: Vec<PathBuf>) -> Self {
        self.reserved = paths;
        self
    }

    /// Restrict the walk to these extensions. `None` accepts every file.
    pub fn with_extensions(mut self, extensions: Option<Vec<String>>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Report progress on `progress` instead of a hidden bar.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Synchronize `root` under a marker taken from the current time.
    pub fn run(&self, root: &Path) -> Result<SyncReport, SyncError> {
        self.run_with_marker(root, Timestamp::now())
    }

    /// Synchronize `root`, tagging every observed row with `marker`.
    pub fn run_with_marker(&self, root: &Path, marker: Timestamp) -> Result<SyncReport, SyncError> {
        if let Some(algorithm) = self.algorithm {
            check_algorithm(self.catalog, algorithm)?;
        }
        let mut report = SyncReport::new(marker);

        let identities = self.discover(root, &mut report)?;
        log::info!("{} Files.", identities.len());

        self.progress.set_length(identities.len() as u64);
        for identity in &identities {
            self.sync_file(identity, marker, &mut report)?;
            self.progress.inc(1);
            self.progress
                .set_message(format!("new: {}; old: {}", report.new, report.known));
        }
        self.progress.finish();

        log::info!("new: {}; old: {}", report.new, report.known);
        Ok(report)
    }

    /// Enumerate and probe the whole tree. A traversal failure aborts before
    /// anything is written; a probe failure only drops that file.
    fn discover(&self, root: &Path, report: &mut SyncReport) -> Result<Vec<Identity>, ScanError> {
        let scanner = DirectoryScanner::new(root)?
            .with_reserved(self.reserved.iter().cloned())
            .with_extensions(self.extensions.as_deref());

        let mut identities = Vec::new();
        for found in scanner {
            let found = found?;
            report.discovered += 1;
            match probe::identify(found) {
                Ok(identity) => identities.push(identity),
                Err(e) => {
                    log::warn!("{}", e);
                    report.skipped += 1;
                }
            }
        }
        Ok(identities)
    }

    /// Decide one file: refresh the marker of a known identity, or extract,
    /// hash and insert a new one.
    pub fn sync_file(
        &self,
        identity: &Identity,
        marker: Timestamp,
        report: &mut SyncReport,
    ) -> Result<FileStatus, CatalogError> {
        let photos = self.catalog.photos();

        if let Some((row_id, _)) = photos.find_by_identity(identity)? {
            photos.touch(row_id, marker)?;
            report.known += 1;
            log::debug!("DB  {}", identity.full_path().display());
            return Ok(FileStatus::Known(row_id));
        }

        let lazy = self.compute_lazy_fields(identity, report);
        let row_id = photos.insert(identity, &lazy, marker)?;
        report.new += 1;
        log::debug!("NEW {}", identity.full_path().display());
        Ok(FileStatus::New(row_id))
    }

    fn compute_lazy_fields(&self, identity: &Identity, report: &mut SyncReport) -> LazyFields {
        let path = identity.full_path();

        let metadata = match self.extractor.extract(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                log::warn!("Failed to extract metadata from {}: {}", path.display(), e);
                report.extraction_failures += 1;
                Metadata::default()
            }
        };

        let checksum = match self.hasher.hash(&path, identity.size) {
            Ok(checksum) => Some(checksum),
            Err(e) => {
                log::warn!("Failed to hash {}: {}", path.display(), e);
                report.hash_failures += 1;
                None
            }
        };

        LazyFields {
            capture_time: metadata.capture_time,
            checksum,
            pixel_size: metadata.pixel_size,
            exif_size: metadata.exif_size,
        }
    }
}
