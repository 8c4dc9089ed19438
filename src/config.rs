use crate::core::hash::HashAlgorithm;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Catalog file name, relative to the scanned root.
    pub catalog_name: String,
    /// Explicit catalog location. Wins over `catalog_name`.
    pub catalog_path: Option<PathBuf>,
    pub hash_algorithm: HashAlgorithm,
    /// Lowercase extension allow-list. `None` catalogs every regular file.
    pub extensions: Option<Vec<String>>,
    /// Never catalog the catalog file or its SQLite sidecars.
    pub skip_catalog_files: bool,
    /// Run the sync loop with `PRAGMA synchronous = OFF`.
    pub fast_writes: bool,
    /// JSONL deletion log, relative to the scanned root.
    pub history_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_name: "photo.db".to_string(),
            catalog_path: None,
            hash_algorithm: HashAlgorithm::Sha1,
            extensions: None,
            skip_catalog_files: true,
            fast_writes: true,
            history_file: ".photodb-history.jsonl".to_string(),
        }
    }
}

impl Config {
    pub fn catalog_path(&self, root: &Path) -> PathBuf {
        self.catalog_path
            .clone()
            .unwrap_or_else(|| root.join(&self.catalog_name))
    }

    pub fn history_path(&self, root: &Path) -> PathBuf {
        root.join(&self.history_file)
    }

    /// Paths the scanner must ignore when `skip_catalog_files` is set.
    pub fn reserved_paths(&self, root: &Path) -> Vec<PathBuf> {
        if !self.skip_catalog_files {
            return Vec::new();
        }
        let catalog = self.catalog_path(root);
        let mut paths: Vec<PathBuf> = ["-journal", "-wal", "-shm"]
            .iter()
            .map(|suffix| {
                let mut sidecar = catalog.clone().into_os_string();
                sidecar.push(suffix);
                PathBuf::from(sidecar)
            })
            .collect();
        paths.push(catalog);
        paths.push(self.history_path(root));
        paths
    }

    pub fn set_extensions(&mut self, list: &[String]) {
        let exts: Vec<String> = list
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self.extensions = (!exts.is_empty()).then_some(exts);
    }
}
