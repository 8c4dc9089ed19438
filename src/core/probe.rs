use crate::core::scanner::FoundFile;
use crate::model::{Identity, Timestamp};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{path}: Unable to stat(): {source}")]
pub struct ProbeError {
    pub path: String,
    #[source]
    pub source: std::io::Error,
}

/// Size and modification time of a file at the moment it was probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileState {
    pub size: u64,
    pub modified_time: Timestamp,
}

pub fn probe(path: &Path) -> Result<FileState, ProbeError> {
    let stat = |source| ProbeError {
        path: path.to_string_lossy().to_string(),
        source,
    };
    let metadata = fs::metadata(path).map_err(stat)?;
    let modified = metadata.modified().map_err(stat)?;

    Ok(FileState {
        size: metadata.len(),
        modified_time: Timestamp::from(modified),
    })
}

/// Stat a scanned file and build its catalog identity.
pub fn identify(found: FoundFile) -> Result<Identity, ProbeError> {
    let state = probe(&found.full_path())?;
    Ok(Identity {
        file_name: found.file_name,
        directory_path: found.directory,
        size: state.size,
        modified_time: state.modified_time,
    })
}
