use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File shrank to {actual} bytes, expected {expected}")]
    Truncated { expected: u64, actual: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    /// Length of the hex fingerprint this algorithm produces.
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha256 | HashAlgorithm::Blake3 => 64,
        }
    }

    pub fn digest(&self, data: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha1 => format!("{:x}", Sha1::digest(data)),
            HashAlgorithm::Sha256 => format!("{:x}", Sha256::digest(data)),
            HashAlgorithm::Blake3 => blake3::hash(data).to_hex().to_string(),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(format!("unknown hash algorithm: {}", other)),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Blake3 => "blake3",
        };
        f.write_str(name)
    }
}

/// Produces the content fingerprint of the first `size` bytes of a file.
pub trait ContentHasher {
    fn hash(&self, path: &Path, size: u64) -> Result<String, HashError>;
}

impl<T: ContentHasher + ?Sized> ContentHasher for &T {
    fn hash(&self, path: &Path, size: u64) -> Result<String, HashError> {
        (**self).hash(path, size)
    }
}

/// Hashes a read-only memory map of the file.
#[derive(Debug, Clone, Copy)]
pub struct MmapHasher {
    algorithm: HashAlgorithm,
}

impl MmapHasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }
}

impl Default for MmapHasher {
    fn default() -> Self {
        Self::new(HashAlgorithm::Sha1)
    }
}

impl ContentHasher for MmapHasher {
    fn hash(&self, path: &Path, size: u64) -> Result<String, HashError> {
        if size == 0 {
            return Ok(self.algorithm.digest(&[]));
        }

        let file = File::open(path)?;
        // The mapping and the descriptor are both released when this returns.
        let mmap = unsafe { Mmap::map(&file)? };

        let actual = mmap.len() as u64;
        if actual < size {
            return Err(HashError::Truncated {
                expected: size,
                actual,
            });
        }

        Ok(self.algorithm.digest(&mmap[..size as usize]))
    }
}
