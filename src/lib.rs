//! Photo catalog synchronization and exact-duplicate removal.
//!
//! A directory tree is mirrored into a SQLite catalog keyed by
//! (file name, directory, size, mtime). New files get their capture time,
//! dimensions and content fingerprint recorded once; later runs only refresh
//! a per-run marker. Copies sharing a file name and fingerprint at different
//! paths can then be reduced to a single survivor.

pub mod config;
pub mod core;
pub mod database;
pub mod model;

pub use crate::config::Config;
pub use crate::core::duplicate::{DedupeError, DuplicateGroup, DuplicateResolver, ResolveReport};
pub use crate::core::hash::HashAlgorithm;
pub use crate::core::sync::{SyncEngine, SyncError, SyncReport};
pub use crate::database::{Catalog, CatalogError};
pub use crate::model::{CatalogEntry, Dimension, Identity, LazyFields, Timestamp};
