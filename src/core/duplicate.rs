// Exact-duplicate resolution over the catalog.
//
// Entries are grouped by (file_name, checksum). A group with copies at two or
// more distinct paths keeps its first live copy in insertion order and loses
// the rest. A copy is live when the file on disk still has the size and mtime
// the catalog recorded for it; anything else is left alone. Two catalog paths
// that resolve to the same file on disk are one copy, never a duplicate pair.

use crate::core::probe;
use crate::core::scanner::canonical_path;
use crate::database::{Catalog, CatalogError};
use crate::model::CatalogEntry;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DedupeError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Failed to write history file {path}: {source}")]
    History {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One physical copy inside a duplicate group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub directory_path: String,
    /// Catalog rows describing this copy, oldest first.
    pub row_ids: Vec<i64>,
    /// Whether the file on disk still matches one of those rows.
    pub live: bool,
    /// Where the file really is on disk, for live copies.
    #[serde(skip)]
    pub canonical: Option<PathBuf>,
}

/// What resolution does with a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    /// First live copy. Kept.
    Survivor,
    /// Live copy at another location. Deleted.
    Redundant,
    /// Same file on disk as an earlier member, cataloged under another
    /// spelling of its path. Kept.
    Alias,
    /// Missing or changed since it was cataloged. Kept.
    Gone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub file_name: String,
    pub checksum: String,
    /// Ordered by first insertion.
    pub members: Vec<GroupMember>,
}

impl DuplicateGroup {
    fn from_entries(file_name: String, checksum: String, entries: &[CatalogEntry]) -> Self {
        let mut members: Vec<GroupMember> = Vec::new();
        for entry in entries {
            let live = is_live(entry);
            let path = &entry.identity.directory_path;
            match members.iter_mut().find(|m| &m.directory_path == path) {
                Some(member) => {
                    member.row_ids.push(entry.row_id);
                    member.live |= live;
                }
                None => members.push(GroupMember {
                    directory_path: path.clone(),
                    row_ids: vec![entry.row_id],
                    live,
                    canonical: None,
                }),
            }
        }

        for member in members.iter_mut().filter(|m| m.live) {
            member.canonical = Some(canonical_path(
                &Path::new(&member.directory_path).join(&file_name),
            ));
        }

        Self {
            file_name,
            checksum,
            members,
        }
    }

    /// Path of `member` as cataloged.
    pub fn path_of(&self, member: &GroupMember) -> PathBuf {
        Path::new(&member.directory_path).join(&self.file_name)
    }

    /// Every member with the role resolution gives it, in member order.
    pub fn roles(&self) -> Vec<(&GroupMember, MemberRole)> {
        let mut seen: HashSet<PathBuf> = HashSet::new();
        self.members
            .iter()
            .map(|member| {
                if !member.live {
                    return (member, MemberRole::Gone);
                }
                let location = member
                    .canonical
                    .clone()
                    .unwrap_or_else(|| self.path_of(member));
                let role = if seen.is_empty() {
                    MemberRole::Survivor
                } else if seen.contains(&location) {
                    MemberRole::Alias
                } else {
                    MemberRole::Redundant
                };
                seen.insert(location);
                (member, role)
            })
            .collect()
    }

    /// The copy that is kept: the first live member.
    pub fn survivor(&self) -> Option<&GroupMember> {
        self.roles()
            .into_iter()
            .find(|(_, role)| *role == MemberRole::Survivor)
            .map(|(member, _)| member)
    }

    /// Live copies at a location other than the survivor's.
    pub fn redundant(&self) -> Vec<&GroupMember> {
        self.roles()
            .into_iter()
            .filter(|(_, role)| *role == MemberRole::Redundant)
            .map(|(member, _)| member)
            .collect()
    }
}

fn is_live(entry: &CatalogEntry) -> bool {
    match probe::probe(&entry.identity.full_path()) {
        Ok(state) => {
            state.size == entry.identity.size
                && state.modified_time == entry.identity.modified_time
        }
        Err(_) => false,
    }
}

/// One resolved group, as appended to the history file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionRecord {
    pub timestamp: String,
    pub file_name: String,
    pub checksum: String,
    pub retained: String,
    pub deleted: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveReport {
    pub groups: usize,
    /// Groups left alone because fewer than two copies were live.
    pub skipped_groups: usize,
    pub deleted: Vec<PathBuf>,
    /// Redundant copies that disappeared before this run could remove them.
    /// Their rows are dropped, but they are not in `deleted` or the history.
    pub vanished: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
    pub rows_removed: usize,
}

pub struct DuplicateResolver<'a> {
    catalog: &'a Catalog,
    history: Option<PathBuf>,
}

impl<'a> DuplicateResolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            history: None,
        }
    }

    /// Append a JSON line per resolved group to `path`.
    pub fn with_history(mut self, path: PathBuf) -> Self {
        self.history = Some(path);
        self
    }

    /// Every duplicate group in the catalog. Reads only; nothing is deleted.
    pub fn find_groups(&self) -> Result<Vec<DuplicateGroup>, DedupeError> {
        let photos = self.catalog.photos();
        let mut groups = Vec::new();
        for key in photos.duplicate_keys()? {
            let entries = photos.find_by_name_and_checksum(&key.file_name, &key.checksum)?;
            groups.push(DuplicateGroup::from_entries(
                key.file_name,
                key.checksum,
                &entries,
            ));
        }
        Ok(groups)
    }

    /// Delete every redundant copy and forget its catalog rows.
    ///
    /// This removes files from disk with no confirmation step.
    pub fn resolve(&self) -> Result<ResolveReport, DedupeError> {
        let mut report = ResolveReport::default();
        for group in self.find_groups()? {
            self.resolve_group(&group, &mut report)?;
        }
        Ok(report)
    }

    fn resolve_group(
        &self,
        group: &DuplicateGroup,
        report: &mut ResolveReport,
    ) -> Result<(), DedupeError> {
        let photos = self.catalog.photos();
        report.groups += 1;

        let roles = group.roles();
        let survivor = roles
            .iter()
            .find(|(_, role)| *role == MemberRole::Survivor)
            .map(|(member, _)| *member);
        let redundant: Vec<&GroupMember> = roles
            .iter()
            .filter(|(_, role)| *role == MemberRole::Redundant)
            .map(|(member, _)| *member)
            .collect();

        let Some(survivor) = survivor.filter(|_| !redundant.is_empty()) else {
            log::info!(
                "Skipping {} ({}): only one copy left on disk",
                group.file_name,
                group.checksum
            );
            report.skipped_groups += 1;
            return Ok(());
        };

        let retained = group.path_of(survivor);
        log::info!("File: {} ({})", group.file_name, group.checksum);
        log::info!("   keep {}", retained.display());
        for (member, role) in &roles {
            if *role == MemberRole::Alias {
                log::warn!(
                    "{} is the same file as a kept copy; not deleting it",
                    group.path_of(member).display()
                );
            }
        }

        let mut deleted = Vec::new();
        for member in redundant {
            let path = group.path_of(member);
            match fs::remove_file(&path) {
                Ok(()) => {
                    log::info!("   rm {}", path.display());
                    deleted.push(path);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    log::warn!("{} vanished before it could be removed", path.display());
                    report.vanished.push(path);
                }
                Err(e) => {
                    log::warn!("Failed to delete {}: {}", path.display(), e);
                    report.failed.push(path);
                    continue;
                }
            }

            report.rows_removed +=
                photos.delete_copy(&group.file_name, &member.directory_path, &group.checksum)?;
        }

        if !deleted.is_empty() {
            self.record(&DeletionRecord {
                timestamp: Utc::now().to_rfc3339(),
                file_name: group.file_name.clone(),
                checksum: group.checksum.clone(),
                retained: retained.to_string_lossy().into_owned(),
                deleted: deleted
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect(),
            })?;
        }
        report.deleted.extend(deleted);
        Ok(())
    }

    fn record(&self, record: &DeletionRecord) -> Result<(), DedupeError> {
        let Some(path) = &self.history else {
            return Ok(());
        };
        let history_err = |source| DedupeError::History {
            path: path.to_string_lossy().to_string(),
            source,
        };

        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(history_err)?;
        writeln!(out, "{}", serde_json::to_string(record)?).map_err(history_err)?;
        Ok(())
    }
}

/// Read back a history file written by [`DuplicateResolver::with_history`].
pub fn read_history(path: &Path) -> Result<Vec<DeletionRecord>, DedupeError> {
    let content = fs::read_to_string(path).map_err(|source| DedupeError::History {
        path: path.to_string_lossy().to_string(),
        source,
    })?;

    let mut records = Vec::new();
    for (i, line) in content.lines().enumerate() {
        match serde_json::from_str::<DeletionRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("Skipping malformed history entry {}: {}", i, e),
        }
    }
    Ok(records)
}
