//! Filesystem snapshots for change detection
//!
//! CI normally feeds `detect-changes` a path list straight from the VCS.
//! When no VCS diff is available, a snapshot taken before and after gives
//! the same thing: a versioned JSON map of relative path to content hash,
//! diffed into the set of added, removed, and modified paths.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{GantryError, GantryResult};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Default snapshot location, relative to the project root
pub const SNAPSHOT_FILE: &str = ".gantry-snapshot.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub generated_at: DateTime<Utc>,
    /// Relative path -> `sha256:<hex>` content hash, sorted by path
    pub files: BTreeMap<String, String>,
}

impl Snapshot {
    /// Hash every file under `root`. The walk honors `.gitignore` so the
    /// snapshot sees the same tree a VCS diff would; `.git` itself and
    /// stored snapshot files are skipped.
    pub fn capture(root: &Path) -> GantryResult<Self> {
        let mut files = BTreeMap::new();

        let walker = ignore::WalkBuilder::new(root)
            .hidden(false)
            .require_git(false)
            .filter_entry(|entry| entry.file_name() != ".git")
            .build();

        for entry in walker {
            let entry = entry.map_err(|e| GantryError::ChangeDetection {
                reason: format!("cannot walk project tree: {e}"),
            })?;
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            if entry.file_name() == SNAPSHOT_FILE {
                continue;
            }
            let rel = entry.path().strip_prefix(root).map_err(|_| {
                GantryError::ChangeDetection {
                    reason: format!("path {} escapes project root", entry.path().display()),
                }
            })?;
            files.insert(
                rel.to_string_lossy().into_owned(),
                hash_file(entry.path())?,
            );
        }

        Ok(Snapshot {
            version: SNAPSHOT_VERSION,
            generated_at: Utc::now(),
            files,
        })
    }

    pub fn load(path: &Path) -> GantryResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| GantryError::ChangeDetection {
            reason: format!("cannot read snapshot {}: {e}", path.display()),
        })?;
        let snapshot: Snapshot =
            serde_json::from_str(&content).map_err(|e| GantryError::ChangeDetection {
                reason: format!("malformed snapshot {}: {e}", path.display()),
            })?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(GantryError::ChangeDetection {
                reason: format!(
                    "snapshot version {} unsupported (expected {SNAPSHOT_VERSION})",
                    snapshot.version
                ),
            });
        }
        Ok(snapshot)
    }

    /// Write atomically: a partially written snapshot must never be read
    /// back as a valid one.
    pub fn save(&self, path: &Path) -> GantryResult<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(&mut tmp, self).map_err(|e| {
            GantryError::ChangeDetection {
                reason: format!("cannot serialize snapshot: {e}"),
            }
        })?;
        tmp.write_all(b"\n")?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Paths added, removed, or modified between `self` and `newer`, sorted.
    pub fn diff(&self, newer: &Snapshot) -> Vec<String> {
        let mut changed = BTreeSet::new();
        for (path, hash) in &self.files {
            match newer.files.get(path) {
                Some(new_hash) if new_hash == hash => {}
                _ => {
                    changed.insert(path.clone());
                }
            }
        }
        for path in newer.files.keys() {
            if !self.files.contains_key(path) {
                changed.insert(path.clone());
            }
        }
        changed.into_iter().collect()
    }
}

fn hash_file(path: &Path) -> GantryResult<String> {
    let content = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(format!("sha256:{:x}", hasher.finalize()))
}
