//! Conflict Detection and Preview Tree for Image Stash
//!
//! This module provides functionality for:
//! 1. Flagging planned downloads whose full paths collide
//! 2. Resolving per-entry rename policy against the batch default
//! 3. Building the directory preview tree and aggregate stats
//! 4. Uniquifying a filename against a same-directory namespace

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collection::GroupId;

/// Directory key used in the preview tree for entries with no directory.
pub const ROOT_DIRECTORY_LABEL: &str = "(root)";

/// Per-entry rename policy. `Unset` means the batch default applies; an
/// explicit value set by the user always wins over the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenamePolicy {
    #[default]
    Unset,
    Rename,
    Overwrite,
}

impl RenamePolicy {
    /// Collapse the tri-state to a boolean, applying `default_rename` to `Unset`.
    pub fn resolved(self, default_rename: bool) -> bool {
        match self {
            RenamePolicy::Unset => default_rename,
            RenamePolicy::Rename => true,
            RenamePolicy::Overwrite => false,
        }
    }

    pub fn is_set(self) -> bool {
        self != RenamePolicy::Unset
    }
}

/// One planned download. Derived data, recomputed on every planning pass and
/// never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    /// Relative directory, empty for the download root.
    pub directory: String,
    pub filename: String,
    pub url: String,
    /// `None` for ungrouped items.
    pub group_id: Option<GroupId>,
    pub has_conflict: bool,
    pub rename: RenamePolicy,
}

impl PlanEntry {
    pub fn new(directory: impl Into<String>, filename: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            filename: filename.into(),
            url: url.into(),
            group_id: None,
            has_conflict: false,
            rename: RenamePolicy::Unset,
        }
    }

    /// Full target path, `directory/filename` or just the filename when the
    /// directory is empty.
    pub fn full_path(&self) -> String {
        if self.directory.is_empty() {
            self.filename.clone()
        } else {
            format!("{}/{}", self.directory, self.filename)
        }
    }
}

/// One file in the preview tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeFile {
    pub filename: String,
    pub url: String,
    /// Position of the entry in the flat plan.
    pub index: usize,
    pub has_conflict: bool,
    pub rename: RenamePolicy,
    pub group_id: Option<GroupId>,
}

/// One directory in the preview tree, files in plan insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryNode {
    pub directory: String,
    pub files: Vec<TreeFile>,
}

/// Aggregate counts over a conflict-checked plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStats {
    pub total: usize,
    pub conflicts: usize,
    /// Conflicting entries that resolve to overwrite rather than rename.
    pub will_overwrite: usize,
}

/// Flag path collisions and resolve rename policy for every entry.
///
/// Entries sharing a full path (case-insensitive) are all flagged. An `Unset`
/// policy on a conflicting entry resolves to `auto_rename_default`; on a
/// non-conflicting entry it resolves to `Rename` (moot without a clash, but
/// populated uniformly). Explicit policies are preserved, which makes the pass
/// idempotent.
pub fn detect_conflicts(mut entries: Vec<PlanEntry>, auto_rename_default: bool) -> Vec<PlanEntry> {
    let mut occupancy: HashMap<String, usize> = HashMap::new();
    for entry in &entries {
        *occupancy.entry(entry.full_path().to_lowercase()).or_insert(0) += 1;
    }

    let default_policy = if auto_rename_default {
        RenamePolicy::Rename
    } else {
        RenamePolicy::Overwrite
    };

    let mut conflicts = 0;
    for entry in &mut entries {
        entry.has_conflict = occupancy[&entry.full_path().to_lowercase()] >= 2;
        if entry.has_conflict {
            conflicts += 1;
        }
        if !entry.rename.is_set() {
            entry.rename = if entry.has_conflict {
                default_policy
            } else {
                RenamePolicy::Rename
            };
        }
    }

    debug!(total = entries.len(), conflicts, "conflict detection pass complete");
    entries
}

/// Build the directory preview tree. Directories appear in first-seen order,
/// files within a directory in plan order; no re-sorting.
pub fn build_tree(entries: &[PlanEntry]) -> Vec<DirectoryNode> {
    let mut nodes: Vec<DirectoryNode> = Vec::new();
    let mut by_directory: HashMap<String, usize> = HashMap::new();

    for (index, entry) in entries.iter().enumerate() {
        let directory = if entry.directory.is_empty() {
            ROOT_DIRECTORY_LABEL.to_string()
        } else {
            entry.directory.clone()
        };
        let slot = *by_directory.entry(directory.clone()).or_insert_with(|| {
            nodes.push(DirectoryNode {
                directory,
                files: Vec::new(),
            });
            nodes.len() - 1
        });
        nodes[slot].files.push(TreeFile {
            filename: entry.filename.clone(),
            url: entry.url.clone(),
            index,
            has_conflict: entry.has_conflict,
            rename: entry.rename,
            group_id: entry.group_id,
        });
    }

    nodes
}

/// Aggregate stats over a conflict-checked plan.
pub fn plan_stats(entries: &[PlanEntry]) -> PlanStats {
    let conflicts = entries.iter().filter(|e| e.has_conflict).count();
    let will_overwrite = entries
        .iter()
        .filter(|e| e.has_conflict && !e.rename.resolved(true))
        .count();
    PlanStats {
        total: entries.len(),
        conflicts,
        will_overwrite,
    }
}

/// Append or increment a trailing `_N` counter on the stem of `name` until it
/// no longer collides with `existing` (a set of lowercased names from the same
/// directory).
pub fn make_unique(name: &str, existing: &HashSet<String>) -> String {
    if !existing.contains(&name.to_lowercase()) {
        return name.to_string();
    }

    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), format!(".{ext}")),
        _ => (name.to_string(), String::new()),
    };

    // A stem that already ends in `_N` continues counting from N.
    let (base, start) = match stem.rsplit_once('_') {
        Some((base, digits)) if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) => {
            (base.to_string(), digits.parse::<usize>().unwrap_or(0) + 1)
        }
        _ => (stem, 1),
    };

    let mut counter = start;
    loop {
        let candidate = format!("{base}_{counter}{extension}");
        if !existing.contains(&candidate.to_lowercase()) {
            return candidate;
        }
        counter += 1;
    }
}
