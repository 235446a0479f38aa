//! Download Planner for Image Stash
//!
//! This module provides functionality for:
//! 1. Flattening the collection (groups in order, plus the ungrouped
//!    pseudo-group) into an ordered download list
//! 2. Naming every entry via its custom filename or the filename template
//! 3. Running the result through conflict detection
//!
//! The plan is fully deterministic given a collection snapshot, a settings
//! snapshot, and a clock instant: every date token in the batch shares one
//! timestamp, so recomputation with unchanged inputs is byte-identical.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Local};
use tracing::debug;

use crate::collection::{Collection, GroupId, ImageItem};
use crate::conflict::{PlanEntry, RenamePolicy, detect_conflicts};
use crate::settings::{DEFAULT_UNGROUPED_DIRECTORY, Settings};
use crate::template::{TemplateContext, apply_template, sanitize_component};

/// Scope of the `{index}` template token. An explicit parameter of plan
/// construction rather than an implicit convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IndexScope {
    /// 1-based within each target directory.
    #[default]
    PerDirectory,
    /// 1-based across the whole batch.
    PerBatch,
}

/// Build the full download plan for the collection.
pub fn build_plan(collection: &Collection, settings: &Settings, scope: IndexScope) -> Vec<PlanEntry> {
    build_plan_at(collection, settings, scope, None, Local::now())
}

/// Build a plan covering only the selected URLs. `{index}` is renumbered
/// contiguously over the subset, not carried over from the full plan.
pub fn build_plan_for(
    collection: &Collection,
    settings: &Settings,
    scope: IndexScope,
    selected: &HashSet<String>,
) -> Vec<PlanEntry> {
    build_plan_at(collection, settings, scope, Some(selected), Local::now())
}

/// Deterministic planning entry point: the batch timestamp is a parameter so
/// the pass is a pure function of its inputs.
pub fn build_plan_at(
    collection: &Collection,
    settings: &Settings,
    scope: IndexScope,
    selected: Option<&HashSet<String>>,
    now: DateTime<Local>,
) -> Vec<PlanEntry> {
    let mut entries: Vec<PlanEntry> = Vec::new();
    let mut directory_counters: HashMap<String, usize> = HashMap::new();
    let mut batch_counter = 0usize;

    let ungrouped_label = if settings.ungrouped_directory.is_empty() {
        DEFAULT_UNGROUPED_DIRECTORY.to_string()
    } else {
        settings.ungrouped_directory.clone()
    };
    let ungrouped_directory = join_directory(&settings.download_directory, &sanitize_component(&ungrouped_label));

    plan_container(
        &collection.ungrouped,
        &ungrouped_directory,
        None,
        None,
        settings,
        scope,
        selected,
        now,
        &mut directory_counters,
        &mut batch_counter,
        &mut entries,
    );

    for group in &collection.groups {
        let label = if group.directory.is_empty() {
            sanitize_component(&group.name)
        } else {
            group.directory.clone()
        };
        let directory = join_directory(&settings.download_directory, &label);
        plan_container(
            &group.images,
            &directory,
            Some(group.id),
            Some(group.name.as_str()),
            settings,
            scope,
            selected,
            now,
            &mut directory_counters,
            &mut batch_counter,
            &mut entries,
        );
    }

    let entries = detect_conflicts(entries, settings.auto_rename);
    debug!(
        total = entries.len(),
        groups = collection.groups.len(),
        "download plan built"
    );
    entries
}

#[allow(clippy::too_many_arguments)]
fn plan_container(
    images: &[ImageItem],
    directory: &str,
    group_id: Option<GroupId>,
    group_name: Option<&str>,
    settings: &Settings,
    scope: IndexScope,
    selected: Option<&HashSet<String>>,
    now: DateTime<Local>,
    directory_counters: &mut HashMap<String, usize>,
    batch_counter: &mut usize,
    entries: &mut Vec<PlanEntry>,
) {
    for item in images {
        if selected.is_some_and(|set| !set.contains(&item.url)) {
            continue;
        }

        let index = match scope {
            IndexScope::PerDirectory => {
                let counter = directory_counters.entry(directory.to_string()).or_insert(0);
                *counter += 1;
                *counter
            }
            IndexScope::PerBatch => {
                *batch_counter += 1;
                *batch_counter
            }
        };

        let filename = match &item.custom_filename {
            Some(custom) => custom_filename(custom, &item.extension),
            None => {
                let ctx = TemplateContext {
                    name: Some(item.filename.clone()),
                    extension: Some(item.extension.clone()),
                    index: Some(index),
                    group: group_name.map(str::to_string),
                };
                apply_template(&settings.filename_template, &ctx, now)
            }
        };

        entries.push(PlanEntry {
            directory: directory.to_string(),
            filename,
            url: item.url.clone(),
            group_id,
            has_conflict: false,
            rename: RenamePolicy::Unset,
        });
    }
}

/// A custom filename bypasses the template but is still made filesystem-safe,
/// and gets the item extension appended when the user left it off.
fn custom_filename(custom: &str, extension: &str) -> String {
    let sanitized = sanitize_component(custom);
    if sanitized.contains('.') {
        sanitized
    } else {
        format!("{sanitized}{extension}")
    }
}

fn join_directory(base: &str, label: &str) -> String {
    match (base.is_empty(), label.is_empty()) {
        (true, _) => label.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}/{label}"),
    }
}
