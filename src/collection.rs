//! Collection State Machine for Image Stash
//!
//! This module provides functionality for:
//! 1. The in-memory model of grouped and ungrouped image lists
//! 2. The selection set and its lifecycle across mutations
//! 3. The drag gesture state machine (idle -> dragging -> dropped/cancelled)
//! 4. Drop disambiguation when a multi-selected item is dragged
//! 5. Insertion-index calculation from pointer coordinates
//!
//! Every image is owned by exactly one container (the ungrouped list or one
//! group), identified by its URL, which is unique across the whole collection.
//! All mutations remove from the origin container before inserting into the
//! destination, so a URL never appears in two containers at once.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::template::stem_and_extension;

/// Error types for collection operations
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CollectionError {
    #[error("group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("no drag gesture in progress")]
    NotDragging,

    #[error("no pending drop intent to resolve")]
    NoPendingDrop,
}

/// Result type for collection operations
pub type CollectionResult<T> = Result<T, CollectionError>;

/// Identifier of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(Uuid);

impl GroupId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where an image was collected from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImageSource {
    ContentScript,
    Clipboard,
    ExternalDrop,
    Import,
    #[default]
    Unknown,
}

/// One collected image reference. Identity key is `url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageItem {
    pub url: String,
    /// Derived stem used by the `{name}` template token.
    pub filename: String,
    /// Extension including the leading dot.
    pub extension: String,
    /// User-assigned filename; when set it bypasses the template entirely.
    pub custom_filename: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub source: ImageSource,
    pub added_at: DateTime<Utc>,
}

impl ImageItem {
    /// Build an item from its source URL, deriving stem and extension.
    pub fn from_url(url: impl Into<String>, source: ImageSource) -> Self {
        let url = url.into();
        let (filename, extension) = stem_and_extension(&url);
        Self {
            url,
            filename,
            extension,
            custom_filename: None,
            width: None,
            height: None,
            source,
            added_at: Utc::now(),
        }
    }
}

/// A named group of images with an optional target directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// Theme color token, e.g. "blue".
    pub color: String,
    /// Relative download directory; empty means the group name is used.
    pub directory: String,
    pub collapsed: bool,
    pub images: Vec<ImageItem>,
}

impl Group {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id: GroupId::new(),
            name: name.into(),
            color: color.into(),
            directory: String::new(),
            collapsed: false,
            images: Vec::new(),
        }
    }
}

/// The persisted root: ungrouped images plus groups, in display order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub ungrouped: Vec<ImageItem>,
    pub groups: Vec<Group>,
}

impl Collection {
    /// Iterate containers in collection order: ungrouped first, then groups.
    pub fn containers(&self) -> impl Iterator<Item = (Option<GroupId>, &Vec<ImageItem>)> {
        std::iter::once((None, &self.ungrouped))
            .chain(self.groups.iter().map(|g| (Some(g.id), &g.images)))
    }

    pub fn contains_url(&self, url: &str) -> bool {
        self.containers().any(|(_, images)| images.iter().any(|i| i.url == url))
    }

    pub fn len(&self) -> usize {
        self.containers().map(|(_, images)| images.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Live drag gesture state; exists only between drag-start and drop/cancel.
#[derive(Debug, Clone, PartialEq)]
pub struct DragState {
    pub dragged_url: String,
    /// The full moving set in collection order: the current selection when the
    /// dragged item was selected, otherwise just the dragged item.
    pub dragged_urls: Vec<String>,
    pub source_group: Option<GroupId>,
}

/// Raised when a multi-selected drag is dropped and the gesture alone cannot
/// tell whether the user meant to move one item or the whole selection.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDropIntent {
    pub dragged_url: String,
    pub selected_urls: Vec<String>,
    pub target_group: Option<GroupId>,
    pub target_index: usize,
}

/// Answer to a [`PendingDropIntent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropResolution {
    /// Move only the dragged item.
    MoveOne,
    /// Move every selected item.
    MoveAll,
}

/// Outcome of a drop gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    /// Items moved into another container.
    Moved,
    /// The dragged item changed position within its container.
    Reordered,
    /// Nothing changed (adjacent self-drop, cancelled, or unknown target).
    NoOp,
    /// A [`PendingDropIntent`] was raised; nothing moves until it is resolved.
    NeedsDisambiguation,
}

/// Given a pointer coordinate along the layout axis and the rendered items'
/// (start, end) extents along that axis (dragged items excluded), return the
/// index at which a drop would insert: before the first item whose midpoint is
/// past the pointer, or past the end.
pub fn calculate_insertion_index(pointer: f64, item_extents: &[(f64, f64)]) -> usize {
    item_extents
        .iter()
        .position(|(start, end)| pointer < (start + end) / 2.0)
        .unwrap_or(item_extents.len())
}

/// Owns the collection plus all transient UI-facing state (selection, drag,
/// pending drop intent) and is the only code that mutates them. Components
/// query it pull-style rather than holding their own copies.
#[derive(Debug, Default)]
pub struct CollectionState {
    collection: Collection,
    selection: HashSet<String>,
    drag: Option<DragState>,
    pending_drop: Option<PendingDropIntent>,
}

impl CollectionState {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            ..Default::default()
        }
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Replace the collection wholesale (after a load), clearing transient state.
    pub fn reset(&mut self, collection: Collection) {
        self.collection = collection;
        self.selection.clear();
        self.drag = None;
        self.pending_drop = None;
    }

    // ---- images ----

    /// Add an image to the ungrouped list. Duplicate URLs are a no-op;
    /// returns whether the item was inserted.
    pub fn add_image(&mut self, item: ImageItem) -> bool {
        if self.collection.contains_url(&item.url) {
            debug!(url = %item.url, "duplicate url ignored");
            return false;
        }
        self.collection.ungrouped.push(item);
        true
    }

    /// Add an image directly to a group. Duplicate URLs are a no-op.
    pub fn add_image_to_group(&mut self, group_id: GroupId, item: ImageItem) -> CollectionResult<bool> {
        if self.collection.contains_url(&item.url) {
            return Ok(false);
        }
        let group = self.group_mut(group_id)?;
        group.images.push(item);
        Ok(true)
    }

    /// Remove an image wherever it lives; returns whether anything was removed.
    pub fn remove_image(&mut self, url: &str) -> bool {
        let Some((container, index)) = self.locate(url) else {
            return false;
        };
        if let Ok(images) = self.container_mut(container) {
            images.remove(index);
        }
        self.purge_urls(&[url.to_string()]);
        true
    }

    /// Remove every ungrouped image.
    pub fn clear_ungrouped(&mut self) {
        let urls: Vec<String> = self.collection.ungrouped.iter().map(|i| i.url.clone()).collect();
        self.collection.ungrouped.clear();
        self.purge_urls(&urls);
    }

    // ---- groups ----

    pub fn create_group(&mut self, name: impl Into<String>, color: impl Into<String>) -> GroupId {
        let group = Group::new(name, color);
        let id = group.id;
        debug!(group = %id, name = %group.name, "group created");
        self.collection.groups.push(group);
        id
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.collection.groups.iter().find(|g| g.id == id)
    }

    fn group_mut(&mut self, id: GroupId) -> CollectionResult<&mut Group> {
        self.collection
            .groups
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or(CollectionError::GroupNotFound(id))
    }

    pub fn rename_group(&mut self, id: GroupId, name: impl Into<String>) -> CollectionResult<()> {
        self.group_mut(id)?.name = name.into();
        Ok(())
    }

    pub fn set_group_directory(&mut self, id: GroupId, directory: impl Into<String>) -> CollectionResult<()> {
        self.group_mut(id)?.directory = directory.into();
        Ok(())
    }

    pub fn toggle_collapsed(&mut self, id: GroupId) -> CollectionResult<bool> {
        let group = self.group_mut(id)?;
        group.collapsed = !group.collapsed;
        Ok(group.collapsed)
    }

    /// Delete a group. Its images return to the end of the ungrouped list in
    /// order; their URLs leave the selection, and any drop intent touching the
    /// group is dropped.
    pub fn delete_group(&mut self, id: GroupId) -> CollectionResult<()> {
        let position = self
            .collection
            .groups
            .iter()
            .position(|g| g.id == id)
            .ok_or(CollectionError::GroupNotFound(id))?;
        let group = self.collection.groups.remove(position);
        let urls: Vec<String> = group.images.iter().map(|i| i.url.clone()).collect();
        self.collection.ungrouped.extend(group.images);
        self.purge_urls(&urls);
        if self
            .pending_drop
            .as_ref()
            .is_some_and(|intent| intent.target_group == Some(id))
        {
            self.pending_drop = None;
        }
        debug!(group = %id, returned = urls.len(), "group deleted, images returned to ungrouped");
        Ok(())
    }

    // ---- selection ----

    pub fn select(&mut self, url: &str) {
        if self.collection.contains_url(url) {
            self.selection.insert(url.to_string());
        }
    }

    pub fn deselect(&mut self, url: &str) {
        self.selection.remove(url);
    }

    pub fn toggle_selected(&mut self, url: &str) {
        if self.selection.contains(url) {
            self.selection.remove(url);
        } else {
            self.select(url);
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn is_selected(&self, url: &str) -> bool {
        self.selection.contains(url)
    }

    pub fn selection_len(&self) -> usize {
        self.selection.len()
    }

    /// Selected URLs in collection order.
    pub fn selected_in_order(&self) -> Vec<String> {
        self.collection
            .containers()
            .flat_map(|(_, images)| images.iter())
            .filter(|item| self.selection.contains(&item.url))
            .map(|item| item.url.clone())
            .collect()
    }

    // ---- drag gesture ----

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn dragged_urls(&self) -> &[String] {
        self.drag.as_ref().map(|d| d.dragged_urls.as_slice()).unwrap_or(&[])
    }

    pub fn pending_drop(&self) -> Option<&PendingDropIntent> {
        self.pending_drop.as_ref()
    }

    /// Enter the dragging state. If the dragged item is currently selected the
    /// whole selection moves with it; otherwise it moves alone.
    pub fn start_drag(&mut self, url: &str, source_group: Option<GroupId>) -> CollectionResult<()> {
        if !self.collection.contains_url(url) {
            return Err(CollectionError::ImageNotFound(url.to_string()));
        }
        let dragged_urls = if self.selection.contains(url) {
            self.selected_in_order()
        } else {
            vec![url.to_string()]
        };
        debug!(url, count = dragged_urls.len(), "drag started");
        self.drag = Some(DragState {
            dragged_url: url.to_string(),
            dragged_urls,
            source_group,
        });
        Ok(())
    }

    /// End the gesture without a drop; no mutation occurs.
    pub fn cancel_drag(&mut self) {
        self.drag = None;
    }

    /// Resolve a drop on `target_group` at `target_index`.
    ///
    /// A single-item drop reorders within its own container (adjacent
    /// positions are a no-op) or moves across containers directly. A drop of
    /// several items raises a [`PendingDropIntent`] instead of mutating,
    /// because "move one" vs "move all selected" cannot be told apart from the
    /// gesture alone.
    pub fn drop_on(&mut self, target_group: Option<GroupId>, target_index: usize) -> CollectionResult<DropOutcome> {
        let drag = self.drag.take().ok_or(CollectionError::NotDragging)?;

        if target_group.is_some_and(|id| self.group(id).is_none()) {
            // Malformed drop target: treat like a cancelled gesture.
            return Ok(DropOutcome::NoOp);
        }

        if drag.dragged_urls.len() > 1 {
            self.pending_drop = Some(PendingDropIntent {
                dragged_url: drag.dragged_url,
                selected_urls: drag.dragged_urls,
                target_group,
                target_index,
            });
            return Ok(DropOutcome::NeedsDisambiguation);
        }

        if target_group == drag.source_group {
            return self.reorder_in(target_group, &drag.dragged_url, target_index);
        }

        self.move_images(&[drag.dragged_url], target_group, target_index)?;
        Ok(DropOutcome::Moved)
    }

    /// Answer an outstanding [`PendingDropIntent`] and perform the move.
    pub fn resolve_pending_drop(&mut self, resolution: DropResolution) -> CollectionResult<DropOutcome> {
        let intent = self.pending_drop.take().ok_or(CollectionError::NoPendingDrop)?;
        let urls = match resolution {
            DropResolution::MoveOne => vec![intent.dragged_url],
            DropResolution::MoveAll => intent.selected_urls,
        };
        self.move_images(&urls, intent.target_group, intent.target_index)?;
        Ok(DropOutcome::Moved)
    }

    /// Discard an outstanding drop intent without mutating.
    pub fn cancel_pending_drop(&mut self) {
        self.pending_drop = None;
    }

    // ---- moves ----

    /// Reorder one item within its container. Dropping adjacent to the item's
    /// own position does not move anything.
    pub fn reorder_in(
        &mut self,
        container: Option<GroupId>,
        url: &str,
        target_index: usize,
    ) -> CollectionResult<DropOutcome> {
        let images = self.container_mut(container)?;
        let source_index = images
            .iter()
            .position(|i| i.url == url)
            .ok_or_else(|| CollectionError::ImageNotFound(url.to_string()))?;

        if target_index == source_index || target_index == source_index + 1 {
            return Ok(DropOutcome::NoOp);
        }

        let item = images.remove(source_index);
        // Removal shifts everything after the source back by one.
        let adjusted = if target_index > source_index {
            target_index - 1
        } else {
            target_index
        };
        let adjusted = adjusted.min(images.len());
        images.insert(adjusted, item);
        Ok(DropOutcome::Reordered)
    }

    /// Move `urls` into `target` at `index`, preserving their relative
    /// collection order. Items are removed from every origin container before
    /// anything is inserted, and the index is adjusted for removals that sat
    /// ahead of it in the target container.
    pub fn move_images(
        &mut self,
        urls: &[String],
        target: Option<GroupId>,
        index: usize,
    ) -> CollectionResult<()> {
        if let Some(id) = target {
            if self.group(id).is_none() {
                return Err(CollectionError::GroupNotFound(id));
            }
        }

        let wanted: HashSet<&str> = urls.iter().map(String::as_str).collect();
        let mut moving: Vec<ImageItem> = Vec::new();
        let mut removed_ahead_in_target = 0usize;

        let container_ids: Vec<Option<GroupId>> =
            self.collection.containers().map(|(id, _)| id).collect();
        for container in container_ids {
            let is_target = container == target;
            let images = self.container_mut(container)?;
            let mut original_position = 0usize;
            let mut cursor = 0usize;
            while cursor < images.len() {
                if wanted.contains(images[cursor].url.as_str()) {
                    if is_target && original_position < index {
                        removed_ahead_in_target += 1;
                    }
                    moving.push(images.remove(cursor));
                } else {
                    cursor += 1;
                }
                original_position += 1;
            }
        }

        let destination = self.container_mut(target)?;
        let at = index
            .saturating_sub(removed_ahead_in_target)
            .min(destination.len());
        for (offset, item) in moving.into_iter().enumerate() {
            destination.insert(at + offset, item);
        }
        Ok(())
    }

    fn container_mut(&mut self, id: Option<GroupId>) -> CollectionResult<&mut Vec<ImageItem>> {
        match id {
            None => Ok(&mut self.collection.ungrouped),
            Some(group_id) => Ok(&mut self.group_mut(group_id)?.images),
        }
    }

    fn locate(&self, url: &str) -> Option<(Option<GroupId>, usize)> {
        for (container, images) in self.collection.containers() {
            if let Some(index) = images.iter().position(|i| i.url == url) {
                return Some((container, index));
            }
        }
        None
    }

    /// Drop URLs from the selection and from any drop intent that references them.
    fn purge_urls(&mut self, urls: &[String]) {
        for url in urls {
            self.selection.remove(url);
        }
        let drop_intent = match &mut self.pending_drop {
            Some(intent) if urls.contains(&intent.dragged_url) => true,
            Some(intent) => {
                intent.selected_urls.retain(|u| !urls.contains(u));
                intent.selected_urls.is_empty()
            }
            None => false,
        };
        if drop_intent {
            self.pending_drop = None;
        }
        let drop_drag = match &mut self.drag {
            Some(drag) if urls.contains(&drag.dragged_url) => true,
            Some(drag) => {
                drag.dragged_urls.retain(|u| !urls.contains(u));
                false
            }
            None => false,
        };
        if drop_drag {
            self.drag = None;
        }
    }
}
