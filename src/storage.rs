//! Persistence layer for Image Stash
//!
//! This module provides functionality for:
//! 1. The async key-value collaborator interface the browser host implements
//! 2. Named slots for groups, ungrouped images, and settings
//! 3. Loading and saving the collection and settings as JSON
//! 4. An in-memory implementation for tests and headless use
//!
//! The store is last-write-wins per key with no transactions. A storage
//! failure during a load is fatal to that operation: the caller keeps its
//! prior in-memory state instead of silently substituting empty defaults,
//! which would overwrite previously persisted data on the next save.

use std::collections::HashMap;

use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::collection::{Collection, Group, ImageItem};
use crate::settings::Settings;

/// Error types for persistence operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Result type for persistence operations
pub type StorageResult<T> = Result<T, StorageError>;

pub const KEY_GROUPS: &str = "groups";
pub const KEY_UNGROUPED: &str = "ungrouped";
pub const KEY_SETTINGS: &str = "settings";

/// Async key-value persistence collaborator. `get` on a missing key yields
/// `None`; concurrent writers race with last-write-wins semantics.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> BoxFuture<'_, StorageResult<Option<Value>>>;
    fn set(&self, key: &str, value: Value) -> BoxFuture<'_, StorageResult<()>>;
    fn remove(&self, key: &str) -> BoxFuture<'_, StorageResult<()>>;
}

/// In-memory [`Storage`] backed by a map.
#[derive(Default)]
pub struct MemoryStorage {
    slots: tokio::sync::Mutex<HashMap<String, Value>>,
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> BoxFuture<'_, StorageResult<Option<Value>>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.slots.lock().await.get(&key).cloned()) })
    }

    fn set(&self, key: &str, value: Value) -> BoxFuture<'_, StorageResult<()>> {
        let key = key.to_string();
        Box::pin(async move {
            self.slots.lock().await.insert(key, value);
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> BoxFuture<'_, StorageResult<()>> {
        let key = key.to_string();
        Box::pin(async move {
            self.slots.lock().await.remove(&key);
            Ok(())
        })
    }
}

/// Typed facade over the raw key-value slots.
pub struct CollectionStore<S: Storage> {
    storage: S,
}

impl<S: Storage> CollectionStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Load the persisted collection. Missing slots (first run) load as empty;
    /// a backend failure aborts the load with no partial result.
    pub async fn load_collection(&self) -> StorageResult<Collection> {
        let groups: Vec<Group> = match self.storage.get(KEY_GROUPS).await? {
            Some(value) => serde_json::from_value(value)?,
            None => Vec::new(),
        };
        let ungrouped: Vec<ImageItem> = match self.storage.get(KEY_UNGROUPED).await? {
            Some(value) => serde_json::from_value(value)?,
            None => Vec::new(),
        };
        debug!(
            groups = groups.len(),
            ungrouped = ungrouped.len(),
            "collection loaded"
        );
        Ok(Collection { ungrouped, groups })
    }

    pub async fn save_collection(&self, collection: &Collection) -> StorageResult<()> {
        self.storage
            .set(KEY_GROUPS, serde_json::to_value(&collection.groups)?)
            .await?;
        self.storage
            .set(KEY_UNGROUPED, serde_json::to_value(&collection.ungrouped)?)
            .await?;
        info!(total = collection.len(), "collection saved");
        Ok(())
    }

    /// Load settings, falling back to defaults only when the slot is absent.
    pub async fn load_settings(&self) -> StorageResult<Settings> {
        match self.storage.get(KEY_SETTINGS).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Settings::default()),
        }
    }

    pub async fn save_settings(&self, settings: &Settings) -> StorageResult<()> {
        self.storage
            .set(KEY_SETTINGS, serde_json::to_value(settings)?)
            .await
    }
}
