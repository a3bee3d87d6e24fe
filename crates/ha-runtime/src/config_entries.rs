//! Config entries: persisted per-instance integration configuration
//!
//! Every update is saved to `.storage/core.config_entries` and then announced
//! on a change channel together with an [`UpdateContext`]. Listeners use the
//! context to tell their own writes apart from user edits.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, instrument};

use crate::storage::{Storable, Storage, StorageError};

/// Storage key for config entries
pub const STORAGE_KEY: &str = "core.config_entries";

const CHANGE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

/// One configured instance of an integration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    /// Unique identifier (ULID)
    pub entry_id: String,

    /// Integration domain
    pub domain: String,

    /// Human-readable display name
    pub title: String,

    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,

    /// User-configurable options
    #[serde(default)]
    pub options: HashMap<String, serde_json::Value>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub modified_at: DateTime<Utc>,
}

impl ConfigEntry {
    /// Create a new entry with a fresh ULID and empty data
    pub fn new(domain: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            entry_id: ulid::Ulid::new().to_string(),
            domain: domain.into(),
            title: title.into(),
            data: HashMap::new(),
            options: HashMap::new(),
            created_at: now,
            modified_at: now,
        }
    }

    /// Set the options of the entry
    pub fn with_options(mut self, options: HashMap<String, serde_json::Value>) -> Self {
        self.options = options;
        self
    }
}

/// Partial update of a config entry
#[derive(Debug, Default)]
pub struct ConfigEntryUpdate {
    pub title: Option<String>,
    pub data: Option<HashMap<String, serde_json::Value>>,
    pub options: Option<HashMap<String, serde_json::Value>>,
}

impl ConfigEntryUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn data(mut self, data: HashMap<String, serde_json::Value>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn options(mut self, options: HashMap<String, serde_json::Value>) -> Self {
        self.options = Some(options);
        self
    }
}

/// Who asked for an update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateContext {
    /// The owning integration wrote the entry itself; its update listener
    /// must not react to the write
    pub self_initiated: bool,
}

impl UpdateContext {
    /// An update made by the user or another integration
    pub fn user() -> Self {
        Self {
            self_initiated: false,
        }
    }

    /// An update the owning integration made to its own entry
    pub fn self_initiated() -> Self {
        Self {
            self_initiated: true,
        }
    }
}

/// Announcement of a saved update
#[derive(Debug, Clone)]
pub struct ConfigEntryChange {
    pub entry_id: String,
    pub domain: String,
    pub context: UpdateContext,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigEntriesData {
    entries: Vec<ConfigEntry>,
}

impl Storable for ConfigEntriesData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 5;
}

pub struct ConfigEntries {
    storage: Arc<Storage>,
    entries: DashMap<String, ConfigEntry>,
    changes: broadcast::Sender<ConfigEntryChange>,
    /// Serializes writes of the storage file
    save_lock: Mutex<()>,
}

impl ConfigEntries {
    /// Create a new, empty manager backed by `storage`
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            entries: DashMap::new(),
            changes: broadcast::channel(CHANGE_CHANNEL_CAPACITY).0,
            save_lock: Mutex::new(()),
        }
    }

    /// Load config entries from storage
    pub async fn load(&self) -> ConfigEntriesResult<()> {
        if let Some(data) = self.storage.load::<ConfigEntriesData>().await? {
            info!("Loading {} config entries from storage", data.entries.len());
            for entry in data.entries {
                self.entries.insert(entry.entry_id.clone(), entry);
            }
        }
        Ok(())
    }

    async fn save(&self) -> ConfigEntriesResult<()> {
        let _guard = self.save_lock.lock().await;
        let data = ConfigEntriesData {
            entries: self.entries.iter().map(|r| r.value().clone()).collect(),
        };
        self.storage.save(&data).await?;
        debug!("Saved {} config entries to storage", data.entries.len());
        Ok(())
    }

    /// Get a config entry by ID
    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|r| r.value().clone())
    }

    /// Get all entries for a domain
    pub fn get_by_domain(&self, domain: &str) -> Vec<ConfigEntry> {
        self.entries
            .iter()
            .filter(|r| r.domain == domain)
            .map(|r| r.value().clone())
            .collect()
    }

    /// Add a new config entry and persist it
    pub async fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        self.entries.insert(entry.entry_id.clone(), entry.clone());
        self.save().await?;

        info!(
            "Added config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry.entry_id
        );
        Ok(entry)
    }

    /// Apply an update, persist it and announce the change
    #[instrument(skip(self, update))]
    pub async fn update(
        &self,
        entry_id: &str,
        update: ConfigEntryUpdate,
        context: UpdateContext,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let updated = {
            let mut entry = self
                .entries
                .get_mut(entry_id)
                .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

            if let Some(title) = update.title {
                entry.title = title;
            }
            if let Some(data) = update.data {
                entry.data = data;
            }
            if let Some(options) = update.options {
                entry.options = options;
            }
            entry.modified_at = Utc::now();
            entry.clone()
        };

        self.save().await?;
        debug!("Updated config entry");

        // No subscriber is not an error
        let _ = self.changes.send(ConfigEntryChange {
            entry_id: updated.entry_id.clone(),
            domain: updated.domain.clone(),
            context,
        });

        Ok(updated)
    }

    /// Remove a config entry
    pub async fn remove(&self, entry_id: &str) -> ConfigEntriesResult<ConfigEntry> {
        let (_, entry) = self
            .entries
            .remove(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        self.save().await?;

        info!(
            "Removed config entry: {} ({}) [{}]",
            entry.title, entry.domain, entry_id
        );
        Ok(entry)
    }

    /// Receive every saved update from now on
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ConfigEntryChange> {
        self.changes.subscribe()
    }

    /// Number of config entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
