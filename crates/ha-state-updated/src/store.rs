//! Persistence of tracker snapshots

use std::sync::Arc;

use async_trait::async_trait;
use ha_runtime::{ConfigEntries, ConfigEntriesError, ConfigEntryUpdate, UpdateContext};
use tracing::{debug, instrument};

use crate::options::merge_snapshot;
use crate::tracker::Snapshot;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, entry_id: &str, snapshot: &Snapshot) -> Result<(), ConfigEntriesError>;
}

/// Stores snapshots in the config entry's options and data
pub struct ConfigEntrySnapshotStore {
    config_entries: Arc<ConfigEntries>,
}

impl ConfigEntrySnapshotStore {
    pub fn new(config_entries: Arc<ConfigEntries>) -> Self {
        Self { config_entries }
    }
}

#[async_trait]
impl SnapshotStore for ConfigEntrySnapshotStore {
    #[instrument(skip(self, snapshot))]
    async fn save(&self, entry_id: &str, snapshot: &Snapshot) -> Result<(), ConfigEntriesError> {
        let entry = self
            .config_entries
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        let mut options = entry.options;
        merge_snapshot(&mut options, snapshot);

        self.config_entries
            .update(
                entry_id,
                ConfigEntryUpdate::new()
                    .data(options.clone())
                    .options(options),
                UpdateContext::self_initiated(),
            )
            .await?;
        debug!(updated = snapshot.updated, "Saved snapshot");
        Ok(())
    }
}
