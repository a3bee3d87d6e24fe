//! Entry lifecycle of the state updated integration
//!
//! [`StateUpdated`] sets up every config entry of the domain, runs the shared
//! [`Coordinator`], owns the services and reloads entries whose options were
//! edited by someone other than the integration itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use ha_core::EntityId;
use ha_runtime::{ConfigEntriesError, ConfigEntry, ConfigEntryChange, HomeAssistant};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::binary_sensor::BinarySensor;
use crate::coordinator::{Coordinator, DEFAULT_TICK_INTERVAL};
use crate::entry::{LoadedEntry, SharedEntry, StateUpdatedEntry};
use crate::error::{StateUpdatedError, StateUpdatedResult};
use crate::listener::spawn_state_listener;
use crate::options::{entry_title, new_entry_options, StateUpdatedOptions};
use crate::services::{register_services, remove_services};
use crate::store::{ConfigEntrySnapshotStore, SnapshotStore};
use crate::DOMAIN;

pub struct StateUpdated {
    hass: HomeAssistant,
    store: Arc<dyn SnapshotStore>,
    entries: Arc<DashMap<String, LoadedEntry>>,
    coordinator: Arc<Coordinator>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl StateUpdated {
    pub fn new(hass: HomeAssistant) -> Arc<Self> {
        Self::with_tick_interval(hass, DEFAULT_TICK_INTERVAL)
    }

    pub fn with_tick_interval(hass: HomeAssistant, tick_interval: Duration) -> Arc<Self> {
        let store = Arc::new(ConfigEntrySnapshotStore::new(hass.config_entries.clone()));
        Self::with_store(hass, store, tick_interval)
    }

    pub fn with_store(
        hass: HomeAssistant,
        store: Arc<dyn SnapshotStore>,
        tick_interval: Duration,
    ) -> Arc<Self> {
        let entries = Arc::new(DashMap::new());
        let coordinator = Arc::new(Coordinator::new(
            entries.clone(),
            hass.clock.clone(),
            tick_interval,
        ));

        Arc::new(Self {
            hass,
            store,
            entries,
            coordinator,
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Register services, set up every entry of the domain and start the
    /// background tasks
    #[instrument(skip(self))]
    pub async fn start(self: &Arc<Self>) {
        register_services(&self.hass.services, self.entries.clone());

        for entry in self.hass.config_entries.get_by_domain(DOMAIN) {
            if let Err(err) = self.setup_entry(&entry.entry_id).await {
                error!(entry_id = %entry.entry_id, error = %err, "Failed to set up entry");
            }
        }

        let mut tasks = self.tasks.lock().await;
        tasks.push(self.coordinator.clone().spawn());
        tasks.push(self.spawn_change_listener());
        info!(entries = self.entries.len(), "State updated started");
    }

    /// Called once the host's state producers are running
    ///
    /// Checks the watched entity of every loaded entry. Entries set up later
    /// are checked as they are set up.
    pub async fn host_started(&self) {
        self.started.store(true, Ordering::SeqCst);

        let runtimes: Vec<SharedEntry> = self.entries.iter().map(|e| e.runtime.clone()).collect();
        for runtime in runtimes {
            runtime.lock().await.verify_watched_entity();
        }
    }

    /// Stop background tasks and unload every entry
    pub async fn stop(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }

        let entry_ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        for entry_id in entry_ids {
            if let Err(err) = self.unload_entry(&entry_id).await {
                warn!(entry_id = %entry_id, error = %err, "Failed to unload entry");
            }
        }
        remove_services(&self.hass.services);
    }

    /// Create, persist and set up a new entry from user options
    pub async fn create_entry(
        &self,
        options: HashMap<String, Value>,
    ) -> StateUpdatedResult<ConfigEntry> {
        let title = entry_title(&options)?;
        let options = new_entry_options(&self.hass.states, options, self.hass.clock.now())?;

        let mut entry = ConfigEntry::new(DOMAIN, title).with_options(options.clone());
        entry.data = options;

        let entry = self.hass.config_entries.add(entry).await?;
        self.setup_entry(&entry.entry_id).await?;
        Ok(entry)
    }

    #[instrument(skip(self))]
    pub async fn setup_entry(&self, entry_id: &str) -> StateUpdatedResult<()> {
        if self.entries.contains_key(entry_id) {
            return Err(StateUpdatedError::AlreadyLoaded(entry_id.to_string()));
        }
        let entry = self
            .hass
            .config_entries
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        if entry.domain != DOMAIN {
            return Err(StateUpdatedError::WrongDomain {
                entry_id: entry.entry_id,
                domain: entry.domain,
            });
        }

        let options = StateUpdatedOptions::from_options(&entry.options)?;
        let sensor_entity_id = self.free_sensor_entity_id(&entry, &options.entity_id)?;
        let sensor = BinarySensor::new(sensor_entity_id.clone(), &entry.entry_id, &entry.title);

        let mut runtime = StateUpdatedEntry::new(
            &entry,
            sensor,
            self.store.clone(),
            self.hass.states.clone(),
            self.hass.issues.clone(),
        )?;
        if self.started.load(Ordering::SeqCst) {
            runtime.verify_watched_entity();
        }
        runtime.write_state();

        let watched = runtime.options().entity_id.clone();
        let attribute = runtime.options().attribute.clone();
        let runtime = Arc::new(Mutex::new(runtime));

        let listener = spawn_state_listener(
            &self.hass.bus,
            runtime.clone(),
            watched,
            attribute,
            self.hass.clock.clone(),
        );

        self.entries.insert(
            entry_id.to_string(),
            LoadedEntry {
                sensor_entity_id: sensor_entity_id.to_string(),
                runtime,
                listener,
            },
        );
        info!(sensor = %sensor_entity_id, "Set up entry");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn unload_entry(&self, entry_id: &str) -> StateUpdatedResult<()> {
        let (_, loaded) = self
            .entries
            .remove(entry_id)
            .ok_or_else(|| StateUpdatedError::NotLoaded(entry_id.to_string()))?;

        loaded.listener.abort();
        loaded.runtime.lock().await.remove_state();
        debug!("Unloaded entry");
        Ok(())
    }

    pub async fn reload_entry(&self, entry_id: &str) -> StateUpdatedResult<()> {
        match self.unload_entry(entry_id).await {
            Ok(()) | Err(StateUpdatedError::NotLoaded(_)) => {}
            Err(err) => return Err(err),
        }
        self.setup_entry(entry_id).await
    }

    /// Unload an entry and delete it from the config entries
    pub async fn remove_entry(&self, entry_id: &str) -> StateUpdatedResult<()> {
        match self.unload_entry(entry_id).await {
            Ok(()) | Err(StateUpdatedError::NotLoaded(_)) => {}
            Err(err) => return Err(err),
        }
        self.hass.config_entries.remove(entry_id).await?;
        Ok(())
    }

    /// Run one auto-clear pass now
    pub async fn refresh(&self) -> usize {
        self.coordinator.refresh().await
    }

    pub fn entry(&self, entry_id: &str) -> Option<SharedEntry> {
        self.entries.get(entry_id).map(|e| e.runtime.clone())
    }

    pub fn sensor_entity_id(&self, entry_id: &str) -> Option<String> {
        self.entries.get(entry_id).map(|e| e.sensor_entity_id.clone())
    }

    pub fn loaded_entries(&self) -> usize {
        self.entries.len()
    }

    /// First sensor id that is not the watched entity, another entry's
    /// sensor or an existing state
    fn free_sensor_entity_id(
        &self,
        entry: &ConfigEntry,
        watched: &EntityId,
    ) -> StateUpdatedResult<EntityId> {
        let mut suffix = None;
        loop {
            let candidate = BinarySensor::entity_id_for(&entry.title, &entry.entry_id, suffix)?;
            let id = candidate.to_string();
            let taken = candidate == *watched
                || self.entries.iter().any(|e| e.sensor_entity_id == id)
                || self.hass.states.get(&id).is_some();
            if !taken {
                return Ok(candidate);
            }
            suffix = Some(suffix.map_or(2, |n| n + 1));
        }
    }

    /// Reload entries whose options changed outside the integration
    fn spawn_change_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.hass.config_entries.subscribe_changes();
        let this: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                let change: ConfigEntryChange = match rx.recv().await {
                    Ok(change) => change,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Config entry change listener lagged");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if change.domain != DOMAIN || change.context.self_initiated {
                    continue;
                }

                let Some(this) = this.upgrade() else { break };
                if !this.entries.contains_key(&change.entry_id) {
                    continue;
                }
                info!(entry_id = %change.entry_id, "Options changed, reloading entry");
                if let Err(err) = this.reload_entry(&change.entry_id).await {
                    error!(entry_id = %change.entry_id, error = %err, "Failed to reload entry");
                }
            }
        })
    }
}
