//! Runtime of one loaded config entry
//!
//! [`StateUpdatedEntry`] owns the tracker of an entry and keeps three things
//! in step with it: the persisted snapshot, the binary sensor state and the
//! issue registry.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ha_core::Context;
use ha_runtime::{ConfigEntry, Issue, IssueRegistry, IssueSeverity, StateMachine};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::binary_sensor::BinarySensor;
use crate::error::StateUpdatedResult;
use crate::options::{snapshot_from_options, StateUpdatedOptions};
use crate::store::SnapshotStore;
use crate::tracker::{ChangeTracker, ClearOutcome, ObserveOutcome};
use crate::value::{unit_suffix, TrackedValue};
use crate::{DOMAIN, TRANSLATION_KEY_MISSING_ENTITY, TRANSLATION_KEY_TEMPLATE_ERROR};

pub type SharedEntry = Arc<Mutex<StateUpdatedEntry>>;

pub struct StateUpdatedEntry {
    entry_id: String,
    options: StateUpdatedOptions,
    tracker: ChangeTracker,
    sensor: BinarySensor,
    store: Arc<dyn SnapshotStore>,
    states: Arc<StateMachine>,
    issues: Arc<IssueRegistry>,
    auto_clear_enabled: bool,
}

impl StateUpdatedEntry {
    /// Restore the entry runtime from its config entry
    pub fn new(
        entry: &ConfigEntry,
        sensor: BinarySensor,
        store: Arc<dyn SnapshotStore>,
        states: Arc<StateMachine>,
        issues: Arc<IssueRegistry>,
    ) -> StateUpdatedResult<Self> {
        let options = StateUpdatedOptions::from_options(&entry.options)?;
        let snapshot = snapshot_from_options(&entry.options)?;

        let unit = states
            .get(&options.entity_id.to_string())
            .and_then(|state| state.unit_of_measurement().map(String::from));
        let tracker =
            ChangeTracker::from_snapshot(options.tracker_settings(), &snapshot, unit_suffix(unit.as_deref()));

        let mut runtime = Self {
            entry_id: entry.entry_id.clone(),
            sensor: sensor.with_icon(options.icon.clone()),
            options,
            tracker,
            store,
            states,
            issues,
            auto_clear_enabled: true,
        };
        runtime.raise_template_issues();
        Ok(runtime)
    }

    /// Check that the watched entity exists; when it does not, raise an issue
    /// and stop auto-clearing until the entity reports a state
    pub fn verify_watched_entity(&mut self) -> bool {
        let watched = self.options.entity_id.to_string();
        if self.states.get(&watched).is_some() {
            return true;
        }

        warn!(entry_id = %self.entry_id, entity_id = %watched, "Watched entity does not exist");
        let issue = Issue::new(
            DOMAIN,
            self.missing_entity_issue_id(),
            IssueSeverity::Warning,
            TRANSLATION_KEY_MISSING_ENTITY,
        )
        .with_placeholder("entity", watched)
        .with_placeholder("state_updated_helper", self.sensor.entity_id.to_string());
        self.issues.create(issue);
        self.auto_clear_enabled = false;
        false
    }

    /// The watched entity reported a state: resolve a missing entity issue
    /// and resume auto-clearing
    pub fn watched_entity_seen(&mut self) {
        if self.auto_clear_enabled {
            return;
        }
        self.issues.delete(DOMAIN, &self.missing_entity_issue_id());
        self.auto_clear_enabled = true;
        info!(entry_id = %self.entry_id, "Watched entity appeared, auto-clear resumed");
    }

    /// Feed one observation of the watched entity
    pub async fn observe(
        &mut self,
        new_value: TrackedValue,
        old_value: TrackedValue,
        unit: Option<&str>,
        now: DateTime<Utc>,
    ) -> ObserveOutcome {
        let unit_changed = self.tracker.set_unit_suffix(unit_suffix(unit));
        let outcome = self.tracker.observe_at(new_value, old_value, now);
        if outcome == ObserveOutcome::Changed {
            info!(
                entry_id = %self.entry_id,
                new_value = %self.tracker.current_value(),
                old_value = %self.tracker.previous_value(),
                "State updated"
            );
            self.persist().await;
        }
        self.raise_template_issues();
        if outcome == ObserveOutcome::Changed || unit_changed {
            self.write_state();
        }
        outcome
    }

    pub async fn auto_clear(&mut self, now: DateTime<Utc>) -> ClearOutcome {
        let outcome = self.tracker.maybe_auto_clear(now);
        if outcome == ClearOutcome::Cleared {
            info!(entry_id = %self.entry_id, "Auto-cleared update");
            self.persist().await;
            self.write_state();
        }
        outcome
    }

    pub async fn reset(&mut self) {
        info!(entry_id = %self.entry_id, "Resetting update");
        self.tracker.reset();
        self.persist().await;
        self.write_state();
    }

    /// Save the snapshot; failures are logged and in-memory state is kept
    async fn persist(&self) {
        if let Err(err) = self.store.save(&self.entry_id, &self.tracker.snapshot()).await {
            error!(entry_id = %self.entry_id, error = %err, "Failed to save state");
        }
    }

    fn missing_entity_issue_id(&self) -> String {
        format!("{}_{}", TRANSLATION_KEY_MISSING_ENTITY, self.entry_id)
    }

    fn raise_template_issues(&mut self) {
        for failure in self.tracker.take_failures() {
            let mut hasher = DefaultHasher::new();
            (&failure.template, failure.error.to_string()).hash(&mut hasher);

            let issue = Issue::new(
                DOMAIN,
                format!(
                    "{}_{}_{:016x}",
                    TRANSLATION_KEY_TEMPLATE_ERROR,
                    self.entry_id,
                    hasher.finish()
                ),
                IssueSeverity::Error,
                TRANSLATION_KEY_TEMPLATE_ERROR,
            )
            .with_placeholder("state_updated_helper", self.sensor.entity_id.to_string())
            .with_placeholder("template", failure.template)
            .with_placeholder("error", failure.error.to_string());
            self.issues.create(issue);
        }
    }

    pub fn write_state(&self) {
        self.sensor.write(&self.states, &self.tracker);
    }

    pub fn remove_state(&self) {
        self.states.remove(&self.sensor.entity_id, Context::new());
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    pub fn options(&self) -> &StateUpdatedOptions {
        &self.options
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn auto_clear_enabled(&self) -> bool {
        self.auto_clear_enabled
    }
}

/// A set-up entry: its runtime plus the task feeding it observations
pub struct LoadedEntry {
    pub sensor_entity_id: String,
    pub runtime: SharedEntry,
    pub(crate) listener: JoinHandle<()>,
}

impl Drop for LoadedEntry {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
