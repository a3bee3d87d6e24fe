//! Isolated host with a mock clock and temporary storage

use ha_core::{Context, EntityId, State};
use ha_runtime::{Clock, HomeAssistant};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use super::MockClock;

pub struct TestHass {
    pub hass: HomeAssistant,
    pub clock: MockClock,
    pub dir: TempDir,
}

impl TestHass {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let clock = MockClock::new();
        Self::in_dir(dir, clock)
    }

    /// A fresh host over an existing storage directory, as after a restart
    pub fn in_dir(dir: TempDir, clock: MockClock) -> Self {
        let hass = HomeAssistant::with_clock(dir.path(), Arc::new(clock.clone()));
        Self { hass, clock, dir }
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    pub fn set_state(&self, entity_id: &str, state: &str, attributes: &[(&str, Value)]) -> State {
        let entity_id: EntityId = entity_id.parse().expect("Invalid entity_id");
        let attributes: HashMap<String, Value> = attributes
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.hass.states.set(entity_id, state, attributes, Context::new())
    }

    pub fn get_state(&self, entity_id: &str) -> Option<State> {
        self.hass.states.get(entity_id)
    }

    pub fn assert_state(&self, entity_id: &str, expected: &str) {
        let state = self.hass.states.get_state(entity_id);
        assert_eq!(
            state.as_deref(),
            Some(expected),
            "Expected entity {} to be in state '{}', but was {:?}",
            entity_id,
            expected,
            state
        );
    }

    /// Wait until `condition` holds, yielding to background tasks
    pub async fn wait_until(&self, mut condition: impl FnMut(&Self) -> bool) {
        for _ in 0..200 {
            if condition(self) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not met in time");
    }

    pub async fn wait_for_state(&self, entity_id: &str, expected: &str) {
        self.wait_until(|t| t.hass.states.get_state(entity_id).as_deref() == Some(expected))
            .await;
    }

    pub fn attribute(&self, entity_id: &str, name: &str) -> Value {
        self.get_state(entity_id)
            .and_then(|s| s.attributes.get(name).cloned())
            .unwrap_or(Value::Null)
    }
}

pub fn options(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
