//! State machine holding the current state of every entity
//!
//! Every write fires a `state_changed` event carrying the old and new state.

use dashmap::DashMap;
use ha_core::events::StateChangedData;
use ha_core::{Context, EntityId, State};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::bus::EventBus;

pub struct StateMachine {
    states: DashMap<String, State>,
    bus: Arc<EventBus>,
}

impl StateMachine {
    /// Create an empty state machine firing on `bus`
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            states: DashMap::new(),
            bus,
        }
    }

    /// Write the state of an entity and fire `state_changed`
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> State {
        let key = entity_id.to_string();
        let old_state = self.states.get(&key).map(|s| s.clone());

        let new_state = match &old_state {
            Some(existing) => existing.successor(state, attributes, context.clone()),
            None => State::new(entity_id.clone(), state, attributes, context.clone()),
        };

        debug!(state = %new_state.state, "Setting entity state");
        self.states.insert(key, new_state.clone());

        self.bus.fire_typed(
            StateChangedData {
                entity_id,
                old_state,
                new_state: Some(new_state.clone()),
            },
            context,
        );

        new_state
    }

    /// Get the full state of an entity
    pub fn get(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// Get only the state string of an entity
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    /// Remove an entity's state, firing `state_changed` with no new state
    #[instrument(skip(self, context), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId, context: Context) -> Option<State> {
        let old_state = self.states.remove(&entity_id.to_string()).map(|(_, s)| s);

        if let Some(state) = &old_state {
            debug!("Removing entity state");
            self.bus.fire_typed(
                StateChangedData {
                    entity_id: entity_id.clone(),
                    old_state: Some(state.clone()),
                    new_state: None,
                },
                context,
            );
        }

        old_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_test_setup() -> (Arc<EventBus>, StateMachine) {
        let bus = Arc::new(EventBus::new());
        let states = StateMachine::new(bus.clone());
        (bus, states)
    }

    #[test]
    fn test_set_and_get_state() {
        let (_, sm) = make_test_setup();

        let entity_id = EntityId::new("sensor", "power").unwrap();
        let attrs = HashMap::from([("unit_of_measurement".to_string(), json!("W"))]);
        sm.set(entity_id, "120", attrs.clone(), Context::new());

        let state = sm.get("sensor.power").unwrap();
        assert_eq!(state.state, "120");
        assert_eq!(state.attributes, attrs);
        assert_eq!(sm.get_state("sensor.missing"), None);
    }

    #[tokio::test]
    async fn test_set_fires_state_changed_with_old_state() {
        let (bus, sm) = make_test_setup();
        let mut rx = bus.subscribe_typed::<StateChangedData>();

        let entity_id = EntityId::new("sensor", "power").unwrap();
        sm.set(entity_id.clone(), "1", HashMap::new(), Context::new());
        sm.set(entity_id, "2", HashMap::new(), Context::new());

        let first = rx.recv().await.unwrap();
        assert!(first.data.old_state.is_none());

        let second = rx.recv().await.unwrap();
        assert_eq!(second.data.old_state.unwrap().state, "1");
        assert_eq!(second.data.new_state.unwrap().state, "2");
    }

    #[tokio::test]
    async fn test_remove_fires_event_without_new_state() {
        let (bus, sm) = make_test_setup();
        let entity_id = EntityId::new("light", "hall").unwrap();
        sm.set(entity_id.clone(), "on", HashMap::new(), Context::new());

        let mut rx = bus.subscribe_typed::<StateChangedData>();
        let removed = sm.remove(&entity_id, Context::new());

        assert_eq!(removed.unwrap().state, "on");
        assert!(sm.get("light.hall").is_none());
        assert!(rx.recv().await.unwrap().data.new_state.is_none());
    }
}
