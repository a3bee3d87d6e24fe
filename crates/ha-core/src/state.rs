//! State of an entity at a point in time

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Context, EntityId, ATTR_UNIT_OF_MEASUREMENT, STATE_UNAVAILABLE, STATE_UNKNOWN};

/// The state of one entity: its value, attributes and timestamps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub entity_id: EntityId,

    /// The state value (e.g. "on", "23.5", "unavailable")
    pub state: String,

    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// When the state value last changed
    pub last_changed: DateTime<Utc>,

    /// When the state or its attributes were last written
    pub last_updated: DateTime<Utc>,

    pub context: Context,
}

impl State {
    pub fn new(
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            state: state.into(),
            attributes,
            last_changed: now,
            last_updated: now,
            context,
        }
    }

    /// Build the successor of this state; `last_changed` only moves when the
    /// value itself changes
    pub fn successor(
        &self,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        let state = state.into();
        let last_changed = if state == self.state {
            self.last_changed
        } else {
            now
        };

        Self {
            entity_id: self.entity_id.clone(),
            state,
            attributes,
            last_changed,
            last_updated: now,
            context,
        }
    }

    /// True for the `unknown` and `unavailable` sentinel values
    pub fn is_sentinel(&self) -> bool {
        self.state == STATE_UNKNOWN || self.state == STATE_UNAVAILABLE
    }

    pub fn unit_of_measurement(&self) -> Option<&str> {
        self.attributes
            .get(ATTR_UNIT_OF_MEASUREMENT)
            .and_then(|v| v.as_str())
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        // Timestamps and context are not part of equality
        self.entity_id == other.entity_id
            && self.state == other.state
            && self.attributes == other.attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sensor() -> EntityId {
        EntityId::new("sensor", "power").unwrap()
    }

    #[test]
    fn test_successor_keeps_last_changed_for_same_value() {
        let first = State::new(sensor(), "10", HashMap::new(), Context::new());
        let second = first.successor("10", HashMap::new(), Context::new());
        assert_eq!(second.last_changed, first.last_changed);

        let third = second.successor("11", HashMap::new(), Context::new());
        assert!(third.last_changed >= second.last_changed);
        assert_eq!(third.state, "11");
    }

    #[test]
    fn test_sentinels() {
        let unknown = State::new(sensor(), STATE_UNKNOWN, HashMap::new(), Context::new());
        let unavailable = State::new(sensor(), STATE_UNAVAILABLE, HashMap::new(), Context::new());
        let real = State::new(sensor(), "0", HashMap::new(), Context::new());

        assert!(unknown.is_sentinel());
        assert!(unavailable.is_sentinel());
        assert!(!real.is_sentinel());
    }

    #[test]
    fn test_unit_of_measurement() {
        let attrs = HashMap::from([(ATTR_UNIT_OF_MEASUREMENT.to_string(), json!("W"))]);
        let state = State::new(sensor(), "10", attrs, Context::new());
        assert_eq!(state.unit_of_measurement(), Some("W"));

        let bare = State::new(sensor(), "10", HashMap::new(), Context::new());
        assert_eq!(bare.unit_of_measurement(), None);
    }
}
