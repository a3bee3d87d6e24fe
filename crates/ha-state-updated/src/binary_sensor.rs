//! The "changed" binary sensor exposed for each entry

use std::collections::HashMap;

use ha_core::{Context, EntityId, EntityIdError, ATTR_FRIENDLY_NAME, ATTR_ICON};
use ha_runtime::StateMachine;
use serde_json::{json, Value};
use tracing::trace;

use crate::tracker::ChangeTracker;
use crate::{CONF_LAST_UPDATED, CONF_NEW_VALUE, CONF_OLD_VALUE};

pub const BINARY_SENSOR_DOMAIN: &str = "binary_sensor";
pub const STATE_ON: &str = "on";
pub const STATE_OFF: &str = "off";
pub const ATTR_TEXT: &str = "text";

#[derive(Debug, Clone, PartialEq)]
pub struct BinarySensor {
    pub entity_id: EntityId,
    /// The config entry id
    pub unique_id: String,
    pub name: String,
    pub icon: Option<String>,
}

impl BinarySensor {
    pub fn new(entity_id: EntityId, unique_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            entity_id,
            unique_id: unique_id.into(),
            name: name.into(),
            icon: None,
        }
    }

    pub fn with_icon(mut self, icon: Option<String>) -> Self {
        self.icon = icon;
        self
    }

    /// Entity id derived from the entry title, with `suffix` appended when the
    /// plain one is taken; titles without usable characters fall back to the
    /// unique id
    pub fn entity_id_for(
        title: &str,
        unique_id: &str,
        suffix: Option<usize>,
    ) -> Result<EntityId, EntityIdError> {
        let mut object_id = slug::slugify(title).replace('-', "_");
        if object_id.is_empty() {
            object_id = format!("state_updated_{}", slug::slugify(unique_id).replace('-', "_"));
        }
        if let Some(n) = suffix {
            object_id = format!("{}_{}", object_id, n);
        }
        EntityId::new(BINARY_SENSOR_DOMAIN, object_id)
    }

    pub fn state(tracker: &ChangeTracker) -> &'static str {
        if tracker.is_latched() {
            STATE_ON
        } else {
            STATE_OFF
        }
    }

    pub fn attributes(&self, tracker: &ChangeTracker) -> HashMap<String, Value> {
        let mut attributes = HashMap::from([
            (CONF_NEW_VALUE.to_string(), tracker.current_value().as_json().clone()),
            (CONF_OLD_VALUE.to_string(), tracker.previous_value().as_json().clone()),
            (
                CONF_LAST_UPDATED.to_string(),
                tracker
                    .latched_at()
                    .map(|at| json!(at.to_rfc3339()))
                    .unwrap_or(Value::Null),
            ),
            (ATTR_TEXT.to_string(), json!(tracker.text())),
            (ATTR_FRIENDLY_NAME.to_string(), json!(self.name)),
        ]);
        if let Some(icon) = &self.icon {
            attributes.insert(ATTR_ICON.to_string(), json!(icon));
        }
        attributes
    }

    /// Write the sensor state into the state machine
    pub fn write(&self, states: &StateMachine, tracker: &ChangeTracker) {
        trace!(entity_id = %self.entity_id, "Writing sensor state");
        states.set(
            self.entity_id.clone(),
            Self::state(tracker),
            self.attributes(tracker),
            Context::new(),
        );
    }
}
