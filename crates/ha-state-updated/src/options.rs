//! Config entry options of a state updated entry

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use ha_core::{EntityId, EntityIdError};
use ha_runtime::StateMachine;
use serde_json::{json, Value};
use thiserror::Error;

use crate::template::{TextTemplate, DEFAULT_TEXT_TEMPLATE};
use crate::tracker::{Snapshot, TrackerSettings};
use crate::value::TrackedValue;
use crate::{
    CONF_ATTRIBUTE, CONF_CLEAR_UPDATE_AFTER_HOURS, CONF_DEVICE_ID, CONF_ENTITY_ID, CONF_ICON,
    CONF_LAST_UPDATED, CONF_NAME, CONF_NEW_VALUE, CONF_OLD_VALUE, CONF_TEXT_TEMPLATE,
    CONF_UPDATED,
};

pub const DEFAULT_CLEAR_UPDATE_AFTER_HOURS: f64 = 25.0;
pub const MIN_CLEAR_UPDATE_AFTER_HOURS: f64 = 0.1;
pub const MAX_CLEAR_UPDATE_AFTER_HOURS: f64 = 999.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptionsError {
    #[error("missing required option '{0}'")]
    Missing(&'static str),

    #[error("option '{key}' must be {expected}")]
    InvalidType {
        key: &'static str,
        expected: &'static str,
    },

    #[error("invalid entity id: {0}")]
    InvalidEntityId(#[from] EntityIdError),

    #[error("clear_update_after_hours must be between 0.1 and 999, got {0}")]
    ClearHoursOutOfRange(f64),

    #[error("invalid stored state: {0}")]
    InvalidSnapshot(String),
}

/// Parsed options of one entry
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdatedOptions {
    /// The watched entity
    pub entity_id: EntityId,
    /// Attribute to watch instead of the state value
    pub attribute: Option<String>,
    pub icon: Option<String>,
    /// Device the sensor belongs to; stored but not acted on
    pub device_id: Option<String>,
    pub clear_update_after_hours: f64,
    pub text_template: String,
    pub name: Option<String>,
}

impl StateUpdatedOptions {
    pub fn from_options(options: &HashMap<String, Value>) -> Result<Self, OptionsError> {
        let entity_id = non_blank(options, CONF_ENTITY_ID)?
            .ok_or(OptionsError::Missing(CONF_ENTITY_ID))?
            .parse::<EntityId>()?;

        let clear_update_after_hours = match options.get(CONF_CLEAR_UPDATE_AFTER_HOURS) {
            None | Some(Value::Null) => DEFAULT_CLEAR_UPDATE_AFTER_HOURS,
            Some(value) => value.as_f64().ok_or(OptionsError::InvalidType {
                key: CONF_CLEAR_UPDATE_AFTER_HOURS,
                expected: "a number",
            })?,
        };
        if !(MIN_CLEAR_UPDATE_AFTER_HOURS..=MAX_CLEAR_UPDATE_AFTER_HOURS)
            .contains(&clear_update_after_hours)
        {
            return Err(OptionsError::ClearHoursOutOfRange(clear_update_after_hours));
        }

        let text_template = string(options, CONF_TEXT_TEMPLATE)?
            .unwrap_or_else(|| DEFAULT_TEXT_TEMPLATE.to_string());

        Ok(Self {
            entity_id,
            attribute: non_blank(options, CONF_ATTRIBUTE)?,
            icon: non_blank(options, CONF_ICON)?,
            device_id: non_blank(options, CONF_DEVICE_ID)?,
            clear_update_after_hours,
            text_template,
            name: non_blank(options, CONF_NAME)?,
        })
    }

    pub fn clear_after(&self) -> Duration {
        Duration::milliseconds((self.clear_update_after_hours * 3_600_000.0).round() as i64)
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            entity_id: self.entity_id.to_string(),
            attribute: self.attribute.clone(),
            clear_after: self.clear_after(),
            template: TextTemplate::new(self.text_template.clone()),
        }
    }

    /// Display name: `name`, else the watched object id followed by "updated"
    pub fn title(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{} updated", self.entity_id.object_id()).replace('_', " "),
        }
    }
}

/// Read the persisted tracker state out of entry options
pub fn snapshot_from_options(options: &HashMap<String, Value>) -> Result<Snapshot, OptionsError> {
    let stored: serde_json::Map<String, Value> = [
        CONF_NEW_VALUE,
        CONF_OLD_VALUE,
        CONF_UPDATED,
        CONF_LAST_UPDATED,
    ]
    .into_iter()
    .filter_map(|key| options.get(key).map(|v| (key.to_string(), v.clone())))
    .filter(|(_, v)| !v.is_null())
    .collect();

    serde_json::from_value(Value::Object(stored))
        .map_err(|e| OptionsError::InvalidSnapshot(e.to_string()))
}

/// Write a snapshot into entry options, keeping every other key
pub fn merge_snapshot(options: &mut HashMap<String, Value>, snapshot: &Snapshot) {
    options.insert(CONF_NEW_VALUE.to_string(), snapshot.new_value.as_json().clone());
    options.insert(CONF_OLD_VALUE.to_string(), snapshot.old_value.as_json().clone());
    options.insert(CONF_UPDATED.to_string(), json!(snapshot.updated));
    match snapshot.last_updated {
        Some(last_updated) => {
            options.insert(CONF_LAST_UPDATED.to_string(), json!(last_updated.to_rfc3339()));
        }
        None => {
            options.remove(CONF_LAST_UPDATED);
        }
    }
}

/// Title for a new entry
pub fn entry_title(options: &HashMap<String, Value>) -> Result<String, OptionsError> {
    Ok(StateUpdatedOptions::from_options(options)?.title())
}

/// Validate options for a new entry and seed its tracker state with the
/// watched entity's current reading
pub fn new_entry_options(
    states: &StateMachine,
    mut options: HashMap<String, Value>,
    now: DateTime<Utc>,
) -> Result<HashMap<String, Value>, OptionsError> {
    let parsed = StateUpdatedOptions::from_options(&options)?;
    options
        .entry(CONF_CLEAR_UPDATE_AFTER_HOURS.to_string())
        .or_insert_with(|| json!(parsed.clear_update_after_hours));
    options
        .entry(CONF_TEXT_TEMPLATE.to_string())
        .or_insert_with(|| json!(parsed.text_template));

    let current = states
        .get(&parsed.entity_id.to_string())
        .and_then(|state| TrackedValue::read(&state, parsed.attribute.as_deref()).ok())
        .unwrap_or_default();

    merge_snapshot(
        &mut options,
        &Snapshot {
            new_value: current.clone(),
            old_value: current,
            updated: false,
            last_updated: Some(now),
        },
    );
    Ok(options)
}

fn string(options: &HashMap<String, Value>, key: &'static str) -> Result<Option<String>, OptionsError> {
    match options.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(OptionsError::InvalidType {
            key,
            expected: "a string",
        }),
    }
}

fn non_blank(options: &HashMap<String, Value>, key: &'static str) -> Result<Option<String>, OptionsError> {
    Ok(string(options, key)?.filter(|s| !s.trim().is_empty()))
}
