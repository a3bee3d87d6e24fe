//! Feeds `state_changed` events of the watched entity into an entry

use ha_core::events::StateChangedData;
use ha_core::{EntityId, STATE_UNKNOWN};
use ha_runtime::{EventBus, SharedClock};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::entry::SharedEntry;
use crate::value::{TrackedValue, ValueError};

/// One observation extracted from a `state_changed` event
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub new_value: TrackedValue,
    pub old_value: TrackedValue,
    pub unit: Option<String>,
}

/// Extract the observation carried by an event
///
/// Returns `Ok(None)` for events the tracker does not care about: the entity
/// was removed or its new value is a sentinel.
pub fn observation_from_event(
    data: &StateChangedData,
    attribute: Option<&str>,
) -> Result<Option<Observation>, ValueError> {
    let Some(new_state) = &data.new_state else {
        return Ok(None);
    };

    let new_value = TrackedValue::read(new_state, attribute)?;
    if new_value.is_sentinel() {
        return Ok(None);
    }

    let old_value = match &data.old_state {
        Some(old_state) => match TrackedValue::read(old_state, attribute) {
            Err(ValueError::Missing) => TrackedValue::from(STATE_UNKNOWN),
            other => other?,
        },
        None => TrackedValue::from(STATE_UNKNOWN),
    };

    Ok(Some(Observation {
        new_value,
        old_value,
        unit: new_state.unit_of_measurement().map(String::from),
    }))
}

/// Subscribe to the bus and spawn the listener task
///
/// The subscription is made before returning so no event fired afterwards is
/// missed.
pub fn spawn_state_listener(
    bus: &EventBus,
    entry: SharedEntry,
    watched: EntityId,
    attribute: Option<String>,
    clock: SharedClock,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe_typed::<StateChangedData>();

    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(_)) => continue,
            };
            if event.data.entity_id != watched {
                continue;
            }
            if event.data.new_state.is_some() {
                entry.lock().await.watched_entity_seen();
            }

            match observation_from_event(&event.data, attribute.as_deref()) {
                Ok(Some(observation)) => {
                    let mut entry = entry.lock().await;
                    entry
                        .observe(
                            observation.new_value,
                            observation.old_value,
                            observation.unit.as_deref(),
                            clock.now(),
                        )
                        .await;
                }
                Ok(None) => debug!(entity_id = %watched, "Skipping state change"),
                Err(err) => error!(entity_id = %watched, error = %err, "Dropping observation"),
            }
        }
        debug!(entity_id = %watched, "State listener stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_core::{Context, State};
    use serde_json::json;
    use std::collections::HashMap;

    fn state(value: &str, attributes: &[(&str, serde_json::Value)]) -> State {
        State::new(
            "sensor.battery".parse().unwrap(),
            value,
            attributes
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<HashMap<_, _>>(),
            Context::new(),
        )
    }

    fn changed(old: Option<State>, new: Option<State>) -> StateChangedData {
        StateChangedData {
            entity_id: "sensor.battery".parse().unwrap(),
            old_state: old,
            new_state: new,
        }
    }

    #[test]
    fn test_state_values() {
        let data = changed(
            Some(state("40", &[])),
            Some(state("45", &[("unit_of_measurement", json!("%"))])),
        );
        let observation = observation_from_event(&data, None).unwrap().unwrap();

        assert_eq!(observation.new_value, TrackedValue::from("45"));
        assert_eq!(observation.old_value, TrackedValue::from("40"));
        assert_eq!(observation.unit.as_deref(), Some("%"));
    }

    #[test]
    fn test_attribute_values() {
        let data = changed(
            Some(state("ok", &[("voltage", json!(3.1))])),
            Some(state("ok", &[("voltage", json!(3.0))])),
        );
        let observation = observation_from_event(&data, Some("voltage")).unwrap().unwrap();

        assert_eq!(observation.new_value.display(), "3.0");
        assert_eq!(observation.old_value.display(), "3.1");
    }

    #[test]
    fn test_missing_old_state_is_unknown() {
        let data = changed(None, Some(state("45", &[])));
        let observation = observation_from_event(&data, None).unwrap().unwrap();
        assert!(observation.old_value.is_sentinel());

        let data = changed(Some(state("ok", &[])), Some(state("ok", &[("voltage", json!(3))])));
        let observation = observation_from_event(&data, Some("voltage")).unwrap().unwrap();
        assert!(observation.old_value.is_sentinel());
    }

    #[test]
    fn test_skipped_events() {
        assert_eq!(
            observation_from_event(&changed(Some(state("1", &[])), None), None).unwrap(),
            None
        );
        assert_eq!(
            observation_from_event(&changed(None, Some(state("unavailable", &[]))), None).unwrap(),
            None
        );
    }

    #[test]
    fn test_malformed_values() {
        let data = changed(None, Some(state("ok", &[("voltage", json!([1, 2]))])));
        assert!(matches!(
            observation_from_event(&data, Some("voltage")),
            Err(ValueError::NotScalar(_))
        ));

        let data = changed(None, Some(state("ok", &[])));
        assert_eq!(
            observation_from_event(&data, Some("voltage")),
            Err(ValueError::Missing)
        );
    }
}
