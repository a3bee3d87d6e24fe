//! `state_updated.reset_entity` and `state_updated.reset_all`

use std::sync::Arc;

use dashmap::DashMap;
use ha_core::ServiceCall;
use ha_runtime::{ServiceError, ServiceRegistry};
use tracing::{info, warn};

use crate::entry::{LoadedEntry, SharedEntry};
use crate::DOMAIN;

pub const SERVICE_RESET_ENTITY: &str = "reset_entity";
pub const SERVICE_RESET_ALL: &str = "reset_all";

/// Reset the entries whose sensors are listed; returns how many were reset
pub async fn reset_entities(entries: &DashMap<String, LoadedEntry>, entity_ids: &[String]) -> usize {
    let mut targets: Vec<SharedEntry> = Vec::new();
    for entity_id in entity_ids {
        match entries.iter().find(|e| &e.sensor_entity_id == entity_id) {
            Some(entry) => targets.push(entry.runtime.clone()),
            None => warn!(entity_id = %entity_id, "No state updated sensor with this entity id"),
        }
    }

    let count = targets.len();
    for runtime in targets {
        runtime.lock().await.reset().await;
    }
    count
}

/// Reset every loaded entry
pub async fn reset_all(entries: &DashMap<String, LoadedEntry>) -> usize {
    let targets: Vec<SharedEntry> = entries.iter().map(|e| e.runtime.clone()).collect();

    let count = targets.len();
    for runtime in targets {
        runtime.lock().await.reset().await;
    }
    count
}

pub fn register_services(services: &ServiceRegistry, entries: Arc<DashMap<String, LoadedEntry>>) {
    let entries_clone = entries.clone();
    services.register(DOMAIN, SERVICE_RESET_ENTITY, move |call: ServiceCall| {
        let entries = entries_clone.clone();
        async move {
            let entity_ids = call.entity_ids();
            if entity_ids.is_empty() {
                return Err(ServiceError::InvalidData("entity_id is required".to_string()));
            }
            reset_entities(&entries, &entity_ids).await;
            Ok(())
        }
    });

    services.register(DOMAIN, SERVICE_RESET_ALL, move |_call: ServiceCall| {
        let entries = entries.clone();
        async move {
            reset_all(&entries).await;
            Ok(())
        }
    });

    info!("State updated services registered");
}

pub fn remove_services(services: &ServiceRegistry) {
    services.remove(DOMAIN, SERVICE_RESET_ENTITY);
    services.remove(DOMAIN, SERVICE_RESET_ALL);
}
