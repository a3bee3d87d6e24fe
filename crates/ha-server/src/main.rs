//! Home Assistant Rust Server
//!
//! Hosts the runtime and the state updated integration. The only argument is
//! an optional path to a YAML server configuration.

mod config;

use std::path::PathBuf;

use anyhow::Result;
use ha_runtime::HomeAssistant;
use ha_state_updated::{StateUpdated, StateUpdatedOptions, DOMAIN};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

/// Create entries listed in the configuration that do not exist yet
async fn import_entries(hass: &HomeAssistant, integration: &StateUpdated, config: &ServerConfig) {
    for options in &config.state_updated {
        let wanted = match StateUpdatedOptions::from_options(options) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "Skipping invalid state_updated configuration");
                continue;
            }
        };

        let exists = hass.config_entries.get_by_domain(DOMAIN).iter().any(|entry| {
            StateUpdatedOptions::from_options(&entry.options)
                .map(|o| o.entity_id == wanted.entity_id && o.attribute == wanted.attribute)
                .unwrap_or(false)
        });
        if exists {
            continue;
        }

        match integration.create_entry(options.clone()).await {
            Ok(entry) => info!(title = %entry.title, "Imported state_updated entry"),
            Err(err) => warn!(error = %err, "Failed to import state_updated entry"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => ServerConfig::load(&path).await?,
        None => ServerConfig::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("Starting Home Assistant (Rust)");

    let hass = HomeAssistant::new(&config.config_dir);
    hass.config_entries.load().await?;

    let integration = StateUpdated::with_tick_interval(hass.clone(), config.tick_interval());
    integration.start().await;
    import_entries(&hass, &integration, &config).await;
    // Entries with an absent watched entity resume auto-clear once it reports
    integration.host_started().await;

    info!(entries = integration.loaded_entries(), "Home Assistant is running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    integration.stop().await;

    Ok(())
}
