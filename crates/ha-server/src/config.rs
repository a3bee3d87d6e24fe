//! Server configuration loaded from YAML

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

fn default_config_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tick_interval_secs() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Directory holding `.storage/`
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Filter directive used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds between auto-clear checks
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// Entries to import on startup, one options map each
    #[serde(default)]
    pub state_updated: Vec<HashMap<String, serde_json::Value>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            log_level: default_log_level(),
            tick_interval_secs: default_tick_interval_secs(),
            state_updated: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("invalid server configuration")?;
        if config.tick_interval_secs == 0 {
            anyhow::bail!("tick_interval_secs must be greater than zero");
        }
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_yaml("{}").unwrap();
        assert_eq!(config.config_dir, PathBuf::from("."));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.tick_interval(), Duration::from_secs(60));
        assert!(config.state_updated.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = ServerConfig::from_yaml(
            r#"
config_dir: /var/lib/homeassistant
log_level: debug
tick_interval_secs: 30
state_updated:
  - entity_id: sensor.outdoor_temp
    clear_update_after_hours: 2.5
  - entity_id: sensor.phone
    attribute: battery_level
"#,
        )
        .unwrap();

        assert_eq!(config.config_dir, PathBuf::from("/var/lib/homeassistant"));
        assert_eq!(config.tick_interval_secs, 30);
        assert_eq!(config.state_updated.len(), 2);
        assert_eq!(config.state_updated[0]["clear_update_after_hours"], json!(2.5));
        assert_eq!(config.state_updated[1]["attribute"], json!("battery_level"));
    }

    #[test]
    fn test_rejects_zero_interval() {
        assert!(ServerConfig::from_yaml("tick_interval_secs: 0").is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("server.yaml");
        tokio::fs::write(&path, "log_level: warn\n").await.unwrap();

        let config = ServerConfig::load(&path).await.unwrap();
        assert_eq!(config.log_level, "warn");
    }
}
