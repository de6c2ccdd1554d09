//! PulseDesk configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PulseDeskError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PulseDeskConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Scheduler/dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Dispatch window length in hours. The tick cadence must equal this
    /// value, otherwise windows leave gaps or overlap.
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
    /// Base URL of the external AI agent-execution service.
    #[serde(default = "default_agent_server_url")]
    pub agent_server_url: String,
    /// Per-request timeout for trigger calls, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_window_hours() -> u32 { 3 }
fn default_agent_server_url() -> String { "http://127.0.0.1:8600".into() }
fn default_request_timeout_secs() -> u64 { 30 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            agent_server_url: default_agent_server_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String { "~/.pulsedesk/pulsedesk.db".into() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl PulseDeskConfig {
    /// Load config from the default path (~/.pulsedesk/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PulseDeskError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| PulseDeskError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| PulseDeskError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the PulseDesk home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pulsedesk")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PulseDeskConfig::default();
        assert_eq!(config.scheduler.window_hours, 3);
        assert_eq!(config.scheduler.request_timeout_secs, 30);
        assert_eq!(config.store.db_path, "~/.pulsedesk/pulsedesk.db");
    }

    #[test]
    fn test_partial_toml() {
        let config: PulseDeskConfig = toml::from_str(
            r#"
            [scheduler]
            agent_server_url = "http://agents.internal:9000"
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.agent_server_url, "http://agents.internal:9000");
        // Unspecified fields fall back to defaults
        assert_eq!(config.scheduler.window_hours, 3);
        assert_eq!(config.store.db_path, "~/.pulsedesk/pulsedesk.db");
    }

    #[test]
    fn test_roundtrip() {
        let mut config = PulseDeskConfig::default();
        config.scheduler.window_hours = 6;
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: PulseDeskConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.scheduler.window_hours, 6);
    }
}
