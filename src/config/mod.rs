//! Configuration management for Tradewire
//!
//! Configuration is loaded from `~/.tradewire/config.json` with environment
//! variable overrides. Each bus or router instance takes its own config value
//! at construction; there is no process-wide configuration state.

mod types;
mod validate;

pub use types::{BusConfig, Config, RouterConfig};
pub use validate::{unknown_fields, Diagnostic};

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;

impl Config {
    /// Returns the Tradewire configuration directory path (~/.tradewire)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tradewire")
    }

    /// Returns the path to the config file (~/.tradewire/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    ///
    /// Unknown fields in the file are warned about and ignored.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let raw: serde_json::Value = serde_json::from_str(&content)?;
            for diag in unknown_fields(&raw) {
                warn!(field = %diag.path, "Unknown config field ignored");
            }
            serde_json::from_value(raw)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables follow the pattern: TRADEWIRE_SECTION_KEY
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("TRADEWIRE_BUS_MAX_RETRIES") {
            if let Ok(v) = val.parse() {
                self.bus.max_retries = v;
            }
        }
        if let Ok(val) = std::env::var("TRADEWIRE_BUS_RETRY_DELAY_MS") {
            if let Ok(v) = val.parse() {
                self.bus.retry_delay_ms = v;
            }
        }
        if let Ok(val) = std::env::var("TRADEWIRE_BUS_MESSAGE_TIMEOUT_MS") {
            if let Ok(v) = val.parse() {
                self.bus.message_timeout_ms = v;
            }
        }
        if let Ok(val) = std::env::var("TRADEWIRE_BUS_MAX_QUEUE_SIZE") {
            if let Ok(v) = val.parse() {
                self.bus.max_queue_size = v;
            }
        }
        if let Ok(val) = std::env::var("TRADEWIRE_ROUTER_CIRCUIT_BREAKER_THRESHOLD") {
            if let Ok(v) = val.parse() {
                self.router.circuit_breaker_threshold = v;
            }
        }
        if let Ok(val) = std::env::var("TRADEWIRE_ROUTER_MAX_ROUTING_HOPS") {
            if let Ok(v) = val.parse() {
                self.router.max_routing_hops = v;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let config = Config::load_from_path(Path::new("/nonexistent/tradewire-config.json"))
            .expect("load defaults");
        assert_eq!(config.bus.max_retries, 3);
        assert_eq!(config.router.max_routing_hops, 10);
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join("tradewire-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(
            &path,
            r#"{"bus": {"max_queue_size": 16}, "router": {"max_routing_hops": 4}}"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).expect("load config");
        assert_eq!(config.bus.max_queue_size, 16);
        assert_eq!(config.router.max_routing_hops, 4);
        // Untouched fields keep their defaults.
        assert_eq!(config.bus.retry_delay_ms, 1000);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = std::env::temp_dir().join("tradewire-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(Config::load_from_path(&path).is_err());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_config_dir_ends_with_tradewire() {
        assert!(Config::dir().ends_with(".tradewire"));
    }
}
