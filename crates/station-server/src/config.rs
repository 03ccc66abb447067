//! Layered configuration.
//!
//! Config is loaded from three layers (in priority order):
//! 1. Compiled defaults, [`StationConfig::default()`]
//! 2. A JSON file, deep-merged over the defaults
//! 3. `STATION_*` environment variables (highest priority)
//!
//! The binary loads one [`StationConfig`] at startup and hands it to the
//! hub builder; nothing here is global.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// Config file is not valid JSON, or does not match the schema.
    #[error("invalid config: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StationConfig {
    /// Listener settings.
    pub server: ServerConfig,
    /// Module distribution settings.
    pub modules: ModulesConfig,
    /// State persistence settings.
    pub data: DataConfig,
}

/// Listener settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// TCP port the hub listens on.
    pub port: u16,
    /// Bind address.
    pub bind: String,
}

/// Module distribution settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModulesConfig {
    /// Directory modules are served from.
    pub dir: PathBuf,
}

/// State persistence settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DataConfig {
    /// Directory the JSON backend writes collections into.
    pub dir: PathBuf,
    /// `"memory"` or `"json"`.
    pub backend: StorageBackend,
    /// Optional entity allowlist for the state store. Empty accepts every
    /// entity; when set, events naming other entities answer the sender
    /// with an error envelope (they still flow through the bus).
    pub entities: Vec<String>,
}

/// Which [`CollectionStore`](station_store::CollectionStore) backs the hub.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Volatile in-process store.
    Memory,
    /// One JSON file per collection under `data.dir`.
    #[default]
    Json,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            modules: ModulesConfig::default(),
            data: DataConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            bind: "0.0.0.0".to_string(),
        }
    }
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("modules"),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            backend: StorageBackend::default(),
            entities: Vec::new(),
        }
    }
}

/// Recursively merge `overlay` into `base`. Objects merge key-by-key;
/// everything else (arrays included) is replaced wholesale.
#[must_use]
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, overlay) => overlay,
    }
}

impl StationConfig {
    /// Load config: defaults, deep-merged file (when it exists), then
    /// `STATION_*` env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = serde_json::to_value(Self::default())?;
        let merged = match path {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(path)?;
                deep_merge(defaults, serde_json::from_str(&raw)?)
            }
            Some(path) => {
                warn!(path = %path.display(), "config file not found, using defaults");
                defaults
            }
            None => defaults,
        };
        let mut config: Self = serde_json::from_value(merged)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `STATION_PORT`, `STATION_BIND`, `STATION_MODULES_DIR`,
    /// `STATION_DATA_DIR`, and `STATION_DATA_BACKEND`.
    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("STATION_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!(value = %port, "ignoring non-numeric STATION_PORT"),
            }
        }
        if let Ok(bind) = std::env::var("STATION_BIND") {
            self.server.bind = bind;
        }
        if let Ok(dir) = std::env::var("STATION_MODULES_DIR") {
            self.modules.dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("STATION_DATA_DIR") {
            self.data.dir = PathBuf::from(dir);
        }
        if let Ok(backend) = std::env::var("STATION_DATA_BACKEND") {
            match backend.as_str() {
                "memory" => self.data.backend = StorageBackend::Memory,
                "json" => self.data.backend = StorageBackend::Json,
                other => warn!(value = other, "ignoring unknown STATION_DATA_BACKEND"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_documented_values() {
        let config = StationConfig::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.modules.dir, PathBuf::from("modules"));
        assert_eq!(config.data.dir, PathBuf::from("data"));
        assert_eq!(config.data.backend, StorageBackend::Json);
        assert!(config.data.entities.is_empty());
    }

    #[test]
    fn deep_merge_overrides_nested_keys_only() {
        let base = json!({"server": {"port": 3000, "bind": "0.0.0.0"}});
        let overlay = json!({"server": {"port": 4000}});
        let merged = deep_merge(base, overlay);
        assert_eq!(merged["server"]["port"], 4000);
        assert_eq!(merged["server"]["bind"], "0.0.0.0");
    }

    #[test]
    fn deep_merge_replaces_arrays() {
        let base = json!({"data": {"entities": ["task"]}});
        let overlay = json!({"data": {"entities": ["note", "user"]}});
        let merged = deep_merge(base, overlay);
        assert_eq!(merged["data"]["entities"], json!(["note", "user"]));
    }

    #[test]
    fn file_layer_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("station.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 4321}, "data": {"entities": ["task"]}}"#,
        )
        .unwrap();

        let config = StationConfig::load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 4321);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.data.entities, vec!["task"]);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = StationConfig::load(Some(Path::new("/nonexistent/station.json"))).unwrap();
        assert_eq!(config, StationConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("station.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(StationConfig::load(Some(&path)).is_err());
    }
}
