//! Configuration module for persistent settings.
//!
//! Only runtime plumbing lives here (tick rate, warm-up, device and file
//! locations). Calibration thresholds and graph scales are compile-time
//! constants.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Directory name under the platform config dir.
const APP_DIR: &str = "air-monitor";

/// Daemon configuration.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Polling loop period.
    pub tick_interval_ms: u64,
    /// Length of the start-up countdown.
    pub warmup_secs: u32,
    /// i2c-dev node the SGP30 sits on.
    pub i2c_device: String,
    /// Baseline store file.
    pub store_path: PathBuf,
    pub socket_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10,
            warmup_secs: 15,
            i2c_device: "/dev/i2c-1".to_string(),
            store_path: config_dir().join("baseline.json"),
            socket_path: crate::ipc_server::DEFAULT_SOCKET_PATH.to_string(),
        }
    }
}

impl Config {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.tick_interval_ms) {
            return Err(ConfigError::ValidationError(format!(
                "tick_interval_ms ({}) must be between 1 and 100",
                self.tick_interval_ms
            )));
        }

        if self.warmup_secs > 120 {
            return Err(ConfigError::ValidationError(format!(
                "warmup_secs ({}) must not exceed 120",
                self.warmup_secs
            )));
        }

        if self.i2c_device.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "i2c_device must not be empty".to_string(),
            ));
        }

        if self.socket_path.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "socket_path must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration manager with file I/O.
pub struct ConfigManager {
    config: RwLock<Config>,
    path: PathBuf,
}

impl ConfigManager {
    /// Load configuration from file or use defaults.
    /// If the file doesn't exist, returns a manager with default config.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|e| {
                ConfigError::ParseError(format!("Failed to read config file: {}", e))
            })?;

            let config: Config = serde_json::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(format!("Invalid JSON: {}", e)))?;

            config.validate()?;
            config
        } else {
            Config::default()
        };

        Ok(Self {
            config: RwLock::new(config),
            path: path.to_path_buf(),
        })
    }

    /// Save configuration to file using atomic write.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config = self.config.read().map_err(|_| {
            ConfigError::ValidationError("Failed to acquire read lock".to_string())
        })?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(&*config)
            .map_err(|e| ConfigError::ParseError(format!("Failed to serialize config: {}", e)))?;

        {
            let mut file = fs::File::create(&temp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    /// Write the current configuration if no file exists yet.
    ///
    /// Returns whether a file was written.
    pub fn save_if_missing(&self) -> Result<bool, ConfigError> {
        if self.path.exists() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Get current configuration.
    pub fn get(&self) -> Config {
        self.config
            .read()
            .map(|c| c.clone())
            .unwrap_or_else(|_| Config::default())
    }

    /// Get the config file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the default config path (~/.config/air-monitor/config.json).
    pub fn default_path() -> PathBuf {
        config_dir().join("config.json")
    }
}

/// Get the config directory path.
fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("/tmp").join(APP_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.tick_interval_ms, 10);
        assert_eq!(config.warmup_secs, 15);
        assert_eq!(config.i2c_device, "/dev/i2c-1");
        assert_eq!(config.socket_path, "/tmp/air-monitor.sock");
        assert!(config.store_path.ends_with("air-monitor/baseline.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_manager_load_nonexistent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nonexistent.json");

        let manager = ConfigManager::load_or_default(&path).unwrap();
        assert_eq!(manager.get(), Config::default());
        assert!(!path.exists());
    }

    #[test]
    fn test_save_if_missing_writes_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let manager = ConfigManager::load_or_default(&path).unwrap();
        assert!(manager.save_if_missing().unwrap());
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
        assert!(!manager.save_if_missing().unwrap());

        let reloaded = ConfigManager::load_or_default(&path).unwrap();
        assert_eq!(reloaded.get(), Config::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"warmup_secs": 30}"#).unwrap();

        let config = ConfigManager::load_or_default(&path).unwrap().get();
        assert_eq!(config.warmup_secs, 30);
        assert_eq!(config.tick_interval_ms, 10);
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ nope").unwrap();

        assert!(matches!(
            ConfigManager::load_or_default(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_invalid_values_rejected_on_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"tick_interval_ms": 0}"#).unwrap();

        assert!(matches!(
            ConfigManager::load_or_default(&path),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_empty_device_rejected() {
        let config = Config {
            i2c_device: "  ".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_tick_interval_range(tick in 0u64..=1_000) {
            let config = Config { tick_interval_ms: tick, ..Config::default() };
            prop_assert_eq!(config.validate().is_ok(), (1..=100).contains(&tick));
        }

        #[test]
        fn prop_warmup_limit(warmup in 0u32..=1_000) {
            let config = Config { warmup_secs: warmup, ..Config::default() };
            let result = config.validate();
            if warmup <= 120 {
                prop_assert!(result.is_ok());
            } else if let Err(ConfigError::ValidationError(msg)) = result {
                prop_assert!(msg.contains("must not exceed 120"));
            } else {
                prop_assert!(false, "Should be ValidationError");
            }
        }

        #[test]
        fn prop_config_file_round_trip(tick in 1u64..=100, warmup in 0u32..=120) {
            let dir = tempdir().unwrap();
            let path = dir.path().join("config.json");
            let config = Config {
                tick_interval_ms: tick,
                warmup_secs: warmup,
                store_path: dir.path().join("baseline.json"),
                ..Config::default()
            };

            let manager = ConfigManager {
                config: RwLock::new(config.clone()),
                path: path.clone(),
            };
            manager.save().unwrap();

            let loaded = ConfigManager::load_or_default(&path).unwrap().get();
            prop_assert_eq!(config, loaded);
        }
    }
}
