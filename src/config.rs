//! Configuration for the stresswatch server.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::session::CadenceConfig;

/// Main configuration for the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Port the HTTP/WebSocket server binds to
    pub listen_port: u16,

    /// Events per kind considered by one feature extraction
    pub window_size: usize,

    /// Seconds between classification cycles
    pub prediction_interval_secs: i64,

    /// Seconds between app context re-checks
    pub app_check_interval_secs: i64,

    /// Seconds between heartbeat messages
    pub heartbeat_interval_secs: i64,

    /// Minimum buffered key events before a classification cycle runs
    pub min_key_events: usize,

    /// Directory for the database and other mutable state
    pub data_path: PathBuf,

    /// Path of the persisted model artifact
    pub model_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stresswatch");

        Self {
            listen_port: 8000,
            window_size: 100,
            prediction_interval_secs: 30,
            app_check_interval_secs: 5,
            heartbeat_interval_secs: 10,
            min_key_events: 10,
            model_path: data_dir.join("model.json"),
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stresswatch")
            .join("config.json")
    }

    /// Path of the SQLite database under the data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_path.join("stress_data.db")
    }

    /// Session timing knobs derived from this configuration.
    pub fn cadence(&self) -> CadenceConfig {
        CadenceConfig {
            prediction_interval_secs: self.prediction_interval_secs,
            app_check_interval_secs: self.app_check_interval_secs,
            heartbeat_interval_secs: self.heartbeat_interval_secs,
            min_key_events: self.min_key_events,
            window_size: self.window_size,
        }
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        if let Some(parent) = self.model_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
