//! Configuration for the classification host.

use crate::core::transmitter::DEFAULT_TIME_BUDGET;
use crate::storage::DEFAULT_WEIGHTS_FILE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding sample files and the weight file
    pub data_dir: PathBuf,

    /// Name of the weight resource inside `data_dir`
    pub weights_file: String,

    /// Maximum events per sample
    pub event_capacity: usize,

    /// Read limit for a sample file in bytes
    pub max_event_bytes: usize,

    /// Read limit for the weight file in bytes
    pub max_weight_bytes: usize,

    /// Events stamped later than this are not transmitted
    pub time_budget: u32,

    /// Wall time per recording time unit
    #[serde(with = "duration_us")]
    pub time_unit: Duration,

    /// How long to wait for all four result chunks
    #[serde(with = "duration_ms")]
    pub session_deadline: Duration,

    /// Pause between classification cycles
    #[serde(with = "duration_ms")]
    pub settle_delay: Duration,

    /// Depth of the completion queue between handler and accumulator
    pub chunk_queue_depth: usize,

    /// Path for exporting classification records
    pub export_path: PathBuf,

    /// Path for storing run statistics
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dvs-gcn-host");

        Self {
            data_dir: PathBuf::from("sd"),
            weights_file: DEFAULT_WEIGHTS_FILE.to_string(),
            event_capacity: 12_329,
            max_event_bytes: 203_778,
            max_weight_bytes: 203_778,
            time_budget: DEFAULT_TIME_BUDGET,
            time_unit: Duration::from_micros(1),
            session_deadline: Duration::from_secs(5),
            settle_delay: Duration::from_millis(10),
            chunk_queue_depth: 8,
            export_path: data_dir.join("exports"),
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
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

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
            .join("dvs-gcn-host")
            .join("config.json")
    }

    /// Ensure output directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be positive".into()));
        }
        if self.chunk_queue_depth < crate::channel::CHUNKS_PER_VECTOR {
            return Err(ConfigError::Invalid(format!(
                "chunk_queue_depth must hold at least {} chunks",
                crate::channel::CHUNKS_PER_VECTOR
            )));
        }
        if self.session_deadline.is_zero() {
            return Err(ConfigError::Invalid("session_deadline must be positive".into()));
        }
        Ok(())
    }

    /// Path of the persisted run statistics.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("stats.json")
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for millisecond durations.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

/// Serde support for microsecond durations.
mod duration_us {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_micros() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let us = u64::deserialize(deserializer)?;
        Ok(Duration::from_micros(us))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.weights_file, "mw.txt");
        assert_eq!(config.time_budget, 200_000);
        assert_eq!(config.time_unit, Duration::from_micros(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_round_trip() {
        let config = Config {
            session_deadline: Duration::from_millis(750),
            time_unit: Duration::from_micros(3),
            ..Config::default()
        };

        let json = serde_json::to_string(&config).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["session_deadline"], 750);
        assert_eq!(value["time_unit"], 3);

        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.session_deadline, Duration::from_millis(750));
        assert_eq!(parsed.time_unit, Duration::from_micros(3));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = serde_json::from_str(r#"{"time_budget": 1000}"#).unwrap();
        assert_eq!(parsed.time_budget, 1000);
        assert_eq!(parsed.weights_file, "mw.txt");
    }

    #[test]
    fn test_validation() {
        let config = Config {
            chunk_queue_depth: 2,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
