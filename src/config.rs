//! Configuration for the ingestion agent.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address of the peer process (`host:port`)
    pub endpoint: String,

    /// Number of channels in every sample
    pub channel_count: usize,

    /// Samples per frame handed to the renderer
    pub frame_buffer_size: usize,

    /// Samples per append to the recording file
    pub write_buffer_size: usize,

    /// One in every `passes` samples is forwarded to the renderer
    pub passes: usize,

    /// How long a recording session lasts after its first sample
    #[serde(with = "duration_serde")]
    pub recording_duration: Duration,

    /// Directory for recording files
    pub output_dir: PathBuf,

    /// How long a receive waits before re-checking for shutdown (0 blocks)
    pub receive_timeout_ms: u64,

    /// Write on a dedicated thread instead of the ingestion thread
    pub background_writes: bool,

    /// Write buffers queued for the writer thread before ingestion waits
    pub writer_queue_capacity: usize,

    /// Frames queued for the renderer before new frames are dropped
    pub frame_queue_capacity: usize,

    /// Samples per channel kept by the console renderer
    pub history_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vizzero");

        Self {
            endpoint: "127.0.0.1:3004".to_string(),
            channel_count: 8,
            frame_buffer_size: 25,
            write_buffer_size: 100,
            passes: 1,
            recording_duration: Duration::from_secs(5),
            output_dir: data_dir.join("recordings"),
            receive_timeout_ms: 100,
            background_writes: true,
            writer_queue_capacity: 64,
            frame_queue_capacity: 16,
            history_capacity: 2500,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`, creating its parent directory.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vizzero")
            .join("config.json")
    }

    /// Ensure the recording directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        crate::storage::ensure_dir(&self.output_dir)
            .map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("channel_count", self.channel_count),
            ("frame_buffer_size", self.frame_buffer_size),
            ("write_buffer_size", self.write_buffer_size),
            ("passes", self.passes),
            ("writer_queue_capacity", self.writer_queue_capacity),
            ("frame_queue_capacity", self.frame_queue_capacity),
            ("history_capacity", self.history_capacity),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be at least 1")));
            }
        }
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint must not be empty".to_string()));
        }
        Ok(())
    }

    /// Receive timeout, or `None` for a blocking receive.
    pub fn receive_timeout(&self) -> Option<Duration> {
        (self.receive_timeout_ms > 0).then(|| Duration::from_millis(self.receive_timeout_ms))
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as fractional seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom("duration must be a non-negative number"));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.channel_count, 8);
        assert_eq!(config.frame_buffer_size, 25);
        assert_eq!(config.write_buffer_size, 100);
        assert_eq!(config.passes, 1);
        assert_eq!(config.recording_duration, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"passes": 4, "recording_duration": 2.5}"#).unwrap();
        assert_eq!(config.passes, 4);
        assert_eq!(config.recording_duration, Duration::from_millis(2500));
        assert_eq!(config.write_buffer_size, 100);
    }

    #[test]
    fn test_negative_duration_is_rejected() {
        let result = serde_json::from_str::<Config>(r#"{"recording_duration": -1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let config = Config {
            write_buffer_size: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_receive_timeout() {
        let mut config = Config::default();
        assert_eq!(config.receive_timeout(), Some(Duration::from_millis(100)));
        config.receive_timeout_ms = 0;
        assert_eq!(config.receive_timeout(), None);
    }

    #[test]
    fn test_save_then_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            passes: 3,
            recording_duration: Duration::from_millis(1500),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.passes, 3);
        assert_eq!(loaded.recording_duration, Duration::from_millis(1500));
        assert_eq!(loaded.endpoint, config.endpoint);
    }

    #[test]
    fn test_load_from_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.write_buffer_size, 100);
    }

    #[test]
    fn test_ensure_directories_creates_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            output_dir: dir.path().join("a").join("b"),
            ..Config::default()
        };
        config.ensure_directories().unwrap();
        assert!(config.output_dir.is_dir());
    }
}
