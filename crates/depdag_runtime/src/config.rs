//! Runtime configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Aggregation interval is zero
    #[error("aggregation interval must be greater than zero")]
    ZeroInterval,

    /// Event buffer is zero
    #[error("event buffer must hold at least one event")]
    ZeroBuffer,

    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File path
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Config document is malformed
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Period between two aggregation ticks of one resource, in milliseconds
    pub interval_ms: u64,
    /// Capacity of the graph event channel
    pub event_buffer: usize,
    /// Maximum nodes accepted per graph (0 = no limit)
    pub max_nodes: usize,
}

impl RuntimeConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self {
            interval_ms: 3_000,
            event_buffer: 64,
            max_nodes: 0,
        }
    }

    /// Set the aggregation interval
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the event channel capacity
    #[must_use]
    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer;
        self
    }

    /// Set the per-graph node limit
    #[must_use]
    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    /// Aggregation interval
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Check the config is usable
    ///
    /// # Errors
    ///
    /// Returns error on a zero interval or zero buffer
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.event_buffer == 0 {
            return Err(ConfigError::ZeroBuffer);
        }
        Ok(())
    }

    /// Parse and validate a JSON config; missing fields keep their defaults
    ///
    /// # Errors
    ///
    /// Returns error if the document is malformed or invalid
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is invalid
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = RuntimeConfig::default();
        assert_eq!(config.interval(), Duration::from_secs(3));
        assert_eq!(config.event_buffer, 64);
        assert_eq!(config.max_nodes, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builders() {
        let config = RuntimeConfig::new()
            .with_interval(Duration::from_millis(250))
            .with_event_buffer(8)
            .with_max_nodes(100);
        assert_eq!(config.interval_ms, 250);
        assert_eq!(config.event_buffer, 8);
        assert_eq!(config.max_nodes, 100);
    }

    #[test]
    fn test_config_zero_interval() {
        let config = RuntimeConfig::new().with_interval(Duration::ZERO);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroInterval)));
    }

    #[test]
    fn test_config_zero_buffer() {
        let config = RuntimeConfig::new().with_event_buffer(0);
        assert!(matches!(config.validate(), Err(ConfigError::ZeroBuffer)));
    }

    #[test]
    fn test_config_from_json_partial() {
        let config = RuntimeConfig::from_json(r#"{ "interval_ms": 500 }"#).unwrap();
        assert_eq!(config.interval(), Duration::from_millis(500));
        assert_eq!(config.event_buffer, 64);
    }

    #[test]
    fn test_config_from_json_rejects_zero() {
        let result = RuntimeConfig::from_json(r#"{ "interval_ms": 0 }"#);
        assert!(matches!(result, Err(ConfigError::ZeroInterval)));
    }

    #[test]
    fn test_config_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "interval_ms": 1000, "event_buffer": 4 }}"#).unwrap();

        let config = RuntimeConfig::load(file.path()).unwrap();
        assert_eq!(config.interval_ms, 1000);
        assert_eq!(config.event_buffer, 4);
    }

    #[test]
    fn test_config_load_missing_file() {
        let result = RuntimeConfig::load("/nonexistent/depdag.json");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
