//! Engine configuration.
//!
//! Every field has a default, so an empty YAML document is a valid
//! configuration:
//!
//! ```yaml
//! name: living-room-stick
//! command_timeout_ms: 5000
//! discover_on_connect: true
//! ```

use std::path::Path;
use std::time::Duration;

use selve_protocol::MAX_FRAME_SIZE;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings for one gateway session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Label used in logs and metrics, usually the transport address.
    pub name: String,
    /// Per-call timeout used by [`Gateway::submit`](crate::Gateway::submit).
    pub command_timeout_ms: u64,
    /// Poll interval of the worker loop's reads.
    pub read_timeout_ms: u64,
    /// Time in-flight calls get to resolve during `disconnect()`.
    pub shutdown_grace_ms: u64,
    /// Frames longer than this are discarded.
    pub max_frame_size: usize,
    /// Read buffer size for the worker loop.
    pub read_buffer_size: usize,
    /// Run `discover_all()` right after connecting.
    pub discover_on_connect: bool,
    /// Ask the gateway to forward every event class after connecting.
    pub enable_events: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            name: "selve".to_string(),
            command_timeout_ms: 10_000,
            read_timeout_ms: 500,
            shutdown_grace_ms: 2_000,
            max_frame_size: MAX_FRAME_SIZE,
            read_buffer_size: 1024,
            discover_on_connect: false,
            enable_events: false,
        }
    }
}

impl GatewayConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_timeout_ms == 0 {
            return Err(ConfigError::Invalid("command_timeout_ms must be positive".into()));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid("read_timeout_ms must be positive".into()));
        }
        if self.max_frame_size < 64 {
            return Err(ConfigError::Invalid(format!(
                "max_frame_size {} is too small for any frame",
                self.max_frame_size
            )));
        }
        if self.read_buffer_size == 0 {
            return Err(ConfigError::Invalid("read_buffer_size must be positive".into()));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.command_timeout(), Duration::from_secs(10));
        assert_eq!(config.read_timeout(), Duration::from_millis(500));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(2));
        assert_eq!(config.max_frame_size, MAX_FRAME_SIZE);
        assert!(!config.discover_on_connect);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = GatewayConfig::from_yaml_str("name: stick\ncommand_timeout_ms: 2500\n").unwrap();
        assert_eq!(config.name, "stick");
        assert_eq!(config.command_timeout(), Duration::from_millis(2500));
        assert_eq!(config.read_timeout_ms, 500);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(GatewayConfig::from_yaml_str("{}").unwrap(), GatewayConfig::default());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = GatewayConfig::from_yaml_str("command_timeout_ms: 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_unknown_types() {
        let err = GatewayConfig::from_yaml_str("read_timeout_ms: soon").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = GatewayConfig::from_file("/nonexistent/selve.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
