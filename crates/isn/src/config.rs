//! Stack configuration loaded from JSON.
//!
//! Every section is optional; missing sections and fields take their
//! defaults.
//!
//! ```json
//! {
//!   "frame":   { "mode": "compact", "max_size": 512, "ack_timeout": 20 },
//!   "message": { "query_timeout": 500, "query_retries": 2 },
//!   "udp":     { "bind": "0.0.0.0:1234", "max_clients": 4 },
//!   "serial":  { "baud_rate": 115200 }
//! }
//! ```

use std::path::Path;

use isn_driver::{SerialParams, UdpConfig};
use isn_frame::FrameConfig;
use isn_msg::MessageConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid stack configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Frame(#[from] isn_frame::FrameError),

    #[error(transparent)]
    Driver(#[from] isn_driver::DriverError),
}

/// Configuration of every configurable layer in a stack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    pub frame: FrameConfig,
    pub message: MessageConfig,
    pub udp: UdpConfig,
    pub serial: SerialParams,
}

impl StackConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json_str(&json)?;
        debug!(path = %path.display(), "loaded stack configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.frame.validate()?;
        self.serial.validate()?;
        Ok(())
    }

    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isn_frame::FrameMode;

    #[test]
    fn empty_document_is_default() {
        let config = StackConfig::from_json_str("{}").unwrap();
        assert_eq!(config, StackConfig::default());
    }

    #[test]
    fn sections_override_individually() {
        let config = StackConfig::from_json_str(
            r#"{ "frame": { "mode": "short", "max_size": 64 }, "message": { "query_retries": 5 } }"#,
        )
        .unwrap();
        assert_eq!(config.frame.mode, FrameMode::Short);
        assert_eq!(config.frame.max_size, 64);
        assert_eq!(config.frame.delimiter, FrameConfig::default().delimiter);
        assert_eq!(config.message.query_retries, 5);
        assert_eq!(config.udp, UdpConfig::default());
    }

    #[test]
    fn out_of_range_frame_size_is_rejected() {
        let err = StackConfig::from_json_str(r#"{ "frame": { "mode": "short", "max_size": 4096 } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Frame(_)), "{err}");
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = StackConfig::from_json_str("{ frame").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn pretty_json_reloads() {
        let mut config = StackConfig::default();
        config.frame.ack_timeout = 7;
        config.message.verbose = true;
        let json = config.to_json_pretty().unwrap();
        assert_eq!(StackConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = StackConfig::from_path("/nonexistent/isn-stack.json").unwrap_err();
        match err {
            ConfigError::Read { path, .. } => assert!(path.ends_with("isn-stack.json")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
