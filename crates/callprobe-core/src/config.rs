//! Configuration types for callprobe.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{ConnectionInfo, Error};

/// Harness configuration loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HarnessConfig {
    /// Session endpoint settings
    pub server: ServerSettings,
    /// Call behavior settings
    pub call: CallSettings,
    /// Logging settings
    pub logging: LoggingSettings,
    /// Transcript recording settings
    pub recording: RecordingSettings,
}

impl HarnessConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        let config: HarnessConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> crate::Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(Error::Config("server.host cannot be empty".to_string()));
        }

        if self.call.max_concurrent_calls == 0 {
            return Err(Error::Config(
                "call.max_concurrent_calls must be > 0".to_string(),
            ));
        }

        if self.recording.enabled && self.recording.directory.is_none() {
            return Err(Error::Config(
                "recording.directory is required when recording is enabled".to_string(),
            ));
        }

        Ok(())
    }
}

/// Address of the session endpoint. Passed through to the session untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host name or address
    pub host: String,
    /// Port number
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let info = ConnectionInfo::default();
        Self {
            host: info.host,
            port: info.port,
        }
    }
}

impl ServerSettings {
    /// Connection descriptor handed to sessions.
    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo::new(self.host.clone(), self.port)
    }
}

/// Per-call timing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallSettings {
    /// Timeout applied when an operation gives none, in milliseconds (0 = wait forever)
    pub default_timeout_ms: u64,
    /// How long to wait for the spurious output after digit entry (0 = don't drain)
    pub digit_drain_timeout_ms: u64,
    /// Maximum number of calls driven at once
    pub max_concurrent_calls: usize,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: 0,
            digit_drain_timeout_ms: 250,
            max_concurrent_calls: 4,
        }
    }
}

impl CallSettings {
    /// Default operation timeout, `None` meaning indefinite.
    pub fn default_timeout(&self) -> Option<Duration> {
        match self.default_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Post-digit drain timeout, `None` meaning the drain is disabled.
    pub fn digit_drain_timeout(&self) -> Option<Duration> {
        match self.digit_drain_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Transcript recording settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RecordingSettings {
    /// Write a transcript for every call
    pub enabled: bool,
    /// Directory transcripts are written to
    pub directory: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HarnessConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 4242);
        assert_eq!(config.call.default_timeout_ms, 0);
        assert_eq!(config.call.digit_drain_timeout_ms, 250);
        assert_eq!(config.call.max_concurrent_calls, 4);
        assert_eq!(config.logging.level, "info");
        assert!(!config.recording.enabled);
    }

    #[test]
    fn test_config_validation() {
        assert!(HarnessConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_max_concurrent_calls() {
        let mut config = HarnessConfig::default();
        config.call.max_concurrent_calls = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_recording_requires_directory() {
        let mut config = HarnessConfig::default();
        config.recording.enabled = true;
        assert!(config.validate().is_err());

        config.recording.directory = Some("transcripts".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
server:
  host: ivr.test
  port: 5060

call:
  default_timeout_ms: 4000
  digit_drain_timeout_ms: 100
  max_concurrent_calls: 8

logging:
  level: debug

recording:
  enabled: true
  directory: target/transcripts
"#;

        let config = HarnessConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.connection_info().to_string(), "ivr.test:5060");
        assert_eq!(
            config.call.default_timeout(),
            Some(Duration::from_millis(4000))
        );
        assert_eq!(
            config.call.digit_drain_timeout(),
            Some(Duration::from_millis(100))
        );
        assert_eq!(config.call.max_concurrent_calls, 8);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.recording.directory.as_deref(),
            Some("target/transcripts")
        );
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = HarnessConfig::from_yaml("call:\n  digit_drain_timeout_ms: 0\n").unwrap();
        assert_eq!(config.call.digit_drain_timeout(), None);
        assert_eq!(config.call.default_timeout(), None);
        assert_eq!(config.server.port, 4242);
    }

    #[test]
    fn test_malformed_yaml() {
        let result = HarnessConfig::from_yaml("call: [not, a, map]");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
