//! Client configuration.
//!
//! Loaded from a JSON file, from environment variables, or left at the
//! defaults. Every field is optional.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, ServiceError};

/// Settings for spawning and talking to the dprint editor service.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Path to (or name of) the dprint executable.
    #[serde(default = "default_executable")]
    pub executable: String,

    /// How long to wait for any single frame read or write.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,

    /// How long `editor-info` may run.
    #[serde(default = "default_info_timeout")]
    pub info_timeout_seconds: u64,

    /// How long the shutdown exchange may take before the service is killed.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            read_timeout_seconds: default_read_timeout(),
            info_timeout_seconds: default_info_timeout(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

impl ServiceConfig {
    /// Create from environment variables, falling back to defaults.
    ///
    /// Reads `DPRINT_PATH`, `DPRINT_READ_TIMEOUT` and `DPRINT_INFO_TIMEOUT`
    /// (timeouts in seconds). Unparsable or zero values are ignored.
    pub fn from_env() -> Self {
        let seconds = |name: &str| {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|v| *v > 0)
        };

        let defaults = Self::default();
        Self {
            executable: std::env::var("DPRINT_PATH")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.executable),
            read_timeout_seconds: seconds("DPRINT_READ_TIMEOUT")
                .unwrap_or(defaults.read_timeout_seconds),
            info_timeout_seconds: seconds("DPRINT_INFO_TIMEOUT")
                .unwrap_or(defaults.info_timeout_seconds),
            ..defaults
        }
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    fn validate(&self) -> Result<()> {
        if self.executable.is_empty() {
            return Err(ServiceError::Config("executable must not be empty".into()));
        }
        for (name, value) in [
            ("read_timeout_seconds", self.read_timeout_seconds),
            ("info_timeout_seconds", self.info_timeout_seconds),
            ("shutdown_timeout_seconds", self.shutdown_timeout_seconds),
        ] {
            if value == 0 {
                return Err(ServiceError::Config(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }

    pub const fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }

    pub const fn info_timeout(&self) -> Duration {
        Duration::from_secs(self.info_timeout_seconds)
    }

    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

fn default_executable() -> String {
    "dprint".into()
}

const fn default_read_timeout() -> u64 {
    30
}

const fn default_info_timeout() -> u64 {
    10
}

const fn default_shutdown_timeout() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.executable, "dprint");
        assert_eq!(config.read_timeout(), Duration::from_secs(30));
        assert_eq!(config.info_timeout(), Duration::from_secs(10));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn empty_json_uses_defaults() {
        let config = ServiceConfig::from_json("{}").unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn parse_partial_json() {
        let config = ServiceConfig::from_json(
            r#"{"executable": "/opt/dprint/bin/dprint", "read_timeout_seconds": 90}"#,
        )
        .unwrap();
        assert_eq!(config.executable, "/opt/dprint/bin/dprint");
        assert_eq!(config.read_timeout(), Duration::from_secs(90));
        assert_eq!(config.info_timeout_seconds, 10);
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = ServiceConfig::from_json(r#"{"read_timeout_seconds": 0}"#).unwrap_err();
        assert!(matches!(&err, ServiceError::Config(m) if m.contains("read_timeout_seconds")));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dprint-editor.json");
        std::fs::write(&path, r#"{"shutdown_timeout_seconds": 2}"#).unwrap();

        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn load_missing_file() {
        let err = ServiceConfig::load(Path::new("/nonexistent/dprint-editor.json")).unwrap_err();
        assert!(matches!(err, ServiceError::Io(_)));
    }

    #[test]
    fn from_env_defaults() {
        // When env vars are not set, from_env() uses the same defaults
        if ["DPRINT_PATH", "DPRINT_READ_TIMEOUT", "DPRINT_INFO_TIMEOUT"]
            .iter()
            .any(|name| std::env::var_os(name).is_some())
        {
            return;
        }
        let config = ServiceConfig::from_env();
        assert_eq!(config.executable, "dprint");
        assert_eq!(config.read_timeout(), Duration::from_secs(30));
    }
}
