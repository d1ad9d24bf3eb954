//! Retriever settings
//!
//! Settings come from `/etc/gce-metadata-scripts/scripts.cfg` plus drop-ins in
//! `scripts.cfg.d/`, all YAML. Every field is optional in files; anything not
//! set falls back to the built-in default.

pub mod loader;
pub mod merge;

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ScriptError;
use crate::metadata::GCE_METADATA_URL;
use crate::retry::RetryPolicy;

pub use loader::load_settings;

/// Default configuration directory
pub const CONFIG_DIR: &str = "/etc/gce-metadata-scripts";

/// Settings for the metadata client and script downloads
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetrieverSettings {
    /// Metadata server base URL
    pub metadata_url: String,

    /// Total attempts for a retried network operation
    pub retry_attempts: u32,

    /// Pause between attempts, in seconds
    pub retry_delay_secs: u64,

    /// TCP connect timeout for every request, in seconds
    pub connect_timeout_secs: u64,

    /// Total timeout for a script download request, in seconds
    pub request_timeout_secs: u64,

    /// Total timeout for a metadata server request, in seconds
    pub metadata_timeout_secs: u64,
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self {
            metadata_url: GCE_METADATA_URL.to_string(),
            retry_attempts: crate::retry::DEFAULT_ATTEMPTS,
            retry_delay_secs: crate::retry::DEFAULT_DELAY.as_secs(),
            connect_timeout_secs: 2,
            request_timeout_secs: 60,
            metadata_timeout_secs: 5,
        }
    }
}

impl RetrieverSettings {
    /// Parse settings from a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Reject values that would make the retriever unusable
    pub fn validate(&self) -> Result<(), ScriptError> {
        if self.metadata_url.trim().is_empty() {
            return Err(ScriptError::Config("metadata_url must not be empty".into()));
        }
        if self.request_timeout_secs == 0 || self.metadata_timeout_secs == 0 {
            return Err(ScriptError::Config("timeouts must be greater than zero".into()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_secs(self.retry_delay_secs))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }
}

/// Locations of the settings file and its drop-in directory
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub dir: PathBuf,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigPaths {
    pub fn new() -> Self {
        Self {
            dir: PathBuf::from(CONFIG_DIR),
        }
    }

    /// Use a custom configuration directory (useful for testing)
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// scripts.cfg - main settings file
    pub fn main_config(&self) -> PathBuf {
        self.dir.join("scripts.cfg")
    }

    /// scripts.cfg.d - drop-in directory
    pub fn config_d(&self) -> PathBuf {
        self.dir.join("scripts.cfg.d")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = RetrieverSettings::default();
        assert_eq!(settings.metadata_url, GCE_METADATA_URL);
        assert_eq!(settings.retry_policy(), RetryPolicy::default());
        assert_eq!(settings.request_timeout(), Duration::from_secs(60));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let settings = RetrieverSettings::from_yaml("retry_attempts: 5\nretry_delay_secs: 1\n").unwrap();
        assert_eq!(settings.retry_attempts, 5);
        assert_eq!(settings.retry_delay_secs, 1);
        assert_eq!(settings.metadata_url, GCE_METADATA_URL);
        assert_eq!(settings.connect_timeout_secs, 2);
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let settings = RetrieverSettings {
            request_timeout_secs: 0,
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(ScriptError::Config(_))));
    }

    #[test]
    fn test_config_paths() {
        let paths = ConfigPaths::with_dir("/tmp/cfg");
        assert_eq!(paths.main_config(), PathBuf::from("/tmp/cfg/scripts.cfg"));
        assert_eq!(paths.config_d(), PathBuf::from("/tmp/cfg/scripts.cfg.d"));
        assert_eq!(ConfigPaths::new().dir, PathBuf::from(CONFIG_DIR));
    }
}
