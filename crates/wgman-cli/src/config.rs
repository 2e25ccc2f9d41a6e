//! Tool configuration.
//!
//! A single JSON file holding:
//! - Where the state snapshot and the `wg-quick` files live
//! - Which `wg`/`wg-quick` binaries to run and for how long
//! - Defaults for newly created interfaces

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wgman_core::{InterfaceDefaults, ManagerConfig, DEFAULT_CONFIG_DIR};
use wgman_wireguard::ToolConfig;

use crate::error::CliError;

/// Where `wgman` looks for its configuration when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/wgman/wgman.json";

/// Default directory for the state snapshot.
pub const DEFAULT_STATE_DIR: &str = "/var/lib/wgman";

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WgmanConfig {
    /// Directory holding the state snapshot.
    pub state_dir: PathBuf,
    /// Directory the `<name>.conf` files are written to.
    pub config_dir: PathBuf,
    /// `wg` binary.
    pub wg_binary: PathBuf,
    /// `wg-quick` binary.
    pub wg_quick_binary: PathBuf,
    /// Upper bound for each tool invocation, in seconds.
    pub command_timeout_secs: u64,
    /// Interface creation defaults.
    pub defaults: InterfaceDefaults,
}

impl Default for WgmanConfig {
    fn default() -> Self {
        let tool = ToolConfig::default();
        Self {
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
            wg_binary: tool.wg_binary,
            wg_quick_binary: tool.wg_quick_binary,
            command_timeout_secs: tool.timeout.as_secs(),
            defaults: InterfaceDefaults::default(),
        }
    }
}

impl WgmanConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CliError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!(
                "failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_json(&content)
    }

    /// Load configuration, falling back to defaults when `path` does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, CliError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or fails validation.
    pub fn from_json(content: &str) -> Result<Self, CliError> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| CliError::Config(format!("invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CliError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CliError::Format(format!("JSON serialization failed: {e}")))?;
        std::fs::write(path, json + "\n")?;
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is unusable.
    pub fn validate(&self) -> Result<(), CliError> {
        for (field, value) in [
            ("state_dir", &self.state_dir),
            ("config_dir", &self.config_dir),
            ("wg_binary", &self.wg_binary),
            ("wg_quick_binary", &self.wg_quick_binary),
        ] {
            if value.as_os_str().is_empty() {
                return Err(CliError::Config(format!("{field} cannot be empty")));
            }
        }

        if self.command_timeout_secs == 0 {
            return Err(CliError::Config(
                "command_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.defaults.port == 0 {
            return Err(CliError::Config("defaults.port must not be 0".to_string()));
        }

        wgman_core::model::validate_interface_name(&self.defaults.name)
            .map_err(|e| CliError::Config(format!("defaults.name: {e}")))?;

        Ok(())
    }

    /// Settings for the `wg`/`wg-quick` adapter.
    #[must_use]
    pub fn tool_config(&self) -> ToolConfig {
        ToolConfig {
            wg_binary: self.wg_binary.clone(),
            wg_quick_binary: self.wg_quick_binary.clone(),
            timeout: Duration::from_secs(self.command_timeout_secs),
        }
    }

    /// Settings for the manager.
    #[must_use]
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            config_dir: self.config_dir.clone(),
            defaults: self.defaults.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WgmanConfig::default();
        assert_eq!(config.state_dir, PathBuf::from("/var/lib/wgman"));
        assert_eq!(config.config_dir, PathBuf::from("/etc/wireguard"));
        assert_eq!(config.wg_binary, PathBuf::from("wg"));
        assert_eq!(config.command_timeout_secs, 30);
        assert_eq!(config.defaults.name, "wg0");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let json = r#"{
            "state_dir": "/tmp/wgman-state",
            "defaults": { "port": 51000, "dns": "9.9.9.9" }
        }"#;

        let config = WgmanConfig::from_json(json).expect("should parse partial config");
        assert_eq!(config.state_dir, PathBuf::from("/tmp/wgman-state"));
        assert_eq!(config.config_dir, PathBuf::from("/etc/wireguard"));
        assert_eq!(config.defaults.port, 51000);
        assert_eq!(config.defaults.dns, "9.9.9.9");
        assert_eq!(config.defaults.name, "wg0");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = WgmanConfig::from_json(r#"{"command_timeout_secs": 0}"#).expect_err("zero");
        assert!(err.to_string().contains("command_timeout_secs"));
    }

    #[test]
    fn test_empty_path_rejected() {
        let err = WgmanConfig::from_json(r#"{"wg_binary": ""}"#).expect_err("empty");
        assert!(err.to_string().contains("wg_binary"));
    }

    #[test]
    fn test_bad_default_name_rejected() {
        let err = WgmanConfig::from_json(r#"{"defaults": {"name": "a/b"}}"#).expect_err("name");
        assert!(err.to_string().contains("defaults.name"));
    }

    #[test]
    fn test_invalid_json() {
        let err = WgmanConfig::from_json("{ not json").expect_err("invalid");
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("wgman.json");
        let mut config = WgmanConfig::default();
        config.command_timeout_secs = 5;
        config.save(&path).expect("save");

        let loaded = WgmanConfig::from_file(&path).expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = WgmanConfig::load_or_default(dir.path().join("absent.json")).expect("default");
        assert_eq!(config, WgmanConfig::default());
        assert!(WgmanConfig::from_file(dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_tool_and_manager_config() {
        let config = WgmanConfig {
            command_timeout_secs: 7,
            config_dir: PathBuf::from("/tmp/conf"),
            ..WgmanConfig::default()
        };
        assert_eq!(config.tool_config().timeout, Duration::from_secs(7));
        assert_eq!(config.manager_config().config_dir, PathBuf::from("/tmp/conf"));
    }
}
