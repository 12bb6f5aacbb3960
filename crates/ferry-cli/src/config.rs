//! Configuration file for the Ferry CLI.

use anyhow::Context;
use ferry_core::{ControllerConfig, Settings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// CLI configuration (`config.toml`)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Controller settings shared with the C ABI
    #[serde(default)]
    pub controller: Settings,
    /// Receive defaults
    #[serde(default)]
    pub receive: ReceiveConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Receive defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveConfig {
    /// Directory received files land in when `-o` is not given
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Cannot parse config {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("ferry/config.toml")
    }

    /// Load config from default path, writing the defaults there on first use
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();

        if path.exists() {
            Self::load(&path)
        } else {
            let config = Self::default();
            if let Err(e) = config.save(&path) {
                tracing::debug!("Not writing default config to {}: {e}", path.display());
            }
            Ok(config)
        }
    }

    /// Validate configuration and build the controller configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the log level or any controller setting is invalid.
    pub fn controller_config(&self) -> anyhow::Result<ControllerConfig> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        self.controller
            .clone()
            .into_config()
            .context("Invalid [controller] settings")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.controller.bind_addr, "0.0.0.0:0");
        assert_eq!(config.receive.output_dir, PathBuf::from("."));
        assert_eq!(config.logging.level, "info");
        assert!(config.controller_config().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        assert!(config.controller_config().is_err());

        config.logging.level = "DEBUG".to_string();
        config.controller.chunk_size = 0;
        assert!(config.controller_config().is_err());

        config.controller.chunk_size = 4096;
        config.controller.bind_addr = "not an address".to_string();
        assert!(config.controller_config().is_err());
    }

    #[test]
    fn test_partial_file() {
        let config: Config = toml::from_str(
            r#"
            [controller]
            relay = "relay.example:7878"
            wait_timeout_ms = 30000

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        let controller = config.controller_config().unwrap();
        assert_eq!(
            controller.transport.relay.as_deref(),
            Some("relay.example:7878")
        );
        assert_eq!(
            controller.transfer.wait_timeout,
            Some(std::time::Duration::from_secs(30))
        );
        assert_eq!(config.receive.output_dir, PathBuf::from("."));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let mut config = Config::default();
        config.controller.chunk_size = 8192;
        config.receive.output_dir = PathBuf::from("/srv/incoming");
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.controller, config.controller);
        assert_eq!(loaded.receive.output_dir, PathBuf::from("/srv/incoming"));
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(dir.path().join("absent.toml")).is_err());
    }
}
