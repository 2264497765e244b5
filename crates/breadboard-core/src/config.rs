/*!
 * Process settings for Breadboard.
 *
 * Settings are everything that is not the device document: where the
 * document lives, how to log, runtime bounds and the listener address.
 * They are layered as defaults, then an optional settings file, then
 * `BREADBOARD__SECTION__KEY` environment variables.
 */
use std::path::Path;
use std::time::Duration;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Environment prefix used by [`SettingsBuilder::from_env`]
pub const ENV_PREFIX: &str = "BREADBOARD";

/// Process-level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// General settings
    #[serde(default)]
    pub general: GeneralSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Runtime settings
    #[serde(default)]
    pub runtime: RuntimeSettings,

    /// Listener overrides
    #[serde(default)]
    pub server: ServerSettings,
}

/// General settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Application name, used in the startup banner
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Path of the JSON device document
    #[serde(default = "default_device_file")]
    pub device_file: String,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level or filter directive (trace, debug, info, `breadboard_engine=debug`)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to use JSON format for logs
    #[serde(default)]
    pub json_format: bool,
}

/// Runtime settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Granularity of the input polling tick in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on a single webhook request in milliseconds
    #[serde(default = "default_webhook_timeout_ms")]
    pub webhook_timeout_ms: u64,

    /// Deepest cascade level one turn processes; transitions caused directly
    /// by polling or a request are level 0, those caused by rules firing on
    /// them level 1, and so on. A deeper transition drops the rest of the queue
    #[serde(default = "default_max_cascade")]
    pub max_cascade: usize,
}

/// Listener overrides; unset fields fall back to the document's `network` section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Bind port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            device_file: default_device_file(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            webhook_timeout_ms: default_webhook_timeout_ms(),
            max_cascade: default_max_cascade(),
        }
    }
}

impl RuntimeSettings {
    /// Polling tick as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Webhook deadline as a [`Duration`], never zero
    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_millis(self.webhook_timeout_ms.max(1))
    }
}

fn default_app_name() -> String {
    "breadboard".to_string()
}

fn default_device_file() -> String {
    "config.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_webhook_timeout_ms() -> u64 {
    1000
}

fn default_max_cascade() -> usize {
    32
}

/// A builder for layered [`Settings`]
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    settings_file: Option<String>,
    environment_prefix: Option<String>,
}

impl SettingsBuilder {
    /// Create a new SettingsBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder reading the standard `BREADBOARD__` environment variables
    pub fn from_env() -> Self {
        Self::new().with_environment_prefix(ENV_PREFIX)
    }

    /// Set the settings file path; a missing file is not an error
    pub fn with_settings_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.settings_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Build the settings
    pub fn build(self) -> Result<Settings> {
        let defaults = ConfigLib::try_from(&Settings::default())
            .map_err(|e| Error::config(format!("Failed to create default settings: {}", e)))?;
        let mut builder = ConfigLib::builder().add_source(defaults);

        if let Some(settings_file) = self.settings_file {
            if Path::new(&settings_file).exists() {
                debug!("Loading settings from {}", settings_file);
                builder = builder.add_source(File::with_name(&settings_file));
            } else {
                debug!("Settings file {} does not exist, using defaults", settings_file);
            }
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading settings from environment variables with prefix {}", prefix);
            builder = builder.add_source(
                Environment::with_prefix(&prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let layered = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build settings: {}", e)))?;

        let settings: Settings = layered
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize settings: {}", e)))?;

        if settings.runtime.max_cascade == 0 {
            return Err(Error::config("runtime.max_cascade must be at least 1"));
        }
        if settings.runtime.webhook_timeout_ms == 0 {
            return Err(Error::config("runtime.webhook_timeout_ms must be at least 1"));
        }

        info!("Settings loaded");
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.general.app_name, "breadboard");
        assert_eq!(settings.general.device_file, "config.json");
        assert_eq!(settings.logging.level, "info");
        assert_eq!(settings.runtime.webhook_timeout(), Duration::from_secs(1));
        assert_eq!(settings.runtime.max_cascade, 32);
        assert_eq!(settings.server.port, None);
    }

    #[test]
    fn test_builder_defaults() {
        let settings = SettingsBuilder::new().build().unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_builder_with_file() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("breadboard.toml");

        {
            let mut file = File::create(&file_path)?;
            file.write_all(
                br#"
                [general]
                device_file = "/etc/breadboard/greenhouse.json"

                [logging]
                level = "debug"

                [runtime]
                max_cascade = 8

                [server]
                port = 8080
            "#,
            )?;
        }

        let settings = SettingsBuilder::new().with_settings_file(file_path).build()?;

        assert_eq!(settings.general.app_name, "breadboard");
        assert_eq!(settings.general.device_file, "/etc/breadboard/greenhouse.json");
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.runtime.max_cascade, 8);
        assert_eq!(settings.server.port, Some(8080));
        assert_eq!(settings.server.host, None);

        Ok(())
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() -> Result<()> {
        let settings = SettingsBuilder::new()
            .with_settings_file("/nonexistent/breadboard.toml")
            .build()?;
        assert_eq!(settings, Settings::default());
        Ok(())
    }

    #[test]
    fn test_builder_with_env() -> Result<()> {
        env::set_var("BBTESTENV__GENERAL__APP_NAME", "env-app");
        env::set_var("BBTESTENV__RUNTIME__WEBHOOK_TIMEOUT_MS", "250");

        let settings = SettingsBuilder::new()
            .with_environment_prefix("BBTESTENV")
            .build()?;

        assert_eq!(settings.general.app_name, "env-app");
        assert_eq!(settings.runtime.webhook_timeout_ms, 250);

        env::remove_var("BBTESTENV__GENERAL__APP_NAME");
        env::remove_var("BBTESTENV__RUNTIME__WEBHOOK_TIMEOUT_MS");

        Ok(())
    }

    #[test]
    fn test_zero_cascade_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("bad.toml");
        std::fs::write(&file_path, "[runtime]\nmax_cascade = 0\n")?;

        let err = SettingsBuilder::new()
            .with_settings_file(file_path)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        Ok(())
    }

    #[test]
    fn test_zero_webhook_timeout() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("bad.toml");
        std::fs::write(&file_path, "[runtime]\nwebhook_timeout_ms = 0\n")?;

        let err = SettingsBuilder::new()
            .with_settings_file(file_path)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("webhook_timeout_ms")));

        let runtime = RuntimeSettings {
            webhook_timeout_ms: 0,
            ..RuntimeSettings::default()
        };
        assert_eq!(runtime.webhook_timeout(), Duration::from_millis(1));
        Ok(())
    }
}
