//! Configuration file handling for `~/.pkgjobd/config.ini`.
//!
//! Loads and saves user configuration with sensible defaults; a missing file
//! means defaults, not an error.

use ini::Ini;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default dispatch heartbeat period in milliseconds.
pub const DEFAULT_DISPATCH_INTERVAL_MS: u64 = 500;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read or parse the config file
    #[error("failed to read config file: {0}")]
    Read(#[from] ini::Error),

    /// Failed to write the config file
    #[error("failed to write config file: {0}")]
    Write(String),

    /// A value failed validation
    #[error("invalid configuration: {section}.{key} = '{value}': {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Failed to create the config directory
    #[error("failed to create config directory: {0}")]
    Directory(std::io::Error),
}

/// User configuration loaded from config.ini.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    /// `[appstore]` section
    pub appstore: AppstoreSettings,
    /// `[daemon]` section
    pub daemon: DaemonSettings,
}

/// App store preferences.
#[derive(Debug, Clone, Default)]
pub struct AppstoreSettings {
    /// Mirror region, e.g. "CN"; unset means the distribution default.
    pub region: Option<String>,
}

/// Daemon tuning.
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    /// Dispatch heartbeat period in milliseconds.
    pub dispatch_interval_ms: u64,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            dispatch_interval_ms: DEFAULT_DISPATCH_INTERVAL_MS,
        }
    }
}

impl ConfigFile {
    /// Load configuration from the default path (`~/.pkgjobd/config.ini`).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("appstore")) {
            if let Some(region) = section.get("region") {
                if !region.is_empty() {
                    config.appstore.region = Some(region.to_string());
                }
            }
        }

        if let Some(section) = ini.section(Some("daemon")) {
            if let Some(value) = section.get("dispatch_interval_ms") {
                config.daemon.dispatch_interval_ms =
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue {
                            section: "daemon".to_string(),
                            key: "dispatch_interval_ms".to_string(),
                            value: value.to_string(),
                            reason: "expected a positive integer".to_string(),
                        })?;
            }
        }

        Ok(config)
    }

    /// Save configuration to the default path.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save configuration to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Directory)?;
        }

        let mut ini = Ini::new();
        if let Some(region) = &self.appstore.region {
            ini.with_section(Some("appstore")).set("region", region.clone());
        }
        ini.with_section(Some("daemon")).set(
            "dispatch_interval_ms",
            self.daemon.dispatch_interval_ms.to_string(),
        );

        ini.write_to_file(path)
            .map_err(|err| ConfigError::Write(err.to_string()))
    }

    /// The dispatch heartbeat period as a [`Duration`].
    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_millis(self.daemon.dispatch_interval_ms)
    }
}

/// Path to the config directory (`~/.pkgjobd`).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pkgjobd")
}

/// Path to the config file (`~/.pkgjobd/config.ini`).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = ConfigFile::load_from(&dir.path().join("absent.ini")).unwrap();
        assert!(config.appstore.region.is_none());
        assert_eq!(
            config.daemon.dispatch_interval_ms,
            DEFAULT_DISPATCH_INTERVAL_MS
        );
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.ini");

        let mut config = ConfigFile::default();
        config.appstore.region = Some("CN".to_string());
        config.daemon.dispatch_interval_ms = 250;
        config.save_to(&path).unwrap();

        let reloaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(reloaded.appstore.region.as_deref(), Some("CN"));
        assert_eq!(reloaded.daemon.dispatch_interval_ms, 250);
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.ini");

        ConfigFile::default().save_to(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_invalid_interval_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[daemon]\ndispatch_interval_ms=soon\n").unwrap();

        let err = ConfigFile::load_from(&path);
        assert!(matches!(err, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_empty_region_treated_as_unset() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[appstore]\nregion=\n").unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert!(config.appstore.region.is_none());
    }

    #[test]
    fn test_dispatch_interval_duration() {
        let mut config = ConfigFile::default();
        config.daemon.dispatch_interval_ms = 100;
        assert_eq!(config.dispatch_interval(), Duration::from_millis(100));
    }
}
