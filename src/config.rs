//! Configuration management for Digit Keypad
//!
//! Configuration is read from a platform-specific TOML file. Every section
//! has defaults, so a missing file or a partial file is fine.
//!
//! ## Config File Location
//!
//! `~/.config/digit-keypad/config.toml` (via `dirs::config_dir()`)
//!
//! ## Example
//!
//! ```no_run
//! use digit_keypad::Config;
//!
//! let mut config = Config::load().unwrap_or_default();
//! config.node.path = "/run/digit_key_driver".into();
//! config.save().expect("Failed to save config");
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to determine config directory
    #[error("Could not determine config directory")]
    NoConfigDir,
    /// IO error reading or writing config file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Failed to parse config file
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Failed to serialize config
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Returns the path to the config file.
///
/// Creates the config directory if it doesn't exist.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    let app_dir = config_dir.join("digit-keypad");

    if !app_dir.exists() {
        fs::create_dir_all(&app_dir)?;
    }

    Ok(app_dir.join("config.toml"))
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Virtual input device identity
    #[serde(default)]
    pub device: DeviceConfig,
    /// Device node settings
    #[serde(default)]
    pub node: NodeConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Session report settings
    #[serde(default)]
    pub report: ReportConfig,
}

/// Identity the virtual keypad registers with the input subsystem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name shown to listeners
    pub name: String,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: "Digit Key Simulator".to_string(),
            vendor: 0x0001,
            product: 0x0001,
            version: 0x0001,
        }
    }
}

/// Device node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Where the node is created
    pub path: PathBuf,
    /// Permission bits of the node
    pub mode: u32,
    /// Idle wait between reads of the node (in milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/tmp/digit_key_driver"),
            mode: 0o622,
            poll_interval_ms: 10,
        }
    }
}

impl NodeConfig {
    /// Get node poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Session report configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReportConfig {
    /// Write a JSON report here on teardown
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default config file.
    ///
    /// Returns the default configuration if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to the default config file.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}
