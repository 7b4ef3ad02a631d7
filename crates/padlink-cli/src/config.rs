//! padlink CLI configuration management
//!
//! Loads the `[link]` table from a TOML file, fills gaps with defaults, and
//! applies command-line overrides on top. Priority ordering:
//! CLI args > config file > defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use padlink_core::{Delimiter, LinkConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cli::Cli;
use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the padlink CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// UART link configuration
    pub link: LinkConfig,
}

impl AppConfig {
    /// Load configuration from the given file, or from the default location
    /// when `path` is `None`. A missing default file is not an error.
    ///
    /// Parsed values are not validated here; call [`AppConfig::validate`]
    /// after command-line overrides have been applied.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => match Self::default_config_path() {
                Some(path) if path.exists() => Self::load_from_file(&path),
                _ => {
                    debug!("No configuration file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        debug!("Loading configuration from {}", path.as_ref().display());
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: AppConfig = toml::from_str(&raw)?;
        Ok(config)
    }

    /// The default configuration file location, `padlink/config.toml` under
    /// the platform configuration directory.
    fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("padlink").join("config.toml"))
    }

    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if !cli.name_prefixes.is_empty() {
            self.link.name_prefixes = cli.name_prefixes.clone();
        }
        if let Some(delimiter) = cli.delimiter {
            self.link.delimiter = delimiter;
        }
        if cli.no_delimiter {
            self.link.delimiter = Delimiter::None;
        }
        if let Some(secs) = cli.scan_timeout {
            self.link.scan_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = cli.connect_timeout {
            self.link.connect_timeout = Duration::from_secs(secs);
        }
        if cli.acknowledged {
            self.link.prefer_unacknowledged = false;
        }
    }

    /// Validate the effective configuration.
    pub fn validate(&self) -> Result<()> {
        if self.link.name_prefixes.is_empty() {
            return Err(CliError::Config(
                "at least one name prefix must be configured".to_string(),
            ));
        }
        if self.link.scan_timeout.is_zero() {
            return Err(CliError::Config(
                "scan timeout must be greater than 0".to_string(),
            ));
        }
        if self.link.connect_timeout.is_zero() {
            return Err(CliError::Config(
                "connect timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
