//! Configuration file handling for fmota
//!
//! The file holds the engine configuration plus a few CLI defaults:
//!
//! ```toml
//! output = "json"
//! no_color = true
//!
//! [transport]
//! type = "ble"
//! adapter = "hci0"
//!
//! [channel]
//! timeout_ms = 5000
//! ```

use anyhow::{Context, Result};
use clap::ValueEnum;
use fmota::config::MockConfig;
use fmota::{OtaConfig, TransportConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::output::OutputFormat;

/// Configuration for the CLI tool
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default output format
    pub output: Option<String>,
    /// Disable colored output
    pub no_color: Option<bool>,
    /// Engine settings
    #[serde(flatten)]
    pub ota: OtaConfig,
}

impl Config {
    /// Load configuration from the default config file
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .ota
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join("fmota");

        Ok(config_dir.join("config.toml"))
    }

    /// Merge CLI arguments over config file values
    pub fn merge_with_args(
        self,
        output: Option<OutputFormat>,
        no_color: bool,
        mock: bool,
    ) -> Result<MergedConfig> {
        let output = match (output, &self.output) {
            (Some(format), _) => format,
            (None, Some(name)) => OutputFormat::from_str(name, true)
                .map_err(|e| anyhow::anyhow!("Invalid output format in config: {}", e))?,
            (None, None) => OutputFormat::default(),
        };

        let mut ota = self.ota;
        if mock && !matches!(ota.transport, TransportConfig::Mock(_)) {
            ota.transport = TransportConfig::Mock(MockConfig::default());
        }

        Ok(MergedConfig {
            ota,
            output,
            no_color: no_color || self.no_color.unwrap_or(false),
        })
    }
}

/// Fully resolved configuration after merging CLI args
#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub ota: OtaConfig,
    pub output: OutputFormat,
    pub no_color: bool,
}
