//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.fanin.toml` files.

use crate::aggregator::FanInConfig;
use crate::models::FaultPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".fanin.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Aggregator settings.
    #[serde(default)]
    pub aggregator: AggregatorConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Output format: "text" or "json".
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            format: default_format(),
        }
    }
}

fn default_format() -> String {
    "text".to_string()
}

/// Fan-in aggregator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Output channel capacity.
    #[serde(default = "default_buffer")]
    pub buffer: usize,

    /// Grace period for halted producers, in milliseconds.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,

    /// Reaction to the first producer fault.
    #[serde(default)]
    pub fault_policy: FaultPolicy,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            buffer: default_buffer(),
            grace_ms: default_grace_ms(),
            fault_policy: FaultPolicy::default(),
        }
    }
}

fn default_buffer() -> usize {
    16
}

fn default_grace_ms() -> u64 {
    2000
}

impl From<&AggregatorConfig> for FanInConfig {
    fn from(config: &AggregatorConfig) -> Self {
        FanInConfig::default()
            .with_buffer(config.buffer)
            .with_grace(Duration::from_millis(config.grace_ms))
            .with_fault_policy(config.fault_policy)
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.fanin.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(DEFAULT_CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.aggregator.buffer, 16);
        assert_eq!(config.aggregator.grace_ms, 2000);
        assert_eq!(config.aggregator.fault_policy, FaultPolicy::FailFast);
        assert_eq!(config.general.format, "text");
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
verbose = true
format = "json"

[aggregator]
buffer = 4
fault_policy = "drain"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert!(config.general.verbose);
        assert_eq!(config.general.format, "json");
        assert_eq!(config.aggregator.buffer, 4);
        assert_eq!(config.aggregator.grace_ms, 2000);
        assert_eq!(config.aggregator.fault_policy, FaultPolicy::Drain);
    }

    #[test]
    fn test_into_fan_in_config() {
        let aggregator = AggregatorConfig {
            buffer: 3,
            grace_ms: 250,
            fault_policy: FaultPolicy::Drain,
        };
        let fan_in = FanInConfig::from(&aggregator);
        assert_eq!(fan_in.buffer, 3);
        assert_eq!(fan_in.grace, Duration::from_millis(250));
        assert_eq!(fan_in.fault_policy, FaultPolicy::Drain);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[aggregator]"));
        assert!(toml_str.contains("fault_policy = \"fail-fast\""));
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from_dir(dir.path()).unwrap().is_none());

        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "[aggregator]\nbuffer = 64\n",
        )
        .unwrap();
        let config = Config::load_from_dir(dir.path()).unwrap().unwrap();
        assert_eq!(config.aggregator.buffer, 64);
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[aggregator]\nbuffer = \"lots\"\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
