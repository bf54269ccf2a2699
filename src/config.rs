//! Configuration management for the Inkplate 2 driver.
//!
//! Handles loading, saving, and validating configuration from JSON files.

use crate::display::transfer::{MAX_TRANSFER_SIZE, MAX_TRANSFER_TIME_MS, TransferLimits};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "/opt/inkplate2/config.json";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// GPIO pin assignments (BCM numbering)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PinConfig {
    /// Reset pin
    pub rst: u8,
    /// Data/Command pin
    pub dc: u8,
    /// Busy status pin
    pub busy: u8,
    /// Power control pin, if the board switches panel power
    pub pwr: Option<u8>,
    /// Manual chip select, if the panel is not on CE0
    pub cs: Option<u8>,
    /// BUSY reads LOW while the panel is busy
    pub busy_active_low: bool,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            rst: 17,
            dc: 25,
            busy: 24,
            pwr: Some(18),
            cs: None,
            busy_active_low: true,
        }
    }
}

impl PinConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        let pins = [Some(self.rst), Some(self.dc), Some(self.busy), self.pwr, self.cs];

        for pin in pins.into_iter().flatten() {
            if pin > 27 {
                return Err(ConfigError::ValidationError(format!(
                    "GPIO {} is not a valid BCM pin (0-27)",
                    pin
                )));
            }
            if !seen.insert(pin) {
                return Err(ConfigError::ValidationError(format!(
                    "GPIO {} is assigned more than once",
                    pin
                )));
            }
        }

        Ok(())
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Display width in pixels
    #[serde(default = "default_display_width")]
    pub display_width: u32,

    /// Display height in pixels
    #[serde(default = "default_display_height")]
    pub display_height: u32,

    /// Largest framed SPI write during a transfer, in bytes
    #[serde(default = "default_max_transfer_size")]
    pub max_transfer_size: usize,

    /// Time budget for one transfer step before yielding, in milliseconds
    #[serde(default = "default_max_transfer_time_ms")]
    pub max_transfer_time_ms: u32,

    /// Host loop period between update steps, in milliseconds
    #[serde(default = "default_loop_interval_ms")]
    pub loop_interval_ms: u64,

    /// How long a wait-for-idle step may take, in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// SPI clock speed in Hz
    #[serde(default = "default_spi_clock_hz")]
    pub spi_clock_hz: u32,

    #[serde(default)]
    pub pins: PinConfig,

    /// Enable verbose logging
    #[serde(default)]
    pub verbose: bool,
}

fn default_display_width() -> u32 {
    crate::display::inkplate2::WIDTH
}

fn default_display_height() -> u32 {
    crate::display::inkplate2::HEIGHT
}

fn default_max_transfer_size() -> usize {
    MAX_TRANSFER_SIZE
}

fn default_max_transfer_time_ms() -> u32 {
    MAX_TRANSFER_TIME_MS
}

fn default_loop_interval_ms() -> u64 {
    16
}

fn default_busy_timeout_ms() -> u32 {
    30_000
}

fn default_spi_clock_hz() -> u32 {
    4_000_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            display_width: default_display_width(),
            display_height: default_display_height(),
            max_transfer_size: default_max_transfer_size(),
            max_transfer_time_ms: default_max_transfer_time_ms(),
            loop_interval_ms: default_loop_interval_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            spi_clock_hz: default_spi_clock_hz(),
            pins: PinConfig::default(),
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration JSON
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default path, or return default config if not found
    #[allow(dead_code)]
    pub fn load_or_default() -> Self {
        Self::load(DEFAULT_CONFIG_PATH).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config: {}, using defaults", e);
            Self::default()
        })
    }

    /// Save configuration to a JSON file atomically
    ///
    /// Writes to a temporary file and renames it over the target, so a power
    /// loss never leaves a half-written config behind.
    #[allow(dead_code)]
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)?;

        std::fs::rename(&tmp_path, path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp_path);
            ConfigError::ReadError(e)
        })?;

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        // The resolution register takes the width as one byte
        if self.display_width == 0 || self.display_width > 255 {
            return Err(ConfigError::ValidationError(
                "display_width must be between 1 and 255".to_string(),
            ));
        }

        if self.display_height == 0 || self.display_height > 65_535 {
            return Err(ConfigError::ValidationError(
                "display_height must be between 1 and 65535".to_string(),
            ));
        }

        if self.max_transfer_size == 0 || self.max_transfer_size > 4096 {
            return Err(ConfigError::ValidationError(
                "max_transfer_size must be between 1 and 4096".to_string(),
            ));
        }

        if self.loop_interval_ms > 1000 {
            return Err(ConfigError::ValidationError(
                "loop_interval_ms must be at most 1000".to_string(),
            ));
        }

        if self.busy_timeout_ms < 100 {
            return Err(ConfigError::ValidationError(
                "busy_timeout_ms must be at least 100".to_string(),
            ));
        }

        if !(100_000..=32_000_000).contains(&self.spi_clock_hz) {
            return Err(ConfigError::ValidationError(
                "spi_clock_hz must be between 100000 and 32000000".to_string(),
            ));
        }

        self.pins.validate()
    }

    /// Chunking and time budget for the transfer engine
    pub fn transfer_limits(&self) -> TransferLimits {
        TransferLimits {
            max_chunk: self.max_transfer_size,
            budget_ms: self.max_transfer_time_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.display_width, 104);
        assert_eq!(config.display_height, 212);
        assert_eq!(config.transfer_limits(), TransferLimits::default());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = Config::from_json(
            r#"{ "max_transfer_size": 64, "pins": { "cs": 7, "pwr": null } }"#,
        )
        .unwrap();

        assert_eq!(config.max_transfer_size, 64);
        assert_eq!(config.max_transfer_time_ms, 10);
        assert_eq!(config.pins.cs, Some(7));
        assert_eq!(config.pins.pwr, None);
        assert_eq!(config.pins.rst, 17);
        assert!(config.pins.busy_active_low);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            r#"{ "display_width": 0 }"#,
            r#"{ "display_width": 300 }"#,
            r#"{ "display_height": 0 }"#,
            r#"{ "max_transfer_size": 0 }"#,
            r#"{ "busy_timeout_ms": 10 }"#,
            r#"{ "spi_clock_hz": 50 }"#,
            r#"{ "loop_interval_ms": 5000 }"#,
            r#"{ "pins": { "dc": 17 } }"#,
            r#"{ "pins": { "cs": 40 } }"#,
        ];

        for json in cases {
            assert!(
                matches!(Config::from_json(json), Err(ConfigError::ValidationError(_))),
                "accepted {}",
                json
            );
        }
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            Config::from_json("{ not json"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_save_then_load() {
        let dir = std::env::temp_dir().join(format!("inkplate2-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");

        let config = Config {
            max_transfer_time_ms: 25,
            pins: PinConfig {
                cs: Some(8),
                ..PinConfig::default()
            },
            ..Config::default()
        };
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
        assert!(!path.with_extension("json.tmp").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
