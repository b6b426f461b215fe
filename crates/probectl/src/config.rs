//! Configuration management for probectl.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/probectl/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use hidlink::{SessionOptions, DEFAULT_REPORT_SIZE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("report_size must be between 1 and 1024, got {0}")]
    InvalidReportSize(usize),

    #[error("response_timeout_ms must be between 1 and 60000, got {0}")]
    InvalidResponseTimeout(u64),

    #[error("log level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Largest report size accepted (full-speed HID tops out well below this).
const MAX_REPORT_SIZE: usize = 1024;

/// Upper bound for the response timeout.
const MAX_RESPONSE_TIMEOUT_MS: u64 = 60_000;

/// Main configuration structure for probectl.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Probe session configuration.
    pub probe: ProbeConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub level: String,
}

/// Probe session configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProbeConfig {
    /// Size of one output report in bytes.
    pub report_size: usize,

    /// How long to wait for a response report, in milliseconds.
    pub response_timeout_ms: u64,

    /// Index of the granted device to use when none is given on the
    /// command line.
    pub device_index: usize,

    /// Vendor/product pairs the native backend may grant. Empty means all.
    pub allow: Vec<AllowedDevice>,
}

/// One allow-list entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllowedDevice {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            report_size: DEFAULT_REPORT_SIZE,
            response_timeout_ms: 2000,
            device_index: 0,
            allow: Vec::new(),
        }
    }
}

impl ProbeConfig {
    /// Session options derived from this configuration.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            report_size: self.report_size,
            response_timeout: Duration::from_millis(self.response_timeout_ms),
        }
    }

    /// Allow-list as grant filters.
    pub fn allow_filters(&self) -> Vec<hidlink::DeviceFilter> {
        self.allow
            .iter()
            .map(|a| hidlink::DeviceFilter::ids(a.vendor_id, a.product_id))
            .collect()
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("probectl")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - PROBECTL_LOG_LEVEL: Override log level
    /// - PROBECTL_RESPONSE_TIMEOUT_MS: Override response timeout
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("PROBECTL_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log level from environment: {}", level);
                self.logging.level = level;
            }
        }

        if let Ok(value) = std::env::var("PROBECTL_RESPONSE_TIMEOUT_MS") {
            match value.parse::<u64>() {
                Ok(ms) => {
                    tracing::info!("Overriding response timeout from environment: {}ms", ms);
                    self.probe.response_timeout_ms = ms;
                }
                Err(_) => {
                    tracing::warn!(
                        "Ignoring invalid PROBECTL_RESPONSE_TIMEOUT_MS value: {}",
                        value
                    );
                }
            }
        }
    }

    /// Filter directive for the tracing subscriber.
    ///
    /// `--verbose` wins, then `PROBECTL_LOG_LEVEL`, then the file's level.
    /// Reads the environment directly so tracing can be installed before
    /// [`apply_env_overrides`](Self::apply_env_overrides) logs anything.
    pub fn log_filter(&self, verbose: bool) -> String {
        if verbose {
            return "debug".to_string();
        }
        match std::env::var("PROBECTL_LOG_LEVEL") {
            Ok(level) if !level.is_empty() => level.to_lowercase(),
            _ => self.logging.level.to_lowercase(),
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe.report_size == 0 || self.probe.report_size > MAX_REPORT_SIZE {
            return Err(ConfigError::InvalidReportSize(self.probe.report_size));
        }

        if self.probe.response_timeout_ms == 0
            || self.probe.response_timeout_ms > MAX_RESPONSE_TIMEOUT_MS
        {
            return Err(ConfigError::InvalidResponseTimeout(
                self.probe.response_timeout_ms,
            ));
        }

        let level = self.logging.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
