//! Configuration file support for hexlink.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (HEXLINK_*)
//! 3. Local config file (./hexlink.toml)
//! 4. Global config file (~/.config/hexlink/config.toml)
//!
//! An explicit `--config PATH` replaces steps 3 and 4 and must parse.

use anyhow::Context;
use directories::ProjectDirs;
use hexlink::{LineEnding, SerialConfig, TransferConfig};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the per-project config file.
pub const LOCAL_CONFIG_FILE: &str = "hexlink.toml";

/// Serial port configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortConfig {
    /// Serial device (e.g., "/dev/ttyUSB0" or "COM3").
    pub serial: Option<String>,
    /// Baud rate.
    pub baud: Option<u32>,
}

/// Line transfer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Milliseconds to wait for the reply to each line.
    pub ack_timeout_ms: Option<u64>,
    /// Payload bytes kept per line.
    pub line_buffer_cap: Option<usize>,
    /// Reply bytes read per line.
    pub ack_window: Option<usize>,
    /// Reply that marks a line as accepted.
    pub ack_token: Option<String>,
    /// Terminator sent after each line.
    pub line_ending: Option<LineEnding>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Port configuration.
    #[serde(default)]
    pub port: PortConfig,
    /// Transfer configuration.
    #[serde(default)]
    pub transfer: TransferSettings,
}

impl Config {
    /// Load configuration from the global and local files, skipping any
    /// that are missing or broken.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a file if it exists, warning on errors.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "hexlink").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.port.serial.is_some() {
            self.port.serial = other.port.serial;
        }
        if other.port.baud.is_some() {
            self.port.baud = other.port.baud;
        }

        let transfer = other.transfer;
        if transfer.ack_timeout_ms.is_some() {
            self.transfer.ack_timeout_ms = transfer.ack_timeout_ms;
        }
        if transfer.line_buffer_cap.is_some() {
            self.transfer.line_buffer_cap = transfer.line_buffer_cap;
        }
        if transfer.ack_window.is_some() {
            self.transfer.ack_window = transfer.ack_window;
        }
        if transfer.ack_token.is_some() {
            self.transfer.ack_token = transfer.ack_token;
        }
        if transfer.line_ending.is_some() {
            self.transfer.line_ending = transfer.line_ending;
        }
    }

    /// Build the serial settings, preferring values given on the command line.
    pub fn serial_config(&self, port: Option<&str>, baud: Option<u32>) -> SerialConfig {
        let mut serial = SerialConfig::default();
        if let Some(name) = port.or(self.port.serial.as_deref()) {
            serial.port_name = name.to_string();
        }
        if let Some(baud) = baud.or(self.port.baud) {
            serial.baud_rate = baud;
        }
        serial
    }

    /// Build the transfer settings, preferring values given on the command line.
    pub fn transfer_config(
        &self,
        ack_timeout_ms: Option<u64>,
        line_ending: Option<LineEnding>,
    ) -> TransferConfig {
        let settings = &self.transfer;
        let mut transfer = TransferConfig::default();

        if let Some(ms) = ack_timeout_ms.or(settings.ack_timeout_ms) {
            transfer.ack_timeout = Duration::from_millis(ms);
        }
        if let Some(cap) = settings.line_buffer_cap {
            transfer.per_line_buffer_cap = cap;
        }
        if let Some(window) = settings.ack_window {
            transfer.ack_window = window;
        }
        if let Some(token) = &settings.ack_token {
            transfer.ack_token = token.as_bytes().to_vec();
        }
        if let Some(ending) = line_ending.or(settings.line_ending) {
            transfer.line_ending = ending;
        }
        transfer
    }
}
