//! Layered configuration
//!
//! Sources, lowest precedence first:
//! - built-in defaults
//! - a TOML file (`bas.toml` in the working directory unless a path is given)
//! - `BAS_`-prefixed environment variables, nested with `__`
//!   (e.g. `BAS_SERIAL__PORT=/dev/ttyS1`)
//! - command line overrides, applied by the binary

use std::path::{Path, PathBuf};
use std::time::Duration;

use bas_types::{DEFAULT_AUDIT_CAPACITY, DEFAULT_HISTORY_CAPACITY};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{ControlOptions, DEFAULT_SCHEDULE_ID};
use crate::link::LinkSettings;

pub const DEFAULT_CONFIG_FILE: &str = "bas.toml";
pub const ENV_PREFIX: &str = "BAS_";

#[cfg(windows)]
pub const DEFAULT_SERIAL_PORT: &str = "COM3";
#[cfg(not(windows))]
pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] figment::Error),

    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub connect_cooldown_ms: u64,
    pub write_pacing_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: 9600,
            connect_cooldown_ms: 5000,
            write_pacing_ms: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub poll_interval_ms: u64,
    /// Schedule id that decides site occupancy
    pub occupancy_schedule: String,
    pub history_capacity: usize,
    pub audit_capacity: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            occupancy_schedule: DEFAULT_SCHEDULE_ID.to_string(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub control: ControlConfig,
    pub log: LogConfig,
}

/// Values given on the command line; `None` leaves the loaded value alone
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<String>,
    pub baud_rate: Option<u32>,
    pub json_logs: bool,
}

impl Config {
    /// Layered provider chain. An explicit `path` must exist; the default
    /// file is optional.
    pub fn figment(path: Option<&Path>) -> Result<Figment, ConfigError> {
        let file = match path {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        Ok(Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Ok(Self::figment(path)?.extract()?)
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(port) = &overrides.port {
            self.serial.port = port.clone();
        }
        if let Some(baud_rate) = overrides.baud_rate {
            self.serial.baud_rate = baud_rate;
        }
        if overrides.json_logs {
            self.log.json = true;
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings::new(&self.serial.port, self.serial.baud_rate)
            .with_connect_cooldown(Duration::from_millis(self.serial.connect_cooldown_ms))
            .with_write_pacing(Duration::from_millis(self.serial.write_pacing_ms))
    }

    pub fn control_options(&self) -> ControlOptions {
        ControlOptions {
            // A zero period would spin; clamp to 1 ms
            poll_interval: Duration::from_millis(self.control.poll_interval_ms.max(1)),
            occupancy_schedule: self.control.occupancy_schedule.clone(),
        }
    }
}
