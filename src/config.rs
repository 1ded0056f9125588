use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub serial: SerialConfig,
    pub tick_ms: u64,            // consumer refresh period
    pub status_every_ticks: u32, // console status line cadence
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,            // empty = pick the last discovered port
    pub baud: BaudRate,
    pub poll_timeout_ms: u64,    // serial read timeout
    pub poll_interval_ms: u64,   // idle sleep between polls
    pub read_backoff_ms: u64,    // sleep after a transient read error
}

/// Baud rates the controller firmware supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BaudRate {
    B9600,
    B19200,
    B38400,
    B57600,
    B115200,
}

impl BaudRate {
    pub const ALL: [BaudRate; 5] = [
        BaudRate::B9600,
        BaudRate::B19200,
        BaudRate::B38400,
        BaudRate::B57600,
        BaudRate::B115200,
    ];

    pub fn as_u32(self) -> u32 {
        match self {
            BaudRate::B9600 => 9600,
            BaudRate::B19200 => 19200,
            BaudRate::B38400 => 38400,
            BaudRate::B57600 => 57600,
            BaudRate::B115200 => 115200,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        BaudRate::ALL
            .into_iter()
            .find(|b| b.as_u32() == value)
            .ok_or(ConfigError::InvalidBaud(value))
    }
}

impl From<BaudRate> for u32 {
    fn from(b: BaudRate) -> u32 {
        b.as_u32()
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port: String::new(),
            baud: BaudRate::B115200,
            poll_timeout_ms: 50,
            poll_interval_ms: 5,
            read_backoff_ms: 50,
        }
    }
}

impl SerialConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_backoff(&self) -> Duration {
        Duration::from_millis(self.read_backoff_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            serial: SerialConfig::default(),
            tick_ms: 100,
            status_every_ticks: 100, // every 10s at the default tick
        }
    }
}

impl MonitorConfig {
    /// Load a JSON config file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}
