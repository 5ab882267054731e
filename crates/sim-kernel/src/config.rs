//! Board description.
//!
//! ```toml
//! log_level = "Info"
//!
//! [policies]
//! pushbtn_simple = "WarnAndContinue"
//!
//! [[devices]]
//! name = "pushbutton_device"
//! compatible = "demo,pushbutton"
//! properties = { purpose = "launch button" }
//! gpios = [{ con_id = "pushbtn", line = 17, active_low = true }]
//!
//! [[devices]]
//! name = "pci0"
//! pci = { vendor = 0x1234, device = 0x5678, bars = [4096] }
//! ```

use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use driver_interface::{CompatibleKey, PciDeviceId, PropertyValue};
use log::LevelFilter;
use rdrive::PropertyPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("board file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("device `{name}`: {reason}")]
    Device { name: String, reason: String },
    #[error("no registered driver named `{0}`")]
    UnknownDriver(String),
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct BoardConfig {
    #[serde(default)]
    pub log_level: LogLevel,
    /// Property policy overrides by driver name.
    #[serde(default)]
    pub policies: BTreeMap<String, Policy>,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    FailClosed,
    WarnAndContinue,
}

impl From<Policy> for PropertyPolicy {
    fn from(value: Policy) -> Self {
        match value {
            Policy::FailClosed => PropertyPolicy::FailClosed,
            Policy::WarnAndContinue => PropertyPolicy::WarnAndContinue,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DeviceConfig {
    pub name: String,
    /// Platform device matched by compatible string.
    pub compatible: Option<String>,
    /// PCI function matched by id.
    pub pci: Option<PciConfig>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropValue>,
    #[serde(default)]
    pub gpios: Vec<GpioConfig>,
}

impl DeviceConfig {
    pub fn key(&self) -> Result<CompatibleKey, ConfigError> {
        match (&self.compatible, &self.pci) {
            (Some(c), None) => Ok(CompatibleKey::Compatible(c.clone())),
            (None, Some(p)) => Ok(CompatibleKey::Pci(PciDeviceId::new(p.vendor, p.device))),
            (Some(_), Some(_)) => Err(self.invalid("both `compatible` and `pci` given")),
            (None, None) => Err(self.invalid("one of `compatible` or `pci` is required")),
        }
    }

    fn invalid(&self, reason: &str) -> ConfigError {
        ConfigError::Device {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum PropValue {
    Int(i64),
    Str(String),
}

impl From<PropValue> for PropertyValue {
    fn from(value: PropValue) -> Self {
        match value {
            PropValue::Int(v) => PropertyValue::Int(v),
            PropValue::Str(s) => PropertyValue::Str(s),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PciConfig {
    pub vendor: u16,
    pub device: u16,
    /// BAR sizes in bytes, BAR0 first.
    #[serde(default = "default_bars")]
    pub bars: Vec<u64>,
}

fn default_bars() -> Vec<u64> {
    vec![4096]
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GpioConfig {
    pub con_id: String,
    pub line: u32,
    #[serde(default)]
    pub active_low: bool,
}

impl Display for BoardConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = toml::to_string(self).map_err(|_| std::fmt::Error)?;
        write!(f, "{s}")
    }
}

impl FromStr for BoardConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}
