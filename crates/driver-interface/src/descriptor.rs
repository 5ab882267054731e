use alloc::{collections::BTreeMap, string::String};
use core::fmt::{self, Display};

use crate::pci::PciDeviceId;

custom_type!(DeviceId, u64, "{:#x}");

/// What a bus matches drivers against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompatibleKey {
    /// Device-tree style `compatible` string, e.g. `vendor,model`.
    Compatible(String),
    Pci(PciDeviceId),
}

impl Display for CompatibleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompatibleKey::Compatible(c) => write!(f, "{c}"),
            CompatibleKey::Pci(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Str(String),
    Int(i64),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s.as_str()),
            PropertyValue::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            PropertyValue::Str(_) => None,
        }
    }
}

impl Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Str(s) => write!(f, "\"{s}\""),
            PropertyValue::Int(v) => write!(f, "<{v}>"),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Str(value.into())
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

/// Named configuration lookup, read once at bind time.
pub trait PropertySource {
    fn get_property(&self, name: &str) -> Option<&PropertyValue>;
}

/// Immutable identity of a discovered device.
///
/// Owned by the bus. The engine clones it into the bound instance so the
/// properties it was bound with stay readable for the instance's lifetime.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub device_id: DeviceId,
    pub name: String,
    pub key: CompatibleKey,
    properties: BTreeMap<String, PropertyValue>,
}

impl DeviceDescriptor {
    pub fn new(device_id: DeviceId, name: impl Into<String>, key: CompatibleKey) -> Self {
        Self {
            device_id,
            name: name.into(),
            key,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.set_property(name, value);
        self
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl PropertySource for DeviceDescriptor {
    fn get_property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }
}
