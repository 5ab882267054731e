use alloc::vec::Vec;

use driver_interface::{CompatibleKey, PciDeviceId};

use crate::{device::DeviceInstance, error::BindError, probe::ProbeContext};

pub type ProbeFn = fn(&mut ProbeContext<'_>) -> Result<(), BindError>;
pub type RemoveFn = fn(&DeviceInstance);

/// What to do when a property a driver asks for is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropertyPolicy {
    /// The bind fails with `ConfigurationMissing`.
    #[default]
    FailClosed,
    /// A warning is logged and the driver sees `None`.
    WarnAndContinue,
}

#[derive(Clone)]
pub struct DriverRegister {
    pub name: &'static str,
    pub probe_kinds: &'static [ProbeKind],
    pub property_policy: PropertyPolicy,
    /// Runs during unbind, after event delivery stopped and before the chain
    /// is released.
    pub on_remove: Option<RemoveFn>,
}

impl DriverRegister {
    /// The first probe kind of this driver accepting `key`.
    pub fn probe_for(&self, key: &CompatibleKey) -> Option<&'static ProbeKind> {
        self.probe_kinds.iter().find(|k| k.matches(key))
    }
}

pub enum ProbeKind {
    Platform {
        compatibles: &'static [&'static str],
        on_probe: ProbeFn,
    },
    Pci {
        id_table: &'static [PciDeviceId],
        on_probe: ProbeFn,
    },
}

impl ProbeKind {
    pub fn matches(&self, key: &CompatibleKey) -> bool {
        match (self, key) {
            (ProbeKind::Platform { compatibles, .. }, CompatibleKey::Compatible(c)) => {
                compatibles.iter().any(|s| *s == c.as_str())
            }
            (ProbeKind::Pci { id_table, .. }, CompatibleKey::Pci(id)) => id_table.contains(id),
            _ => false,
        }
    }

    pub fn on_probe(&self) -> ProbeFn {
        match self {
            ProbeKind::Platform { on_probe, .. } | ProbeKind::Pci { on_probe, .. } => *on_probe,
        }
    }
}

/// Registered drivers in registration order.
#[derive(Default)]
pub struct RegisterContainer {
    registers: Vec<DriverRegister>,
}

impl RegisterContainer {
    pub const fn new() -> Self {
        Self {
            registers: Vec::new(),
        }
    }

    pub fn add(&mut self, register: DriverRegister) {
        self.registers.push(register);
    }

    pub fn append(&mut self, register: &[DriverRegister]) {
        self.registers.extend_from_slice(register);
    }

    /// First registered match wins.
    pub fn find(&self, key: &CompatibleKey) -> Option<(DriverRegister, &'static ProbeKind)> {
        self.registers
            .iter()
            .find_map(|r| r.probe_for(key).map(|k| (r.clone(), k)))
    }

    pub fn by_name(&self, name: &str) -> Option<&DriverRegister> {
        self.registers.iter().find(|r| r.name == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.registers.iter().map(|r| r.name).collect()
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}
