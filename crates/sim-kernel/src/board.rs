use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use driver_interface::{DeviceDescriptor, DeviceId, PciDeviceId};
use log::debug;
use rdrive::{BindingEngine, DriverRegister, UnbindReport};

use crate::{
    SimKernel,
    bus::{Bus, ProbeReport},
    config::{BoardConfig, ConfigError},
};

/// A kernel and a bus populated from a [`BoardConfig`].
pub struct Board {
    kernel: Arc<SimKernel>,
    bus: Bus,
    names: BTreeMap<String, DeviceId>,
}

impl Board {
    /// Registers `registers`, applies the policy overrides and plugs in every
    /// device. Nothing is bound yet.
    pub fn new(cfg: &BoardConfig, registers: &[DriverRegister]) -> Result<Self, ConfigError> {
        let kernel = SimKernel::new();
        let bus = Bus::new(kernel.clone());
        let engine = bus.engine();
        engine.append_register(registers);

        let drivers = engine.driver_names();
        for (name, policy) in &cfg.policies {
            let driver = drivers
                .iter()
                .find(|d| **d == name.as_str())
                .copied()
                .ok_or_else(|| ConfigError::UnknownDriver(name.clone()))?;
            engine.set_property_policy(driver, (*policy).into());
        }

        let mut names = BTreeMap::new();
        let mut lines = BTreeSet::new();
        for dev in &cfg.devices {
            let key = dev.key()?;
            let id = bus.alloc_id();
            if names.insert(dev.name.clone(), id).is_some() {
                return Err(ConfigError::Device {
                    name: dev.name.clone(),
                    reason: "duplicate name".into(),
                });
            }

            let mut desc = DeviceDescriptor::new(id, dev.name.as_str(), key);
            for (k, v) in &dev.properties {
                desc.set_property(k.as_str(), v.clone());
            }

            for g in &dev.gpios {
                if !lines.insert(g.line) {
                    return Err(ConfigError::Device {
                        name: dev.name.clone(),
                        reason: format!("gpio line {} already wired", g.line),
                    });
                }
                kernel.add_gpio_line(id, &g.con_id, g.line, g.active_low);
            }
            if let Some(p) = &dev.pci {
                kernel.add_pci_function(id, PciDeviceId::new(p.vendor, p.device), &p.bars);
            }

            debug!("board: {} is [{id}]", dev.name);
            bus.insert(desc);
        }

        Ok(Self { kernel, bus, names })
    }

    pub fn kernel(&self) -> &Arc<SimKernel> {
        &self.kernel
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn engine(&self) -> &Arc<BindingEngine> {
        self.bus.engine()
    }

    /// Id the board assigned to the device called `name`.
    pub fn device_id(&self, name: &str) -> Option<DeviceId> {
        self.names.get(name).copied()
    }

    pub fn probe_all(&self) -> ProbeReport {
        self.bus.probe_all()
    }

    pub fn shutdown(&self) -> Vec<UnbindReport> {
        self.bus.shutdown()
    }
}
