use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use driver_interface::{DeviceDescriptor, DeviceId, KernelServices};
use log::{debug, info, warn};
use rdrive::{BindError, BindingEngine, DeviceInstance, UnbindReport};
use spin::Mutex;

/// Result of a [`Bus::probe_all`] pass.
#[derive(Debug, Default)]
pub struct ProbeReport {
    pub bound: Vec<DeviceId>,
    pub failed: Vec<(DeviceId, BindError)>,
    /// Devices no registered driver matches.
    pub unmatched: Vec<DeviceId>,
}

/// Platform and PCI device discovery.
///
/// Owns the descriptors of everything plugged in and asks the engine to bind
/// and unbind them. The descriptor table lock is never held across a bind.
pub struct Bus {
    engine: Arc<BindingEngine>,
    devices: Mutex<BTreeMap<DeviceId, DeviceDescriptor>>,
    next_id: AtomicU64,
}

impl Bus {
    pub fn new(services: Arc<dyn KernelServices>) -> Self {
        Self::with_engine(Arc::new(BindingEngine::new(services)))
    }

    pub fn with_engine(engine: Arc<BindingEngine>) -> Self {
        Self {
            engine,
            devices: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn engine(&self) -> &Arc<BindingEngine> {
        &self.engine
    }

    /// A device id not handed out before.
    pub fn alloc_id(&self) -> DeviceId {
        DeviceId::from(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Records a discovered device without binding it.
    pub fn insert(&self, desc: DeviceDescriptor) {
        debug!("[{}] discovered {} ({})", desc.device_id, desc.name, desc.key);
        self.devices.lock().insert(desc.device_id, desc);
    }

    /// Hot-plug: records the device and binds it right away.
    pub fn add_device(&self, desc: DeviceDescriptor) -> Result<Arc<DeviceInstance>, BindError> {
        self.insert(desc.clone());
        self.engine.bind(&desc)
    }

    /// Hot-unplug: unbinds the device if bound and forgets it.
    ///
    /// `None` when the device was known but not bound.
    pub fn remove_device(&self, id: DeviceId) -> Result<Option<UnbindReport>, BindError> {
        let report = match self.engine.unbind(id) {
            Ok(r) => Some(r),
            Err(BindError::NotBound(_)) => None,
            Err(e) => return Err(e),
        };
        if self.devices.lock().remove(&id).is_none() && report.is_none() {
            return Err(BindError::NotBound(id));
        }
        Ok(report)
    }

    /// Binds every known device that is not bound yet, in id order.
    pub fn probe_all(&self) -> ProbeReport {
        let devices: Vec<DeviceDescriptor> = self.devices.lock().values().cloned().collect();
        let mut report = ProbeReport::default();

        for desc in devices {
            let id = desc.device_id;
            if self.engine.instance(id).is_some() {
                continue;
            }
            if self.engine.matches(&desc).is_none() {
                debug!("[{id}] {}: no driver for {}", desc.name, desc.key);
                report.unmatched.push(id);
                continue;
            }
            match self.engine.bind(&desc) {
                Ok(_) => report.bound.push(id),
                Err(e) => {
                    warn!("[{id}] {}: {e}", desc.name);
                    report.failed.push((id, e));
                }
            }
        }

        info!(
            "probe done: {} bound, {} failed, {} without driver",
            report.bound.len(),
            report.failed.len(),
            report.unmatched.len()
        );
        report
    }

    /// Unbinds everything, most recently bound first.
    pub fn shutdown(&self) -> Vec<UnbindReport> {
        self.engine.unbind_all()
    }

    pub fn descriptor(&self, id: DeviceId) -> Option<DeviceDescriptor> {
        self.devices.lock().get(&id).cloned()
    }

    pub fn devices(&self) -> Vec<DeviceDescriptor> {
        self.devices.lock().values().cloned().collect()
    }
}
