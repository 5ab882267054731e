use alloc::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    vec::Vec,
};

use driver_interface::{DeviceDescriptor, DeviceId, KernelServices};
use log::{debug, error, info, warn};

use crate::{
    device::{DeviceInstance, DeviceState, Stats},
    error::{BindError, ReleaseFailure},
    probe::ProbeContext,
    register::{DriverRegister, PropertyPolicy, RegisterContainer},
    sync::RwLock,
};

/// Outcome of an unbind. Release failures never stop a teardown; they are
/// collected here instead.
#[derive(Debug, Default)]
pub struct UnbindReport {
    pub device: DeviceId,
    pub released: usize,
    pub failures: Vec<ReleaseFailure>,
}

impl UnbindReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Default)]
struct Bound {
    by_id: BTreeMap<DeviceId, Arc<DeviceInstance>>,
    order: Vec<DeviceId>,
}

/// Matches devices to drivers and runs their bind and unbind.
///
/// Table locks are only held for lookups and updates, never across a probe,
/// a quiesce or a release.
pub struct BindingEngine {
    services: Arc<dyn KernelServices>,
    registers: RwLock<RegisterContainer>,
    policies: RwLock<BTreeMap<&'static str, PropertyPolicy>>,
    pending: RwLock<BTreeSet<DeviceId>>,
    bound: RwLock<Bound>,
}

impl BindingEngine {
    pub fn new(services: Arc<dyn KernelServices>) -> Self {
        Self {
            services,
            registers: RwLock::new(RegisterContainer::new()),
            policies: RwLock::new(BTreeMap::new()),
            pending: RwLock::new(BTreeSet::new()),
            bound: RwLock::new(Bound::default()),
        }
    }

    pub fn services(&self) -> &Arc<dyn KernelServices> {
        &self.services
    }

    pub fn register(&self, register: DriverRegister) {
        debug!("register driver {}", register.name);
        self.registers.write().add(register);
    }

    pub fn append_register(&self, registers: &[DriverRegister]) {
        self.registers.write().append(registers);
    }

    pub fn driver_names(&self) -> Vec<&'static str> {
        self.registers.read().names()
    }

    /// Overrides the property policy of a driver by name.
    pub fn set_property_policy(&self, driver: &'static str, policy: PropertyPolicy) {
        self.policies.write().insert(driver, policy);
    }

    fn policy_for(&self, register: &DriverRegister) -> PropertyPolicy {
        self.policies
            .read()
            .get(register.name)
            .copied()
            .unwrap_or(register.property_policy)
    }

    /// Name of the driver that would bind `desc`.
    pub fn matches(&self, desc: &DeviceDescriptor) -> Option<&'static str> {
        self.registers.read().find(&desc.key).map(|(r, _)| r.name)
    }

    pub fn bind(&self, desc: &DeviceDescriptor) -> Result<Arc<DeviceInstance>, BindError> {
        let id = desc.device_id;
        let Some((register, kind)) = self.registers.read().find(&desc.key) else {
            return Err(BindError::NoMatch(id));
        };

        if self.bound.read().by_id.contains_key(&id) || !self.pending.write().insert(id) {
            return Err(BindError::AlreadyBound(id));
        }

        debug!("[{id}] bind {} ({}) with {}", desc.name, desc.key, register.name);

        let instance = Arc::new(DeviceInstance::new(desc.clone(), register.name));
        let policy = self.policy_for(&register);
        let mut ctx = ProbeContext::new(&instance, &self.services, policy);
        let res = (kind.on_probe())(&mut ctx);
        let chain = ctx.into_chain();

        if let Err(e) = res {
            let n = chain.unwind();
            instance.clear_runtime();
            instance.set_state(DeviceState::Unbound);
            self.pending.write().remove(&id);
            error!(
                "[{id}] {} probe failed at step `{}`: {e} ({n} released)",
                register.name,
                e.step().unwrap_or("-")
            );
            return Err(e);
        }

        instance.install_chain(chain);
        let bound = instance.transition(DeviceState::Binding, DeviceState::Bound);
        debug_assert!(bound, "[{id}] left Binding during probe");
        if let Some(d) = instance.dispatcher() {
            d.open();
        }
        {
            let mut bound = self.bound.write();
            bound.by_id.insert(id, instance.clone());
            bound.order.push(id);
        }
        self.pending.write().remove(&id);

        info!("[{id}] {} bound to {}", desc.name, register.name);
        Ok(instance)
    }

    pub fn unbind(&self, id: DeviceId) -> Result<UnbindReport, BindError> {
        let instance = {
            let mut bound = self.bound.write();
            let Some(instance) = bound.by_id.get(&id) else {
                return Err(BindError::NotBound(id));
            };
            if !instance.transition(DeviceState::Bound, DeviceState::Unbinding) {
                return Err(BindError::NotBound(id));
            }
            bound.order.retain(|d| *d != id);
            match bound.by_id.remove(&id) {
                Some(i) => i,
                None => return Err(BindError::NotBound(id)),
            }
        };

        debug!("[{id}] unbind from {}", instance.driver_name());

        if let Some(d) = instance.dispatcher() {
            d.quiesce();
        }

        let on_remove = self
            .registers
            .read()
            .by_name(instance.driver_name())
            .and_then(|r| r.on_remove);
        if let Some(on_remove) = on_remove {
            on_remove(&instance);
        }

        let mut report = UnbindReport {
            device: id,
            ..Default::default()
        };
        if let Some(chain) = instance.take_chain() {
            report.released = chain.len();
            report.failures = chain.release_all();
        }
        instance.clear_runtime();
        instance.set_state(DeviceState::Unbound);

        if report.is_clean() {
            info!("[{id}] unbound, {} resources released", report.released);
        } else {
            warn!(
                "[{id}] unbound with {} release failures",
                report.failures.len()
            );
        }
        Ok(report)
    }

    /// Unbinds everything, most recently bound first.
    pub fn unbind_all(&self) -> Vec<UnbindReport> {
        let order: Vec<DeviceId> = self.bound.read().order.iter().rev().copied().collect();
        order
            .into_iter()
            .filter_map(|id| match self.unbind(id) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!("[{id}] {e}");
                    None
                }
            })
            .collect()
    }

    pub fn instance(&self, id: DeviceId) -> Option<Arc<DeviceInstance>> {
        self.bound.read().by_id.get(&id).cloned()
    }

    /// Bound instances in bind order.
    pub fn instances(&self) -> Vec<Arc<DeviceInstance>> {
        let bound = self.bound.read();
        bound
            .order
            .iter()
            .filter_map(|id| bound.by_id.get(id).cloned())
            .collect()
    }

    pub fn get_stats(&self, id: DeviceId) -> Option<Stats> {
        self.instance(id).map(|i| i.stats())
    }
}
