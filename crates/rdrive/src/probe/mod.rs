use alloc::{boxed::Box, string::String, sync::Arc};

use driver_interface::{
    DeviceDescriptor, DeviceId, DriverError, DriverResult, IrqConfig, KernelServices,
    PropertySource, PropertyValue,
};
use log::warn;

use crate::{
    chain::ResourceChain,
    device::DeviceInstance,
    dispatcher::{EventDispatcher, EventHandler, EventRegistration},
    error::BindError,
    register::PropertyPolicy,
    resource::{Resource, ResourceKind, Slot},
};

/// Everything a probe function works with.
///
/// Resources acquired through the context go into the instance's chain. If
/// the probe returns an error the engine unwinds that chain.
pub struct ProbeContext<'a> {
    instance: &'a Arc<DeviceInstance>,
    services: &'a Arc<dyn KernelServices>,
    policy: PropertyPolicy,
    chain: ResourceChain,
}

impl<'a> ProbeContext<'a> {
    pub(crate) fn new(
        instance: &'a Arc<DeviceInstance>,
        services: &'a Arc<dyn KernelServices>,
        policy: PropertyPolicy,
    ) -> Self {
        Self {
            instance,
            services,
            policy,
            chain: ResourceChain::new(instance.id()),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.instance.id()
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        self.instance.descriptor()
    }

    pub fn instance(&self) -> &Arc<DeviceInstance> {
        self.instance
    }

    pub fn services(&self) -> &Arc<dyn KernelServices> {
        self.services
    }

    pub fn acquire<R, F>(&mut self, step: &'static str, f: F) -> Result<Slot<R>, BindError>
    where
        R: Resource,
        F: FnOnce(&Arc<dyn KernelServices>) -> DriverResult<R>,
    {
        let services = self.services;
        self.chain.acquire(step, || f(services))
    }

    /// Publishes the device to its outer subsystem. Meant to be the last
    /// step of a probe.
    pub fn register<R, F>(&mut self, step: &'static str, f: F) -> Result<Slot<R>, BindError>
    where
        R: Resource,
        F: FnOnce(&Arc<dyn KernelServices>) -> DriverResult<R>,
    {
        let services = self.services;
        self.chain.register(step, || f(services))
    }

    /// Runs `enable` now and records `disable` to undo it.
    pub fn add_action<E, D>(
        &mut self,
        step: &'static str,
        enable: E,
        disable: D,
    ) -> Result<(), BindError>
    where
        E: FnOnce(&Arc<dyn KernelServices>) -> DriverResult,
        D: FnOnce(&Arc<dyn KernelServices>) -> DriverResult + Send + Sync + 'static,
    {
        enable(self.services).map_err(|source| BindError::ResourceUnavailable {
            step,
            kind: ResourceKind::Action,
            source,
        })?;
        let services = self.services.clone();
        self.chain
            .add_action(step, ResourceKind::Action, move || disable(&services));
        Ok(())
    }

    pub fn resource<R: Resource>(&self, slot: Slot<R>) -> Option<&R> {
        self.chain.get(slot)
    }

    /// Looks a property up, applying the driver's policy when it is absent.
    pub fn property(&self, name: &str) -> Result<Option<PropertyValue>, BindError> {
        match self.descriptor().get_property(name) {
            Some(v) => Ok(Some(v.clone())),
            None => match self.policy {
                PropertyPolicy::FailClosed => Err(BindError::ConfigurationMissing(name.into())),
                PropertyPolicy::WarnAndContinue => {
                    warn!("[{}] property `{name}` not set, continuing", self.id());
                    Ok(None)
                }
            },
        }
    }

    pub fn property_str(&self, name: &str) -> Result<Option<String>, BindError> {
        match self.property(name)? {
            None => Ok(None),
            Some(PropertyValue::Str(s)) => Ok(Some(s)),
            Some(other) => Err(BindError::InvalidProperty {
                name: name.into(),
                reason: alloc::format!("expected a string, got {other}"),
            }),
        }
    }

    pub fn property_int(&self, name: &str) -> Result<Option<i64>, BindError> {
        match self.property(name)? {
            None => Ok(None),
            Some(PropertyValue::Int(v)) => Ok(Some(v)),
            Some(other) => Err(BindError::InvalidProperty {
                name: name.into(),
                reason: alloc::format!("expected an integer, got {other}"),
            }),
        }
    }

    /// Routes `cfg.irq` to `handler`. Delivery starts once the device is
    /// bound.
    pub fn request_event<H>(
        &mut self,
        step: &'static str,
        cfg: IrqConfig,
        name: &str,
        handler: H,
    ) -> Result<(), BindError>
    where
        H: EventHandler + 'static,
    {
        if self.instance.dispatcher().is_some() {
            return Err(BindError::ResourceUnavailable {
                step,
                kind: ResourceKind::EventRegistration,
                source: DriverError::Busy,
            });
        }
        let dispatcher =
            EventDispatcher::new(cfg.irq, name, Arc::downgrade(self.instance), Box::new(handler));
        let slot = self.acquire(step, |k| EventRegistration::request(k, &cfg, dispatcher))?;
        if let Some(reg) = self.chain.get(slot) {
            self.instance.set_dispatcher(reg.dispatcher().clone());
        }
        Ok(())
    }

    pub fn set_drvdata<T: core::any::Any + Send + Sync>(&self, data: Arc<T>) {
        self.instance.set_drvdata(data);
    }

    pub(crate) fn into_chain(self) -> ResourceChain {
        self.chain
    }
}
