use alloc::sync::Arc;

use driver_interface::{
    DeviceId, DriverError, DriverResult, InputHandle, InputInfo, InputSubsystem, KernelServices,
    NetDeviceInfo, NetDeviceOps, NetHandle, NetSubsystem,
};

use super::{Resource, ResourceKind};

fn input(services: &Arc<dyn KernelServices>) -> DriverResult<&dyn InputSubsystem> {
    services.input().ok_or(DriverError::NotSupported)
}

fn net(services: &Arc<dyn KernelServices>) -> DriverResult<&dyn NetSubsystem> {
    services.net().ok_or(DriverError::NotSupported)
}

pub struct InputDeviceObject {
    services: Arc<dyn KernelServices>,
    handle: InputHandle,
}

impl InputDeviceObject {
    pub fn allocate(
        services: &Arc<dyn KernelServices>,
        owner: DeviceId,
        info: &InputInfo,
    ) -> DriverResult<Self> {
        let handle = input(services)?.allocate_device(owner, info)?;
        Ok(Self {
            services: services.clone(),
            handle,
        })
    }

    pub fn handle(&self) -> InputHandle {
        self.handle
    }
}

impl Resource for InputDeviceObject {
    const KIND: ResourceKind = ResourceKind::LogicalDevice;

    fn release(&mut self) -> DriverResult {
        input(&self.services)?.free_device(self.handle)
    }
}

/// An input device registered with the input subsystem.
pub struct InputRegistration {
    services: Arc<dyn KernelServices>,
    handle: InputHandle,
}

impl InputRegistration {
    pub fn register(
        services: &Arc<dyn KernelServices>,
        handle: InputHandle,
    ) -> DriverResult<Self> {
        input(services)?.register_device(handle)?;
        Ok(Self {
            services: services.clone(),
            handle,
        })
    }
}

impl Resource for InputRegistration {
    const KIND: ResourceKind = ResourceKind::Registration;

    fn release(&mut self) -> DriverResult {
        input(&self.services)?.unregister_device(self.handle)
    }
}

pub struct NetDeviceObject {
    services: Arc<dyn KernelServices>,
    handle: NetHandle,
    info: NetDeviceInfo,
}

impl NetDeviceObject {
    pub fn alloc_etherdev(
        services: &Arc<dyn KernelServices>,
        owner: DeviceId,
        info: NetDeviceInfo,
    ) -> DriverResult<Self> {
        let handle = net(services)?.alloc_etherdev(owner, &info)?;
        Ok(Self {
            services: services.clone(),
            handle,
            info,
        })
    }

    pub fn handle(&self) -> NetHandle {
        self.handle
    }

    pub fn info(&self) -> &NetDeviceInfo {
        &self.info
    }
}

impl Resource for NetDeviceObject {
    const KIND: ResourceKind = ResourceKind::LogicalDevice;

    fn release(&mut self) -> DriverResult {
        net(&self.services)?.free_netdev(self.handle)
    }
}

/// A network device registered with the network subsystem.
///
/// The subsystem keeps `ops` until the device is unregistered.
pub struct NetRegistration {
    services: Arc<dyn KernelServices>,
    handle: NetHandle,
}

impl NetRegistration {
    pub fn register(
        services: &Arc<dyn KernelServices>,
        handle: NetHandle,
        ops: Arc<dyn NetDeviceOps>,
    ) -> DriverResult<Self> {
        net(services)?.register_netdev(handle, ops)?;
        Ok(Self {
            services: services.clone(),
            handle,
        })
    }
}

impl Resource for NetRegistration {
    const KIND: ResourceKind = ResourceKind::Registration;

    fn release(&mut self) -> DriverResult {
        net(&self.services)?.unregister_netdev(self.handle)
    }
}
