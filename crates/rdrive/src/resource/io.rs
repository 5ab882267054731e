use alloc::{sync::Arc, vec::Vec};

use driver_interface::{
    BarInfo, DeviceId, DriverError, DriverResult, IoMapping, IrqId, KernelServices, Mmio, PciBus,
};

use super::{Resource, ResourceKind};

fn pci(services: &Arc<dyn KernelServices>) -> DriverResult<&dyn PciBus> {
    services.pci().ok_or(DriverError::NotSupported)
}

/// A BAR reserved for this driver.
pub struct PciRegion {
    services: Arc<dyn KernelServices>,
    dev: DeviceId,
    bar: BarInfo,
}

impl PciRegion {
    pub fn request(
        services: &Arc<dyn KernelServices>,
        dev: DeviceId,
        bar: u8,
        owner: &str,
    ) -> DriverResult<Self> {
        let bar = pci(services)?.request_region(dev, bar, owner)?;
        Ok(Self {
            services: services.clone(),
            dev,
            bar,
        })
    }

    pub fn bar(&self) -> BarInfo {
        self.bar
    }
}

impl Resource for PciRegion {
    const KIND: ResourceKind = ResourceKind::IoRegion;

    fn release(&mut self) -> DriverResult {
        pci(&self.services)?.release_region(self.dev, self.bar.index)
    }
}

/// A BAR mapped for register access.
pub struct MappedBar {
    services: Arc<dyn KernelServices>,
    map: IoMapping,
    len: usize,
}

impl MappedBar {
    pub fn map(services: &Arc<dyn KernelServices>, dev: DeviceId, bar: u8) -> DriverResult<Self> {
        let bus = pci(services)?;
        let map = bus.ioremap_bar(dev, bar)?;
        let len = bus.mapping_len(map)?;
        Ok(Self {
            services: services.clone(),
            map,
            len,
        })
    }

    pub fn mapping(&self) -> IoMapping {
        self.map
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Resource for MappedBar {
    const KIND: ResourceKind = ResourceKind::IoRegion;

    fn release(&mut self) -> DriverResult {
        pci(&self.services)?.iounmap(self.map)
    }
}

/// MSI-X vectors enabled on a PCI function.
pub struct MsixVectors {
    services: Arc<dyn KernelServices>,
    dev: DeviceId,
    vectors: Vec<IrqId>,
}

impl MsixVectors {
    pub fn enable(
        services: &Arc<dyn KernelServices>,
        dev: DeviceId,
        nvec: usize,
    ) -> DriverResult<Self> {
        let vectors = pci(services)?.enable_msix(dev, nvec)?;
        Ok(Self {
            services: services.clone(),
            dev,
            vectors,
        })
    }

    pub fn vectors(&self) -> &[IrqId] {
        &self.vectors
    }
}

impl Resource for MsixVectors {
    const KIND: ResourceKind = ResourceKind::EventLine;

    fn release(&mut self) -> DriverResult {
        pci(&self.services)?.disable_msix(self.dev)
    }
}
