//! Skeleton PCI driver: enable, claim BAR0, map it, one MSI-X vector.

use alloc::sync::Arc;

use driver_interface::{
    DeviceId, DriverError, DriverResult, IoMapping, IrqConfig, IrqId, KernelServices, Mmio, PciBus,
    PciDeviceId, Trigger, io::RegOffset,
};
use log::{debug, info};
use rdrive::{
    BindError, DeviceInstance, DriverRegister, EventHandler, HandlerFault, ProbeContext,
    ProbeKind, PropertyPolicy, ResourceKind,
    resource::{MappedBar, MsixVectors, PciRegion},
};

pub const DRV_NAME: &str = "pci_skel";
pub const MY_DEVICE: PciDeviceId = PciDeviceId::new(0x1234, 0x5678);
pub const MEMORY_BAR: u8 = 0;
pub const NUM_MSIX_VECTORS: usize = 1;

/// Pending interrupt causes.
pub const REG_INT_STATUS: RegOffset = 0x00;
/// Write-one-to-clear acknowledge of `REG_INT_STATUS`.
pub const REG_INT_ACK: RegOffset = 0x04;

const KINDS: &[ProbeKind] = &[ProbeKind::Pci {
    id_table: &[MY_DEVICE],
    on_probe: probe,
}];

pub const PCI_SKELETON: DriverRegister = DriverRegister {
    name: DRV_NAME,
    probe_kinds: KINDS,
    property_policy: PropertyPolicy::FailClosed,
    on_remove: Some(remove),
};

fn pci(k: &Arc<dyn KernelServices>) -> DriverResult<&dyn PciBus> {
    k.pci().ok_or(DriverError::NotSupported)
}

fn probe(ctx: &mut ProbeContext<'_>) -> Result<(), BindError> {
    let id = ctx.id();
    crate::validate_match(ctx, KINDS)?;
    info!("[{id}] probe for {}", ctx.descriptor().key);

    ctx.add_action(
        "pci_enable_device",
        |k| pci(k)?.enable_device(id),
        move |k| pci(k)?.disable_device(id),
    )?;

    let region = ctx.acquire("pci_request_region", |k| {
        PciRegion::request(k, id, MEMORY_BAR, DRV_NAME)
    })?;
    if let Some(r) = ctx.resource(region) {
        debug!("[{id}] BAR{} at {:#x}, {:#x} bytes", r.bar().index, r.bar().base, r.bar().len);
    }

    set_master(ctx.services(), id)?;

    let bar = ctx.acquire("pci_ioremap_bar", |k| MappedBar::map(k, id, MEMORY_BAR))?;
    let map = ctx
        .resource(bar)
        .map(|b| b.mapping())
        .ok_or(BindError::ConfigurationMissing("BAR0 mapping".into()))?;

    let msix = ctx.acquire("pci_enable_msix", |k| {
        MsixVectors::enable(k, id, NUM_MSIX_VECTORS)
    })?;
    let irq = ctx
        .resource(msix)
        .and_then(|m| m.vectors().first().copied())
        .ok_or(BindError::ResourceUnavailable {
            step: "pci_enable_msix",
            kind: ResourceKind::EventLine,
            source: DriverError::NotFound,
        })?;

    let handler = SkeletonIrq {
        services: ctx.services().clone(),
        map,
    };
    ctx.request_event(
        "request_irq",
        IrqConfig {
            irq,
            trigger: Trigger::EdgeRising,
        },
        DRV_NAME,
        handler,
    )?;

    info!("[{id}] initialized with MSI-X vector {irq}");
    Ok(())
}

fn set_master(k: &Arc<dyn KernelServices>, id: DeviceId) -> Result<(), BindError> {
    let bus = pci(k).map_err(|source| BindError::ResourceUnavailable {
        step: "pci_set_master",
        kind: ResourceKind::Action,
        source,
    })?;
    bus.set_master(id);
    Ok(())
}

fn remove(dev: &DeviceInstance) {
    info!("[{}] {} interrupts handled", dev.id(), dev.stats().events);
}

struct SkeletonIrq {
    services: Arc<dyn KernelServices>,
    map: IoMapping,
}

impl EventHandler for SkeletonIrq {
    fn handle(&self, dev: &DeviceInstance, irq: IrqId) -> Result<(), HandlerFault> {
        let bus = pci(&self.services)?;
        let status = bus.read32(self.map, REG_INT_STATUS)?;
        if status != 0 {
            bus.write32(self.map, REG_INT_ACK, status)?;
        }
        dev.update_stats(|s| s.events += 1);
        debug!("[{}] irq {irq} status {status:#x}", dev.id());
        Ok(())
    }
}
