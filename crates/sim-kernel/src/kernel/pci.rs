//! PCI functions with one register file per BAR.
//!
//! Every simulated function has the same interrupt block at the start of its
//! BARs: offset `0x00` holds the pending causes, writing ones to offset
//! `0x04` clears them.

use std::collections::BTreeMap;

use driver_interface::{
    BarInfo, DeviceId, DriverError, DriverResult, IoMapping, IrqId, IrqReturn, Mmio, PciBus,
    PciDeviceId, io::RegOffset,
};
use log::{debug, info};

use super::{FaultPoint, SimKernel};

/// Interrupt number of the first MSI-X vector handed out.
pub const MSIX_IRQ_BASE: usize = 200;

const MAX_MSIX: usize = 8;
const BAR_WINDOW: u64 = 0xfe00_0000;
const STATUS: RegOffset = 0x00;
const ACK: RegOffset = 0x04;

struct Bar {
    base: u64,
    regs: Vec<u32>,
    owner: Option<String>,
}

struct Function {
    id: PciDeviceId,
    bars: Vec<Bar>,
    enabled: bool,
    master: bool,
    msix: Vec<IrqId>,
}

impl Function {
    fn bar(&self, bar: u8) -> DriverResult<&Bar> {
        self.bars
            .get(usize::from(bar))
            .ok_or_else(|| DriverError::InvalidArgument(format!("no BAR{bar}")))
    }

    fn bar_mut(&mut self, bar: u8) -> DriverResult<&mut Bar> {
        self.bars
            .get_mut(usize::from(bar))
            .ok_or_else(|| DriverError::InvalidArgument(format!("no BAR{bar}")))
    }
}

struct Mapping {
    dev: DeviceId,
    bar: u8,
}

#[derive(Default)]
pub(super) struct PciState {
    functions: BTreeMap<DeviceId, Function>,
    mappings: BTreeMap<IoMapping, Mapping>,
    next_map: u32,
    next_base: u64,
    next_vector: usize,
}

impl PciState {
    pub(super) fn held(&self) -> usize {
        self.functions
            .values()
            .map(|f| {
                usize::from(f.enabled)
                    + f.bars.iter().filter(|b| b.owner.is_some()).count()
                    + usize::from(!f.msix.is_empty())
            })
            .sum::<usize>()
            + self.mappings.len()
    }

    fn function(&mut self, dev: DeviceId) -> DriverResult<&mut Function> {
        self.functions.get_mut(&dev).ok_or(DriverError::NotFound)
    }

    fn reg(&mut self, map: IoMapping, offset: RegOffset) -> DriverResult<&mut u32> {
        let m = self.mappings.get(&map).ok_or(DriverError::NotFound)?;
        let (dev, bar) = (m.dev, m.bar);
        if offset % 4 != 0 {
            return Err(DriverError::InvalidArgument(format!("unaligned offset {offset:#x}")));
        }
        self.function(dev)?
            .bar_mut(bar)?
            .regs
            .get_mut(offset / 4)
            .ok_or_else(|| DriverError::InvalidArgument(format!("offset {offset:#x} out of range")))
    }
}

impl SimKernel {
    /// Plugs a function with the given BAR sizes into the bus.
    pub fn add_pci_function(&self, dev: DeviceId, id: PciDeviceId, bar_sizes: &[u64]) {
        let mut s = self.pci.lock();
        let bars = bar_sizes
            .iter()
            .map(|len| {
                let base = BAR_WINDOW + s.next_base;
                s.next_base += len.next_multiple_of(0x1000);
                Bar {
                    base,
                    regs: vec![0; (*len / 4).max(2) as usize],
                    owner: None,
                }
            })
            .collect();
        s.functions.insert(
            dev,
            Function {
                id,
                bars,
                enabled: false,
                master: false,
                msix: Vec::new(),
            },
        );
    }

    /// Latches `cause` in BAR0 and signals the first MSI-X vector.
    pub fn pci_raise(&self, dev: DeviceId, cause: u32) -> Option<IrqReturn> {
        let irq = {
            let mut s = self.pci.lock();
            let f = s.functions.get_mut(&dev)?;
            let status = f.bars.first_mut()?.regs.get_mut(STATUS / 4)?;
            *status |= cause;
            if !f.master {
                return None;
            }
            *f.msix.first()?
        };
        self.raise(irq)
    }

    /// Pending causes in BAR0.
    pub fn pci_status(&self, dev: DeviceId) -> Option<u32> {
        let s = self.pci.lock();
        let f = s.functions.get(&dev)?;
        f.bars.first()?.regs.get(STATUS / 4).copied()
    }

    pub fn pci_enabled(&self, dev: DeviceId) -> bool {
        self.pci.lock().functions.get(&dev).is_some_and(|f| f.enabled)
    }

    pub fn pci_is_master(&self, dev: DeviceId) -> bool {
        self.pci.lock().functions.get(&dev).is_some_and(|f| f.master)
    }
}

impl Mmio for SimKernel {
    fn read32(&self, map: IoMapping, offset: RegOffset) -> DriverResult<u32> {
        Ok(*self.pci.lock().reg(map, offset)?)
    }

    fn write32(&self, map: IoMapping, offset: RegOffset, value: u32) -> DriverResult {
        let mut s = self.pci.lock();
        if offset == ACK {
            *s.reg(map, STATUS)? &= !value;
        } else {
            *s.reg(map, offset)? = value;
        }
        Ok(())
    }

    fn mapping_len(&self, map: IoMapping) -> DriverResult<usize> {
        let mut s = self.pci.lock();
        let m = s.mappings.get(&map).ok_or(DriverError::NotFound)?;
        let (dev, bar) = (m.dev, m.bar);
        Ok(s.function(dev)?.bar(bar)?.regs.len() * 4)
    }
}

impl PciBus for SimKernel {
    fn enable_device(&self, dev: DeviceId) -> DriverResult {
        self.fault(FaultPoint::PciEnable)?;
        let mut s = self.pci.lock();
        let f = s.function(dev)?;
        if f.enabled {
            return Err(DriverError::Busy);
        }
        f.enabled = true;
        info!("[{dev}] pci {} enabled", f.id);
        Ok(())
    }

    fn disable_device(&self, dev: DeviceId) -> DriverResult {
        {
            let mut s = self.pci.lock();
            let f = s.function(dev)?;
            if !f.enabled {
                return Err(DriverError::InvalidArgument(format!("{} not enabled", f.id)));
            }
            f.enabled = false;
            f.master = false;
        }
        self.log_release("pci_disable_device");
        Ok(())
    }

    fn request_region(&self, dev: DeviceId, bar: u8, owner: &str) -> DriverResult<BarInfo> {
        self.fault(FaultPoint::PciRequestRegion)?;
        let mut s = self.pci.lock();
        let b = s.function(dev)?.bar_mut(bar)?;
        if b.owner.is_some() {
            return Err(DriverError::Busy);
        }
        b.owner = Some(owner.to_string());
        Ok(BarInfo {
            index: bar,
            base: b.base,
            len: b.regs.len() as u64 * 4,
        })
    }

    fn release_region(&self, dev: DeviceId, bar: u8) -> DriverResult {
        {
            let mut s = self.pci.lock();
            let b = s.function(dev)?.bar_mut(bar)?;
            if b.owner.take().is_none() {
                return Err(DriverError::NotFound);
            }
        }
        self.log_release("pci_release_region");
        Ok(())
    }

    fn set_master(&self, dev: DeviceId) {
        if let Some(f) = self.pci.lock().functions.get_mut(&dev) {
            f.master = true;
            debug!("[{dev}] bus master");
        }
    }

    fn ioremap_bar(&self, dev: DeviceId, bar: u8) -> DriverResult<IoMapping> {
        self.fault(FaultPoint::PciIoremap)?;
        let mut s = self.pci.lock();
        s.function(dev)?.bar(bar)?;
        s.next_map += 1;
        let map = IoMapping::from(s.next_map);
        s.mappings.insert(map, Mapping { dev, bar });
        Ok(map)
    }

    fn iounmap(&self, map: IoMapping) -> DriverResult {
        if self.pci.lock().mappings.remove(&map).is_none() {
            return Err(DriverError::NotFound);
        }
        self.log_release("iounmap");
        Ok(())
    }

    fn enable_msix(&self, dev: DeviceId, nvec: usize) -> DriverResult<Vec<IrqId>> {
        self.fault(FaultPoint::PciEnableMsix)?;
        if nvec == 0 || nvec > MAX_MSIX {
            return Err(DriverError::InvalidArgument(format!("{nvec} vectors")));
        }
        let mut s = self.pci.lock();
        let base = MSIX_IRQ_BASE + s.next_vector;
        let f = s.function(dev)?;
        if !f.enabled {
            return Err(DriverError::InvalidArgument(format!("{} not enabled", f.id)));
        }
        if !f.msix.is_empty() {
            return Err(DriverError::Busy);
        }
        f.msix = (base..base + nvec).map(IrqId::from).collect();
        let vectors = f.msix.clone();
        s.next_vector += nvec;
        Ok(vectors)
    }

    fn disable_msix(&self, dev: DeviceId) -> DriverResult {
        {
            let mut s = self.pci.lock();
            let f = s.function(dev)?;
            if f.msix.is_empty() {
                return Err(DriverError::InvalidArgument("msix not enabled".into()));
            }
            f.msix.clear();
        }
        self.log_release("pci_disable_msix");
        Ok(())
    }
}
