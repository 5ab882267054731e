use alloc::vec::Vec;
use core::fmt::{self, Display};

use crate::{DeviceId, DriverResult, IrqId, io::Mmio, IoMapping};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PciDeviceId {
    pub vendor: u16,
    pub device: u16,
}

impl PciDeviceId {
    pub const fn new(vendor: u16, device: u16) -> Self {
        Self { vendor, device }
    }
}

impl Display for PciDeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor, self.device)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarInfo {
    pub index: u8,
    pub base: u64,
    pub len: u64,
}

pub trait PciBus: Mmio {
    fn enable_device(&self, dev: DeviceId) -> DriverResult;
    fn disable_device(&self, dev: DeviceId) -> DriverResult;
    fn request_region(&self, dev: DeviceId, bar: u8, owner: &str) -> DriverResult<BarInfo>;
    fn release_region(&self, dev: DeviceId, bar: u8) -> DriverResult;
    fn set_master(&self, dev: DeviceId);
    fn ioremap_bar(&self, dev: DeviceId, bar: u8) -> DriverResult<IoMapping>;
    fn iounmap(&self, map: IoMapping) -> DriverResult;
    /// Enables exactly `nvec` MSI-X vectors or fails.
    fn enable_msix(&self, dev: DeviceId, nvec: usize) -> DriverResult<Vec<IrqId>>;
    fn disable_msix(&self, dev: DeviceId) -> DriverResult;
}
