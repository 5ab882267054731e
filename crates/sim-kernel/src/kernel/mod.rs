use std::{
    collections::BTreeSet,
    fmt::{self, Debug},
    sync::Arc,
};

use driver_interface::{
    DriverError, DriverResult, GpioController, InputSubsystem, IrqChip, KernelServices,
    NetSubsystem, PciBus,
};
use log::{Level, debug, log_enabled};
use spin::Mutex;

use crate::hexdump::hex_dump_lines;

mod gpio;
mod input;
mod irq;
mod net;
mod pci;

pub use gpio::GPIO_IRQ_BASE;
pub use pci::MSIX_IRQ_BASE;

/// A kernel call that can be told to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FaultPoint {
    GpiodGet,
    GpiodPut,
    GpiodToIrq,
    RequestIrq,
    FreeIrq,
    InputAllocate,
    InputRegister,
    AllocEtherdev,
    RegisterNetdev,
    PciEnable,
    PciRequestRegion,
    PciIoremap,
    PciEnableMsix,
}

/// In-memory implementation of every kernel capability.
///
/// Each capability keeps its own table behind a spin lock. Locks are never
/// held while calling back into a driver.
#[derive(Default)]
pub struct SimKernel {
    gpio: Mutex<gpio::GpioState>,
    irq: Mutex<irq::IrqState>,
    input: Mutex<input::InputState>,
    net: Mutex<net::NetState>,
    pci: Mutex<pci::PciState>,
    faults: Mutex<BTreeSet<FaultPoint>>,
    releases: Mutex<Vec<&'static str>>,
}

impl SimKernel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next call at `point` fails with an I/O error.
    pub fn inject_fault(&self, point: FaultPoint) {
        self.faults.lock().insert(point);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    fn fault(&self, point: FaultPoint) -> DriverResult {
        if self.faults.lock().remove(&point) {
            debug!("injected fault at {point:?}");
            return Err(DriverError::Io(format!("injected fault at {point:?}")));
        }
        Ok(())
    }

    fn log_release(&self, what: &'static str) {
        self.releases.lock().push(what);
    }

    /// Every release call made so far, oldest first.
    pub fn releases(&self) -> Vec<&'static str> {
        self.releases.lock().clone()
    }

    pub fn clear_releases(&self) {
        self.releases.lock().clear();
    }

    /// Number of kernel objects currently held by drivers.
    pub fn held(&self) -> usize {
        self.gpio.lock().held()
            + self.irq.lock().held()
            + self.input.lock().held()
            + self.net.lock().held()
            + self.pci.lock().held()
    }
}

impl Debug for SimKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimKernel")
            .field("held", &self.held())
            .field("releases", &self.releases.lock().len())
            .finish()
    }
}

impl KernelServices for SimKernel {
    fn gpio(&self) -> Option<&dyn GpioController> {
        Some(self)
    }

    fn irq_chip(&self) -> Option<&dyn IrqChip> {
        Some(self)
    }

    fn input(&self) -> Option<&dyn InputSubsystem> {
        Some(self)
    }

    fn net(&self) -> Option<&dyn NetSubsystem> {
        Some(self)
    }

    fn pci(&self) -> Option<&dyn PciBus> {
        Some(self)
    }

    fn hex_dump(&self, prefix: &str, data: &[u8]) {
        if !log_enabled!(Level::Debug) {
            return;
        }
        for line in hex_dump_lines(prefix, data) {
            debug!("{line}");
        }
    }
}
