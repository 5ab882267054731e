//! Kernel service contracts for drivers.
//!
//! A kernel implements [`KernelServices`] and hands it to the binding engine.
//! Drivers reach every capability through it, so they never depend on the
//! kernel crate directly. A capability a kernel does not have is `None`.

use crate::{GpioController, InputSubsystem, IrqChip, NetSubsystem, PciBus};

pub trait KernelServices: Send + Sync {
    fn gpio(&self) -> Option<&dyn GpioController> {
        None
    }

    fn irq_chip(&self) -> Option<&dyn IrqChip> {
        None
    }

    fn input(&self) -> Option<&dyn InputSubsystem> {
        None
    }

    fn net(&self) -> Option<&dyn NetSubsystem> {
        None
    }

    fn pci(&self) -> Option<&dyn PciBus> {
        None
    }

    /// Diagnostic dump of a buffer. Not part of any correctness contract.
    fn hex_dump(&self, _prefix: &str, _data: &[u8]) {}
}
