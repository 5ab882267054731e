//! Device identity and kernel capability contracts shared by the binding
//! engine (`rdrive`), the drivers and whatever kernel hosts them.
//!
//! Nothing in here owns a resource. Capabilities hand out small copyable
//! handles ([`GpioDesc`], [`InputHandle`], [`NetHandle`], [`IoMapping`]) and
//! take them back on release; the engine decides when that happens.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
mod _macro;

pub mod descriptor;
pub mod err;
pub mod gpio;
pub mod input;
pub mod io;
pub mod irq;
pub mod net;
pub mod pci;
pub mod services;

pub use descriptor::{CompatibleKey, DeviceDescriptor, DeviceId, PropertySource, PropertyValue};
pub use err::{DriverError, DriverResult};
pub use gpio::{Direction, GpioController, GpioDesc};
pub use input::{EventKind, InputEvent, InputHandle, InputInfo, InputSubsystem};
pub use io::{IoMapping, Mmio};
pub use irq::{IrqAction, IrqChip, IrqConfig, IrqId, IrqReturn, Trigger};
pub use net::{
    Frame, FrameAllocator, MacAddr, NetDeviceInfo, NetDeviceOps, NetFlags, NetHandle, NetStats,
    NetSubsystem, TxStatus,
};
pub use pci::{BarInfo, PciBus, PciDeviceId};
pub use services::KernelServices;
