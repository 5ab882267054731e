//! Drivers bound through the rdrive engine.
//!
//! - [`pushbtn`]: GPIO push-button reported as `KEY_ENTER`, in a strict and
//!   a lenient variant.
//! - [`pci_skeleton`]: minimal PCI function with one MSI-X vector.
//! - [`veth`]: virtual Ethernet device that classifies what it transmits.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::vec::Vec;

use rdrive::{BindError, DriverRegister, ProbeContext, ProbeKind};

pub mod pci_skeleton;
pub mod pushbtn;
pub mod veth;

/// Every driver of this crate, in match priority order.
pub fn registers() -> Vec<DriverRegister> {
    alloc::vec![
        pushbtn::PUSHBTN,
        pushbtn::PUSHBTN_SIMPLE,
        pci_skeleton::PCI_SKELETON,
        veth::VETH,
    ]
}

/// Re-checks inside probe that the device is one the driver was matched for.
pub(crate) fn validate_match(
    ctx: &ProbeContext<'_>,
    kinds: &[ProbeKind],
) -> Result<(), BindError> {
    let key = &ctx.descriptor().key;
    if kinds.iter().any(|k| k.matches(key)) {
        Ok(())
    } else {
        log::error!("[{}] {key} does not match this driver", ctx.id());
        Err(BindError::NoMatch(ctx.id()))
    }
}
