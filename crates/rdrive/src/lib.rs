//! Device binding engine.
//!
//! A driver is a [`DriverRegister`]: match data plus a probe function. The
//! [`BindingEngine`] matches discovered devices against the registered
//! drivers, runs the probe with a [`ProbeContext`], and keeps every resource
//! the probe acquired in the device's [`ResourceChain`]. Unbind stops event
//! delivery, lets running handlers finish, and releases the chain newest
//! first.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod chain;
mod device;
mod dispatcher;
mod error;
mod manager;
mod probe;
mod register;
pub mod resource;
pub mod sync;

pub use chain::ResourceChain;
pub use device::{DeviceInstance, DeviceState, Stats};
pub use dispatcher::{DispatchStats, EventDispatcher, EventHandler, EventRegistration};
pub use error::{BindError, HandlerFault, ReleaseFailure};
pub use manager::{BindingEngine, UnbindReport};
pub use probe::ProbeContext;
pub use register::{DriverRegister, ProbeFn, ProbeKind, PropertyPolicy, RegisterContainer, RemoveFn};
pub use resource::{Resource, ResourceGuard, ResourceKind, Slot};

pub use driver_interface;
