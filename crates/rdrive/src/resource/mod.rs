//! Scoped ownership of the things a bind acquires.
//!
//! A [`Resource`] is released by exactly one [`ResourceGuard`]: either
//! explicitly, through the owning [`ResourceChain`](crate::ResourceChain), or
//! when the guard goes out of scope on an early return.

use alloc::boxed::Box;
use core::{any::Any, fmt::Debug, marker::PhantomData};

use driver_interface::DriverResult;
use log::{trace, warn};

mod io;
mod line;
mod logical;

pub use io::{MappedBar, MsixVectors, PciRegion};
pub use line::{EventLine, InputLine};
pub use logical::{InputDeviceObject, InputRegistration, NetDeviceObject, NetRegistration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Mapped or reserved I/O memory.
    IoRegion,
    /// GPIO descriptor used as an input.
    InputLine,
    /// Interrupt line derived from an input line or allocated by a bus.
    EventLine,
    /// Network or input device object allocated from a subsystem.
    LogicalDevice,
    /// A dispatcher wired to an interrupt line.
    EventRegistration,
    /// The logical device made visible to its outer subsystem.
    Registration,
    /// Release-only action with no value attached.
    Action,
}

pub trait Resource: Send + Sync + 'static {
    const KIND: ResourceKind;

    /// Gives the resource back. Called at most once, by the owning guard.
    fn release(&mut self) -> DriverResult;
}

pub struct ResourceGuard<R: Resource> {
    step: &'static str,
    res: Option<R>,
}

impl<R: Resource> ResourceGuard<R> {
    pub fn new(step: &'static str, res: R) -> Self {
        Self {
            step,
            res: Some(res),
        }
    }

    pub fn step(&self) -> &'static str {
        self.step
    }

    pub fn get(&self) -> Option<&R> {
        self.res.as_ref()
    }

    pub fn is_held(&self) -> bool {
        self.res.is_some()
    }

    /// Releases now. Later calls, and the eventual drop, do nothing.
    pub fn release(&mut self) -> DriverResult {
        match self.res.take() {
            Some(mut res) => {
                trace!("[{}] release {:?}", self.step, R::KIND);
                res.release()
            }
            None => Ok(()),
        }
    }
}

impl<R: Resource> Drop for ResourceGuard<R> {
    fn drop(&mut self) {
        if self.res.is_some() {
            if let Err(e) = self.release() {
                warn!("[{}] release on drop failed: {e}", self.step);
            }
        }
    }
}

impl<R: Resource + Debug> Debug for ResourceGuard<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("step", &self.step)
            .field("res", &self.res)
            .finish()
    }
}

/// Type-erased chain entry.
pub(crate) trait Entry: Send + Sync {
    fn step(&self) -> &'static str;
    fn kind(&self) -> ResourceKind;
    fn release(&mut self) -> DriverResult;
    fn as_any(&self) -> &dyn Any;
}

impl<R: Resource> Entry for ResourceGuard<R> {
    fn step(&self) -> &'static str {
        self.step
    }

    fn kind(&self) -> ResourceKind {
        R::KIND
    }

    fn release(&mut self) -> DriverResult {
        ResourceGuard::release(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) type ReleaseFn = Box<dyn FnOnce() -> DriverResult + Send + Sync>;

/// Device-managed action: something to undo that has no value of its own,
/// e.g. "disable the PCI function".
pub(crate) struct Action {
    step: &'static str,
    kind: ResourceKind,
    release: Option<ReleaseFn>,
}

impl Action {
    pub(crate) fn new(step: &'static str, kind: ResourceKind, release: ReleaseFn) -> Self {
        Self {
            step,
            kind,
            release: Some(release),
        }
    }
}

impl Entry for Action {
    fn step(&self) -> &'static str {
        self.step
    }

    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn release(&mut self) -> DriverResult {
        match self.release.take() {
            Some(f) => {
                trace!("[{}] run release action", self.step);
                f()
            }
            None => Ok(()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for Action {
    fn drop(&mut self) {
        if self.release.is_some() {
            if let Err(e) = Entry::release(self) {
                warn!("[{}] release action on drop failed: {e}", self.step);
            }
        }
    }
}

/// Typed position of a resource inside a chain.
pub struct Slot<R> {
    pub(crate) index: usize,
    _marker: PhantomData<fn() -> R>,
}

impl<R> Slot<R> {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }
}

impl<R> Clone for Slot<R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R> Copy for Slot<R> {}

impl<R> Debug for Slot<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Slot({})", self.index)
    }
}
