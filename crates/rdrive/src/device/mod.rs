use alloc::sync::Arc;
use core::{
    any::Any,
    fmt::{self, Debug},
    sync::atomic::{AtomicU8, Ordering},
};

use driver_interface::{DeviceDescriptor, DeviceId};
use spin::Mutex;

use crate::{chain::ResourceChain, dispatcher::EventDispatcher};

mod stats;

pub use stats::Stats;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Unbound = 0,
    Binding = 1,
    Bound = 2,
    Unbinding = 3,
}

impl DeviceState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Binding,
            2 => Self::Bound,
            3 => Self::Unbinding,
            _ => Self::Unbound,
        }
    }
}

/// A device while a driver owns it.
///
/// The chain is only populated between a successful probe and unbind. The
/// counter block is the one piece of state the event handler and the data
/// plane share, and every read or write of it goes through one lock.
pub struct DeviceInstance {
    descriptor: DeviceDescriptor,
    driver: &'static str,
    state: AtomicU8,
    chain: Mutex<Option<ResourceChain>>,
    dispatcher: Mutex<Option<EventDispatcher>>,
    stats: Mutex<Stats>,
    drvdata: Mutex<Option<Arc<dyn Any + Send + Sync>>>,
}

impl DeviceInstance {
    pub(crate) fn new(descriptor: DeviceDescriptor, driver: &'static str) -> Self {
        Self {
            descriptor,
            driver,
            state: AtomicU8::new(DeviceState::Binding as u8),
            chain: Mutex::new(None),
            dispatcher: Mutex::new(None),
            stats: Mutex::new(Stats::default()),
            drvdata: Mutex::new(None),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.descriptor.device_id
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn driver_name(&self) -> &'static str {
        self.driver
    }

    pub fn state(&self) -> DeviceState {
        DeviceState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn transition(&self, from: DeviceState, to: DeviceState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn set_state(&self, state: DeviceState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Consistent copy of the counters.
    pub fn stats(&self) -> Stats {
        *self.stats.lock()
    }

    /// Updates the counters under the instance lock.
    pub fn update_stats<T>(&self, f: impl FnOnce(&mut Stats) -> T) -> T {
        f(&mut self.stats.lock())
    }

    pub fn set_drvdata<T: Any + Send + Sync>(&self, data: Arc<T>) {
        *self.drvdata.lock() = Some(data);
    }

    pub fn drvdata<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let data = self.drvdata.lock().clone()?;
        data.downcast::<T>().ok()
    }

    /// Acquisition steps of the installed chain, oldest first.
    pub fn resource_steps(&self) -> alloc::vec::Vec<&'static str> {
        self.chain
            .lock()
            .as_ref()
            .map(|c| c.steps())
            .unwrap_or_default()
    }

    pub(crate) fn install_chain(&self, chain: ResourceChain) {
        *self.chain.lock() = Some(chain);
    }

    pub(crate) fn take_chain(&self) -> Option<ResourceChain> {
        self.chain.lock().take()
    }

    pub(crate) fn dispatcher(&self) -> Option<EventDispatcher> {
        self.dispatcher.lock().clone()
    }

    pub(crate) fn set_dispatcher(&self, dispatcher: EventDispatcher) -> bool {
        let mut slot = self.dispatcher.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(dispatcher);
        true
    }

    pub(crate) fn clear_runtime(&self) {
        self.dispatcher.lock().take();
        self.drvdata.lock().take();
    }
}

impl Debug for DeviceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceInstance")
            .field("id", &self.id())
            .field("name", &self.descriptor.name)
            .field("driver", &self.driver)
            .field("state", &self.state())
            .finish()
    }
}
