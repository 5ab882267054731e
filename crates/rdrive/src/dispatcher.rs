//! Routing of interrupt lines to driver handlers.
//!
//! The interrupt layer holds an [`EventDispatcher`] as its `IrqAction`. Every
//! invocation is counted in flight before the enabled flag is looked at, and
//! [`EventDispatcher::quiesce`] clears the flag before it waits for the count
//! to reach zero. With both sides sequentially consistent, once `quiesce`
//! returns no handler is running and none will start.

use alloc::{
    boxed::Box,
    string::{String, ToString},
    sync::{Arc, Weak},
};
use core::{
    hint::spin_loop,
    sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
};

use driver_interface::{DriverResult, IrqAction, IrqChip, IrqId, IrqReturn, KernelServices};
use log::{debug, error, trace};
use spin::Mutex;

use crate::{
    device::DeviceInstance,
    error::HandlerFault,
    resource::{Resource, ResourceKind},
};

/// Driver side of an interrupt line.
pub trait EventHandler: Send + Sync {
    fn handle(&self, dev: &DeviceInstance, irq: IrqId) -> Result<(), HandlerFault>;
}

impl<F> EventHandler for F
where
    F: Fn(&DeviceInstance, IrqId) -> Result<(), HandlerFault> + Send + Sync,
{
    fn handle(&self, dev: &DeviceInstance, irq: IrqId) -> Result<(), HandlerFault> {
        self(dev, irq)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub faults: u64,
    pub spurious: u64,
}

struct Inner {
    irq: IrqId,
    name: String,
    owner: Weak<DeviceInstance>,
    handler: Mutex<Box<dyn EventHandler>>,
    enabled: AtomicBool,
    in_flight: AtomicUsize,
    delivered: AtomicU64,
    faults: AtomicU64,
    spurious: AtomicU64,
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<Inner>,
}

impl EventDispatcher {
    /// A gated dispatcher. Nothing is delivered until [`open`](Self::open).
    pub fn new(
        irq: IrqId,
        name: &str,
        owner: Weak<DeviceInstance>,
        handler: Box<dyn EventHandler>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                irq,
                name: name.to_string(),
                owner,
                handler: Mutex::new(handler),
                enabled: AtomicBool::new(false),
                in_flight: AtomicUsize::new(0),
                delivered: AtomicU64::new(0),
                faults: AtomicU64::new(0),
                spurious: AtomicU64::new(0),
            }),
        }
    }

    pub fn irq(&self) -> IrqId {
        self.inner.irq
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            faults: self.inner.faults.load(Ordering::Relaxed),
            spurious: self.inner.spurious.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn open(&self) {
        debug!("{}: dispatcher open on irq {}", self.inner.name, self.inner.irq);
        self.inner.enabled.store(true, Ordering::SeqCst);
    }

    /// Stops delivery and waits until running invocations have returned.
    ///
    /// Must not be called from inside this dispatcher's own handler.
    pub fn quiesce(&self) {
        self.inner.enabled.store(false, Ordering::SeqCst);
        while self.inner.in_flight.load(Ordering::SeqCst) != 0 {
            spin_loop();
        }
        trace!("{}: quiesced", self.inner.name);
    }

    pub fn dispatch(&self) -> IrqReturn {
        self.inner.dispatch()
    }

    pub(crate) fn action(&self) -> Arc<dyn IrqAction> {
        self.inner.clone()
    }
}

impl Inner {
    fn dispatch(&self) -> IrqReturn {
        let _guard = InFlight::enter(&self.in_flight);

        if !self.enabled.load(Ordering::SeqCst) {
            self.spurious.fetch_add(1, Ordering::Relaxed);
            return IrqReturn::None;
        }

        let Some(dev) = self.owner.upgrade() else {
            self.spurious.fetch_add(1, Ordering::Relaxed);
            return IrqReturn::None;
        };

        let handler = self.handler.lock();
        self.delivered.fetch_add(1, Ordering::Relaxed);
        if let Err(fault) = handler.handle(&dev, self.irq) {
            self.faults.fetch_add(1, Ordering::Relaxed);
            error!("[{}] {}: {fault}", dev.id(), self.name);
        }
        IrqReturn::Handled
    }
}

impl IrqAction for Inner {
    fn handle(&self, _irq: IrqId) -> IrqReturn {
        self.dispatch()
    }
}

/// Chain entry for a dispatcher routed through the IRQ chip.
pub struct EventRegistration {
    services: Arc<dyn KernelServices>,
    dispatcher: EventDispatcher,
}

impl EventRegistration {
    pub(crate) fn request(
        services: &Arc<dyn KernelServices>,
        cfg: &driver_interface::IrqConfig,
        dispatcher: EventDispatcher,
    ) -> DriverResult<Self> {
        let chip = chip(services)?;
        chip.request_irq(cfg, dispatcher.name(), dispatcher.action())?;
        Ok(Self {
            services: services.clone(),
            dispatcher,
        })
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }
}

fn chip(services: &Arc<dyn KernelServices>) -> DriverResult<&dyn IrqChip> {
    services
        .irq_chip()
        .ok_or(driver_interface::DriverError::NotSupported)
}

impl Resource for EventRegistration {
    const KIND: ResourceKind = ResourceKind::EventRegistration;

    fn release(&mut self) -> DriverResult {
        self.dispatcher.quiesce();
        let chip = chip(&self.services)?;
        let irq = self.dispatcher.irq();
        chip.disable_irq(irq);
        chip.free_irq(irq)
    }
}

#[cfg(test)]
mod test {
    extern crate std;

    use std::{
        sync::atomic::AtomicBool,
        thread,
        time::Duration,
    };

    use driver_interface::{CompatibleKey, DeviceDescriptor, DeviceId};

    use super::*;

    fn instance() -> Arc<DeviceInstance> {
        Arc::new(DeviceInstance::new(
            DeviceDescriptor::new(
                DeviceId::from(7u64),
                "button",
                CompatibleKey::Compatible("test".into()),
            ),
            "test",
        ))
    }

    fn counting() -> Box<dyn EventHandler> {
        Box::new(|dev: &DeviceInstance, _irq: IrqId| {
            dev.update_stats(|s| s.events += 1);
            Ok(())
        })
    }

    #[test]
    fn test_gated_until_open() {
        let dev = instance();
        let d = EventDispatcher::new(IrqId::from(3usize), "btn", Arc::downgrade(&dev), counting());
        assert_eq!(d.dispatch(), IrqReturn::None);
        d.open();
        assert_eq!(d.dispatch(), IrqReturn::Handled);
        assert_eq!(dev.stats().events, 1);
        assert_eq!(
            d.stats(),
            DispatchStats {
                delivered: 1,
                faults: 0,
                spurious: 1
            }
        );
    }

    #[test]
    fn test_fault_is_contained() {
        let dev = instance();
        let d = EventDispatcher::new(
            IrqId::from(3usize),
            "btn",
            Arc::downgrade(&dev),
            Box::new(|_: &DeviceInstance, _: IrqId| Err(HandlerFault("line read".into()))),
        );
        d.open();
        assert_eq!(d.dispatch(), IrqReturn::Handled);
        assert_eq!(d.stats().faults, 1);
        assert_eq!(d.in_flight(), 0);
    }

    #[test]
    fn test_quiesce_waits_for_running_handler() {
        let _ = env_logger::builder().is_test(true).try_init();

        let dev = instance();
        let started = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let (s, f) = (started.clone(), finished.clone());
        let d = EventDispatcher::new(
            IrqId::from(9usize),
            "slow",
            Arc::downgrade(&dev),
            Box::new(move |_: &DeviceInstance, _: IrqId| {
                s.store(true, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(50));
                f.store(true, Ordering::SeqCst);
                Ok(())
            }),
        );
        d.open();

        let d2 = d.clone();
        let t = thread::spawn(move || d2.dispatch());
        while !started.load(Ordering::SeqCst) {
            spin_loop();
        }
        d.quiesce();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(d.in_flight(), 0);
        assert_eq!(d.dispatch(), IrqReturn::None);
        assert_eq!(t.join().unwrap(), IrqReturn::Handled);

        d.quiesce();
    }

    #[test]
    fn test_dropped_owner_is_spurious() {
        let dev = instance();
        let d = EventDispatcher::new(IrqId::from(1usize), "x", Arc::downgrade(&dev), counting());
        d.open();
        drop(dev);
        assert_eq!(d.dispatch(), IrqReturn::None);
        assert_eq!(d.stats().spurious, 1);
    }
}
