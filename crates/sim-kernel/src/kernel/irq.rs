use std::{collections::BTreeMap, sync::Arc};

use driver_interface::{
    DriverError, DriverResult, IrqAction, IrqChip, IrqConfig, IrqId, IrqReturn, Trigger,
};
use log::{debug, trace, warn};

use super::{FaultPoint, SimKernel};

struct Registered {
    name: String,
    trigger: Trigger,
    action: Arc<dyn IrqAction>,
    enabled: bool,
}

impl Registered {
    fn fires_on(&self, rising: bool) -> bool {
        match self.trigger {
            Trigger::EdgeBoth => true,
            Trigger::EdgeRising | Trigger::LevelHigh => rising,
            Trigger::EdgeFalling | Trigger::LevelLow => !rising,
        }
    }
}

#[derive(Default)]
pub(super) struct IrqState {
    lines: BTreeMap<IrqId, Registered>,
    unhandled: u64,
}

impl IrqState {
    pub(super) fn held(&self) -> usize {
        self.lines.len()
    }
}

impl SimKernel {
    /// Delivers `irq` to its action, if one is registered and enabled.
    ///
    /// The action runs on the calling thread with no kernel lock held.
    pub fn raise(&self, irq: IrqId) -> Option<IrqReturn> {
        let action = {
            let mut s = self.irq.lock();
            match s.lines.get(&irq) {
                Some(r) if r.enabled => r.action.clone(),
                _ => {
                    s.unhandled += 1;
                    trace!("irq {irq}: nobody listening");
                    return None;
                }
            }
        };
        Some(action.handle(irq))
    }

    pub(super) fn raise_edge(&self, irq: IrqId, rising: bool) -> Option<IrqReturn> {
        let fires = self
            .irq
            .lock()
            .lines
            .get(&irq)
            .map(|r| r.fires_on(rising))
            .unwrap_or(true);
        if !fires {
            return None;
        }
        self.raise(irq)
    }

    pub fn irq_name(&self, irq: IrqId) -> Option<String> {
        self.irq.lock().lines.get(&irq).map(|r| r.name.clone())
    }

    pub fn irq_enabled(&self, irq: IrqId) -> bool {
        self.irq.lock().lines.get(&irq).is_some_and(|r| r.enabled)
    }

    /// Interrupts raised while no enabled action was registered.
    pub fn unhandled_irqs(&self) -> u64 {
        self.irq.lock().unhandled
    }
}

impl IrqChip for SimKernel {
    fn request_irq(&self, cfg: &IrqConfig, name: &str, action: Arc<dyn IrqAction>) -> DriverResult {
        self.fault(FaultPoint::RequestIrq)?;
        let mut s = self.irq.lock();
        if let Some(r) = s.lines.get(&cfg.irq) {
            warn!("irq {} already requested by {}", cfg.irq, r.name);
            return Err(DriverError::Busy);
        }
        s.lines.insert(
            cfg.irq,
            Registered {
                name: name.to_string(),
                trigger: cfg.trigger,
                action,
                enabled: true,
            },
        );
        debug!("irq {} requested by {name} ({:?})", cfg.irq, cfg.trigger);
        Ok(())
    }

    fn disable_irq(&self, irq: IrqId) {
        if let Some(r) = self.irq.lock().lines.get_mut(&irq) {
            r.enabled = false;
        }
    }

    fn free_irq(&self, irq: IrqId) -> DriverResult {
        self.fault(FaultPoint::FreeIrq)?;
        if self.irq.lock().lines.remove(&irq).is_none() {
            return Err(DriverError::NotFound);
        }
        self.log_release("free_irq");
        Ok(())
    }
}
