use alloc::sync::Arc;

use crate::DriverResult;

custom_type!(IrqId, usize, "{:#x}");

/// The trigger configuration for an interrupt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Trigger {
    EdgeBoth,
    EdgeRising,
    EdgeFalling,
    LevelHigh,
    LevelLow,
}

#[derive(Debug, Clone)]
pub struct IrqConfig {
    pub irq: IrqId,
    pub trigger: Trigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    Handled,
    None,
}

/// Whatever the interrupt controller calls when a line fires.
pub trait IrqAction: Send + Sync {
    fn handle(&self, irq: IrqId) -> IrqReturn;
}

pub trait IrqChip: Send + Sync {
    fn request_irq(&self, cfg: &IrqConfig, name: &str, action: Arc<dyn IrqAction>) -> DriverResult;
    /// Masks the line; an invocation already running is not interrupted.
    fn disable_irq(&self, irq: IrqId);
    fn free_irq(&self, irq: IrqId) -> DriverResult;
}
