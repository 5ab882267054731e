use crate::{DeviceId, DriverResult, IrqId};

custom_type!(GpioDesc, u32, "gpio{}");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    OutLow,
    OutHigh,
}

pub trait GpioController: Send + Sync {
    /// Claims the line the device describes as `<con_id>-gpios`.
    fn gpiod_get(&self, dev: DeviceId, con_id: &str, dir: Direction) -> DriverResult<GpioDesc>;
    fn gpiod_put(&self, desc: GpioDesc) -> DriverResult;
    /// Logical value, active-low already applied.
    fn get_value(&self, desc: GpioDesc) -> DriverResult<bool>;
    fn to_irq(&self, desc: GpioDesc) -> DriverResult<IrqId>;
}
