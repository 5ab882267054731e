use alloc::sync::Arc;

use driver_interface::{
    DeviceId, Direction, DriverError, DriverResult, GpioController, GpioDesc, IrqId,
    KernelServices,
};

use super::{Resource, ResourceKind};

fn gpio(services: &Arc<dyn KernelServices>) -> DriverResult<&dyn GpioController> {
    services.gpio().ok_or(DriverError::NotSupported)
}

/// A GPIO line claimed as an input.
pub struct InputLine {
    services: Arc<dyn KernelServices>,
    desc: GpioDesc,
}

impl InputLine {
    pub fn get(
        services: &Arc<dyn KernelServices>,
        dev: DeviceId,
        con_id: &str,
    ) -> DriverResult<Self> {
        let desc = gpio(services)?.gpiod_get(dev, con_id, Direction::In)?;
        Ok(Self {
            services: services.clone(),
            desc,
        })
    }

    pub fn desc(&self) -> GpioDesc {
        self.desc
    }
}

impl Resource for InputLine {
    const KIND: ResourceKind = ResourceKind::InputLine;

    fn release(&mut self) -> DriverResult {
        gpio(&self.services)?.gpiod_put(self.desc)
    }
}

/// Interrupt line derived from an input line.
///
/// The mapping belongs to the GPIO chip, so releasing only forgets it. It is
/// still a chain entry so the unwind order stays uniform.
pub struct EventLine {
    irq: IrqId,
}

impl EventLine {
    pub fn from_line(services: &Arc<dyn KernelServices>, line: GpioDesc) -> DriverResult<Self> {
        let irq = gpio(services)?.to_irq(line)?;
        Ok(Self { irq })
    }

    pub fn irq(&self) -> IrqId {
        self.irq
    }
}

impl Resource for EventLine {
    const KIND: ResourceKind = ResourceKind::EventLine;

    fn release(&mut self) -> DriverResult {
        Ok(())
    }
}
