use std::collections::{BTreeMap, BTreeSet};

use driver_interface::{
    DeviceId, Direction, DriverError, DriverResult, GpioController, GpioDesc, IrqId, IrqReturn,
};
use log::{debug, trace};

use super::{FaultPoint, SimKernel};

/// Interrupt number of GPIO line 0.
pub const GPIO_IRQ_BASE: usize = 100;

struct Line {
    active_low: bool,
    /// Physical level.
    high: bool,
}

#[derive(Default)]
pub(super) struct GpioState {
    lines: BTreeMap<u32, Line>,
    /// `(device, con_id)` to line, as the board wires them.
    wiring: BTreeMap<(DeviceId, String), u32>,
    claimed: BTreeSet<u32>,
}

impl GpioState {
    pub(super) fn held(&self) -> usize {
        self.claimed.len()
    }

    fn line(&self, desc: GpioDesc) -> DriverResult<&Line> {
        if !self.claimed.contains(&desc.raw()) {
            return Err(DriverError::NotFound);
        }
        self.lines.get(&desc.raw()).ok_or(DriverError::NotFound)
    }
}

fn line_irq(line: u32) -> IrqId {
    IrqId::from(GPIO_IRQ_BASE + line as usize)
}

impl SimKernel {
    /// Wires `line` to `dev` under `con_id`. The line starts deasserted.
    pub fn add_gpio_line(&self, dev: DeviceId, con_id: &str, line: u32, active_low: bool) {
        let mut g = self.gpio.lock();
        g.lines.insert(
            line,
            Line {
                active_low,
                high: active_low,
            },
        );
        g.wiring.insert((dev, con_id.to_string()), line);
    }

    /// Sets the logical level of `line` and raises its interrupt on a change.
    ///
    /// Returns what the interrupt layer made of it, `None` when the level did
    /// not change or nothing was listening.
    pub fn drive_line(&self, line: u32, asserted: bool) -> Option<IrqReturn> {
        let rising = {
            let mut g = self.gpio.lock();
            let l = g.lines.get_mut(&line)?;
            let high = asserted ^ l.active_low;
            if l.high == high {
                return None;
            }
            l.high = high;
            high
        };
        trace!("gpio{line} -> {}", rising as u8);
        self.raise_edge(line_irq(line), rising)
    }

    /// Logical level of `line`, claimed or not.
    pub fn line_value(&self, line: u32) -> Option<bool> {
        self.gpio.lock().lines.get(&line).map(|l| l.high ^ l.active_low)
    }

    pub fn line_claimed(&self, line: u32) -> bool {
        self.gpio.lock().claimed.contains(&line)
    }
}

impl GpioController for SimKernel {
    fn gpiod_get(&self, dev: DeviceId, con_id: &str, dir: Direction) -> DriverResult<GpioDesc> {
        self.fault(FaultPoint::GpiodGet)?;
        let mut g = self.gpio.lock();
        let line = *g
            .wiring
            .get(&(dev, con_id.to_string()))
            .ok_or(DriverError::NotFound)?;
        if !g.claimed.insert(line) {
            return Err(DriverError::Busy);
        }
        if let Some(l) = g.lines.get_mut(&line) {
            match dir {
                Direction::In => {}
                Direction::OutLow => l.high = l.active_low,
                Direction::OutHigh => l.high = !l.active_low,
            }
        }
        debug!("[{dev}] {con_id}-gpios claimed gpio{line} as {dir:?}");
        Ok(GpioDesc::from(line))
    }

    fn gpiod_put(&self, desc: GpioDesc) -> DriverResult {
        self.fault(FaultPoint::GpiodPut)?;
        if !self.gpio.lock().claimed.remove(&desc.raw()) {
            return Err(DriverError::NotFound);
        }
        self.log_release("gpiod_put");
        Ok(())
    }

    fn get_value(&self, desc: GpioDesc) -> DriverResult<bool> {
        let g = self.gpio.lock();
        let l = g.line(desc)?;
        Ok(l.high ^ l.active_low)
    }

    fn to_irq(&self, desc: GpioDesc) -> DriverResult<IrqId> {
        self.fault(FaultPoint::GpiodToIrq)?;
        self.gpio.lock().line(desc)?;
        Ok(line_irq(desc.raw()))
    }
}
