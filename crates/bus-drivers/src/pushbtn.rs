//! GPIO push-button as an input device.
//!
//! The line is claimed as an input, mapped to an interrupt on both edges, and
//! every edge reports `KEY_ENTER` with the current line level. Two variants
//! share the probe:
//!
//! | compatible | `purpose` property | key sync |
//! |---|---|---|
//! | `demo,pushbutton` | required | after every event |
//! | `demo,pushbutton-simple` | optional | on release only |

use alloc::{format, sync::Arc};

use driver_interface::{
    DriverError, EventKind, GpioDesc, InputHandle, InputInfo, IrqConfig, IrqId, KernelServices,
    Trigger, input::KEY_ENTER,
};
use log::{debug, info};
use rdrive::{
    BindError, DeviceInstance, DriverRegister, EventHandler, HandlerFault, ProbeContext,
    ProbeKind, PropertyPolicy,
    resource::{EventLine, InputDeviceObject, InputLine, InputRegistration},
};

/// GPIO connection id; the board describes the line as `pushbtn-gpios`.
pub const CON_ID: &str = "pushbtn";

const PUSHBTN_KINDS: &[ProbeKind] = &[ProbeKind::Platform {
    compatibles: &["demo,pushbutton"],
    on_probe: probe_strict,
}];

const PUSHBTN_SIMPLE_KINDS: &[ProbeKind] = &[ProbeKind::Platform {
    compatibles: &["demo,pushbutton-simple"],
    on_probe: probe_simple,
}];

pub const PUSHBTN: DriverRegister = DriverRegister {
    name: "pushbtn",
    probe_kinds: PUSHBTN_KINDS,
    property_policy: PropertyPolicy::FailClosed,
    on_remove: Some(remove),
};

pub const PUSHBTN_SIMPLE: DriverRegister = DriverRegister {
    name: "pushbtn_simple",
    probe_kinds: PUSHBTN_SIMPLE_KINDS,
    property_policy: PropertyPolicy::WarnAndContinue,
    on_remove: Some(remove),
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    EveryEvent,
    OnRelease,
}

struct Variant {
    irq_name: &'static str,
    input_name: &'static str,
    phys: &'static str,
    sync: SyncMode,
    kinds: &'static [ProbeKind],
}

const STRICT: Variant = Variant {
    irq_name: "pushbtn",
    input_name: "GPIO PushButton",
    phys: "pushbtn/input0",
    sync: SyncMode::EveryEvent,
    kinds: PUSHBTN_KINDS,
};

const SIMPLE: Variant = Variant {
    irq_name: "pushbtn-simple",
    input_name: "GPIO PushButton",
    phys: "pushbtn_simple/input0",
    sync: SyncMode::OnRelease,
    kinds: PUSHBTN_SIMPLE_KINDS,
};

fn probe_strict(ctx: &mut ProbeContext<'_>) -> Result<(), BindError> {
    probe(ctx, &STRICT)
}

fn probe_simple(ctx: &mut ProbeContext<'_>) -> Result<(), BindError> {
    probe(ctx, &SIMPLE)
}

fn probe(ctx: &mut ProbeContext<'_>, v: &Variant) -> Result<(), BindError> {
    let id = ctx.id();
    crate::validate_match(ctx, v.kinds)?;

    let line = ctx.acquire("gpiod_get", |k| InputLine::get(k, id, CON_ID))?;
    let desc = ctx
        .resource(line)
        .map(|l| l.desc())
        .ok_or(BindError::ConfigurationMissing(format!("{CON_ID}-gpios")))?;

    let event = ctx.acquire("gpiod_to_irq", |k| EventLine::from_line(k, desc))?;
    let irq = ctx
        .resource(event)
        .map(|e| e.irq())
        .ok_or(BindError::ConfigurationMissing(format!("{CON_ID} irq")))?;
    info!("[{id}] {} mapped to irq {irq}", desc);

    if let Some(purpose) = ctx.property_str("purpose")? {
        info!("[{id}] purpose = \"{purpose}\"");
    }

    let info = InputInfo {
        name: v.input_name.into(),
        phys: v.phys.into(),
        capability: (EventKind::Key, KEY_ENTER),
    };
    let input = ctx.acquire("input_allocate_device", |k| {
        InputDeviceObject::allocate(k, id, &info)
    })?;
    let handle = ctx
        .resource(input)
        .map(|i| i.handle())
        .ok_or(BindError::ConfigurationMissing("input device".into()))?;

    let handler = PushButton {
        services: ctx.services().clone(),
        line: desc,
        input: handle,
        sync: v.sync,
    };
    ctx.request_event(
        "request_irq",
        IrqConfig {
            irq,
            trigger: Trigger::EdgeBoth,
        },
        v.irq_name,
        handler,
    )?;

    ctx.register("input_register_device", |k| {
        InputRegistration::register(k, handle)
    })?;
    Ok(())
}

fn remove(dev: &DeviceInstance) {
    info!(
        "[{}] {} removed after {} events",
        dev.id(),
        dev.driver_name(),
        dev.stats().events
    );
}

struct PushButton {
    services: Arc<dyn KernelServices>,
    line: GpioDesc,
    input: InputHandle,
    sync: SyncMode,
}

impl EventHandler for PushButton {
    fn handle(&self, dev: &DeviceInstance, irq: IrqId) -> Result<(), HandlerFault> {
        let gpio = self.services.gpio().ok_or(DriverError::NotSupported)?;
        let input = self.services.input().ok_or(DriverError::NotSupported)?;

        let pressed = gpio.get_value(self.line)?;
        let count = dev.update_stats(|s| {
            s.events += 1;
            s.events
        });
        debug!("[{}] irq {irq}: count={count} state={}", dev.id(), pressed as u8);

        input.report_key(self.input, KEY_ENTER, pressed);
        if self.sync == SyncMode::EveryEvent || !pressed {
            input.sync(self.input);
        }
        Ok(())
    }
}
