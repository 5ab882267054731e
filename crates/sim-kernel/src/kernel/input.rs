use std::collections::BTreeMap;

use driver_interface::{
    DeviceId, DriverError, DriverResult, InputEvent, InputHandle, InputInfo, InputSubsystem,
};
use log::{debug, trace};

use super::{FaultPoint, SimKernel};

struct InputDev {
    owner: DeviceId,
    info: InputInfo,
    registered: bool,
    events: Vec<InputEvent>,
}

#[derive(Default)]
pub(super) struct InputState {
    next: u32,
    devices: BTreeMap<InputHandle, InputDev>,
}

impl InputState {
    pub(super) fn held(&self) -> usize {
        self.devices.len() + self.devices.values().filter(|d| d.registered).count()
    }
}

impl SimKernel {
    /// Input device allocated on behalf of `owner`.
    pub fn input_handle(&self, owner: DeviceId) -> Option<InputHandle> {
        self.input
            .lock()
            .devices
            .iter()
            .find(|(_, d)| d.owner == owner)
            .map(|(h, _)| *h)
    }

    pub fn input_info(&self, handle: InputHandle) -> Option<InputInfo> {
        self.input.lock().devices.get(&handle).map(|d| d.info.clone())
    }

    pub fn input_registered(&self, handle: InputHandle) -> bool {
        self.input
            .lock()
            .devices
            .get(&handle)
            .is_some_and(|d| d.registered)
    }

    /// Events reported to `handle` while it was registered.
    pub fn input_events(&self, handle: InputHandle) -> Vec<InputEvent> {
        self.input
            .lock()
            .devices
            .get(&handle)
            .map(|d| d.events.clone())
            .unwrap_or_default()
    }
}

impl InputSubsystem for SimKernel {
    fn allocate_device(&self, owner: DeviceId, info: &InputInfo) -> DriverResult<InputHandle> {
        self.fault(FaultPoint::InputAllocate)?;
        let mut s = self.input.lock();
        s.next += 1;
        let handle = InputHandle::from(s.next);
        s.devices.insert(
            handle,
            InputDev {
                owner,
                info: info.clone(),
                registered: false,
                events: Vec::new(),
            },
        );
        Ok(handle)
    }

    fn free_device(&self, handle: InputHandle) -> DriverResult {
        {
            let mut s = self.input.lock();
            match s.devices.get(&handle) {
                None => return Err(DriverError::NotFound),
                Some(d) if d.registered => return Err(DriverError::Busy),
                Some(_) => {}
            }
            s.devices.remove(&handle);
        }
        self.log_release("input_free_device");
        Ok(())
    }

    fn register_device(&self, handle: InputHandle) -> DriverResult {
        self.fault(FaultPoint::InputRegister)?;
        let mut s = self.input.lock();
        let d = s.devices.get_mut(&handle).ok_or(DriverError::NotFound)?;
        if d.registered {
            return Err(DriverError::Busy);
        }
        d.registered = true;
        debug!("{handle}: {} at {}", d.info.name, d.info.phys);
        Ok(())
    }

    fn unregister_device(&self, handle: InputHandle) -> DriverResult {
        {
            let mut s = self.input.lock();
            let d = s.devices.get_mut(&handle).ok_or(DriverError::NotFound)?;
            if !d.registered {
                return Err(DriverError::InvalidArgument(format!("{handle} not registered")));
            }
            d.registered = false;
        }
        self.log_release("input_unregister_device");
        Ok(())
    }

    fn report_event(&self, handle: InputHandle, event: InputEvent) {
        let mut s = self.input.lock();
        match s.devices.get_mut(&handle) {
            Some(d) if d.registered => d.events.push(event),
            _ => trace!("{handle}: event {event:?} dropped"),
        }
    }
}
