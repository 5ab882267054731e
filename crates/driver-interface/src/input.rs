use alloc::string::String;

use crate::{DeviceId, DriverResult};

custom_type!(InputHandle, u32, "input{}");

pub const KEY_ENTER: u16 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Key,
    Sync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub kind: EventKind,
    pub code: u16,
    pub value: i32,
}

impl InputEvent {
    pub fn key(code: u16, pressed: bool) -> Self {
        Self {
            kind: EventKind::Key,
            code,
            value: pressed as i32,
        }
    }

    pub fn sync() -> Self {
        Self {
            kind: EventKind::Sync,
            code: 0,
            value: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InputInfo {
    pub name: String,
    pub phys: String,
    /// Supported `(kind, code)` pair.
    pub capability: (EventKind, u16),
}

pub trait InputSubsystem: Send + Sync {
    fn allocate_device(&self, owner: DeviceId, info: &InputInfo) -> DriverResult<InputHandle>;
    fn free_device(&self, handle: InputHandle) -> DriverResult;
    fn register_device(&self, handle: InputHandle) -> DriverResult;
    fn unregister_device(&self, handle: InputHandle) -> DriverResult;
    fn report_event(&self, handle: InputHandle, event: InputEvent);

    fn report_key(&self, handle: InputHandle, code: u16, pressed: bool) {
        self.report_event(handle, InputEvent::key(code, pressed));
    }

    fn sync(&self, handle: InputHandle) {
        self.report_event(handle, InputEvent::sync());
    }
}
