use alloc::string::String;

use driver_interface::{DeviceId, DriverError};
use thiserror::Error;

use crate::resource::ResourceKind;

/// Why a bind or unbind request was refused.
///
/// A bind error is returned only after everything the failed bind acquired
/// has been released again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("[{step}] {kind:?} unavailable: {source}")]
    ResourceUnavailable {
        step: &'static str,
        kind: ResourceKind,
        source: DriverError,
    },
    #[error("required property `{0}` missing")]
    ConfigurationMissing(String),
    #[error("property `{name}` invalid: {reason}")]
    InvalidProperty { name: String, reason: String },
    #[error("[{step}] registration failed: {source}")]
    RegistrationFailed {
        step: &'static str,
        source: DriverError,
    },
    #[error("device {0} already bound")]
    AlreadyBound(DeviceId),
    #[error("device {0} not bound")]
    NotBound(DeviceId),
    #[error("no driver matches device {0}")]
    NoMatch(DeviceId),
}

impl BindError {
    /// The acquisition step that failed, if the error came from one.
    pub fn step(&self) -> Option<&'static str> {
        match self {
            BindError::ResourceUnavailable { step, .. }
            | BindError::RegistrationFailed { step, .. } => Some(*step),
            _ => None,
        }
    }
}

/// Raised by an event handler. Logged and counted by the dispatcher, never
/// propagated past it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("handler fault: {0}")]
pub struct HandlerFault(pub String);

impl From<DriverError> for HandlerFault {
    fn from(value: DriverError) -> Self {
        Self(alloc::format!("{value}"))
    }
}

/// A resource whose release failed during teardown.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("[{step}] release of {kind:?} failed: {error}")]
pub struct ReleaseFailure {
    pub step: &'static str,
    pub kind: ResourceKind,
    pub error: DriverError,
}
