use alloc::string::String;

use thiserror::Error;

/// Failure reported by a kernel capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("not found")]
    NotFound,
    #[error("out of memory")]
    NoMemory,
    #[error("resource busy")]
    Busy,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not supported")]
    NotSupported,
    #[error("io error: {0}")]
    Io(String),
}

pub type DriverResult<T = ()> = core::result::Result<T, DriverError>;
