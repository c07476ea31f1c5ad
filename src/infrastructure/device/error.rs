//! Error types for the device layer.

use thiserror::Error;

use crate::domain::error::DomainError;

/// Device-level errors.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no touch-capable axis block found in capability dump")]
    NoTouchAxes,
    #[error("malformed capability dump: {0}")]
    Parse(String),
    #[error("device io: {0}")]
    Io(#[from] std::io::Error),
    #[error("device disconnected")]
    Disconnected,
    #[error("contact slot {0} not supported by device")]
    InvalidSlot(i32),
}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

impl From<DeviceError> for DomainError {
    fn from(err: DeviceError) -> Self {
        DomainError::Device(err.to_string())
    }
}
