//! Device status codes and error handling.
//!
//! Device operations report a raw status code; this module converts it into
//! Rust's `Result` type.

use std::fmt;
use thiserror::Error;

/// Status codes returned by the ACL device.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwStatus {
    Success = 0,
    Failure = -1,
    NotSupported = -2,
    NoMemory = -3,
    InsufficientResources = -4,
    InvalidParameter = -5,
    ItemAlreadyExists = -6,
    ItemNotFound = -7,
    TableFull = -8,
    ObjectInUse = -9,
    Timeout = -10,
}

impl HwStatus {
    /// Creates a status from a raw i32 value. Unknown codes map to `Failure`.
    pub fn from_raw(status: i32) -> Self {
        match status {
            0 => HwStatus::Success,
            -2 => HwStatus::NotSupported,
            -3 => HwStatus::NoMemory,
            -4 => HwStatus::InsufficientResources,
            -5 => HwStatus::InvalidParameter,
            -6 => HwStatus::ItemAlreadyExists,
            -7 => HwStatus::ItemNotFound,
            -8 => HwStatus::TableFull,
            -9 => HwStatus::ObjectInUse,
            -10 => HwStatus::Timeout,
            _ => HwStatus::Failure,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == HwStatus::Success
    }

    /// Converts to a Result, returning Ok(()) for success.
    pub fn into_result(self) -> HwResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(HwError::from_status(self))
        }
    }
}

impl fmt::Display for HwStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HwStatus::Success => "HW_STATUS_SUCCESS",
            HwStatus::Failure => "HW_STATUS_FAILURE",
            HwStatus::NotSupported => "HW_STATUS_NOT_SUPPORTED",
            HwStatus::NoMemory => "HW_STATUS_NO_MEMORY",
            HwStatus::InsufficientResources => "HW_STATUS_INSUFFICIENT_RESOURCES",
            HwStatus::InvalidParameter => "HW_STATUS_INVALID_PARAMETER",
            HwStatus::ItemAlreadyExists => "HW_STATUS_ITEM_ALREADY_EXISTS",
            HwStatus::ItemNotFound => "HW_STATUS_ITEM_NOT_FOUND",
            HwStatus::TableFull => "HW_STATUS_TABLE_FULL",
            HwStatus::ObjectInUse => "HW_STATUS_OBJECT_IN_USE",
            HwStatus::Timeout => "HW_STATUS_TIMEOUT",
        };
        write!(f, "{}", s)
    }
}

/// Error type for device operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HwError {
    /// The device returned an error status.
    #[error("device operation {operation} failed: {status}")]
    Status {
        operation: &'static str,
        status: HwStatus,
    },

    /// The device has no object with the given raw handle.
    #[error("device object not found: 0x{raw:016x}")]
    UnknownObject { raw: u64 },

    /// An offset or size was outside the programmed region.
    #[error("offset {offset} outside region of {hw_size} entries")]
    OutOfBounds { offset: u32, hw_size: u32 },
}

impl HwError {
    /// Creates an error from a device status code.
    pub fn from_status(status: HwStatus) -> Self {
        HwError::Status {
            operation: "unknown",
            status,
        }
    }

    /// Returns the device status this error corresponds to.
    pub fn status(&self) -> HwStatus {
        match self {
            HwError::Status { status, .. } => *status,
            HwError::UnknownObject { .. } => HwStatus::ItemNotFound,
            HwError::OutOfBounds { .. } => HwStatus::InvalidParameter,
        }
    }
}

/// Result type for device operations.
pub type HwResult<T> = Result<T, HwError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_raw() {
        assert_eq!(HwStatus::from_raw(0), HwStatus::Success);
        assert_eq!(HwStatus::from_raw(-8), HwStatus::TableFull);
        assert_eq!(HwStatus::from_raw(-999), HwStatus::Failure);
    }

    #[test]
    fn test_into_result() {
        assert!(HwStatus::Success.into_result().is_ok());

        let err = HwStatus::NoMemory.into_result().unwrap_err();
        assert_eq!(err.status(), HwStatus::NoMemory);
    }

    #[test]
    fn test_error_display() {
        let err = HwError::Status {
            operation: "write_rules",
            status: HwStatus::Timeout,
        };
        assert_eq!(
            err.to_string(),
            "device operation write_rules failed: HW_STATUS_TIMEOUT"
        );
    }
}
