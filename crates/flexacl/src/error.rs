//! Error type shared by every ACL core operation.

use std::fmt;

use flexacl_common::RefCountError;
use flexacl_hw::HwError;
use thiserror::Error;

/// Bare error kind, for callers that branch on the category only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidParam,
    EntryNotFound,
    ResourceExhausted,
    ResourceInUse,
    AlreadyExists,
    Unsupported,
    HardwareFailure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidParam => "INVALID_PARAM",
            ErrorKind::EntryNotFound => "ENTRY_NOT_FOUND",
            ErrorKind::ResourceExhausted => "NO_RESOURCES",
            ErrorKind::ResourceInUse => "RESOURCE_IN_USE",
            ErrorKind::AlreadyExists => "ALREADY_EXISTS",
            ErrorKind::Unsupported => "CMD_UNSUPPORTED",
            ErrorKind::HardwareFailure => "HW_FAILURE",
        };
        write!(f, "{}", s)
    }
}

/// Error type for ACL core operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AclError {
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    /// An offset or index outside the addressed object.
    #[error("Offset {offset} out of range (capacity {capacity})")]
    OutOfRange { offset: u32, capacity: u32 },

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Resources exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Resource in use: {0}")]
    ResourceInUse(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Unsupported command: {0}")]
    Unsupported(String),

    #[error("Hardware failure: {0}")]
    HardwareFailure(#[from] HwError),
}

impl AclError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AclError::InvalidParam(_) | AclError::OutOfRange { .. } => ErrorKind::InvalidParam,
            AclError::EntryNotFound(_) => ErrorKind::EntryNotFound,
            AclError::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            AclError::ResourceInUse(_) => ErrorKind::ResourceInUse,
            AclError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            AclError::Unsupported(_) => ErrorKind::Unsupported,
            AclError::HardwareFailure(_) => ErrorKind::HardwareFailure,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        AclError::InvalidParam(message.into())
    }

    pub(crate) fn not_found(what: impl fmt::Display) -> Self {
        AclError::EntryNotFound(what.to_string())
    }

    pub(crate) fn exhausted(message: impl Into<String>) -> Self {
        AclError::ResourceExhausted(message.into())
    }

    pub(crate) fn in_use(message: impl Into<String>) -> Self {
        AclError::ResourceInUse(message.into())
    }

    /// Maps a reference-count failure on `what` to an error.
    pub(crate) fn from_ref_count(err: RefCountError, what: impl fmt::Display) -> Self {
        match err {
            RefCountError::KeyNotFound => AclError::not_found(what),
            RefCountError::RefCountUnderflow => {
                AclError::invalid(format!("reference count underflow on {}", what))
            }
        }
    }
}

/// Result type for ACL core operations.
pub type Result<T> = std::result::Result<T, AclError>;
