// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{DecodeError, EncodeError};

/// Errors that can occur anywhere in the storage engine.
#[derive(Debug)]
pub enum Error {
    /// Caller passed a value that violates a documented precondition.
    InvalidArgument(String),

    /// Requested tag, chunk or block does not exist.
    NotFound(String),

    /// A blocking operation did not complete in time.
    Timeout(String),

    /// Allocation failed.
    OutOfMemory(String),

    /// Underlying I/O failed.
    IoFailed(std::io::Error),

    /// The OS denied access to a resource.
    PermissionDenied(String),

    /// The requested operation is not implemented by this backend.
    NotSupported(String),

    /// The resource is in use by another operation (e.g. WAL segment not cleared).
    Busy(String),

    /// The handle or container has already been closed.
    Closed,

    /// On-disk data failed a checksum, magic or bounds check.
    CorruptData(String),

    /// Anything that should not be reachable from documented usage.
    Internal(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArgument(m) => write!(f, "invalid argument: {m}"),
            Self::NotFound(m) => write!(f, "not found: {m}"),
            Self::Timeout(m) => write!(f, "timeout: {m}"),
            Self::OutOfMemory(m) => write!(f, "out of memory: {m}"),
            Self::IoFailed(e) => write!(f, "I/O failed: {e}"),
            Self::PermissionDenied(m) => write!(f, "permission denied: {m}"),
            Self::NotSupported(m) => write!(f, "not supported: {m}"),
            Self::Busy(m) => write!(f, "busy: {m}"),
            Self::Closed => write!(f, "handle is closed"),
            Self::CorruptData(m) => write!(f, "corrupt data: {m}"),
            Self::Internal(m) => write!(f, "internal error: {m}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoFailed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        match value.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(value.to_string()),
            std::io::ErrorKind::NotFound => Self::NotFound(value.to_string()),
            _ => Self::IoFailed(value),
        }
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Internal(value.to_string())
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::CorruptData(value.to_string())
    }
}

/// Engine-wide result type.
pub type Result<T> = std::result::Result<T, Error>;
