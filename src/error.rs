// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Error types for DSA operations.
//!
//! [`DsaError`] carries the context of a failure; [`DsaError::status`]
//! collapses it onto the closed [`Status`] taxonomy that C callers see.

use crate::status::Status;
use crate::validation::ValidationError;
use thiserror::Error;

/// Errors that can occur during DSA operations.
#[derive(Debug, Error)]
pub enum DsaError {
    /// A required pointer argument was null.
    #[error("null pointer: {0}")]
    NullPointer(&'static str),

    /// Raw execution path value is out of range.
    #[error("invalid execution path value {0}")]
    InvalidPath(u32),

    /// The job buffer is not an initialized, live job.
    #[error("job is not initialized or was already finalized")]
    JobCorrupted,

    /// The descriptor built from a job or batch slot was rejected.
    #[error("descriptor rejected: {0}")]
    Validation(#[from] ValidationError),

    /// Batch slot index is past the end of the batch.
    #[error("batch task index {index} out of range for {count} tasks")]
    BatchTaskIndexOverflow { index: usize, count: usize },

    /// Batch holds fewer tasks than the minimum.
    #[error("batch of {count} tasks is below the minimum of {min}")]
    BatchSize { count: usize, min: usize },

    /// Buffer size mismatch.
    #[error("buffer size mismatch: expected {expected}, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Every eligible work queue reported busy.
    #[error("work queue full")]
    QueueFull,

    /// Driver is present but no usable work queue was found.
    #[error("no work queue available")]
    NoWorkQueue,

    /// Discovery recorded that hardware cannot be used.
    #[error("hardware path unavailable: {0}")]
    HardwareUnavailable(Status),

    /// The job has nothing in flight and no outcome to report.
    #[error("job was not submitted")]
    NotSubmitted,

    /// DSA operation completed with an error status.
    #[error("DSA operation failed: {status}, result={result:#04x}")]
    OperationFailed { status: Status, result: u8 },

    /// Page fault during DSA operation.
    #[error("page fault at address {fault_addr:#018x}, completed {bytes_completed} bytes")]
    PageFault {
        fault_addr: u64,
        bytes_completed: u32,
    },

    /// I/O error from system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Platform not supported.
    #[error("platform not supported: DSA requires Linux with IDXD driver")]
    PlatformNotSupported,

    /// Permission denied accessing DSA device.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Memory mapping failed.
    #[error("mmap failed: {0}")]
    MmapFailed(String),

    /// A sysfs attribute held an unexpected value.
    #[error("invalid sysfs attribute {path}: {value:?}")]
    InvalidSysfs { path: String, value: String },
}

impl DsaError {
    /// Returns the caller-visible status for this error.
    pub fn status(&self) -> Status {
        match self {
            Self::NullPointer(_) => Status::NullPointerError,
            Self::InvalidPath(_) => Status::PathError,
            Self::JobCorrupted => Status::JobCorrupted,
            Self::Validation(e) => e.status(),
            Self::BatchTaskIndexOverflow { .. } => Status::BatchTaskIndexOverflow,
            Self::BatchSize { .. } => Status::BatchSizeError,
            Self::BufferSizeMismatch { .. } => Status::MemoryOverflowError,
            Self::QueueFull => Status::WorkQueueOverflowError,
            Self::NoWorkQueue => Status::WorkQueuesNotAvailable,
            Self::HardwareUnavailable(status) => *status,
            Self::NotSubmitted => Status::JobCorrupted,
            Self::OperationFailed { status, .. } => *status,
            Self::PageFault { .. } => Status::PageFaultError,
            Self::PlatformNotSupported => Status::LibaccelNotFound,
            Self::Io(_)
            | Self::PermissionDenied(_)
            | Self::MmapFailed(_)
            | Self::InvalidSysfs { .. } => Status::LibaccelError,
        }
    }
}

/// Result type alias for DSA operations.
pub type DsaResult<T> = Result<T, DsaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(DsaError::NullPointer("job").status(), Status::NullPointerError);
        assert_eq!(DsaError::InvalidPath(7).status(), Status::PathError);
        assert_eq!(DsaError::QueueFull.status(), Status::WorkQueueOverflowError);
        assert_eq!(DsaError::PlatformNotSupported.status(), Status::LibaccelNotFound);
        assert_eq!(
            DsaError::BatchTaskIndexOverflow { index: 5, count: 4 }.status(),
            Status::BatchTaskIndexOverflow
        );
        assert_eq!(
            DsaError::Validation(ValidationError::Overlapping).status(),
            Status::OverlappingBufferError
        );
    }

    #[test]
    fn test_operation_failed_keeps_status() {
        let err = DsaError::OperationFailed {
            status: Status::DifCheckError,
            result: 0x04,
        };
        assert_eq!(err.status(), Status::DifCheckError);
        assert!(err.to_string().contains("DIF_CHECK_ERROR"));
    }
}
