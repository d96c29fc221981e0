// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Caller-visible status taxonomy.
//!
//! Every job, batch and C entry point reports one of these values. The
//! numbering is stable and shared with the C ABI in [`crate::capi`], so a C
//! caller can compare the returned `u32` against the same constants.

use crate::descriptor::ExecutionStatus;

/// Closed set of statuses returned by the dispatch engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Status {
    /// Operation completed successfully.
    Ok = 0,
    /// Operation completed, but a checked result did not match the expected one.
    FalsePredicateOk = 1,
    /// Operation was accepted and is still running.
    BeingProcessed = 2,
    InternalError = 3,
    NullPointerError = 4,
    LimitsError = 5,
    /// Raw execution path value is not one of auto, software or hardware.
    PathError = 6,
    HintError = 7,
    CrcAlignError = 8,
    /// At least one task of a batch failed.
    BatchError = 9,
    DeltaAscendError = 10,
    DeltaOffsetError = 11,
    /// DIF check failed; the job's `result` carries the mismatch bitmask.
    DifCheckError = 12,
    JobOperationError = 13,
    JobFlagsError = 14,
    JobLengthError = 15,
    BatchLimitsError = 16,
    DeltaRecordSizeError = 17,
    OverlappingBufferError = 18,
    DualcastAlignError = 19,
    DeltaAlignError = 20,
    DeltaInputSizeError = 21,
    MemoryOverflowError = 22,
    /// Job buffer does not hold an initialized, live job.
    JobCorrupted = 23,
    /// Every eligible hardware queue reported busy.
    WorkQueueOverflowError = 24,
    PageFaultError = 25,
    TcANotAvailable = 26,
    TcBNotAvailable = 27,
    BatchTaskIndexOverflow = 28,
    BatchSizeError = 29,
    DrainPageFaultError = 30,
    UnknownCacheSizeError = 31,
    DifStripAdjacentError = 32,
    /// The accelerator driver (IDXD sysfs bus) is not present.
    LibaccelNotFound = 100,
    LibaccelError = 101,
    /// Driver present, but no enabled shared work queue could be used.
    WorkQueuesNotAvailable = 102,
}

impl Status {
    /// Returns the status as its stable numeric code.
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    /// True for `Ok` and `FalsePredicateOk`.
    #[inline]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::FalsePredicateOk)
    }

    /// Returns a human-readable name for the status.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::FalsePredicateOk => "FALSE_PREDICATE_OK",
            Self::BeingProcessed => "BEING_PROCESSED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::NullPointerError => "NULL_POINTER_ERROR",
            Self::LimitsError => "LIMITS_ERROR",
            Self::PathError => "PATH_ERROR",
            Self::HintError => "HINT_ERROR",
            Self::CrcAlignError => "CRC_ALIGN_ERROR",
            Self::BatchError => "BATCH_ERROR",
            Self::DeltaAscendError => "DELTA_ASCEND_ERROR",
            Self::DeltaOffsetError => "DELTA_OFFSET_ERROR",
            Self::DifCheckError => "DIF_CHECK_ERROR",
            Self::JobOperationError => "JOB_OPERATION_ERROR",
            Self::JobFlagsError => "JOB_FLAGS_ERROR",
            Self::JobLengthError => "JOB_LENGTH_ERROR",
            Self::BatchLimitsError => "BATCH_LIMITS_ERROR",
            Self::DeltaRecordSizeError => "DELTA_RECORD_SIZE_ERROR",
            Self::OverlappingBufferError => "OVERLAPPING_BUFFER_ERROR",
            Self::DualcastAlignError => "DUALCAST_ALIGN_ERROR",
            Self::DeltaAlignError => "DELTA_ALIGN_ERROR",
            Self::DeltaInputSizeError => "DELTA_INPUT_SIZE_ERROR",
            Self::MemoryOverflowError => "MEMORY_OVERFLOW_ERROR",
            Self::JobCorrupted => "JOB_CORRUPTED",
            Self::WorkQueueOverflowError => "WORK_QUEUE_OVERFLOW_ERROR",
            Self::PageFaultError => "PAGE_FAULT_ERROR",
            Self::TcANotAvailable => "TC_A_NOT_AVAILABLE",
            Self::TcBNotAvailable => "TC_B_NOT_AVAILABLE",
            Self::BatchTaskIndexOverflow => "BATCH_TASK_INDEX_OVERFLOW",
            Self::BatchSizeError => "BATCH_SIZE_ERROR",
            Self::DrainPageFaultError => "DRAIN_PAGE_FAULT_ERROR",
            Self::UnknownCacheSizeError => "UNKNOWN_CACHE_SIZE_ERROR",
            Self::DifStripAdjacentError => "DIF_STRIP_ADJACENT_ERROR",
            Self::LibaccelNotFound => "LIBACCEL_NOT_FOUND",
            Self::LibaccelError => "LIBACCEL_ERROR",
            Self::WorkQueuesNotAvailable => "WORK_QUEUES_NOT_AVAILABLE",
        }
    }
}

impl From<ExecutionStatus> for Status {
    /// Maps a completion-record status code onto the caller taxonomy.
    fn from(status: ExecutionStatus) -> Self {
        match status {
            ExecutionStatus::Processing => Self::BeingProcessed,
            ExecutionStatus::Success => Self::Ok,
            ExecutionStatus::FalsePredicate => Self::FalsePredicateOk,
            ExecutionStatus::PageFault => Self::PageFaultError,
            ExecutionStatus::BatchError => Self::BatchError,
            ExecutionStatus::OffsetOrderError => Self::DeltaAscendError,
            ExecutionStatus::OffsetOverflow => Self::DeltaOffsetError,
            ExecutionStatus::DifControlError => Self::DifCheckError,
            ExecutionStatus::OperationError => Self::JobOperationError,
            ExecutionStatus::FlagError => Self::JobFlagsError,
            ExecutionStatus::InvalidTransferSize => Self::JobLengthError,
            ExecutionStatus::DescriptorCountError => Self::BatchSizeError,
            ExecutionStatus::DeltaSizeError => Self::DeltaInputSizeError,
            ExecutionStatus::BuffersOverlap => Self::OverlappingBufferError,
            ExecutionStatus::DualcastMisalign => Self::DualcastAlignError,
            _ => Self::InternalError,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u32())
    }
}
