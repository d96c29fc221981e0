// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Descriptor validation.
//!
//! Every descriptor is validated before it reaches either executor, so the
//! software and hardware paths reject exactly the same inputs. Validation
//! errors are caller bugs: they are returned immediately and never retried.

use crate::delta;
use crate::descriptor::HwDescriptor;
use crate::dif::{DifBlockSize, DIF_SIZE};
use crate::opcode::Operation;
use crate::status::Status;
use thiserror::Error;

/// Smallest number of descriptors in a batch.
pub const MIN_BATCH_SIZE: u32 = 2;

/// Smallest `max_delta_record_size` accepted by create-delta.
pub const MIN_DELTA_RECORD_SIZE: u32 = 80;

/// Reasons a descriptor is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("required address is null")]
    NullAddress,

    #[error("transfer size is zero")]
    NullSize,

    #[error("buffers overlap")]
    Overlapping,

    #[error("delta buffers must be 8-byte aligned")]
    Misalignment,

    #[error("delta transfer size must be a multiple of 8")]
    WrongSize,

    #[error("delta transfer size exceeds {:#x} bytes", delta::MAX_INPUT_SIZE)]
    LargeSize,

    #[error("delta record size must be a multiple of 10 and at least 80 bytes")]
    WrongDeltaSize,

    #[error("dualcast destinations must share bits 11:0")]
    WrongDualcast,

    #[error("batch holds fewer than {MIN_BATCH_SIZE} descriptors")]
    WrongBatchSize,

    #[error("transfer size is not a whole number of DIF blocks")]
    WrongDifSize,

    #[error("dif_strip destination directly precedes its source")]
    DifStripAdjacent,

    #[error("unsupported operation {0:#04x}")]
    UnsupportedOperation(u8),

    #[error("unknown DIF block size code {0}")]
    UnknownDifBlockSize(u32),
}

impl ValidationError {
    /// Returns the caller-visible status for this error.
    pub const fn status(self) -> Status {
        match self {
            Self::NullAddress => Status::NullPointerError,
            Self::NullSize | Self::WrongDifSize => Status::JobLengthError,
            Self::Overlapping => Status::OverlappingBufferError,
            Self::Misalignment => Status::DeltaAlignError,
            Self::WrongSize | Self::LargeSize => Status::DeltaInputSizeError,
            Self::WrongDeltaSize => Status::DeltaRecordSizeError,
            Self::WrongDualcast => Status::DualcastAlignError,
            Self::WrongBatchSize => Status::BatchSizeError,
            Self::DifStripAdjacent => Status::DifStripAdjacentError,
            Self::UnsupportedOperation(_) => Status::JobOperationError,
            Self::UnknownDifBlockSize(_) => Status::JobFlagsError,
        }
    }
}

/// True if `[a, a + a_len)` and `[b, b + b_len)` intersect.
#[inline]
pub fn overlaps(a: u64, a_len: u64, b: u64, b_len: u64) -> bool {
    (a <= b && a.wrapping_add(a_len) > b) || (b <= a && b.wrapping_add(b_len) > a)
}

fn ensure(condition: bool, error: ValidationError) -> Result<(), ValidationError> {
    if condition {
        Ok(())
    } else {
        Err(error)
    }
}

fn non_null(addrs: &[u64]) -> Result<(), ValidationError> {
    ensure(addrs.iter().all(|&a| a != 0), ValidationError::NullAddress)
}

fn non_zero(sizes: &[u32]) -> Result<(), ValidationError> {
    ensure(sizes.iter().all(|&s| s != 0), ValidationError::NullSize)
}

fn aligned8(addrs: &[u64]) -> Result<(), ValidationError> {
    ensure(addrs.iter().all(|&a| a % 8 == 0), ValidationError::Misalignment)
}

fn disjoint(a: u64, a_len: u64, b: u64, b_len: u64) -> Result<(), ValidationError> {
    ensure(!overlaps(a, a_len, b, b_len), ValidationError::Overlapping)
}

/// Validate one descriptor.
///
/// # Errors
///
/// Returns the first rule the descriptor violates.
pub fn validate(desc: &HwDescriptor) -> Result<(), ValidationError> {
    let op = desc.operation().ok_or(ValidationError::UnsupportedOperation(desc.opcode))?;
    let size = desc.xfer_size;
    let len = u64::from(size);

    match op {
        Operation::Nop | Operation::Drain => Ok(()),

        Operation::Batch => {
            non_null(&[desc.src])?;
            ensure(size >= MIN_BATCH_SIZE, ValidationError::WrongBatchSize)
        }

        Operation::MemMove => {
            non_null(&[desc.src, desc.dst])?;
            non_zero(&[size])
        }

        Operation::Fill | Operation::CacheFlush => {
            non_null(&[desc.dst])?;
            non_zero(&[size])
        }

        Operation::Compare => {
            non_null(&[desc.src, desc.dst])?;
            non_zero(&[size])
        }

        Operation::ComparePattern | Operation::Crc => {
            non_null(&[desc.src])?;
            non_zero(&[size])
        }

        Operation::CopyCrc => {
            non_null(&[desc.src, desc.dst])?;
            non_zero(&[size])?;
            disjoint(desc.src, len, desc.dst, len)
        }

        Operation::Dualcast => {
            let dst2 = desc.dst2();
            non_null(&[desc.src, desc.dst, dst2])?;
            non_zero(&[size])?;
            ensure(desc.dst & 0xFFF == dst2 & 0xFFF, ValidationError::WrongDualcast)?;
            disjoint(desc.src, len, desc.dst, len)?;
            disjoint(desc.src, len, dst2, len)?;
            disjoint(desc.dst, len, dst2, len)
        }

        Operation::CreateDelta => {
            let record = desc.delta_record_addr();
            let max = desc.max_delta_record_size();
            non_null(&[desc.src, desc.dst, record])?;
            non_zero(&[size, max])?;
            aligned8(&[desc.src, desc.dst, record])?;
            ensure(size as usize % delta::BLOCK_SIZE == 0, ValidationError::WrongSize)?;
            ensure(size as usize <= delta::MAX_INPUT_SIZE, ValidationError::LargeSize)?;
            ensure(
                max as usize % delta::NOTE_SIZE == 0 && max >= MIN_DELTA_RECORD_SIZE,
                ValidationError::WrongDeltaSize,
            )
        }

        Operation::ApplyDelta => {
            let record_size = desc.delta_record_size();
            non_null(&[desc.dst, desc.src])?;
            non_zero(&[size, record_size])?;
            disjoint(desc.src, u64::from(record_size), desc.dst, len)?;
            aligned8(&[desc.dst, desc.src])?;
            ensure(size as usize % delta::BLOCK_SIZE == 0, ValidationError::WrongSize)?;
            ensure(size as usize <= delta::MAX_INPUT_SIZE, ValidationError::LargeSize)?;
            ensure(
                record_size as usize % delta::NOTE_SIZE == 0,
                ValidationError::WrongDeltaSize,
            )
        }

        Operation::DifCheck | Operation::DifInsert | Operation::DifStrip | Operation::DifUpdate => {
            validate_dif(op, desc)
        }
    }
}

fn validate_dif(op: Operation, desc: &HwDescriptor) -> Result<(), ValidationError> {
    let block = DifBlockSize::from_code(desc.dif_flags());
    let size = desc.xfer_size;
    let len = u64::from(size);

    if op == Operation::DifCheck {
        non_null(&[desc.src])?;
    } else {
        non_null(&[desc.src, desc.dst])?;
    }
    non_zero(&[size])?;

    if op == Operation::DifInsert {
        ensure(size as usize % block.bytes() == 0, ValidationError::WrongDifSize)?;
        let dst_len = len + (len / block.bytes() as u64) * DIF_SIZE as u64;
        return disjoint(desc.src, len, desc.dst, dst_len);
    }

    ensure(size as usize % block.protected() == 0, ValidationError::WrongDifSize)?;

    match op {
        Operation::DifStrip => {
            let dst_len = len - (len / block.protected() as u64) * DIF_SIZE as u64;
            disjoint(desc.src, len, desc.dst, dst_len)?;
            // The device mishandles a destination that ends right before the source.
            let adjacent = desc.dst < desc.src
                && desc.dst + dst_len <= desc.src
                && desc.src <= desc.dst + len;
            ensure(!adjacent, ValidationError::DifStripAdjacent)
        }
        Operation::DifUpdate => disjoint(desc.src, len, desc.dst, len),
        _ => Ok(()),
    }
}
