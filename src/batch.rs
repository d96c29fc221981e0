// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Batch coordinator.
//!
//! A batch lives in a caller-owned buffer:
//!
//! ```text
//! | pad | descriptor 0 .. descriptor N-1 | record 0 .. record N-1 |
//! ```
//!
//! The descriptors start at the first 64-byte aligned address of the
//! buffer and each descriptor points at its own completion record. The
//! buffer is run by a job whose operation is `Batch`, with the buffer as
//! its first destination.

use crate::descriptor::{
    CompletionRecord, DescriptorFlags, HwDescriptor, RawCompletionRecord, RawDescriptor,
    COMPLETION_RECORD_SIZE, DESCRIPTOR_SIZE,
};
use crate::error::{DsaError, DsaResult};
use crate::flags::JobFlags;
use crate::job::{apply_flags, check_copy_only, DifConfig};
use crate::opcode::Operation;
use crate::status::Status;
use crate::validation::{validate, MIN_BATCH_SIZE};
use std::marker::PhantomData;

/// Bytes one task occupies: its descriptor plus its completion record.
pub const TASK_SIZE: usize = DESCRIPTOR_SIZE + COMPLETION_RECORD_SIZE;

/// Slack that lets the descriptor array be aligned anywhere in the buffer.
pub const ALIGNMENT_PAD: usize = DESCRIPTOR_SIZE;

/// Buffer size for a batch of `task_count` tasks.
///
/// # Errors
///
/// Returns `BatchSize` when `task_count` is below the minimum batch size.
///
/// # Example
///
/// ```
/// use dsa_offload::batch::size_for;
///
/// assert_eq!(size_for(4).unwrap(), 4 * 96 + 64);
/// assert!(size_for(1).is_err());
/// ```
pub fn size_for(task_count: usize) -> DsaResult<usize> {
    if task_count < MIN_BATCH_SIZE as usize {
        return Err(DsaError::BatchSize {
            count: task_count,
            min: MIN_BATCH_SIZE as usize,
        });
    }
    Ok(task_count * TASK_SIZE + ALIGNMENT_PAD)
}

/// Offset of the descriptor array within a buffer at `addr` and the number
/// of tasks a buffer of `len` bytes holds.
pub fn layout(addr: usize, len: usize) -> (usize, usize) {
    let offset = addr.wrapping_neg() % DESCRIPTOR_SIZE;
    (offset, len.saturating_sub(ALIGNMENT_PAD) / TASK_SIZE)
}

/// Typed view of a batch buffer.
#[derive(Debug)]
pub struct BatchBuffer<'a> {
    descriptors: *mut RawDescriptor,
    records: *mut RawCompletionRecord,
    count: usize,
    _buffer: PhantomData<&'a mut [u8]>,
}

impl<'a> BatchBuffer<'a> {
    /// View `buffer` as a batch.
    ///
    /// # Errors
    ///
    /// Returns `BatchSize` when the buffer holds fewer tasks than the minimum.
    pub fn from_bytes(buffer: &'a mut [u8]) -> DsaResult<Self> {
        // SAFETY: the slice is valid and exclusively borrowed for 'a.
        unsafe { Self::from_raw(buffer.as_mut_ptr(), buffer.len()) }
    }

    /// View `len` bytes at `ptr` as a batch.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes for `'a`,
    /// and nothing else may access the buffer meanwhile.
    pub unsafe fn from_raw(ptr: *mut u8, len: usize) -> DsaResult<Self> {
        if ptr.is_null() {
            return Err(DsaError::NullPointer("batch buffer"));
        }
        let (offset, count) = layout(ptr as usize, len);
        if count < MIN_BATCH_SIZE as usize {
            return Err(DsaError::BatchSize {
                count,
                min: MIN_BATCH_SIZE as usize,
            });
        }
        let descriptors = ptr.add(offset) as *mut RawDescriptor;
        let records = descriptors.add(count) as *mut RawCompletionRecord;
        Ok(Self {
            descriptors,
            records,
            count,
            _buffer: PhantomData,
        })
    }

    /// Number of tasks.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Batch descriptor over the whole buffer.
    pub fn descriptor(&self) -> HwDescriptor {
        HwDescriptor::batch(self.descriptors, self.count as u32)
    }

    /// Mark every task's completion record as not completed.
    ///
    /// Called before each submission of the batch so that `get_status`
    /// never reports a result left over from an earlier run.
    pub fn reset_records(&mut self) {
        for index in 0..self.count {
            // SAFETY: index < count.
            unsafe { (*self.records.add(index)).clear() };
        }
    }

    fn check_index(&self, index: usize) -> DsaResult<()> {
        if index >= self.count {
            return Err(DsaError::BatchTaskIndexOverflow {
                index,
                count: self.count,
            });
        }
        Ok(())
    }

    /// Store `desc` in slot `index`, wired to the slot's completion record.
    fn set(&mut self, index: usize, mut desc: HwDescriptor, flags: JobFlags) -> DsaResult<()> {
        self.check_index(index)?;
        apply_flags(&mut desc, flags);
        // SAFETY: index < count, so both slots lie inside the buffer.
        unsafe {
            let record = &mut *self.records.add(index);
            record.clear();
            desc.set_completion_addr(record.addr());
        }
        validate(&desc)?;
        // SAFETY: as above.
        unsafe { *self.descriptors.add(index) = RawDescriptor::from(&desc) };
        Ok(())
    }

    fn slot(&self, index: usize) -> DsaResult<HwDescriptor> {
        self.check_index(index)?;
        // SAFETY: index < count.
        Ok(unsafe { HwDescriptor::from(&*self.descriptors.add(index)) })
    }

    fn record(&self, index: usize) -> DsaResult<&RawCompletionRecord> {
        self.check_index(index)?;
        // SAFETY: index < count.
        Ok(unsafe { &*self.records.add(index) })
    }

    pub fn set_nop(&mut self, index: usize, flags: JobFlags) -> DsaResult<()> {
        self.set(index, HwDescriptor::nop(), flags)
    }

    pub fn set_mem_move(
        &mut self,
        index: usize,
        src: *const u8,
        dst: *mut u8,
        len: u32,
        flags: JobFlags,
    ) -> DsaResult<()> {
        check_copy_only(src, dst, len, flags)?;
        self.set(index, HwDescriptor::mem_move(dst, src, len), flags)
    }

    pub fn set_fill(&mut self, index: usize, pattern: u64, dst: *mut u8, len: u32, flags: JobFlags) -> DsaResult<()> {
        self.set(index, HwDescriptor::fill(dst, len, pattern), flags)
    }

    pub fn set_compare(
        &mut self,
        index: usize,
        src1: *const u8,
        src2: *const u8,
        len: u32,
        expected: u8,
        flags: JobFlags,
    ) -> DsaResult<()> {
        self.set(index, HwDescriptor::compare(src1, src2, len, expected), flags)
    }

    pub fn set_compare_pattern(
        &mut self,
        index: usize,
        src: *const u8,
        len: u32,
        pattern: u64,
        expected: u8,
        flags: JobFlags,
    ) -> DsaResult<()> {
        self.set(index, HwDescriptor::compare_pattern(src, len, pattern, expected), flags)
    }

    /// The CRC lands in the slot's completion record; see [`get_crc`](Self::get_crc).
    pub fn set_crc(&mut self, index: usize, src: *const u8, len: u32, seed: u32, flags: JobFlags) -> DsaResult<()> {
        self.set(index, HwDescriptor::crc(src, len, seed), flags.difference(JobFlags::CRC_READ_SEED))
    }

    pub fn set_copy_crc(
        &mut self,
        index: usize,
        src: *const u8,
        dst: *mut u8,
        len: u32,
        seed: u32,
        flags: JobFlags,
    ) -> DsaResult<()> {
        self.set(
            index,
            HwDescriptor::copy_crc(dst, src, len, seed),
            flags.difference(JobFlags::CRC_READ_SEED),
        )
    }

    pub fn set_dualcast(
        &mut self,
        index: usize,
        src: *const u8,
        dst1: *mut u8,
        dst2: *mut u8,
        len: u32,
        flags: JobFlags,
    ) -> DsaResult<()> {
        self.set(index, HwDescriptor::dualcast(dst1, dst2, src, len), flags)
    }

    pub fn set_cache_flush(&mut self, index: usize, dst: *mut u8, len: u32, flags: JobFlags) -> DsaResult<()> {
        self.set(index, HwDescriptor::cache_flush(dst, len), flags)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_create_delta(
        &mut self,
        index: usize,
        src1: *const u8,
        src2: *const u8,
        len: u32,
        delta: *mut u8,
        max_delta: u32,
        expected: u8,
        flags: JobFlags,
    ) -> DsaResult<()> {
        self.set(
            index,
            HwDescriptor::create_delta(src1, src2, len, delta, max_delta, expected),
            flags,
        )
    }

    pub fn set_apply_delta(
        &mut self,
        index: usize,
        delta: *const u8,
        delta_len: u32,
        dst: *mut u8,
        len: u32,
        flags: JobFlags,
    ) -> DsaResult<()> {
        self.set(index, HwDescriptor::apply_delta(dst, len, delta, delta_len), flags)
    }

    pub fn set_dif_check(
        &mut self,
        index: usize,
        src: *const u8,
        len: u32,
        config: &DifConfig,
        flags: JobFlags,
    ) -> DsaResult<()> {
        self.set(
            index,
            config.descriptor(Operation::DifCheck, src, std::ptr::null_mut(), len)?,
            flags,
        )
    }

    pub fn set_dif_insert(
        &mut self,
        index: usize,
        src: *const u8,
        dst: *mut u8,
        len: u32,
        config: &DifConfig,
        flags: JobFlags,
    ) -> DsaResult<()> {
        self.set(index, config.descriptor(Operation::DifInsert, src, dst, len)?, flags)
    }

    pub fn set_dif_strip(
        &mut self,
        index: usize,
        src: *const u8,
        dst: *mut u8,
        len: u32,
        config: &DifConfig,
        flags: JobFlags,
    ) -> DsaResult<()> {
        self.set(index, config.descriptor(Operation::DifStrip, src, dst, len)?, flags)
    }

    pub fn set_dif_update(
        &mut self,
        index: usize,
        src: *const u8,
        dst: *mut u8,
        len: u32,
        config: &DifConfig,
        flags: JobFlags,
    ) -> DsaResult<()> {
        self.set(index, config.descriptor(Operation::DifUpdate, src, dst, len)?, flags)
    }

    /// Make task `index` wait for every earlier task of the batch.
    pub fn set_fence(&mut self, index: usize) -> DsaResult<()> {
        let mut desc = self.slot(index)?;
        desc.flags |= DescriptorFlags::FENCE;
        // SAFETY: slot() checked the index.
        unsafe { *self.descriptors.add(index) = RawDescriptor::from(&desc) };
        Ok(())
    }

    /// Status of task `index`; `BeingProcessed` until it has run.
    pub fn get_status(&self, index: usize) -> DsaResult<Status> {
        let record = self.record(index)?;
        if !record.is_complete() {
            return Ok(Status::BeingProcessed);
        }
        Ok(Status::from(record.load().execution_status()))
    }

    /// Result byte of task `index`.
    pub fn get_result(&self, index: usize) -> DsaResult<u8> {
        Ok(self.completion(index)?.result)
    }

    /// CRC computed by task `index`.
    pub fn get_crc(&self, index: usize) -> DsaResult<u32> {
        Ok(self.completion(index)?.crc_value())
    }

    /// Full completion record of task `index`.
    pub fn completion(&self, index: usize) -> DsaResult<CompletionRecord> {
        Ok(self.record(index)?.load())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels;
    use crate::validation::ValidationError;

    #[test]
    fn test_size_for() {
        assert_eq!(size_for(4).unwrap(), 448);
        assert_eq!(size_for(2).unwrap(), 256);
        assert!(matches!(size_for(1), Err(DsaError::BatchSize { count: 1, min: 2 })));
    }

    #[test]
    fn test_layout_aligns_descriptors() {
        let mut buffer = vec![0u8; size_for(4).unwrap() + 7];
        let batch = BatchBuffer::from_bytes(&mut buffer[7..]).unwrap();
        assert_eq!(batch.count(), 4);
        assert_eq!(batch.descriptor().src % 64, 0);
    }

    #[test]
    fn test_index_overflow() {
        let mut buffer = vec![0u8; size_for(4).unwrap()];
        let mut batch = BatchBuffer::from_bytes(&mut buffer).unwrap();
        assert!(matches!(
            batch.set_nop(5, JobFlags::empty()),
            Err(DsaError::BatchTaskIndexOverflow { index: 5, count: 4 })
        ));
        assert!(batch.set_nop(3, JobFlags::empty()).is_ok());
        assert!(batch.get_status(4).is_err());
    }

    #[test]
    fn test_too_small_buffer() {
        let mut buffer = vec![0u8; 64 + 96];
        assert!(matches!(BatchBuffer::from_bytes(&mut buffer), Err(DsaError::BatchSize { .. })));
    }

    #[test]
    fn test_slot_is_validated() {
        let mut buffer = vec![0u8; size_for(2).unwrap()];
        let mut batch = BatchBuffer::from_bytes(&mut buffer).unwrap();
        let data = [0u8; 8];
        let err = batch
            .set_mem_move(0, data.as_ptr(), std::ptr::null_mut(), 8, JobFlags::empty())
            .unwrap_err();
        assert!(matches!(err, DsaError::Validation(ValidationError::NullAddress)));
    }

    #[test]
    fn test_software_run_reports_each_task() {
        let src = [7u8; 32];
        let mut dst = [0u8; 32];
        let crc_src = *b"123456789";
        let mut buffer = vec![0u8; size_for(3).unwrap()];
        let mut batch = BatchBuffer::from_bytes(&mut buffer).unwrap();

        batch.set_mem_move(0, src.as_ptr(), dst.as_mut_ptr(), 32, JobFlags::empty()).unwrap();
        batch.set_crc(1, crc_src.as_ptr(), 9, 0, JobFlags::empty()).unwrap();
        batch
            .set_compare(2, src.as_ptr(), dst.as_ptr(), 32, 0, JobFlags::empty())
            .unwrap();
        batch.set_fence(2).unwrap();
        assert_eq!(batch.get_status(0).unwrap(), Status::BeingProcessed);

        let record = unsafe { kernels::run(&batch.descriptor()) };
        assert!(record.execution_status().is_success());
        assert_eq!(record.bytes_completed, 3);
        assert_eq!(dst, src);
        assert_eq!(batch.get_status(1).unwrap(), Status::Ok);
        assert_eq!(batch.get_crc(1).unwrap(), 0xE306_9283);
        assert_eq!(batch.get_result(2).unwrap(), 0);
    }
}
