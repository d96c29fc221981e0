// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Software executor.
//!
//! [`run`] interprets a [`HwDescriptor`] exactly as the device would and
//! returns the completion record the device would have written. The
//! software path, the batch coordinator and [`SimulatedPortal`] all go
//! through here, so a descriptor means the same thing on every path.
//!
//! [`SimulatedPortal`]: crate::submit::SimulatedPortal

use crate::crc::dsa_crc32;
use crate::delta::{self, ApplyError};
use crate::descriptor::{
    publish_completion, CompletionRecord, DescriptorFlags, DifTags, ExecutionStatus, HwDescriptor,
    RawDescriptor,
};
use crate::dif::{self, DifBlockSize, DifParams, DIF_SIZE};
use crate::flags::{CrcFlags, DifFlags};
use crate::opcode::Operation;
use std::slice;

/// Cache line size used by cache flush.
const CACHE_LINE: usize = 64;

/// Result byte of compare and compare-pattern.
const EQUAL: u8 = 0;
const NOT_EQUAL: u8 = 1;

// ============================================================================
// Slice kernels
// ============================================================================

/// Offset of the first differing byte of `a` and `b`, `None` if equal.
pub fn compare(a: &[u8], b: &[u8]) -> Option<usize> {
    a.iter().zip(b).position(|(x, y)| x != y)
}

/// Compare `src` with a repeated little-endian 8-byte `pattern`.
///
/// A mismatch inside a whole quadword reports the offset of that quadword;
/// inside the trailing partial quadword it reports the byte offset.
pub fn compare_pattern(src: &[u8], pattern: u64) -> Option<usize> {
    let bytes = pattern.to_le_bytes();
    let mut chunks = src.chunks_exact(8);
    if let Some(index) = chunks.by_ref().position(|chunk| chunk != &bytes[..]) {
        return Some(index * 8);
    }
    let tail = chunks.remainder();
    let start = src.len() - tail.len();
    tail.iter()
        .zip(bytes)
        .position(|(x, y)| *x != y)
        .map(|i| start + i)
}

/// Fill `dst` with a repeated little-endian 8-byte `pattern`.
pub fn fill(dst: &mut [u8], pattern: u64) {
    let bytes = pattern.to_le_bytes();
    let mut chunks = dst.chunks_exact_mut(8);
    for chunk in chunks.by_ref() {
        chunk.copy_from_slice(&bytes);
    }
    let tail = chunks.into_remainder();
    let n = tail.len();
    tail.copy_from_slice(&bytes[..n]);
}

/// Flush every cache line covering `[addr, addr + len)`.
#[cfg(target_arch = "x86_64")]
unsafe fn flush_lines(addr: u64, len: usize) {
    use core::arch::x86_64::{_mm_clflush, _mm_sfence};
    let start = addr & !(CACHE_LINE as u64 - 1);
    let end = addr + len as u64;
    let mut line = start;
    while line < end {
        _mm_clflush(line as *const u8);
        line += CACHE_LINE as u64;
    }
    _mm_sfence();
}

#[cfg(not(target_arch = "x86_64"))]
unsafe fn flush_lines(_addr: u64, _len: usize) {
    std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
}

// ============================================================================
// Descriptor interpreter
// ============================================================================

fn predicate(desc: &HwDescriptor, matched: bool) -> ExecutionStatus {
    if desc.flags.contains(DescriptorFlags::CHECK_RESULT) && !matched {
        ExecutionStatus::FalsePredicate
    } else {
        ExecutionStatus::Success
    }
}

fn dif_params(desc: &HwDescriptor) -> DifParams {
    DifParams {
        flags: DifFlags::from_descriptor(desc.src_dif_flags(), desc.dst_dif_flags(), desc.dif_flags()),
        block_size: DifBlockSize::from_code(desc.dif_flags()),
        src: DifTags {
            ref_tag: desc.src_ref_tag(),
            app_tag_mask: desc.src_app_tag_mask(),
            app_tag: desc.src_app_tag(),
        },
        dst: DifTags {
            ref_tag: desc.dst_ref_tag(),
            app_tag_mask: desc.dst_app_tag_mask(),
            app_tag: desc.dst_app_tag(),
        },
    }
}

fn dif_failure(err: dif::DifError) -> CompletionRecord {
    let mut record = CompletionRecord::with_status(ExecutionStatus::DifControlError);
    record.result = err.result.bits();
    record.bytes_completed = err.offset as u32;
    record
}

/// Execute `desc` in software and return its completion record.
///
/// Nothing is written to `desc.completion_addr`; see [`execute`].
///
/// # Safety
///
/// Every address the descriptor names must be valid for the access the
/// operation performs over `xfer_size` bytes (or the derived size for DIF,
/// delta and batch operations). The descriptor should have passed
/// [`validate`](crate::validation::validate).
pub unsafe fn run(desc: &HwDescriptor) -> CompletionRecord {
    let Some(op) = desc.operation() else {
        return CompletionRecord::with_status(ExecutionStatus::OperationError);
    };
    let len = desc.xfer_size as usize;

    match op {
        Operation::Nop | Operation::Drain => CompletionRecord::with_status(ExecutionStatus::Success),

        Operation::Batch => run_batch(desc.src as *const RawDescriptor, len),

        Operation::MemMove => {
            std::ptr::copy(desc.src as *const u8, desc.dst as *mut u8, len);
            CompletionRecord::with_status(ExecutionStatus::Success)
        }

        Operation::Fill => {
            fill(slice::from_raw_parts_mut(desc.dst as *mut u8, len), desc.src);
            CompletionRecord::with_status(ExecutionStatus::Success)
        }

        Operation::Compare | Operation::ComparePattern => {
            let src = slice::from_raw_parts(desc.src as *const u8, len);
            let mismatch = if op == Operation::Compare {
                compare(src, slice::from_raw_parts(desc.dst as *const u8, len))
            } else {
                compare_pattern(src, desc.dst)
            };
            let result = if mismatch.is_some() { NOT_EQUAL } else { EQUAL };
            let mut record =
                CompletionRecord::with_status(predicate(desc, result == desc.expected_result()));
            record.result = result;
            record.bytes_completed = mismatch.unwrap_or(0) as u32;
            record
        }

        Operation::CreateDelta => {
            let reference = slice::from_raw_parts(desc.src as *const u8, len);
            let target = slice::from_raw_parts(desc.dst as *const u8, len);
            let out = slice::from_raw_parts_mut(
                desc.delta_record_addr() as *mut u8,
                desc.max_delta_record_size() as usize,
            );
            let (result, size) = delta::create(reference, target, out);
            let bit = 1u8 << result.as_u8();
            let mut record =
                CompletionRecord::with_status(predicate(desc, desc.expected_result() & bit != 0));
            record.result = result.as_u8();
            record.set_delta_record_size(size as u32);
            record
        }

        Operation::ApplyDelta => {
            let notes = slice::from_raw_parts(desc.src as *const u8, desc.delta_record_size() as usize);
            let target = slice::from_raw_parts_mut(desc.dst as *mut u8, len);
            match delta::apply(notes, target) {
                Ok(()) => CompletionRecord::with_status(ExecutionStatus::Success),
                Err(err) => {
                    let status = match err {
                        ApplyError::OutOfOrder(_) => ExecutionStatus::OffsetOrderError,
                        ApplyError::OutOfRange(_) => ExecutionStatus::OffsetOverflow,
                    };
                    let mut record = CompletionRecord::with_status(status);
                    record.bytes_completed = err.record_offset() as u32;
                    record
                }
            }
        }

        Operation::Dualcast => {
            let src = desc.src as *const u8;
            std::ptr::copy_nonoverlapping(src, desc.dst as *mut u8, len);
            std::ptr::copy_nonoverlapping(src, desc.dst2() as *mut u8, len);
            CompletionRecord::with_status(ExecutionStatus::Success)
        }

        Operation::Crc | Operation::CopyCrc => {
            let src = slice::from_raw_parts(desc.src as *const u8, len);
            if op == Operation::CopyCrc {
                std::ptr::copy_nonoverlapping(src.as_ptr(), desc.dst as *mut u8, len);
            }
            let seed = match desc.crc_seed_addr() {
                0 => desc.crc_seed(),
                addr => std::ptr::read_unaligned(addr as *const u32),
            };
            let crc = dsa_crc32(src, seed, CrcFlags::from_bits_truncate(desc.op_flags));
            let mut record = CompletionRecord::with_status(ExecutionStatus::Success);
            record.set_crc_value(crc);
            record
        }

        Operation::DifCheck | Operation::DifInsert | Operation::DifStrip | Operation::DifUpdate => {
            run_dif(op, desc)
        }

        Operation::CacheFlush => {
            flush_lines(desc.dst, len);
            CompletionRecord::with_status(ExecutionStatus::Success)
        }
    }
}

unsafe fn run_dif(op: Operation, desc: &HwDescriptor) -> CompletionRecord {
    let params = dif_params(desc);
    let len = desc.xfer_size as usize;
    let src = slice::from_raw_parts(desc.src as *const u8, len);
    let mut record = CompletionRecord::with_status(ExecutionStatus::Success);

    match op {
        Operation::DifCheck => match dif::check(src, &params) {
            Ok(tags) => record.set_src_tags(tags),
            Err(err) => return dif_failure(err),
        },
        Operation::DifInsert => {
            let blocks = len / params.block_size.bytes();
            let dst = slice::from_raw_parts_mut(desc.dst as *mut u8, len + blocks * DIF_SIZE);
            record.set_dst_tags(dif::insert(src, dst, &params));
        }
        Operation::DifStrip => {
            let blocks = len / params.block_size.protected();
            let dst = slice::from_raw_parts_mut(desc.dst as *mut u8, len - blocks * DIF_SIZE);
            match dif::strip(src, dst, &params) {
                Ok(tags) => record.set_src_tags(tags),
                Err(err) => return dif_failure(err),
            }
        }
        _ => {
            let dst = slice::from_raw_parts_mut(desc.dst as *mut u8, len);
            match dif::update(src, dst, &params) {
                Ok((src_tags, dst_tags)) => {
                    record.set_src_tags(src_tags);
                    record.set_dst_tags(dst_tags);
                }
                Err(err) => return dif_failure(err),
            }
        }
    }
    record
}

/// Run the sub-descriptors of a batch in order.
///
/// Stops at the first sub-descriptor that does not complete with success;
/// its effects and those of its predecessors stay in place.
unsafe fn run_batch(list: *const RawDescriptor, count: usize) -> CompletionRecord {
    let mut completed = 0usize;

    while completed < count {
        let sub = HwDescriptor::from(&*list.add(completed));
        let batchable = sub.operation().is_some_and(Operation::is_batchable);
        if !batchable {
            break;
        }
        let record = execute(&sub);
        if !record.execution_status().is_success() {
            break;
        }
        completed += 1;
    }

    let status = if completed == count {
        ExecutionStatus::Success
    } else {
        ExecutionStatus::BatchError
    };
    let mut record = CompletionRecord::with_status(status);
    record.bytes_completed = completed as u32;
    record
}

/// Execute `desc` and publish the record at its completion address, if any.
///
/// The status byte is written last, so a poller that observes a non-zero
/// status sees the whole record.
///
/// # Safety
///
/// Same as [`run`]; in addition `completion_addr`, when non-zero, must
/// point to a writable 32-byte record.
pub unsafe fn execute(desc: &HwDescriptor) -> CompletionRecord {
    let record = run(desc);
    if desc.completion_addr != 0 {
        publish_completion(desc.completion_addr, &record);
    }
    record
}
