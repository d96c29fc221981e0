// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! C ABI.
//!
//! A job lives in a caller buffer of [`dsa_get_job_size`] bytes. The job is
//! placed at the first suitably aligned address inside that buffer, so the
//! same buffer pointer must be passed to every call. Every function returns
//! a [`Status`] code; pointers are checked for null before use and no panic
//! unwinds into the caller.

use crate::batch::{self, BatchBuffer};
use crate::error::{DsaError, DsaResult};
use crate::flags::JobFlags;
use crate::job::{Job, Path};
use crate::status::Status;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

/// Smallest batch accepted through the C entry points.
pub const C_MIN_BATCH_SIZE: u32 = 4;

fn guarded(f: impl FnOnce() -> DsaResult<Status>) -> u32 {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(status)) => status.as_u32(),
        Ok(Err(e)) => e.status().as_u32(),
        Err(_) => Status::InternalError.as_u32(),
    }
}

fn non_null<T>(ptr: *const T, name: &'static str) -> DsaResult<()> {
    if ptr.is_null() {
        Err(DsaError::NullPointer(name))
    } else {
        Ok(())
    }
}

/// The aligned job inside a caller buffer.
fn placed(buffer: *mut u8) -> DsaResult<*mut Job> {
    non_null(buffer, "job")?;
    let pad = buffer.align_offset(mem::align_of::<Job>());
    if pad >= mem::align_of::<Job>() {
        return Err(DsaError::JobCorrupted);
    }
    Ok(buffer.wrapping_add(pad) as *mut Job)
}

unsafe fn live<'a>(buffer: *mut u8) -> DsaResult<&'a mut Job> {
    Job::live(placed(buffer)?)
}

unsafe fn batch_of<'a>(buffer: *mut u8) -> DsaResult<BatchBuffer<'a>> {
    let job = live(buffer)?;
    BatchBuffer::from_raw(job.record.destination_first_ptr, job.record.destination_length as usize)
}

unsafe fn read_pattern(pattern: *const u8) -> DsaResult<u64> {
    non_null(pattern, "pattern")?;
    Ok(u64::from_le_bytes(ptr::read_unaligned(pattern as *const [u8; 8])))
}

/// Write the buffer size a job on `path` needs to `size_ptr`.
///
/// # Safety
///
/// `size_ptr` must be null or valid for a `u32` write.
#[no_mangle]
pub unsafe extern "C" fn dsa_get_job_size(path: u32, size_ptr: *mut u32) -> u32 {
    guarded(|| {
        non_null(size_ptr, "size")?;
        let path = Path::try_from(path)?;
        *size_ptr = Job::size(path) as u32;
        Ok(Status::Ok)
    })
}

/// Initialize a job on `path` in `job` (a buffer of [`dsa_get_job_size`] bytes).
///
/// The whole buffer is zeroed first.
///
/// # Safety
///
/// `job` must be null or valid for writes of the size reported for `path`.
#[no_mangle]
pub unsafe extern "C" fn dsa_init_job(path: u32, job: *mut u8) -> u32 {
    guarded(|| {
        let path = Path::try_from(path)?;
        let placed = placed(job)?;
        ptr::write_bytes(job, 0, Job::size(path));
        Job::init_in_place(placed, path)?;
        Ok(Status::Ok)
    })
}

/// # Safety
///
/// `job` must be an initialized job buffer whose record names valid buffers.
#[no_mangle]
pub unsafe extern "C" fn dsa_submit_job(job: *mut u8) -> u32 {
    guarded(|| live(job)?.submit())
}

/// # Safety
///
/// Same as [`dsa_submit_job`].
#[no_mangle]
pub unsafe extern "C" fn dsa_execute_job(job: *mut u8) -> u32 {
    guarded(|| live(job)?.execute())
}

/// # Safety
///
/// `job` must be an initialized job buffer.
#[no_mangle]
pub unsafe extern "C" fn dsa_wait_job(job: *mut u8) -> u32 {
    guarded(|| live(job)?.wait())
}

/// # Safety
///
/// `job` must be an initialized job buffer.
#[no_mangle]
pub unsafe extern "C" fn dsa_check_job(job: *mut u8) -> u32 {
    guarded(|| live(job)?.check())
}

/// Release a job. The buffer may be initialized again afterwards.
///
/// # Safety
///
/// `job` must be an initialized job buffer.
#[no_mangle]
pub unsafe extern "C" fn dsa_finalize_job(job: *mut u8) -> u32 {
    guarded(|| {
        Job::finalize_in_place(placed(job)?)?;
        Ok(Status::Ok)
    })
}

/// Write the batch buffer size for `task_count` tasks to `size_ptr`.
///
/// # Safety
///
/// `size_ptr` must be null or valid for a `u32` write.
#[no_mangle]
pub unsafe extern "C" fn dsa_get_batch_size(job: *const u8, task_count: u32, size_ptr: *mut u32) -> u32 {
    guarded(|| {
        non_null(job, "job")?;
        non_null(size_ptr, "size")?;
        if task_count < C_MIN_BATCH_SIZE {
            return Err(DsaError::BatchSize {
                count: task_count as usize,
                min: C_MIN_BATCH_SIZE as usize,
            });
        }
        *size_ptr = batch::size_for(task_count as usize)? as u32;
        Ok(Status::Ok)
    })
}

/// # Safety
///
/// `job` must be an initialized job whose destination is the batch buffer.
#[no_mangle]
pub unsafe extern "C" fn dsa_batch_set_nop_by_index(job: *mut u8, index: u32, flags: u64) -> u32 {
    guarded(|| {
        batch_of(job)?.set_nop(index as usize, JobFlags::from_bits_truncate(flags))?;
        Ok(Status::Ok)
    })
}

/// # Safety
///
/// As [`dsa_batch_set_nop_by_index`]; the buffers must stay valid until
/// the batch completes.
#[no_mangle]
pub unsafe extern "C" fn dsa_batch_set_mem_move_by_index(
    job: *mut u8,
    index: u32,
    source: *const u8,
    destination: *mut u8,
    length: u32,
    flags: u64,
) -> u32 {
    guarded(|| {
        non_null(source, "source")?;
        non_null(destination, "destination")?;
        batch_of(job)?.set_mem_move(index as usize, source, destination, length, JobFlags::from_bits_truncate(flags))?;
        Ok(Status::Ok)
    })
}

/// `pattern` points to 8 pattern bytes.
///
/// # Safety
///
/// As [`dsa_batch_set_mem_move_by_index`].
#[no_mangle]
pub unsafe extern "C" fn dsa_batch_set_fill_by_index(
    job: *mut u8,
    index: u32,
    pattern: *const u8,
    destination: *mut u8,
    length: u32,
    flags: u64,
) -> u32 {
    guarded(|| {
        let pattern = read_pattern(pattern)?;
        non_null(destination, "destination")?;
        batch_of(job)?.set_fill(index as usize, pattern, destination, length, JobFlags::from_bits_truncate(flags))?;
        Ok(Status::Ok)
    })
}

/// # Safety
///
/// As [`dsa_batch_set_mem_move_by_index`].
#[no_mangle]
pub unsafe extern "C" fn dsa_batch_set_compare_by_index(
    job: *mut u8,
    index: u32,
    source_first: *const u8,
    source_second: *const u8,
    length: u32,
    expected_result: u8,
    flags: u64,
) -> u32 {
    guarded(|| {
        non_null(source_first, "source_first")?;
        non_null(source_second, "source_second")?;
        batch_of(job)?.set_compare(
            index as usize,
            source_first,
            source_second,
            length,
            expected_result,
            JobFlags::from_bits_truncate(flags),
        )?;
        Ok(Status::Ok)
    })
}

/// The seed is read through `crc_seed` when `flags` has `CRC_READ_SEED`.
///
/// # Safety
///
/// As [`dsa_batch_set_mem_move_by_index`]; `crc_seed` must be readable.
#[no_mangle]
pub unsafe extern "C" fn dsa_batch_set_crc_by_index(
    job: *mut u8,
    index: u32,
    source: *const u8,
    length: u32,
    crc_seed: *const u32,
    flags: u64,
) -> u32 {
    guarded(|| {
        non_null(source, "source")?;
        non_null(crc_seed, "crc_seed")?;
        let flags = JobFlags::from_bits_truncate(flags);
        let seed = if flags.contains(JobFlags::CRC_READ_SEED) {
            ptr::read_unaligned(crc_seed)
        } else {
            0
        };
        batch_of(job)?.set_crc(index as usize, source, length, seed, flags)?;
        Ok(Status::Ok)
    })
}

/// Write the status of batch task `index` to `status_ptr`.
///
/// # Safety
///
/// As [`dsa_batch_set_nop_by_index`]; `status_ptr` must be writable.
#[no_mangle]
pub unsafe extern "C" fn dsa_batch_get_status(job: *mut u8, index: u32, status_ptr: *mut u32) -> u32 {
    guarded(|| {
        non_null(status_ptr, "status")?;
        *status_ptr = batch_of(job)?.get_status(index as usize)?.as_u32();
        Ok(Status::Ok)
    })
}

/// Write the result byte of batch task `index` to `result_ptr`.
///
/// # Safety
///
/// As [`dsa_batch_get_status`].
#[no_mangle]
pub unsafe extern "C" fn dsa_batch_get_result(job: *mut u8, index: u32, result_ptr: *mut u8) -> u32 {
    guarded(|| {
        non_null(result_ptr, "result")?;
        *result_ptr = batch_of(job)?.get_result(index as usize)?;
        Ok(Status::Ok)
    })
}

/// Write the CRC of batch task `index` to `crc_ptr`.
///
/// # Safety
///
/// As [`dsa_batch_get_status`].
#[no_mangle]
pub unsafe extern "C" fn dsa_batch_get_crc(job: *mut u8, index: u32, crc_ptr: *mut u32) -> u32 {
    guarded(|| {
        non_null(crc_ptr, "crc")?;
        *crc_ptr = batch_of(job)?.get_crc(index as usize)?;
        Ok(Status::Ok)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::CrcFlags;
    use crate::opcode::Operation;

    const SOFTWARE: u32 = Path::Software as u32;
    const AUTO: u32 = Path::Auto as u32;

    fn job_buffer(path: u32) -> Vec<u64> {
        let mut size = 0u32;
        assert_eq!(unsafe { dsa_get_job_size(path, &mut size) }, Status::Ok.as_u32());
        vec![0u64; (size as usize).div_ceil(8)]
    }

    #[test]
    fn test_job_size_is_stable() {
        let (mut a, mut b) = (0u32, 0u32);
        unsafe {
            dsa_get_job_size(SOFTWARE, &mut a);
            dsa_get_job_size(SOFTWARE, &mut b);
        }
        assert_eq!(a, b);
        assert!(a as usize >= mem::size_of::<Job>());
        assert_eq!(unsafe { dsa_get_job_size(9, &mut a) }, Status::PathError.as_u32());
        assert_eq!(
            unsafe { dsa_get_job_size(SOFTWARE, ptr::null_mut()) },
            Status::NullPointerError.as_u32()
        );
    }

    #[test]
    fn test_null_pointers() {
        unsafe {
            assert_eq!(dsa_init_job(SOFTWARE, ptr::null_mut()), Status::NullPointerError.as_u32());
            assert_eq!(dsa_submit_job(ptr::null_mut()), Status::NullPointerError.as_u32());
            assert_eq!(dsa_check_job(ptr::null_mut()), Status::NullPointerError.as_u32());
            assert_eq!(dsa_finalize_job(ptr::null_mut()), Status::NullPointerError.as_u32());
            assert_eq!(
                dsa_batch_get_status(ptr::null_mut(), 0, ptr::null_mut()),
                Status::NullPointerError.as_u32()
            );
        }
    }

    #[test]
    fn test_uninitialized_buffer_is_corrupted() {
        let mut buffer = job_buffer(SOFTWARE);
        let job = buffer.as_mut_ptr() as *mut u8;
        assert_eq!(unsafe { dsa_submit_job(job) }, Status::JobCorrupted.as_u32());
    }

    #[test]
    fn test_misaligned_buffer_is_placed() {
        let mut size = 0u32;
        unsafe { dsa_get_job_size(SOFTWARE, &mut size) };
        let mut buffer = vec![0u8; size as usize + 1];
        let job = unsafe { buffer.as_mut_ptr().add(1) };
        unsafe {
            assert_eq!(dsa_init_job(SOFTWARE, job), Status::Ok.as_u32());
            assert_eq!(dsa_finalize_job(job), Status::Ok.as_u32());
        }
    }

    #[test]
    fn test_init_zeroes_whole_buffer() {
        let mut size = 0u32;
        unsafe { dsa_get_job_size(AUTO, &mut size) };
        let size = size as usize;
        let mut buffer = vec![0xFFu8; size + 1];
        let job = unsafe { buffer.as_mut_ptr().add(1) };
        assert_eq!(unsafe { dsa_init_job(AUTO, job) }, Status::Ok.as_u32());

        let start = job.align_offset(mem::align_of::<Job>());
        let end = start + mem::size_of::<Job>();
        let area = &buffer[1..=size];
        assert!(area[..start].iter().all(|&b| b == 0));
        assert!(area[end..].iter().all(|&b| b == 0));
        assert_eq!(unsafe { dsa_finalize_job(job) }, Status::Ok.as_u32());
    }

    #[test]
    fn test_fill_through_c_abi() {
        let mut buffer = job_buffer(SOFTWARE);
        let job = buffer.as_mut_ptr() as *mut u8;
        let mut dst = [0u8; 32];
        unsafe {
            assert_eq!(dsa_init_job(SOFTWARE, job), Status::Ok.as_u32());
            let record = &mut live(job).unwrap().record;
            record.set_operation(Operation::Fill);
            record.pattern = [0xAB; 8];
            record.destination_first_ptr = dst.as_mut_ptr();
            record.destination_length = 32;
            assert_eq!(dsa_execute_job(job), Status::Ok.as_u32());
            assert_eq!(dsa_check_job(job), Status::Ok.as_u32());
            assert_eq!(dsa_finalize_job(job), Status::Ok.as_u32());
            assert_eq!(dsa_check_job(job), Status::JobCorrupted.as_u32());
        }
        assert_eq!(dst, [0xAB; 32]);
    }

    #[test]
    fn test_batch_through_c_abi() {
        let mut buffer = job_buffer(SOFTWARE);
        let job = buffer.as_mut_ptr() as *mut u8;
        let mut size = 0u32;
        unsafe {
            assert_eq!(dsa_get_batch_size(job, 3, &mut size), Status::BatchSizeError.as_u32());
            assert_eq!(dsa_get_batch_size(job, 4, &mut size), Status::Ok.as_u32());
        }
        assert_eq!(size as usize, 4 * batch::TASK_SIZE + batch::ALIGNMENT_PAD);

        let mut batch = vec![0u8; size as usize];
        let src = [5u8; 16];
        let mut dst = [0u8; 16];
        let pattern = [1u8; 8];
        let mut filled = [0u8; 16];
        let seed = 0u32;
        unsafe {
            dsa_init_job(SOFTWARE, job);
            let record = &mut live(job).unwrap().record;
            record.set_operation(Operation::Batch);
            record.destination_first_ptr = batch.as_mut_ptr();
            record.destination_length = size;

            let ok = Status::Ok.as_u32();
            assert_eq!(dsa_batch_set_mem_move_by_index(job, 0, src.as_ptr(), dst.as_mut_ptr(), 16, 0), ok);
            assert_eq!(dsa_batch_set_fill_by_index(job, 1, pattern.as_ptr(), filled.as_mut_ptr(), 16, 0), ok);
            assert_eq!(dsa_batch_set_compare_by_index(job, 2, src.as_ptr(), dst.as_ptr(), 16, 0, 0), ok);
            assert_eq!(dsa_batch_set_crc_by_index(job, 3, src.as_ptr(), 16, &seed, 0), ok);
            assert_eq!(
                dsa_batch_set_nop_by_index(job, 4, 0),
                Status::BatchTaskIndexOverflow.as_u32()
            );

            assert_eq!(dsa_execute_job(job), ok);
            let mut status = u32::MAX;
            let mut result = u8::MAX;
            let mut crc = 0u32;
            assert_eq!(dsa_batch_get_status(job, 2, &mut status), ok);
            assert_eq!(dsa_batch_get_result(job, 2, &mut result), ok);
            assert_eq!(dsa_batch_get_crc(job, 3, &mut crc), ok);
            assert_eq!(status, ok);
            assert_eq!(result, 0);
            assert_eq!(crc, crate::crc::dsa_crc32(&src, 0, CrcFlags::empty()));
            dsa_finalize_job(job);
        }
        assert_eq!(dst, src);
        assert_eq!(filled, [1u8; 16]);
    }
}
