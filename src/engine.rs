// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! High-level engine API over slices.

use crate::dispatcher::Dispatcher;
use crate::error::{DsaError, DsaResult};
use crate::flags::JobFlags;
use crate::job::{Job, JobRecord, Path};
use crate::opcode::Operation;
use crate::registry::Registry;
use crate::status::Status;
use std::sync::Arc;

/// Safe slice operations on top of [`Job`].
///
/// # Example
///
/// ```rust
/// use dsa_offload::{DsaEngine, DsaError, Path};
///
/// fn main() -> Result<(), DsaError> {
///     let engine = DsaEngine::new(Path::Software);
///
///     let crc = engine.crc32(b"123456789")?;
///     assert_eq!(crc, 0xE306_9283);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DsaEngine {
    path: Path,
    dispatcher: Arc<Dispatcher>,
}

impl DsaEngine {
    /// Engine on the hardware path of the process-wide registry.
    ///
    /// # Errors
    ///
    /// Returns [`DsaError::HardwareUnavailable`] when discovery found no
    /// usable work queue.
    pub fn open_first() -> DsaResult<Self> {
        let registry = Registry::global();
        if let Some(status) = registry.unavailable_status() {
            return Err(DsaError::HardwareUnavailable(status));
        }
        log::info!(
            "DSA engine: {} device(s), {} work queue(s)",
            registry.devices().len(),
            registry.queue_count()
        );
        Ok(Self {
            path: Path::Hardware,
            dispatcher: Dispatcher::global(),
        })
    }

    /// Engine on `path` using the process-wide dispatcher.
    pub fn new(path: Path) -> Self {
        Self::with_dispatcher(path, Dispatcher::global())
    }

    pub fn with_dispatcher(path: Path, dispatcher: Arc<Dispatcher>) -> Self {
        Self { path, dispatcher }
    }

    pub fn path(&self) -> Path {
        self.path
    }

    /// Run one job described by `record` to completion.
    fn run(&self, record: JobRecord) -> DsaResult<JobRecord> {
        let mut job = Job::with_dispatcher(self.path, self.dispatcher.clone());
        job.record = record;
        // SAFETY: every record built below points into slices borrowed for
        // the duration of this call, and `execute` waits for completion.
        let status = unsafe { job.execute()? };
        match status {
            Status::Ok | Status::FalsePredicateOk => Ok(job.record),
            status => Err(DsaError::OperationFailed {
                status,
                result: job.record.result,
            }),
        }
    }

    /// CRC-32C of `data`, as computed by the accelerator.
    pub fn crc32(&self, data: &[u8]) -> DsaResult<u32> {
        self.crc32_with_seed(data, 0)
    }

    /// CRC-32C of `data` continuing from `seed`.
    ///
    /// `crc32_with_seed(b, crc32(a))` equals `crc32(a ++ b)`.
    pub fn crc32_with_seed(&self, data: &[u8], seed: u32) -> DsaResult<u32> {
        let mut crc = seed;
        let mut record = JobRecord {
            source_first_ptr: data.as_ptr() as *mut u8,
            source_length: length(data.len())?,
            crc_checksum_ptr: &mut crc,
            flags: JobFlags::CRC_READ_SEED,
            ..JobRecord::default()
        };
        record.set_operation(Operation::Crc);
        self.run(record)?;
        Ok(crc)
    }

    /// Copy `src` into the front of `dst`.
    ///
    /// # Errors
    ///
    /// Returns an error if `dst` is smaller than `src` or the operation fails.
    pub fn memcpy(&self, dst: &mut [u8], src: &[u8]) -> DsaResult<()> {
        if dst.len() < src.len() {
            return Err(DsaError::BufferSizeMismatch {
                expected: src.len(),
                actual: dst.len(),
            });
        }
        let mut record = JobRecord {
            source_first_ptr: src.as_ptr() as *mut u8,
            destination_first_ptr: dst.as_mut_ptr(),
            source_length: length(src.len())?,
            ..JobRecord::default()
        };
        record.set_operation(Operation::MemMove);
        self.run(record).map(drop)
    }

    /// Fill `dst` with the little-endian bytes of `pattern`, repeated.
    pub fn memset(&self, dst: &mut [u8], pattern: u64) -> DsaResult<()> {
        let mut record = JobRecord {
            destination_first_ptr: dst.as_mut_ptr(),
            destination_length: length(dst.len())?,
            pattern: pattern.to_le_bytes(),
            ..JobRecord::default()
        };
        record.set_operation(Operation::Fill);
        self.run(record).map(drop)
    }

    /// `Ok(true)` if `a` and `b` hold the same bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the lengths differ or the operation fails.
    pub fn memcmp(&self, a: &[u8], b: &[u8]) -> DsaResult<bool> {
        if a.len() != b.len() {
            return Err(DsaError::BufferSizeMismatch {
                expected: a.len(),
                actual: b.len(),
            });
        }
        let mut record = JobRecord {
            source_first_ptr: a.as_ptr() as *mut u8,
            source_second_ptr: b.as_ptr() as *mut u8,
            source_length: length(a.len())?,
            ..JobRecord::default()
        };
        record.set_operation(Operation::Compare);
        Ok(self.run(record)?.result == 0)
    }

    /// Execute a no-op, measuring submission overhead.
    pub fn noop(&self) -> DsaResult<()> {
        self.run(JobRecord::default()).map(drop)
    }
}

fn length(len: usize) -> DsaResult<u32> {
    u32::try_from(len).map_err(|_| DsaError::BufferSizeMismatch {
        expected: u32::MAX as usize,
        actual: len,
    })
}
