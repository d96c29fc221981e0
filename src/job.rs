// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Job lifecycle.
//!
//! A [`Job`] is a public [`JobRecord`] that the caller fills, plus private
//! state that tracks one submission at a time:
//!
//! ```text
//! Initialized -> Submitted -> Completed -> (resubmit) ...
//!                         \-> BeingProcessed (hardware, until check/wait)
//! ```
//!
//! The record is turned into a descriptor, validated, and then either run
//! by the software kernels or handed to the [`Dispatcher`]. Results are
//! decoded back into the record in both cases, so a caller cannot tell the
//! paths apart by looking at the record.
//!
//! # Example
//!
//! ```
//! use dsa_offload::{Job, Operation, Path, Status};
//!
//! let src = [7u8; 64];
//! let mut dst = [0u8; 64];
//!
//! let mut job = Job::new(Path::Software);
//! job.record.operation = Operation::MemMove.as_u8();
//! job.record.source_first_ptr = src.as_ptr() as *mut u8;
//! job.record.destination_first_ptr = dst.as_mut_ptr();
//! job.record.source_length = 64;
//!
//! let status = unsafe { job.execute() }?;
//! assert_eq!(status, Status::Ok);
//! assert_eq!(dst, src);
//! # Ok::<(), dsa_offload::DsaError>(())
//! ```

use crate::batch::BatchBuffer;
use crate::descriptor::{
    CompletionRecord, DescriptorFlags, DifTags, ExecutionStatus, HwDescriptor, RawCompletionRecord,
    RawDescriptor,
};
use crate::dif::DifBlockSize;
use crate::dispatcher::{Dispatcher, SubmitStatus};
use crate::error::{DsaError, DsaResult};
use crate::flags::{DifFlags, JobFlags};
use crate::kernels;
use crate::numa::NUMA_ANY;
use crate::opcode::Operation;
use crate::status::Status;
use crate::validation::{validate, ValidationError};
use std::mem;
use std::ptr;
use std::sync::Arc;

/// Marks a live, initialized job.
const JOB_GUARD: u64 = 0x4453_415f_4a4f_4221;

/// Written over the guard when a job is finalized in place.
const JOB_FINALIZED: u64 = 0x4453_415f_4445_4144;

/// Where a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum Path {
    /// Hardware when a queue accepts the job, software otherwise.
    #[default]
    Auto = 0,
    Software = 1,
    Hardware = 2,
}

impl TryFrom<u32> for Path {
    type Error = DsaError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Auto),
            1 => Ok(Self::Software),
            2 => Ok(Self::Hardware),
            other => Err(DsaError::InvalidPath(other)),
        }
    }
}

/// DIF parameters of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct DifConfig {
    /// [`DifFlags`] bits.
    pub flags: u32,
    pub source_reference_tag_seed: u32,
    pub source_application_tag_seed: u16,
    pub source_application_tag_mask: u16,
    pub destination_reference_tag_seed: u32,
    pub destination_application_tag_seed: u16,
    pub destination_application_tag_mask: u16,
    /// [`DifBlockSize`] code.
    pub block_size: u32,
}

impl DifConfig {
    pub fn flags(&self) -> DifFlags {
        DifFlags::from_bits_truncate(self.flags)
    }

    /// Decoded block size; codes above 3 name no block size.
    pub fn block_size(&self) -> Result<DifBlockSize, ValidationError> {
        match u8::try_from(self.block_size) {
            Ok(code @ 0..=3) => Ok(DifBlockSize::from_code(code)),
            _ => Err(ValidationError::UnknownDifBlockSize(self.block_size)),
        }
    }

    pub fn source_tags(&self) -> DifTags {
        DifTags {
            ref_tag: self.source_reference_tag_seed,
            app_tag_mask: self.source_application_tag_mask,
            app_tag: self.source_application_tag_seed,
        }
    }

    pub fn destination_tags(&self) -> DifTags {
        DifTags {
            ref_tag: self.destination_reference_tag_seed,
            app_tag_mask: self.destination_application_tag_mask,
            app_tag: self.destination_application_tag_seed,
        }
    }

    fn set_source_tags(&mut self, tags: DifTags) {
        self.source_reference_tag_seed = tags.ref_tag;
        self.source_application_tag_seed = tags.app_tag;
    }

    fn set_destination_tags(&mut self, tags: DifTags) {
        self.destination_reference_tag_seed = tags.ref_tag;
        self.destination_application_tag_seed = tags.app_tag;
    }

    /// DIF descriptor for `op` with these parameters.
    pub fn descriptor(&self, op: Operation, src: *const u8, dst: *mut u8, len: u32) -> DsaResult<HwDescriptor> {
        Ok(HwDescriptor::dif(
            op,
            src,
            dst,
            len,
            self.flags(),
            self.block_size()?.code(),
            self.source_tags(),
            self.destination_tags(),
        ))
    }
}

/// Caller-visible part of a job.
///
/// `operation` decides which fields are read. Outputs (`result`, `offset`,
/// `*crc_checksum_ptr`, `destination_length` for create-delta and the DIF
/// tag seeds) are written when the job completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct JobRecord {
    pub source_first_ptr: *mut u8,
    pub source_second_ptr: *mut u8,
    pub destination_first_ptr: *mut u8,
    pub destination_second_ptr: *mut u8,
    /// CRC seed (with `CRC_READ_SEED`) and CRC result.
    pub crc_checksum_ptr: *mut u32,
    pub source_length: u32,
    pub destination_length: u32,
    /// Mismatch offset for compare and DIF; completed tasks for a batch.
    pub offset: u32,
    /// Fill and compare-pattern pattern, little-endian.
    pub pattern: [u8; 8],
    /// Raw [`Operation`] code.
    pub operation: u8,
    pub result: u8,
    pub expected_result: u8,
    pub flags: JobFlags,
    pub dif_config: DifConfig,
    /// Preferred NUMA node, [`NUMA_ANY`] for the submitting thread's node.
    pub numa_id: u32,
}

impl Default for JobRecord {
    fn default() -> Self {
        Self {
            source_first_ptr: ptr::null_mut(),
            source_second_ptr: ptr::null_mut(),
            destination_first_ptr: ptr::null_mut(),
            destination_second_ptr: ptr::null_mut(),
            crc_checksum_ptr: ptr::null_mut(),
            source_length: 0,
            destination_length: 0,
            offset: 0,
            pattern: [0; 8],
            operation: Operation::Nop.as_u8(),
            result: 0,
            expected_result: 0,
            flags: JobFlags::empty(),
            dif_config: DifConfig::default(),
            numa_id: NUMA_ANY,
        }
    }
}

impl JobRecord {
    pub fn set_operation(&mut self, op: Operation) {
        self.operation = op.as_u8();
    }

    /// Pattern as the 64-bit value the device uses.
    pub fn pattern_u64(&self) -> u64 {
        u64::from_le_bytes(self.pattern)
    }
}

/// Hardware scratch: the submitted descriptor and the record the device writes.
#[derive(Debug, Default)]
#[repr(C, align(64))]
struct HwScratch {
    descriptor: RawDescriptor,
    record: RawCompletionRecord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initialized,
    /// A hardware descriptor is in flight.
    Submitted,
    Completed,
}

struct JobState {
    guard: u64,
    path: Path,
    phase: Phase,
    dispatcher: Option<Arc<Dispatcher>>,
    scratch: Option<Box<HwScratch>>,
    outcome: Option<Status>,
}

impl JobState {
    fn new(path: Path, dispatcher: Option<Arc<Dispatcher>>) -> Self {
        let scratch = (path != Path::Software).then(|| Box::new(HwScratch::default()));
        Self {
            guard: JOB_GUARD,
            path,
            phase: Phase::Initialized,
            dispatcher,
            scratch,
            outcome: None,
        }
    }
}

impl Drop for JobState {
    fn drop(&mut self) {
        // The device may still write the record; keep it alive until it has.
        if self.phase == Phase::Submitted {
            if let Some(scratch) = &self.scratch {
                while !scratch.record.is_complete() {
                    std::hint::spin_loop();
                }
            }
        }
    }
}

/// One reusable unit of work.
#[repr(C)]
pub struct Job {
    pub record: JobRecord,
    state: JobState,
}

impl Job {
    /// Bytes a caller must provide for a job on `path`.
    ///
    /// Stable for a given path. Covers the job itself, one alignment pad,
    /// and the hardware scratch for paths that may use hardware.
    pub const fn size(path: Path) -> usize {
        let scratch = match path {
            Path::Software => 0,
            Path::Auto | Path::Hardware => mem::size_of::<HwScratch>(),
        };
        mem::size_of::<Job>() + mem::align_of::<Job>() + scratch
    }

    /// A job on `path` that submits through [`Dispatcher::global`].
    ///
    /// The global registry is discovered on the first hardware submission,
    /// not here.
    pub fn new(path: Path) -> Self {
        Self {
            record: JobRecord::default(),
            state: JobState::new(path, None),
        }
    }

    /// A job on `path` that submits through `dispatcher`.
    pub fn with_dispatcher(path: Path, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            record: JobRecord::default(),
            state: JobState::new(path, Some(dispatcher)),
        }
    }

    /// Initialize a job in caller memory.
    ///
    /// # Safety
    ///
    /// `job` must be valid for writes of `size_of::<Job>()` bytes and
    /// aligned for `Job`. Any job previously stored there is overwritten
    /// without being dropped.
    pub unsafe fn init_in_place(job: *mut Job, path: Path) -> DsaResult<()> {
        if job.is_null() {
            return Err(DsaError::NullPointer("job"));
        }
        ptr::write(job, Job::new(path));
        Ok(())
    }

    /// Finalize a job in caller memory and mark the memory as dead.
    ///
    /// # Safety
    ///
    /// `job` must point to a job initialized with
    /// [`init_in_place`](Self::init_in_place) and not yet finalized.
    pub unsafe fn finalize_in_place(job: *mut Job) -> DsaResult<()> {
        Self::live(job)?;
        ptr::drop_in_place(job);
        ptr::addr_of_mut!((*job).state.guard).write(JOB_FINALIZED);
        Ok(())
    }

    /// Borrow a job from caller memory, checking its guard.
    ///
    /// # Safety
    ///
    /// `job` must be null or valid for reads of `size_of::<Job>()` bytes
    /// and aligned for `Job`.
    pub unsafe fn live<'a>(job: *mut Job) -> DsaResult<&'a mut Job> {
        if job.is_null() {
            return Err(DsaError::NullPointer("job"));
        }
        if ptr::addr_of!((*job).state.guard).read() != JOB_GUARD {
            return Err(DsaError::JobCorrupted);
        }
        Ok(&mut *job)
    }

    pub fn path(&self) -> Path {
        self.state.path
    }

    /// Release the job.
    ///
    /// Waits for an in-flight hardware descriptor to finish first.
    pub fn finalize(self) {}

    fn dispatcher(&mut self) -> Arc<Dispatcher> {
        self.state.dispatcher.get_or_insert_with(Dispatcher::global).clone()
    }

    /// Submit the job.
    ///
    /// Returns the terminal status of a job that ran in software and
    /// `BeingProcessed` for a job accepted by hardware.
    ///
    /// # Errors
    ///
    /// Invalid parameters are reported before anything runs. On the
    /// hardware path a busy or missing accelerator is an error; on the
    /// auto path it sends the job to software instead.
    ///
    /// # Safety
    ///
    /// Every buffer the record names must be valid for the operation and
    /// stay valid until the job completes. The job itself must not move
    /// while a hardware submission is in flight.
    pub unsafe fn submit(&mut self) -> DsaResult<Status> {
        if self.state.guard != JOB_GUARD {
            return Err(DsaError::JobCorrupted);
        }
        if self.state.phase == Phase::Submitted {
            self.wait()?;
        }
        self.state.outcome = None;

        let desc = describe(&self.record)?;
        match self.state.path {
            Path::Software => Ok(self.run_software(&desc)),
            Path::Hardware => self.submit_hardware(desc),
            Path::Auto => match self.submit_hardware(desc) {
                Err(DsaError::QueueFull | DsaError::HardwareUnavailable(_)) => {
                    log::trace!("opcode {:#04x} falls back to software", desc.opcode);
                    Ok(self.run_software(&desc))
                }
                other => other,
            },
        }
    }

    unsafe fn run_software(&mut self, desc: &HwDescriptor) -> Status {
        let record = kernels::run(desc);
        self.complete(desc, &record)
    }

    unsafe fn submit_hardware(&mut self, mut desc: HwDescriptor) -> DsaResult<Status> {
        let dispatcher = self.dispatcher();
        let scratch = self.state.scratch.as_mut().ok_or(DsaError::JobCorrupted)?;
        scratch.record.clear();
        desc.set_completion_addr(scratch.record.addr());

        match dispatcher.submit(&mut desc, self.record.numa_id) {
            SubmitStatus::Success => {
                scratch.descriptor = RawDescriptor::from(&desc);
                self.state.phase = Phase::Submitted;
                Ok(Status::BeingProcessed)
            }
            SubmitStatus::QueueBusy => Err(DsaError::QueueFull),
            SubmitStatus::Unavailable(status) => Err(DsaError::HardwareUnavailable(status)),
        }
    }

    /// Poll the job once.
    ///
    /// Returns `BeingProcessed` while hardware is still working. Once the
    /// job is done its results are decoded into the record and the same
    /// terminal status is returned by every later call.
    ///
    /// # Errors
    ///
    /// `NotSubmitted` when nothing was submitted since initialization.
    ///
    /// # Safety
    ///
    /// Same as [`submit`](Self::submit): results are written through the
    /// record's pointers.
    pub unsafe fn check(&mut self) -> DsaResult<Status> {
        if self.state.guard != JOB_GUARD {
            return Err(DsaError::JobCorrupted);
        }
        if let Some(status) = self.state.outcome {
            return Ok(status);
        }
        if self.state.phase != Phase::Submitted {
            return Err(DsaError::NotSubmitted);
        }
        let scratch = self.state.scratch.as_ref().ok_or(DsaError::JobCorrupted)?;
        if !scratch.record.is_complete() {
            return Ok(Status::BeingProcessed);
        }

        let desc = HwDescriptor::from(&scratch.descriptor);
        let mut record = scratch.record.load();
        if record.execution_status() == ExecutionStatus::PageFault && self.state.path == Path::Auto {
            if let Some(rest) = continue_after_fault(&desc, &record) {
                log::debug!(
                    "opcode {:#04x} faulted at {:#x} after {} bytes, finished in software",
                    desc.opcode,
                    record.fault_addr,
                    record.bytes_completed
                );
                record = rest;
            }
        }
        Ok(self.complete(&desc, &record))
    }

    /// Poll until the job completes.
    ///
    /// # Safety
    ///
    /// See [`check`](Self::check).
    pub unsafe fn wait(&mut self) -> DsaResult<Status> {
        loop {
            match self.check()? {
                Status::BeingProcessed => std::hint::spin_loop(),
                status => return Ok(status),
            }
        }
    }

    /// Submit and wait.
    ///
    /// # Safety
    ///
    /// See [`submit`](Self::submit).
    pub unsafe fn execute(&mut self) -> DsaResult<Status> {
        match self.submit()? {
            Status::BeingProcessed => self.wait(),
            status => Ok(status),
        }
    }

    /// Decode `cr` into the record and remember the outcome.
    unsafe fn complete(&mut self, desc: &HwDescriptor, cr: &CompletionRecord) -> Status {
        let status = Status::from(cr.execution_status());
        decode(&mut self.record, desc, cr);
        self.state.phase = Phase::Completed;
        self.state.outcome = Some(status);
        status
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("record", &self.record)
            .field("path", &self.state.path)
            .field("phase", &self.state.phase)
            .field("outcome", &self.state.outcome)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Record <-> descriptor
// ============================================================================

/// Merge job flags into a descriptor.
pub(crate) fn apply_flags(desc: &mut HwDescriptor, flags: JobFlags) {
    desc.flags |= DescriptorFlags::from_bits_truncate(flags.general());
    desc.op_flags |= flags.op_specific();
}

/// With `COPY_ONLY`, a move must not overwrite its own source.
pub(crate) fn check_copy_only(src: *const u8, dst: *mut u8, len: u32, flags: JobFlags) -> DsaResult<()> {
    let (src, dst) = (src as u64, dst as u64);
    if flags.contains(JobFlags::COPY_ONLY) && src <= dst && src + u64::from(len) > dst {
        return Err(ValidationError::Overlapping.into());
    }
    Ok(())
}

/// Build and validate the descriptor for `record`.
///
/// # Safety
///
/// With `CRC_READ_SEED` the seed is read through `crc_checksum_ptr`; for a
/// batch the destination must be the batch buffer.
unsafe fn describe(record: &JobRecord) -> DsaResult<HwDescriptor> {
    let op = Operation::from_u8(record.operation)
        .ok_or(ValidationError::UnsupportedOperation(record.operation))?;
    let src1 = record.source_first_ptr;
    let dst1 = record.destination_first_ptr;
    let mut flags = record.flags;

    let desc = match op {
        Operation::Nop => HwDescriptor::nop(),
        Operation::Drain => HwDescriptor::drain(dst1 as u64, record.destination_second_ptr as u64),
        Operation::Batch => {
            let mut batch = BatchBuffer::from_raw(dst1, record.destination_length as usize)?;
            batch.reset_records();
            batch.descriptor()
        }
        Operation::MemMove => {
            check_copy_only(src1, dst1, record.source_length, flags)?;
            HwDescriptor::mem_move(dst1, src1, record.source_length)
        }
        Operation::Fill => HwDescriptor::fill(dst1, record.destination_length, record.pattern_u64()),
        Operation::Compare => HwDescriptor::compare(
            src1,
            record.source_second_ptr,
            record.source_length,
            record.expected_result,
        ),
        Operation::ComparePattern => HwDescriptor::compare_pattern(
            src1,
            record.source_length,
            record.pattern_u64(),
            record.expected_result,
        ),
        Operation::Crc | Operation::CopyCrc => {
            let crc = record.crc_checksum_ptr;
            if crc.is_null() {
                return Err(DsaError::NullPointer("crc_checksum_ptr"));
            }
            let seed = if flags.contains(JobFlags::CRC_READ_SEED) {
                ptr::read_unaligned(crc)
            } else {
                0
            };
            flags.remove(JobFlags::CRC_READ_SEED);
            if op == Operation::Crc {
                HwDescriptor::crc(src1, record.source_length, seed)
            } else {
                HwDescriptor::copy_crc(dst1, src1, record.source_length, seed)
            }
        }
        Operation::CreateDelta => HwDescriptor::create_delta(
            src1,
            record.source_second_ptr,
            record.source_length,
            dst1,
            record.destination_length,
            record.expected_result,
        ),
        Operation::ApplyDelta => {
            HwDescriptor::apply_delta(dst1, record.destination_length, src1, record.source_length)
        }
        Operation::Dualcast => {
            HwDescriptor::dualcast(dst1, record.destination_second_ptr, src1, record.source_length)
        }
        Operation::CacheFlush => HwDescriptor::cache_flush(dst1, record.destination_length),
        Operation::DifCheck | Operation::DifInsert | Operation::DifStrip | Operation::DifUpdate => {
            record.dif_config.descriptor(op, src1, dst1, record.source_length)?
        }
    };

    let mut desc = desc;
    apply_flags(&mut desc, flags);
    validate(&desc)?;
    Ok(desc)
}

/// Write the outputs of a completed `desc` into `record`.
unsafe fn decode(record: &mut JobRecord, desc: &HwDescriptor, cr: &CompletionRecord) {
    let success = cr.execution_status().is_success();
    record.result = cr.result;

    match desc.operation() {
        Some(Operation::Compare | Operation::ComparePattern | Operation::Batch) => {
            record.offset = cr.bytes_completed;
        }
        Some(Operation::Crc | Operation::CopyCrc) => {
            if success && !record.crc_checksum_ptr.is_null() {
                ptr::write_unaligned(record.crc_checksum_ptr, cr.crc_value());
            }
        }
        Some(Operation::CreateDelta) => {
            record.destination_length = cr.delta_record_size();
        }
        Some(Operation::DifCheck | Operation::DifStrip) => {
            record.offset = cr.bytes_completed;
            if success {
                record.dif_config.set_source_tags(cr.src_tags());
            }
        }
        Some(Operation::DifInsert) => {
            record.offset = cr.bytes_completed;
            if success {
                record.dif_config.set_destination_tags(cr.dst_tags());
            }
        }
        Some(Operation::DifUpdate) => {
            record.offset = cr.bytes_completed;
            if success {
                record.dif_config.set_source_tags(cr.src_tags());
                record.dif_config.set_destination_tags(cr.dst_tags());
            }
        }
        _ => {}
    }
}

// ============================================================================
// Page fault continuation
// ============================================================================

/// Finish in software what the device left after a page fault.
///
/// Returns `None` for operations that cannot be resumed part way.
///
/// # Safety
///
/// The buffers of `desc` must still be valid.
unsafe fn continue_after_fault(desc: &HwDescriptor, faulted: &CompletionRecord) -> Option<CompletionRecord> {
    let done = faulted.bytes_completed;
    if done >= desc.xfer_size {
        return None;
    }
    let op = desc.operation()?;
    // Compare-pattern reports quadword offsets on the grid of the whole
    // buffer, so it resumes at the start of the faulting quadword.
    let resume = match op {
        Operation::ComparePattern => done & !7,
        _ => done,
    };
    let step = u64::from(resume);
    // Pattern byte i applies to buffer byte i % 8.
    let rotate = |pattern: u64| pattern.rotate_right((resume % 8) * 8);

    let mut rest = *desc;
    rest.completion_addr = 0;
    rest.xfer_size -= resume;
    match op {
        Operation::MemMove => {
            rest.src += step;
            rest.dst += step;
        }
        Operation::Fill => {
            rest.src = rotate(rest.src);
            rest.dst += step;
        }
        Operation::CacheFlush => rest.dst += step,
        Operation::Compare => {
            rest.src += step;
            rest.dst += step;
        }
        Operation::ComparePattern => {
            rest.src += step;
            rest.dst = rotate(rest.dst);
        }
        Operation::Dualcast => {
            rest.src += step;
            rest.dst += step;
            rest.set_dst2(rest.dst2() + step);
        }
        Operation::Crc | Operation::CopyCrc => {
            rest.src += step;
            if op == Operation::CopyCrc {
                rest.dst += step;
            }
            rest.set_crc_seed(faulted.crc_value());
            rest.set_crc_seed_addr(0);
        }
        _ => return None,
    }

    let mut record = kernels::run(&rest);
    // Offsets reported by the remainder are relative to where it started.
    let stopped_early = !record.execution_status().is_success();
    let mismatch = matches!(op, Operation::Compare | Operation::ComparePattern) && record.result != 0;
    if stopped_early || mismatch || record.bytes_completed != 0 {
        record.bytes_completed += resume;
    }
    Some(record)
}
