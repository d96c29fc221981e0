// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! DSA hardware descriptor and completion record structures.
//!
//! [`HwDescriptor`] and [`CompletionRecord`] are the typed forms; the wire
//! forms are [`RawDescriptor`] (64 bytes, 64-byte aligned) and
//! [`RawCompletionRecord`] (32 bytes, 32-byte aligned). `pack`/`unpack` are
//! the only places that know the byte offsets, so both the hardware portal
//! and the software kernels see exactly the same layout.
//!
//! # Descriptor layout
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | PASID / privilege (always zero) |
//! | 4 | 2 | general flags |
//! | 6 | 1 | operation-specific flags |
//! | 7 | 1 | opcode |
//! | 8 | 8 | completion record address |
//! | 16 | 8 | source / pattern / descriptor list |
//! | 24 | 8 | destination / second source |
//! | 32 | 4 | transfer size / descriptor count |
//! | 36 | 2 | completion interrupt handle |
//! | 40 | 24 | operation-specific |

use crate::opcode::Operation;
use bitflags::bitflags;

/// Size of a packed descriptor in bytes.
pub const DESCRIPTOR_SIZE: usize = 64;

/// Size of a packed completion record in bytes.
pub const COMPLETION_RECORD_SIZE: usize = 32;

bitflags! {
    /// General descriptor flags (bytes 4-5).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DescriptorFlags: u16 {
        /// Fence - wait for previous descriptors in the batch.
        const FENCE = 0x0001;
        /// Block on fault - let the device resolve page faults.
        const BLOCK_ON_FAULT = 0x0002;
        /// Completion record address is valid.
        const CR_ADDR_VALID = 0x0004;
        /// Request completion record.
        const REQUEST_COMPLETION = 0x0008;
        /// Request completion interrupt.
        const COMPLETION_INTERRUPT = 0x0010;
        /// Completion record steering tag.
        const CR_STEERING_TAG = 0x0020;
        /// Compare result against the expected value.
        const CHECK_RESULT = 0x0080;
        /// Cache control - allocate destination writes in the cache.
        const CACHE_CTRL = 0x0100;
        const ADDR1_TC = 0x0200;
        const ADDR2_TC = 0x0400;
        const ADDR3_TC = 0x0800;
        const CR_TC = 0x1000;
        const STRICT_ORDERING = 0x2000;
        /// Destination readback.
        const DEST_READBACK = 0x4000;
        const DEST_STEERING_TAG = 0x8000;
    }
}

// ============================================================================
// Descriptor
// ============================================================================

/// Typed 64-byte DSA hardware descriptor.
///
/// Bytes 40..64 depend on the operation and are exposed through named
/// accessors (`expected_result`, `crc_seed`, `delta_record_addr`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HwDescriptor {
    /// General flags.
    pub flags: DescriptorFlags,
    /// Operation-specific flags (byte 6).
    pub op_flags: u8,
    /// Raw opcode; see [`HwDescriptor::operation`].
    pub opcode: u8,
    /// Address of the completion record (must be 32-byte aligned).
    pub completion_addr: u64,
    /// Source address (operation-dependent meaning).
    pub src: u64,
    /// Destination address (operation-dependent meaning).
    pub dst: u64,
    /// Transfer size in bytes, or descriptor count for a batch.
    pub xfer_size: u32,
    /// Interrupt handle for completion interrupts.
    pub int_handle: u16,
    op_specific: [u8; 24],
}

impl HwDescriptor {
    /// Create a zeroed descriptor for `op`.
    #[inline]
    pub fn new(op: Operation) -> Self {
        Self {
            opcode: op.as_u8(),
            ..Self::default()
        }
    }

    /// Decoded opcode, `None` when the opcode byte is unknown.
    #[inline]
    pub fn operation(&self) -> Option<Operation> {
        Operation::from_u8(self.opcode)
    }

    /// Point the descriptor at a completion record and request it.
    #[inline]
    pub fn set_completion_addr(&mut self, addr: u64) {
        self.completion_addr = addr;
        self.flags |= DescriptorFlags::CR_ADDR_VALID | DescriptorFlags::REQUEST_COMPLETION;
    }

    /// Serialize to the little-endian wire form.
    pub fn pack(&self) -> [u8; DESCRIPTOR_SIZE] {
        let mut bytes = [0u8; DESCRIPTOR_SIZE];
        bytes[4..6].copy_from_slice(&self.flags.bits().to_le_bytes());
        bytes[6] = self.op_flags;
        bytes[7] = self.opcode;
        bytes[8..16].copy_from_slice(&self.completion_addr.to_le_bytes());
        bytes[16..24].copy_from_slice(&self.src.to_le_bytes());
        bytes[24..32].copy_from_slice(&self.dst.to_le_bytes());
        bytes[32..36].copy_from_slice(&self.xfer_size.to_le_bytes());
        bytes[36..38].copy_from_slice(&self.int_handle.to_le_bytes());
        bytes[40..64].copy_from_slice(&self.op_specific);
        bytes
    }

    /// Parse the little-endian wire form.
    pub fn unpack(bytes: &[u8; DESCRIPTOR_SIZE]) -> Self {
        let mut op_specific = [0u8; 24];
        op_specific.copy_from_slice(&bytes[40..64]);
        Self {
            flags: DescriptorFlags::from_bits_retain(le_u16(bytes, 4)),
            op_flags: bytes[6],
            opcode: bytes[7],
            completion_addr: le_u64(bytes, 8),
            src: le_u64(bytes, 16),
            dst: le_u64(bytes, 24),
            xfer_size: le_u32(bytes, 32),
            int_handle: le_u16(bytes, 36),
            op_specific,
        }
    }

    // Operation-specific region, addressed by absolute descriptor offset.

    #[inline]
    fn get_u8(&self, offset: usize) -> u8 {
        self.op_specific[offset - 40]
    }

    #[inline]
    fn put_u8(&mut self, offset: usize, value: u8) {
        self.op_specific[offset - 40] = value;
    }

    #[inline]
    fn get_u16(&self, offset: usize) -> u16 {
        let i = offset - 40;
        u16::from_le_bytes([self.op_specific[i], self.op_specific[i + 1]])
    }

    #[inline]
    fn put_u16(&mut self, offset: usize, value: u16) {
        let i = offset - 40;
        self.op_specific[i..i + 2].copy_from_slice(&value.to_le_bytes());
    }

    #[inline]
    fn get_u32(&self, offset: usize) -> u32 {
        let i = offset - 40;
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.op_specific[i..i + 4]);
        u32::from_le_bytes(b)
    }

    #[inline]
    fn put_u32(&mut self, offset: usize, value: u32) {
        let i = offset - 40;
        self.op_specific[i..i + 4].copy_from_slice(&value.to_le_bytes());
    }

    #[inline]
    fn get_u64(&self, offset: usize) -> u64 {
        let i = offset - 40;
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.op_specific[i..i + 8]);
        u64::from_le_bytes(b)
    }

    #[inline]
    fn put_u64(&mut self, offset: usize, value: u64) {
        let i = offset - 40;
        self.op_specific[i..i + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Expected result for compare, compare-pattern and create-delta.
    pub fn expected_result(&self) -> u8 {
        match self.operation() {
            Some(Operation::CreateDelta) => self.get_u8(56),
            _ => self.get_u8(40),
        }
    }

    pub fn set_expected_result(&mut self, value: u8) {
        match self.operation() {
            Some(Operation::CreateDelta) => self.put_u8(56, value),
            _ => self.put_u8(40, value),
        }
    }

    /// Delta record address (create-delta).
    pub fn delta_record_addr(&self) -> u64 {
        self.get_u64(40)
    }

    pub fn set_delta_record_addr(&mut self, addr: u64) {
        self.put_u64(40, addr);
    }

    /// Maximum delta record size (create-delta).
    pub fn max_delta_record_size(&self) -> u32 {
        self.get_u32(48)
    }

    pub fn set_max_delta_record_size(&mut self, size: u32) {
        self.put_u32(48, size);
    }

    /// Size of the delta record to apply (apply-delta).
    pub fn delta_record_size(&self) -> u32 {
        self.get_u32(40)
    }

    pub fn set_delta_record_size(&mut self, size: u32) {
        self.put_u32(40, size);
    }

    /// Second dualcast destination.
    pub fn dst2(&self) -> u64 {
        self.get_u64(40)
    }

    pub fn set_dst2(&mut self, addr: u64) {
        self.put_u64(40, addr);
    }

    /// CRC seed (crc, copy-crc).
    pub fn crc_seed(&self) -> u32 {
        self.get_u32(40)
    }

    pub fn set_crc_seed(&mut self, seed: u32) {
        self.put_u32(40, seed);
    }

    /// Address the CRC seed is read from, zero when unused.
    pub fn crc_seed_addr(&self) -> u64 {
        self.get_u64(48)
    }

    pub fn set_crc_seed_addr(&mut self, addr: u64) {
        self.put_u64(48, addr);
    }

    /// Source DIF flags, byte 40.
    pub fn src_dif_flags(&self) -> u8 {
        self.get_u8(40)
    }

    pub fn set_src_dif_flags(&mut self, flags: u8) {
        self.put_u8(40, flags);
    }

    /// Destination DIF flags, byte 41.
    pub fn dst_dif_flags(&self) -> u8 {
        self.get_u8(41)
    }

    pub fn set_dst_dif_flags(&mut self, flags: u8) {
        self.put_u8(41, flags);
    }

    /// General DIF flags and block-size code, byte 42.
    pub fn dif_flags(&self) -> u8 {
        self.get_u8(42)
    }

    pub fn set_dif_flags(&mut self, flags: u8) {
        self.put_u8(42, flags);
    }

    pub fn src_ref_tag(&self) -> u32 {
        self.get_u32(48)
    }

    pub fn set_src_ref_tag(&mut self, tag: u32) {
        self.put_u32(48, tag);
    }

    pub fn src_app_tag_mask(&self) -> u16 {
        self.get_u16(52)
    }

    pub fn set_src_app_tag_mask(&mut self, mask: u16) {
        self.put_u16(52, mask);
    }

    pub fn src_app_tag(&self) -> u16 {
        self.get_u16(54)
    }

    pub fn set_src_app_tag(&mut self, tag: u16) {
        self.put_u16(54, tag);
    }

    pub fn dst_ref_tag(&self) -> u32 {
        self.get_u32(56)
    }

    pub fn set_dst_ref_tag(&mut self, tag: u32) {
        self.put_u32(56, tag);
    }

    pub fn dst_app_tag_mask(&self) -> u16 {
        self.get_u16(60)
    }

    pub fn set_dst_app_tag_mask(&mut self, mask: u16) {
        self.put_u16(60, mask);
    }

    pub fn dst_app_tag(&self) -> u16 {
        self.get_u16(62)
    }

    pub fn set_dst_app_tag(&mut self, tag: u16) {
        self.put_u16(62, tag);
    }

    // ========================================================================
    // Builders
    // ========================================================================

    /// Create a no-op descriptor (useful for testing/synchronization).
    pub fn nop() -> Self {
        Self::new(Operation::Nop)
    }

    /// Create a drain descriptor with optional readback addresses.
    pub fn drain(readback1: u64, readback2: u64) -> Self {
        let mut desc = Self::new(Operation::Drain);
        desc.src = readback1;
        desc.dst = readback2;
        desc
    }

    /// Create a batch descriptor over `count` descriptors at `list`.
    pub fn batch(list: *const RawDescriptor, count: u32) -> Self {
        let mut desc = Self::new(Operation::Batch);
        desc.src = list as u64;
        desc.xfer_size = count;
        desc
    }

    /// Create a memory move (copy) descriptor.
    pub fn mem_move(dst: *mut u8, src: *const u8, len: u32) -> Self {
        let mut desc = Self::new(Operation::MemMove);
        desc.src = src as u64;
        desc.dst = dst as u64;
        desc.xfer_size = len;
        desc
    }

    /// Create a memory fill descriptor.
    pub fn fill(dst: *mut u8, len: u32, pattern: u64) -> Self {
        let mut desc = Self::new(Operation::Fill);
        desc.src = pattern; // Pattern goes in the source field for fill
        desc.dst = dst as u64;
        desc.xfer_size = len;
        desc
    }

    /// Create a memory compare descriptor.
    pub fn compare(src1: *const u8, src2: *const u8, len: u32, expected: u8) -> Self {
        let mut desc = Self::new(Operation::Compare);
        desc.src = src1 as u64;
        desc.dst = src2 as u64; // Second source goes in the destination field
        desc.xfer_size = len;
        desc.set_expected_result(expected);
        desc
    }

    /// Create a compare-with-pattern descriptor.
    pub fn compare_pattern(src: *const u8, len: u32, pattern: u64, expected: u8) -> Self {
        let mut desc = Self::new(Operation::ComparePattern);
        desc.src = src as u64;
        desc.dst = pattern;
        desc.xfer_size = len;
        desc.set_expected_result(expected);
        desc
    }

    /// Create a CRC generation descriptor.
    pub fn crc(src: *const u8, len: u32, seed: u32) -> Self {
        let mut desc = Self::new(Operation::Crc);
        desc.src = src as u64;
        desc.xfer_size = len;
        desc.set_crc_seed(seed);
        desc
    }

    /// Create a copy-with-CRC descriptor.
    pub fn copy_crc(dst: *mut u8, src: *const u8, len: u32, seed: u32) -> Self {
        let mut desc = Self::crc(src, len, seed);
        desc.opcode = Operation::CopyCrc.as_u8();
        desc.dst = dst as u64;
        desc
    }

    /// Create a dualcast descriptor.
    pub fn dualcast(dst1: *mut u8, dst2: *mut u8, src: *const u8, len: u32) -> Self {
        let mut desc = Self::new(Operation::Dualcast);
        desc.src = src as u64;
        desc.dst = dst1 as u64;
        desc.xfer_size = len;
        desc.set_dst2(dst2 as u64);
        desc
    }

    /// Create a create-delta descriptor comparing `src1` (reference) with `src2`.
    pub fn create_delta(
        src1: *const u8,
        src2: *const u8,
        len: u32,
        delta: *mut u8,
        max_delta: u32,
        expected: u8,
    ) -> Self {
        let mut desc = Self::new(Operation::CreateDelta);
        desc.src = src1 as u64;
        desc.dst = src2 as u64;
        desc.xfer_size = len;
        desc.set_delta_record_addr(delta as u64);
        desc.set_max_delta_record_size(max_delta);
        desc.set_expected_result(expected);
        desc
    }

    /// Create an apply-delta descriptor.
    pub fn apply_delta(dst: *mut u8, len: u32, delta: *const u8, delta_size: u32) -> Self {
        let mut desc = Self::new(Operation::ApplyDelta);
        desc.src = delta as u64;
        desc.dst = dst as u64;
        desc.xfer_size = len;
        desc.set_delta_record_size(delta_size);
        desc
    }

    /// Create a cache flush descriptor.
    pub fn cache_flush(dst: *mut u8, len: u32) -> Self {
        let mut desc = Self::new(Operation::CacheFlush);
        desc.dst = dst as u64;
        desc.xfer_size = len;
        desc
    }

    /// Create a DIF descriptor for any of the four DIF operations.
    ///
    /// Only the tag group the operation reads is consulted by the executor;
    /// both groups are packed so that the same call serves dif_update.
    #[allow(clippy::too_many_arguments)]
    pub fn dif(
        op: Operation,
        src: *const u8,
        dst: *mut u8,
        len: u32,
        flags: crate::flags::DifFlags,
        block_code: u8,
        src_tags: DifTags,
        dst_tags: DifTags,
    ) -> Self {
        let mut desc = Self::new(op);
        desc.src = src as u64;
        desc.dst = dst as u64;
        desc.xfer_size = len;
        desc.set_dif_flags(flags.general_byte() | (block_code & 0x03));
        if !matches!(op, Operation::DifInsert) {
            desc.set_src_dif_flags(flags.source_byte());
            desc.set_src_ref_tag(src_tags.ref_tag);
            desc.set_src_app_tag_mask(src_tags.app_tag_mask);
            desc.set_src_app_tag(src_tags.app_tag);
        }
        if matches!(op, Operation::DifInsert | Operation::DifUpdate) {
            desc.set_dst_dif_flags(flags.destination_byte());
            desc.set_dst_ref_tag(dst_tags.ref_tag);
            desc.set_dst_app_tag_mask(dst_tags.app_tag_mask);
            desc.set_dst_app_tag(dst_tags.app_tag);
        }
        desc
    }
}

/// Reference/application tag seeds of one side of a DIF operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DifTags {
    pub ref_tag: u32,
    pub app_tag_mask: u16,
    pub app_tag: u16,
}

/// 64-byte aligned wire form of a descriptor.
///
/// This is what is written to a portal and what a batch descriptor list is
/// made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C, align(64))]
pub struct RawDescriptor(pub [u8; DESCRIPTOR_SIZE]);

impl RawDescriptor {
    #[inline]
    pub const fn zeroed() -> Self {
        Self([0; DESCRIPTOR_SIZE])
    }
}

impl Default for RawDescriptor {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl From<&HwDescriptor> for RawDescriptor {
    fn from(desc: &HwDescriptor) -> Self {
        Self(desc.pack())
    }
}

impl From<&RawDescriptor> for HwDescriptor {
    fn from(raw: &RawDescriptor) -> Self {
        HwDescriptor::unpack(&raw.0)
    }
}

// ============================================================================
// Completion record
// ============================================================================

/// Typed 32-byte completion record.
///
/// # Layout (per Intel DSA Architecture Specification)
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0 | 1 | status |
/// | 1 | 1 | result |
/// | 4 | 4 | bytes_completed (descriptors completed for a batch) |
/// | 8 | 8 | fault_addr |
/// | 16 | 16 | operation-specific (CRC, delta size, DIF tags) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionRecord {
    /// Raw status byte; zero means not yet completed.
    pub status: u8,
    /// Result code (operation-specific).
    /// - For Compare: 0 = equal, 1 = not equal
    /// - For DIF operations: [`DifResult`](crate::flags::DifResult) bits
    pub result: u8,
    /// Number of bytes completed (for partial completions on page fault).
    pub bytes_completed: u32,
    /// Fault address (if page fault occurred).
    pub fault_addr: u64,
    op_specific: [u8; 16],
}

impl CompletionRecord {
    /// A completed record with the given execution status.
    pub fn with_status(status: ExecutionStatus) -> Self {
        Self {
            status: status.as_u8(),
            ..Self::default()
        }
    }

    /// Decoded execution status (low 6 bits of the status byte).
    #[inline]
    pub fn execution_status(&self) -> ExecutionStatus {
        ExecutionStatus::from(self.status)
    }

    /// True once the executor has written the record.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.status != 0
    }

    pub fn pack(&self) -> [u8; COMPLETION_RECORD_SIZE] {
        let mut bytes = [0u8; COMPLETION_RECORD_SIZE];
        bytes[0] = self.status;
        bytes[1] = self.result;
        bytes[4..8].copy_from_slice(&self.bytes_completed.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.fault_addr.to_le_bytes());
        bytes[16..32].copy_from_slice(&self.op_specific);
        bytes
    }

    pub fn unpack(bytes: &[u8; COMPLETION_RECORD_SIZE]) -> Self {
        let mut op_specific = [0u8; 16];
        op_specific.copy_from_slice(&bytes[16..32]);
        Self {
            status: bytes[0],
            result: bytes[1],
            bytes_completed: le_u32(bytes, 4),
            fault_addr: le_u64(bytes, 8),
            op_specific,
        }
    }

    #[inline]
    fn get_u16(&self, offset: usize) -> u16 {
        let i = offset - 16;
        u16::from_le_bytes([self.op_specific[i], self.op_specific[i + 1]])
    }

    #[inline]
    fn put_u16(&mut self, offset: usize, value: u16) {
        let i = offset - 16;
        self.op_specific[i..i + 2].copy_from_slice(&value.to_le_bytes());
    }

    #[inline]
    fn get_u32(&self, offset: usize) -> u32 {
        let i = offset - 16;
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.op_specific[i..i + 4]);
        u32::from_le_bytes(b)
    }

    #[inline]
    fn put_u32(&mut self, offset: usize, value: u32) {
        let i = offset - 16;
        self.op_specific[i..i + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// CRC value (crc, copy-crc).
    pub fn crc_value(&self) -> u32 {
        self.get_u32(16)
    }

    pub fn set_crc_value(&mut self, crc: u32) {
        self.put_u32(16, crc);
    }

    /// Size of the produced delta record (create-delta).
    pub fn delta_record_size(&self) -> u32 {
        self.get_u32(16)
    }

    pub fn set_delta_record_size(&mut self, size: u32) {
        self.put_u32(16, size);
    }

    /// Source tags after the last processed block (check, strip, update).
    pub fn src_tags(&self) -> DifTags {
        DifTags {
            ref_tag: self.get_u32(16),
            app_tag_mask: self.get_u16(20),
            app_tag: self.get_u16(22),
        }
    }

    pub fn set_src_tags(&mut self, tags: DifTags) {
        self.put_u32(16, tags.ref_tag);
        self.put_u16(20, tags.app_tag_mask);
        self.put_u16(22, tags.app_tag);
    }

    /// Destination tags after the last processed block (insert, update).
    pub fn dst_tags(&self) -> DifTags {
        DifTags {
            ref_tag: self.get_u32(24),
            app_tag_mask: self.get_u16(28),
            app_tag: self.get_u16(30),
        }
    }

    pub fn set_dst_tags(&mut self, tags: DifTags) {
        self.put_u32(24, tags.ref_tag);
        self.put_u16(28, tags.app_tag_mask);
        self.put_u16(30, tags.app_tag);
    }
}

/// 32-byte aligned wire form of a completion record.
///
/// The executor (hardware or software) writes it; the submitter polls the
/// status byte with volatile reads.
#[derive(Debug)]
#[repr(C, align(32))]
pub struct RawCompletionRecord(pub [u8; COMPLETION_RECORD_SIZE]);

impl RawCompletionRecord {
    #[inline]
    pub const fn zeroed() -> Self {
        Self([0; COMPLETION_RECORD_SIZE])
    }

    /// Address handed to the executor.
    #[inline]
    pub fn addr(&mut self) -> u64 {
        self as *mut Self as u64
    }

    /// Zero the record so that status byte 0 means "not completed".
    #[inline]
    pub fn clear(&mut self) {
        // SAFETY: `self` is a valid, exclusive reference.
        unsafe { std::ptr::write_volatile(&mut self.0, [0; COMPLETION_RECORD_SIZE]) }
    }

    /// Status byte (volatile read).
    #[inline]
    pub fn status(&self) -> u8 {
        // SAFETY: `self` is a valid reference; the executor may write it concurrently.
        unsafe { std::ptr::read_volatile(&self.0[0]) }
    }

    /// Check if the operation has completed (volatile read).
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.status() != 0
    }

    /// Snapshot of the record.
    ///
    /// Only meaningful after [`is_complete`](Self::is_complete) returned true;
    /// the acquire fence pairs with the executor's release before the status byte.
    pub fn load(&self) -> CompletionRecord {
        std::sync::atomic::fence(std::sync::atomic::Ordering::Acquire);
        // SAFETY: `self` is a valid reference.
        let bytes = unsafe { std::ptr::read_volatile(&self.0) };
        CompletionRecord::unpack(&bytes)
    }
}

impl Default for RawCompletionRecord {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Publish `record` at `addr`: every byte but the status first, then a
/// release fence, then the status byte.
///
/// # Safety
///
/// `addr` must point to 32 writable bytes that nobody else writes concurrently.
pub unsafe fn publish_completion(addr: u64, record: &CompletionRecord) {
    let dst = addr as *mut u8;
    let bytes = record.pack();
    std::ptr::copy_nonoverlapping(bytes.as_ptr().add(1), dst.add(1), COMPLETION_RECORD_SIZE - 1);
    std::sync::atomic::fence(std::sync::atomic::Ordering::Release);
    std::ptr::write_volatile(dst, bytes[0]);
}

// ============================================================================
// Execution status
// ============================================================================

/// Completion status codes written by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionStatus {
    /// Operation not yet complete.
    Processing,
    /// Operation completed successfully.
    Success,
    /// Operation completed, result did not match the expected one.
    FalsePredicate,
    /// Page fault occurred.
    PageFault,
    PageResponseError,
    /// At least one descriptor of the batch failed.
    BatchError,
    BatchPageFault,
    OffsetOrderError,
    OffsetOverflow,
    /// DIF check found a mismatch.
    DifControlError,
    /// Unsupported operation.
    OperationError,
    /// Invalid flags in descriptor.
    FlagError,
    NonZeroReserved,
    /// Invalid transfer size.
    InvalidTransferSize,
    DescriptorCountError,
    DeltaSizeError,
    BuffersOverlap,
    DualcastMisalign,
    DescriptorListAlign,
    InvalidInterruptHandle,
    PageFaultOnTranslation,
    /// Invalid completion record address.
    CompletionRecordAlign,
    MisalignAddress,
    Privilege,
    TrafficClass,
    ReadbackTranslation,
    OperationReadbackTimeout,
    HardwareTimeout,
    AddressTranslation,
    /// Unknown status code.
    Unknown(u8),
}

impl From<u8> for ExecutionStatus {
    fn from(status: u8) -> Self {
        match status & 0x3F {
            0x00 => Self::Processing,
            0x01 => Self::Success,
            0x02 => Self::FalsePredicate,
            0x03 => Self::PageFault,
            0x04 => Self::PageResponseError,
            0x05 => Self::BatchError,
            0x06 => Self::BatchPageFault,
            0x07 => Self::OffsetOrderError,
            0x08 => Self::OffsetOverflow,
            0x09 => Self::DifControlError,
            0x10 => Self::OperationError,
            0x11 => Self::FlagError,
            0x12 => Self::NonZeroReserved,
            0x13 => Self::InvalidTransferSize,
            0x14 => Self::DescriptorCountError,
            0x15 => Self::DeltaSizeError,
            0x16 => Self::BuffersOverlap,
            0x17 => Self::DualcastMisalign,
            0x18 => Self::DescriptorListAlign,
            0x19 => Self::InvalidInterruptHandle,
            0x1A => Self::PageFaultOnTranslation,
            0x1B => Self::CompletionRecordAlign,
            0x1C => Self::MisalignAddress,
            0x1D => Self::Privilege,
            0x1E => Self::TrafficClass,
            0x1F => Self::ReadbackTranslation,
            0x20 => Self::OperationReadbackTimeout,
            0x21 => Self::HardwareTimeout,
            0x22 => Self::AddressTranslation,
            other => Self::Unknown(other),
        }
    }
}

impl ExecutionStatus {
    /// Raw status code.
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Processing => 0x00,
            Self::Success => 0x01,
            Self::FalsePredicate => 0x02,
            Self::PageFault => 0x03,
            Self::PageResponseError => 0x04,
            Self::BatchError => 0x05,
            Self::BatchPageFault => 0x06,
            Self::OffsetOrderError => 0x07,
            Self::OffsetOverflow => 0x08,
            Self::DifControlError => 0x09,
            Self::OperationError => 0x10,
            Self::FlagError => 0x11,
            Self::NonZeroReserved => 0x12,
            Self::InvalidTransferSize => 0x13,
            Self::DescriptorCountError => 0x14,
            Self::DeltaSizeError => 0x15,
            Self::BuffersOverlap => 0x16,
            Self::DualcastMisalign => 0x17,
            Self::DescriptorListAlign => 0x18,
            Self::InvalidInterruptHandle => 0x19,
            Self::PageFaultOnTranslation => 0x1A,
            Self::CompletionRecordAlign => 0x1B,
            Self::MisalignAddress => 0x1C,
            Self::Privilege => 0x1D,
            Self::TrafficClass => 0x1E,
            Self::ReadbackTranslation => 0x1F,
            Self::OperationReadbackTimeout => 0x20,
            Self::HardwareTimeout => 0x21,
            Self::AddressTranslation => 0x22,
            Self::Unknown(code) => code,
        }
    }

    /// Returns true if this status indicates success.
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if this status indicates the operation is still pending.
    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Processing)
    }

    /// Returns true if this status indicates an error.
    #[inline]
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::Processing | Self::Success | Self::FalsePredicate)
    }
}

#[inline]
fn le_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

#[inline]
fn le_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(b)
}

#[inline]
fn le_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(b)
}

// Compile-time size and alignment checks per Intel DSA Architecture Specification
const _: () = assert!(std::mem::size_of::<RawDescriptor>() == 64);
const _: () = assert!(std::mem::align_of::<RawDescriptor>() == 64);
const _: () = assert!(std::mem::size_of::<RawCompletionRecord>() == 32);
const _: () = assert!(std::mem::align_of::<RawCompletionRecord>() == 32);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::DifFlags;

    #[test]
    fn test_descriptor_size_and_alignment() {
        assert_eq!(std::mem::size_of::<RawDescriptor>(), 64);
        assert_eq!(std::mem::align_of::<RawDescriptor>(), 64);
    }

    #[test]
    fn test_completion_record_size_and_alignment() {
        assert_eq!(std::mem::size_of::<RawCompletionRecord>(), 32);
        assert_eq!(std::mem::align_of::<RawCompletionRecord>(), 32);
    }

    #[test]
    fn test_common_field_offsets() {
        let mut desc = HwDescriptor::mem_move(0x2000 as *mut u8, 0x1000 as *const u8, 0x40);
        desc.set_completion_addr(0x3000);
        desc.flags |= DescriptorFlags::FENCE;
        let bytes = desc.pack();

        assert_eq!(&bytes[0..4], &[0, 0, 0, 0]);
        assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), 0x000D);
        assert_eq!(bytes[7], 0x03);
        assert_eq!(bytes[8..16], 0x3000u64.to_le_bytes());
        assert_eq!(bytes[16..24], 0x1000u64.to_le_bytes());
        assert_eq!(bytes[24..32], 0x2000u64.to_le_bytes());
        assert_eq!(bytes[32..36], 0x40u32.to_le_bytes());
        assert_eq!(HwDescriptor::unpack(&bytes), desc);
    }

    #[test]
    fn test_create_delta_offsets() {
        let desc = HwDescriptor::create_delta(
            0x1000 as *const u8,
            0x2000 as *const u8,
            64,
            0x3000 as *mut u8,
            80,
            0x03,
        );
        let bytes = desc.pack();
        assert_eq!(bytes[40..48], 0x3000u64.to_le_bytes());
        assert_eq!(bytes[48..52], 80u32.to_le_bytes());
        assert_eq!(bytes[56], 0x03);
        assert_eq!(desc.expected_result(), 0x03);
    }

    #[test]
    fn test_dif_update_offsets() {
        let src = DifTags { ref_tag: 0x1122_3344, app_tag_mask: 0x00FF, app_tag: 0xBEEF };
        let dst = DifTags { ref_tag: 0x5566_7788, app_tag_mask: 0xFF00, app_tag: 0xCAFE };
        let flags = DifFlags::SRC_INC_APP_TAG | DifFlags::DST_PASS_GUARD | DifFlags::INVERT_CRC_SEED;
        let desc = HwDescriptor::dif(
            Operation::DifUpdate,
            0x1000 as *const u8,
            0x2000 as *mut u8,
            520,
            flags,
            0x00,
            src,
            dst,
        );
        let bytes = desc.pack();
        assert_eq!(bytes[7], 0x15);
        assert_eq!(bytes[40], 0x10);
        assert_eq!(bytes[41], 0x20);
        assert_eq!(bytes[42], 0x04);
        assert_eq!(bytes[48..52], 0x1122_3344u32.to_le_bytes());
        assert_eq!(bytes[52..54], 0x00FFu16.to_le_bytes());
        assert_eq!(bytes[54..56], 0xBEEFu16.to_le_bytes());
        assert_eq!(bytes[56..60], 0x5566_7788u32.to_le_bytes());
        assert_eq!(bytes[60..62], 0xFF00u16.to_le_bytes());
        assert_eq!(bytes[62..64], 0xCAFEu16.to_le_bytes());
    }

    #[test]
    fn test_completion_record_layout() {
        let mut record = CompletionRecord::with_status(ExecutionStatus::Success);
        record.result = 1;
        record.bytes_completed = 0x1234;
        record.fault_addr = 0xDEAD_0000;
        record.set_crc_value(0xE306_9283);
        let bytes = record.pack();
        assert_eq!(bytes[0], 0x01);
        assert_eq!(bytes[1], 0x01);
        assert_eq!(bytes[4..8], 0x1234u32.to_le_bytes());
        assert_eq!(bytes[8..16], 0xDEAD_0000u64.to_le_bytes());
        assert_eq!(bytes[16..20], 0xE306_9283u32.to_le_bytes());
        assert_eq!(CompletionRecord::unpack(&bytes), record);
    }

    #[test]
    fn test_execution_status_masks_upper_bits() {
        assert_eq!(ExecutionStatus::from(0x41), ExecutionStatus::Success);
        assert_eq!(ExecutionStatus::from(0x03), ExecutionStatus::PageFault);
        assert_eq!(ExecutionStatus::from(0x3F), ExecutionStatus::Unknown(0x3F));
        assert!(ExecutionStatus::PageFault.is_error());
        assert!(!ExecutionStatus::FalsePredicate.is_error());
    }

    #[test]
    fn test_publish_and_poll() {
        let mut raw = RawCompletionRecord::zeroed();
        assert!(!raw.is_complete());

        let mut record = CompletionRecord::with_status(ExecutionStatus::Success);
        record.bytes_completed = 64;
        // SAFETY: `raw` is a live, exclusively owned record.
        unsafe { publish_completion(raw.addr(), &record) };

        assert!(raw.is_complete());
        assert_eq!(raw.load(), record);

        raw.clear();
        assert!(!raw.is_complete());
    }
}
