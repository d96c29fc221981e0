// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Descriptor submission.
//!
//! Shared work queues accept descriptors through ENQCMD, a non-posted
//! 64-byte write that reports through EFLAGS.ZF whether the queue took the
//! descriptor. [`Enqueue`] abstracts the portal so that the dispatcher can
//! be exercised against [`SimulatedPortal`] on machines without a device.
//!
//! # Safety
//!
//! Submitting is unsafe because:
//! - The portal address must be valid and properly mapped
//! - The descriptor must remain valid during submission
//! - The completion record must remain valid until the operation completes

use crate::descriptor::{HwDescriptor, RawDescriptor};
use crate::kernels;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// A sink for descriptors, normally one work queue portal.
pub trait Enqueue: Send + Sync {
    /// Hand `desc` to the queue. Returns `false` when the queue is busy.
    ///
    /// # Safety
    ///
    /// Every address named by `desc`, including its completion record, must
    /// stay valid until the completion record reports a status.
    unsafe fn enqueue(&self, desc: &RawDescriptor) -> bool;
}

impl<T: Enqueue + ?Sized> Enqueue for Arc<T> {
    unsafe fn enqueue(&self, desc: &RawDescriptor) -> bool {
        (**self).enqueue(desc)
    }
}

/// Store fence ordering descriptor and buffer writes before submission.
#[inline]
#[cfg(target_arch = "x86_64")]
pub fn sfence() {
    // SAFETY: SFENCE has no memory operands and no preconditions.
    unsafe { core::arch::x86_64::_mm_sfence() }
}

#[inline]
#[cfg(not(target_arch = "x86_64"))]
pub fn sfence() {
    std::sync::atomic::fence(Ordering::Release);
}

/// Submit a descriptor to a Shared Work Queue using ENQCMD.
///
/// Returns `true` if the descriptor was successfully enqueued,
/// `false` if the queue was full (retry later).
///
/// # Safety
///
/// - `portal` must be a valid memory-mapped DSA portal address (64-byte aligned)
/// - `desc` must be a valid, properly initialized 64-byte descriptor
/// - The completion record referenced by `desc` must remain valid
/// - The process must have a valid PASID bound via iommu_sva_bind_device
///
/// # Instruction Details
///
/// `ENQCMD r64, m512` reads 64 bytes from the source memory operand,
/// auto-fills the PASID field from IA32_PASID MSR, and submits to the
/// device at the destination address.
/// - Register operand (r64): Contains destination address (portal)
/// - Memory operand (m512): Source of 64 bytes (descriptor)
#[inline]
#[cfg(target_arch = "x86_64")]
pub unsafe fn enqcmd(portal: *mut u8, desc: &RawDescriptor) -> bool {
    // ENQCMD instruction encoding:
    // F3 0F 38 F8 /r - ENQCMD r64, m512
    //
    // ModR/M byte 0x02:
    //   mod = 00 (memory, no displacement)
    //   reg = 000 (RAX - contains destination address)
    //   r/m = 010 (RDX - memory base for source)
    //
    // ZF=0 on success, ZF=1 when the queue rejected the descriptor.
    let failed: u8;
    core::arch::asm!(
        ".byte 0xf3, 0x0f, 0x38, 0xf8, 0x02",
        "setz {failed}",
        in("rax") portal,
        in("rdx") desc as *const RawDescriptor,
        failed = out(reg_byte) failed,
        options(nostack)
    );
    failed == 0
}

/// Portal that runs descriptors in software at enqueue time.
///
/// Used by tests and by callers that want the dispatcher's routing without
/// a device. It can be switched to report busy, and it counts every
/// descriptor it accepted.
#[derive(Debug, Default)]
pub struct SimulatedPortal {
    busy: AtomicBool,
    accepted: AtomicUsize,
    rejected: AtomicUsize,
}

impl SimulatedPortal {
    pub fn new() -> Self {
        Self::default()
    }

    /// A portal that rejects every descriptor until [`set_busy`](Self::set_busy)`(false)`.
    pub fn busy() -> Self {
        let portal = Self::default();
        portal.set_busy(true);
        portal
    }

    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::Relaxed);
    }

    /// Descriptors accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Descriptors turned away because the portal was busy.
    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::Relaxed)
    }
}

impl Enqueue for SimulatedPortal {
    unsafe fn enqueue(&self, desc: &RawDescriptor) -> bool {
        if self.busy.load(Ordering::Relaxed) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.accepted.fetch_add(1, Ordering::Relaxed);
        kernels::execute(&HwDescriptor::from(desc));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ExecutionStatus, RawCompletionRecord};

    #[test]
    fn test_simulated_portal_executes() {
        let portal = SimulatedPortal::new();
        let src = [3u8; 32];
        let mut dst = [0u8; 32];
        let mut record = RawCompletionRecord::zeroed();
        let mut desc = HwDescriptor::mem_move(dst.as_mut_ptr(), src.as_ptr(), 32);
        desc.set_completion_addr(record.addr());

        assert!(unsafe { portal.enqueue(&RawDescriptor::from(&desc)) });
        assert_eq!(record.load().execution_status(), ExecutionStatus::Success);
        assert_eq!(dst, src);
        assert_eq!(portal.accepted(), 1);
    }

    #[test]
    fn test_simulated_portal_busy() {
        let portal = SimulatedPortal::busy();
        let desc = RawDescriptor::from(&HwDescriptor::nop());
        assert!(!unsafe { portal.enqueue(&desc) });
        assert_eq!(portal.rejected(), 1);

        portal.set_busy(false);
        assert!(unsafe { portal.enqueue(&desc) });
        assert_eq!(portal.accepted(), 1);
    }

    // Note: ENQCMD itself requires real DSA hardware and is not exercised
    // in unit tests.
}
