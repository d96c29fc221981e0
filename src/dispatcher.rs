// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Hardware dispatcher.
//!
//! Picks a device on the caller's NUMA node and a queue on that device,
//! both round-robin starting after the last one that accepted work. A busy
//! queue is not an error: the next queue is tried, then the next device.
//! Only when the whole wrap is busy does the caller see
//! [`SubmitStatus::QueueBusy`]. The dispatcher never sleeps.
//!
//! Load is spread per device first, then per queue. With `M` submissions
//! and no busy queues each device gets at most `ceil(M / D)` of them for
//! `D` eligible devices, and each queue at most `ceil(M / (D * Q))` only
//! when every eligible device has the same number `Q` of queues. When the
//! devices differ in queue count, a queue on a device with fewer queues
//! takes a larger share: with one 1-queue and one 3-queue device, four
//! submissions put two on the lone queue.

use crate::descriptor::{DescriptorFlags, HwDescriptor, RawDescriptor};
use crate::device::round_robin;
use crate::numa::{self, NUMA_NONE};
use crate::opcode::Operation;
use crate::registry::Registry;
use crate::status::Status;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, OnceLock};

/// Outcome of a hardware submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStatus {
    /// A queue accepted the descriptor.
    Success,
    /// Every eligible queue reported busy.
    QueueBusy,
    /// Hardware is unavailable; the status says why.
    Unavailable(Status),
}

/// Routes descriptors to the devices of one registry.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    cursor: AtomicUsize,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        let cursor = AtomicUsize::new(registry.devices().len());
        Self { registry, cursor }
    }

    /// Dispatcher over [`Registry::global`].
    pub fn global() -> Arc<Dispatcher> {
        static GLOBAL: OnceLock<Arc<Dispatcher>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(Dispatcher::new(Registry::global())))
            .clone()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Submit `desc` to a queue on node `numa_hint`.
    ///
    /// [`NUMA_ANY`](crate::numa::NUMA_ANY) selects the node of the calling
    /// thread and [`NUMA_NONE`] accepts every device. Block-on-fault is set
    /// on `desc` (and on every descriptor of a batch list) before submission.
    ///
    /// # Safety
    ///
    /// Every address named by `desc` must stay valid until its completion
    /// record reports a status. For a batch, `desc.src` must point to
    /// `desc.xfer_size` writable descriptors.
    pub unsafe fn submit(&self, desc: &mut HwDescriptor, numa_hint: u32) -> SubmitStatus {
        if let Some(status) = self.registry.unavailable_status() {
            return SubmitStatus::Unavailable(status);
        }

        force_block_on_fault(desc);
        let raw = RawDescriptor::from(&*desc);
        let node = numa::resolve_hint(numa_hint);
        let devices = self.registry.devices();

        let chosen = round_robin(&self.cursor, devices.len(), |i| {
            let device = &devices[i];
            (node == NUMA_NONE || device.numa_node() == node) && device.enqueue(&raw)
        });

        match chosen {
            Some(i) => {
                log::trace!("opcode {:#04x} submitted to {} (node {node})", desc.opcode, devices[i].name());
                SubmitStatus::Success
            }
            None => {
                log::trace!("opcode {:#04x} not accepted on node {node}: all queues busy", desc.opcode);
                SubmitStatus::QueueBusy
            }
        }
    }
}

/// Set block-on-fault on `desc`, or on each descriptor of its list when it
/// is a batch.
///
/// # Safety
///
/// For a batch, `desc.src` must point to `desc.xfer_size` writable descriptors.
unsafe fn force_block_on_fault(desc: &mut HwDescriptor) {
    match desc.operation() {
        Some(Operation::Batch) => {
            let list = desc.src as *mut RawDescriptor;
            for i in 0..desc.xfer_size as usize {
                let slot = &mut *list.add(i);
                let mut sub = HwDescriptor::from(&*slot);
                if sub.operation().is_some_and(Operation::accepts_block_on_fault) {
                    sub.flags |= DescriptorFlags::BLOCK_ON_FAULT;
                    *slot = RawDescriptor::from(&sub);
                }
            }
        }
        Some(op) if op.accepts_block_on_fault() => desc.flags |= DescriptorFlags::BLOCK_ON_FAULT,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Capabilities, Device};
    use crate::submit::SimulatedPortal;
    use crate::wq::Queue;

    fn device(name: &str, node: u32, portals: &[Arc<SimulatedPortal>]) -> Device {
        let queues = portals
            .iter()
            .enumerate()
            .map(|(i, p)| Queue::new(format!("{name}.wq{i}"), 1, false, Box::new(p.clone())))
            .collect();
        Device::new(name, node, Capabilities::default(), queues)
    }

    #[test]
    fn test_unavailable_registry_fails_fast() {
        let dispatcher = Dispatcher::new(Arc::new(Registry::from_devices(Vec::new())));
        let mut desc = HwDescriptor::nop();
        assert_eq!(
            unsafe { dispatcher.submit(&mut desc, NUMA_NONE) },
            SubmitStatus::Unavailable(Status::WorkQueuesNotAvailable)
        );
    }

    #[test]
    fn test_alternates_between_devices() {
        let a = Arc::new(SimulatedPortal::new());
        let b = Arc::new(SimulatedPortal::new());
        let registry = Registry::from_devices(vec![device("dsa0", 0, &[a.clone()]), device("dsa1", 0, &[b.clone()])]);
        let dispatcher = Dispatcher::new(Arc::new(registry));

        for _ in 0..6 {
            let mut desc = HwDescriptor::nop();
            assert_eq!(unsafe { dispatcher.submit(&mut desc, 0) }, SubmitStatus::Success);
        }
        assert_eq!(a.accepted(), 3);
        assert_eq!(b.accepted(), 3);
    }

    #[test]
    fn test_skips_other_nodes() {
        let near = Arc::new(SimulatedPortal::new());
        let far = Arc::new(SimulatedPortal::new());
        let registry = Registry::from_devices(vec![device("dsa0", 1, &[far.clone()]), device("dsa1", 0, &[near.clone()])]);
        let dispatcher = Dispatcher::new(Arc::new(registry));

        for _ in 0..3 {
            let mut desc = HwDescriptor::nop();
            assert_eq!(unsafe { dispatcher.submit(&mut desc, 0) }, SubmitStatus::Success);
        }
        assert_eq!(near.accepted(), 3);
        assert_eq!(far.accepted(), 0);

        near.set_busy(true);
        let mut desc = HwDescriptor::nop();
        assert_eq!(unsafe { dispatcher.submit(&mut desc, 0) }, SubmitStatus::QueueBusy);
        assert_eq!(far.accepted(), 0);

        let mut desc = HwDescriptor::nop();
        assert_eq!(unsafe { dispatcher.submit(&mut desc, NUMA_NONE) }, SubmitStatus::Success);
        assert_eq!(far.accepted(), 1);
    }

    #[test]
    fn test_all_busy() {
        let a = Arc::new(SimulatedPortal::busy());
        let b = Arc::new(SimulatedPortal::busy());
        let registry = Registry::from_devices(vec![device("dsa0", 0, &[a.clone(), b.clone()])]);
        let dispatcher = Dispatcher::new(Arc::new(registry));

        let mut desc = HwDescriptor::nop();
        assert_eq!(unsafe { dispatcher.submit(&mut desc, NUMA_NONE) }, SubmitStatus::QueueBusy);
        assert_eq!(a.rejected(), 1);
        assert_eq!(b.rejected(), 1);
    }

    #[test]
    fn test_block_on_fault_is_forced() {
        let src = [1u8; 16];
        let mut dst = [0u8; 16];
        let mut desc = HwDescriptor::mem_move(dst.as_mut_ptr(), src.as_ptr(), 16);
        unsafe { force_block_on_fault(&mut desc) };
        assert!(desc.flags.contains(DescriptorFlags::BLOCK_ON_FAULT));

        let mut nop = HwDescriptor::nop();
        unsafe { force_block_on_fault(&mut nop) };
        assert!(!nop.flags.contains(DescriptorFlags::BLOCK_ON_FAULT));

        let mut list = [
            RawDescriptor::from(&HwDescriptor::mem_move(dst.as_mut_ptr(), src.as_ptr(), 16)),
            RawDescriptor::from(&HwDescriptor::nop()),
        ];
        let mut batch = HwDescriptor::batch(list.as_mut_ptr(), 2);
        unsafe { force_block_on_fault(&mut batch) };
        assert!(!batch.flags.contains(DescriptorFlags::BLOCK_ON_FAULT));
        assert!(HwDescriptor::from(&list[0]).flags.contains(DescriptorFlags::BLOCK_ON_FAULT));
        assert!(!HwDescriptor::from(&list[1]).flags.contains(DescriptorFlags::BLOCK_ON_FAULT));
    }
}
