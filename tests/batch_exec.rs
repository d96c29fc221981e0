// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Batches executed through jobs.

use dsa_offload::batch::{self, ALIGNMENT_PAD, TASK_SIZE};
use dsa_offload::{
    BatchBuffer, Capabilities, Device, DifConfig, Dispatcher, DsaError, Job, JobFlags, Operation, Path, Queue, Registry,
    SimulatedPortal, Status, NUMA_NONE,
};
use std::sync::Arc;

fn batch_job(path: Path, buffer: &mut [u8]) -> Job {
    let device = Device::new(
        "dsa0",
        0,
        Capabilities::default(),
        vec![Queue::new("wq0.0", 1, false, Box::new(SimulatedPortal::new()))],
    );
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(Registry::from_devices(vec![device]))));
    let mut job = Job::with_dispatcher(path, dispatcher);
    job.record.set_operation(Operation::Batch);
    job.record.destination_first_ptr = buffer.as_mut_ptr();
    job.record.destination_length = buffer.len() as u32;
    job.record.numa_id = NUMA_NONE;
    job
}

#[test]
fn test_batch_size_and_index_limits() {
    assert_eq!(batch::size_for(4).unwrap(), 4 * TASK_SIZE + ALIGNMENT_PAD);
    assert!(matches!(batch::size_for(1), Err(DsaError::BatchSize { .. })));

    let mut buffer = vec![0u8; batch::size_for(4).unwrap()];
    let mut tasks = BatchBuffer::from_bytes(&mut buffer).unwrap();
    assert_eq!(tasks.count(), 4);
    let err = tasks.set_nop(5, JobFlags::empty()).unwrap_err();
    assert_eq!(err.status(), Status::BatchTaskIndexOverflow);
}

#[test]
fn test_batch_of_moves_equals_individual_moves() {
    let sources: Vec<Vec<u8>> = (0..4u8).map(|i| vec![i + 1; 512]).collect();

    let mut expected = vec![vec![0u8; 512]; 4];
    for (src, dst) in sources.iter().zip(expected.iter_mut()) {
        let mut job = Job::new(Path::Software);
        job.record.set_operation(Operation::MemMove);
        job.record.source_first_ptr = src.as_ptr() as *mut u8;
        job.record.destination_first_ptr = dst.as_mut_ptr();
        job.record.source_length = 512;
        assert_eq!(unsafe { job.execute() }.unwrap(), Status::Ok);
    }

    for path in [Path::Software, Path::Hardware] {
        let mut actual = vec![vec![0u8; 512]; 4];
        let mut buffer = vec![0u8; batch::size_for(4).unwrap()];
        let mut tasks = BatchBuffer::from_bytes(&mut buffer).unwrap();
        for (i, (src, dst)) in sources.iter().zip(actual.iter_mut()).enumerate() {
            tasks
                .set_mem_move(i, src.as_ptr(), dst.as_mut_ptr(), 512, JobFlags::empty())
                .unwrap();
        }

        let mut job = batch_job(path, &mut buffer);
        assert_eq!(unsafe { job.execute() }.unwrap(), Status::Ok);
        assert_eq!(job.record.offset, 4);
        assert_eq!(actual, expected);
    }
}

#[test]
fn test_fenced_move_sees_fill() {
    let mut staging = vec![0u8; 1024];
    let mut copy = vec![0u8; 1024];
    let mut buffer = vec![0u8; batch::size_for(2).unwrap()];

    let mut tasks = BatchBuffer::from_bytes(&mut buffer).unwrap();
    tasks
        .set_fill(0, 0x1122_3344_5566_7788, staging.as_mut_ptr(), 1024, JobFlags::empty())
        .unwrap();
    tasks
        .set_mem_move(1, staging.as_ptr(), copy.as_mut_ptr(), 1024, JobFlags::FENCE)
        .unwrap();

    let mut job = batch_job(Path::Hardware, &mut buffer);
    assert_eq!(unsafe { job.execute() }.unwrap(), Status::Ok);
    assert_eq!(copy, staging);
    assert!(copy.chunks(8).all(|c| c == 0x1122_3344_5566_7788u64.to_le_bytes()));
}

#[test]
fn test_partial_failure_reports_completed_count() {
    let a = vec![1u8; 64];
    let b = vec![2u8; 64];
    let mut dst = vec![0u8; 64];
    let mut after = vec![0u8; 64];
    let mut buffer = vec![0u8; batch::size_for(3).unwrap()];

    let mut tasks = BatchBuffer::from_bytes(&mut buffer).unwrap();
    tasks.set_mem_move(0, a.as_ptr(), dst.as_mut_ptr(), 64, JobFlags::empty()).unwrap();
    // Expects equal buffers and checks the result: fails.
    tasks
        .set_compare(1, a.as_ptr(), b.as_ptr(), 64, 0, JobFlags::CHECK_RESULT)
        .unwrap();
    tasks.set_mem_move(2, b.as_ptr(), after.as_mut_ptr(), 64, JobFlags::empty()).unwrap();

    let mut job = batch_job(Path::Software, &mut buffer);
    assert_eq!(unsafe { job.execute() }.unwrap(), Status::BatchError);
    assert_eq!(job.record.offset, 1);
    // Completed work is not rolled back; later tasks did not run.
    assert_eq!(dst, a);
    assert_eq!(after, vec![0u8; 64]);

    let tasks = BatchBuffer::from_bytes(&mut buffer).unwrap();
    assert_eq!(tasks.get_status(0).unwrap(), Status::Ok);
    assert_eq!(tasks.get_status(1).unwrap(), Status::FalsePredicateOk);
    assert_eq!(tasks.get_result(1).unwrap(), 1);
    assert_eq!(tasks.get_status(2).unwrap(), Status::BeingProcessed);
}

#[test]
fn test_resubmitted_batch_reports_only_current_run() {
    for path in [Path::Software, Path::Hardware] {
        let a = vec![1u8; 64];
        let mut b = a.clone();
        let mut dst = vec![0u8; 64];
        let mut after = vec![0u8; 64];
        let mut buffer = vec![0u8; batch::size_for(3).unwrap()];

        let mut tasks = BatchBuffer::from_bytes(&mut buffer).unwrap();
        tasks.set_mem_move(0, a.as_ptr(), dst.as_mut_ptr(), 64, JobFlags::empty()).unwrap();
        tasks
            .set_compare(1, a.as_ptr(), b.as_ptr(), 64, 0, JobFlags::CHECK_RESULT)
            .unwrap();
        tasks.set_mem_move(2, b.as_ptr(), after.as_mut_ptr(), 64, JobFlags::empty()).unwrap();

        let mut job = batch_job(path, &mut buffer);
        assert_eq!(unsafe { job.execute() }.unwrap(), Status::Ok);
        assert_eq!(job.record.offset, 3);
        let tasks = BatchBuffer::from_bytes(&mut buffer).unwrap();
        assert_eq!(tasks.get_status(2).unwrap(), Status::Ok);

        // Same buffer, but now the compare fails and the last move is skipped.
        b[10] = 9;
        after.fill(0);
        let mut job = batch_job(path, &mut buffer);
        assert_eq!(unsafe { job.execute() }.unwrap(), Status::BatchError);
        assert_eq!(job.record.offset, 1);
        assert_eq!(after, vec![0u8; 64]);

        let tasks = BatchBuffer::from_bytes(&mut buffer).unwrap();
        assert_eq!(tasks.get_status(0).unwrap(), Status::Ok);
        assert_eq!(tasks.get_status(1).unwrap(), Status::FalsePredicateOk);
        assert_eq!(tasks.get_status(2).unwrap(), Status::BeingProcessed);
    }
}

#[test]
fn test_batch_rejects_invalid_slot() {
    let mut buffer = vec![0u8; batch::size_for(2).unwrap()];
    let mut tasks = BatchBuffer::from_bytes(&mut buffer).unwrap();
    let src = [0u8; 8];
    let err = tasks
        .set_mem_move(0, src.as_ptr(), std::ptr::null_mut(), 8, JobFlags::empty())
        .unwrap_err();
    assert_eq!(err.status(), Status::NullPointerError);
}

#[test]
fn test_batch_rejects_unknown_dif_block_size() {
    let mut buffer = vec![0u8; batch::size_for(2).unwrap()];
    let mut tasks = BatchBuffer::from_bytes(&mut buffer).unwrap();
    let data = [0u8; 520];
    let config = DifConfig {
        block_size: 7,
        ..DifConfig::default()
    };
    let err = tasks
        .set_dif_check(0, data.as_ptr(), 520, &config, JobFlags::empty())
        .unwrap_err();
    assert_eq!(err.status(), Status::JobFlagsError);
}
