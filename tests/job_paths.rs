// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Jobs on every path give the same observable results.

use dsa_offload::descriptor::HwDescriptor;
use dsa_offload::flags::expect;
use dsa_offload::{
    kernels, Capabilities, Device, Dispatcher, Job, JobFlags, JobRecord, Operation, Path, Queue, Registry,
    SimulatedPortal, Status, NUMA_NONE,
};
use std::sync::Arc;

fn simulated_dispatcher(portal: Arc<SimulatedPortal>) -> Arc<Dispatcher> {
    let device = Device::new(
        "dsa0",
        0,
        Capabilities::default(),
        vec![Queue::new("wq0.0", 1, false, Box::new(portal))],
    );
    Arc::new(Dispatcher::new(Arc::new(Registry::from_devices(vec![device]))))
}

fn job(path: Path, record: JobRecord) -> Job {
    let mut job = Job::with_dispatcher(path, simulated_dispatcher(Arc::new(SimulatedPortal::new())));
    job.record = record;
    job.record.numa_id = NUMA_NONE;
    job
}

#[test]
fn test_job_size_covers_the_job() {
    for path in [Path::Auto, Path::Software, Path::Hardware] {
        assert_eq!(Job::size(path), Job::size(path));
        assert!(Job::size(path) >= std::mem::size_of::<Job>());
    }
}

#[test]
fn test_compare_matches_direct_kernel() {
    let a: Vec<u8> = (0..200u8).collect();
    let mut b = a.clone();
    b[117] ^= 0xFF;

    let direct = unsafe { kernels::run(&HwDescriptor::compare(a.as_ptr(), b.as_ptr(), 200, 0)) };

    for path in [Path::Software, Path::Hardware, Path::Auto] {
        let mut record = JobRecord {
            source_first_ptr: a.as_ptr() as *mut u8,
            source_second_ptr: b.as_mut_ptr(),
            source_length: 200,
            ..JobRecord::default()
        };
        record.set_operation(Operation::Compare);
        let mut job = job(path, record);
        let status = unsafe { job.execute() }.unwrap();
        assert_eq!(status, Status::from(direct.execution_status()));
        assert_eq!(job.record.result, direct.result);
        assert_eq!(job.record.offset, direct.bytes_completed);
        assert_eq!(job.record.offset, 117);
    }
}

#[test]
fn test_crc_matches_direct_kernel() {
    let data: Vec<u8> = (0..4096u32).map(|i| (i * 7) as u8).collect();
    let direct = unsafe { kernels::run(&HwDescriptor::crc(data.as_ptr(), 4096, 0)) };

    for path in [Path::Software, Path::Hardware] {
        let mut crc = 0u32;
        let mut record = JobRecord {
            source_first_ptr: data.as_ptr() as *mut u8,
            source_length: 4096,
            crc_checksum_ptr: &mut crc,
            ..JobRecord::default()
        };
        record.set_operation(Operation::Crc);
        let mut job = job(path, record);
        assert_eq!(unsafe { job.execute() }.unwrap(), Status::Ok);
        assert_eq!(crc, direct.crc_value());
    }
}

#[test]
fn test_delta_round_trip_through_jobs() {
    let reference = vec![0u64; 32];
    let mut target = reference.clone();
    target[3] = 0xDEAD;
    target[30] = 0xBEEF;
    let mut delta = vec![0u64; 10];

    let mut record = JobRecord {
        source_first_ptr: reference.as_ptr() as *mut u8,
        source_second_ptr: target.as_mut_ptr() as *mut u8,
        source_length: 256,
        destination_first_ptr: delta.as_mut_ptr() as *mut u8,
        destination_length: 80,
        expected_result: expect::NOT_EQUAL,
        flags: JobFlags::CHECK_RESULT,
        ..JobRecord::default()
    };
    record.set_operation(Operation::CreateDelta);
    let mut create = job(Path::Software, record);
    assert_eq!(unsafe { create.execute() }.unwrap(), Status::Ok);
    assert_eq!(create.record.destination_length, 20);

    let mut restored = reference.clone();
    let mut record = JobRecord {
        source_first_ptr: delta.as_mut_ptr() as *mut u8,
        source_length: create.record.destination_length,
        destination_first_ptr: restored.as_mut_ptr() as *mut u8,
        destination_length: 256,
        ..JobRecord::default()
    };
    record.set_operation(Operation::ApplyDelta);
    let mut apply = job(Path::Hardware, record);
    assert_eq!(unsafe { apply.execute() }.unwrap(), Status::Ok);
    assert_eq!(restored, target);
}

#[test]
fn test_dualcast_writes_both_destinations() {
    let src = [0x42u8; 256];
    // Both destinations share bits 11:0.
    let mut area = vec![0u8; 3 * 4096];
    let base = area.as_mut_ptr();
    let first = base.wrapping_add(base.align_offset(4096));
    let second = first.wrapping_add(4096);

    let mut record = JobRecord {
        source_first_ptr: src.as_ptr() as *mut u8,
        destination_first_ptr: first,
        destination_second_ptr: second,
        source_length: 256,
        ..JobRecord::default()
    };
    record.set_operation(Operation::Dualcast);
    let mut job = job(Path::Software, record);
    assert_eq!(unsafe { job.execute() }.unwrap(), Status::Ok);
    unsafe {
        assert_eq!(std::slice::from_raw_parts(first, 256), &src[..]);
        assert_eq!(std::slice::from_raw_parts(second, 256), &src[..]);
    }
}

#[test]
fn test_hardware_job_reports_being_processed_then_completes() {
    let src = [1u8; 64];
    let mut dst = [0u8; 64];
    let mut record = JobRecord {
        source_first_ptr: src.as_ptr() as *mut u8,
        destination_first_ptr: dst.as_mut_ptr(),
        source_length: 64,
        ..JobRecord::default()
    };
    record.set_operation(Operation::MemMove);
    let mut job = job(Path::Hardware, record);

    assert_eq!(unsafe { job.submit() }.unwrap(), Status::BeingProcessed);
    let first = unsafe { job.check() }.unwrap();
    assert_eq!(first, Status::Ok);
    for _ in 0..3 {
        assert_eq!(unsafe { job.check() }.unwrap(), first);
    }
    job.finalize();
    assert_eq!(dst, src);
}

#[test]
fn test_job_is_reusable() {
    let mut job = Job::new(Path::Software);
    let mut buffer = [0u8; 32];
    for value in [1u8, 2, 3] {
        job.record.set_operation(Operation::Fill);
        job.record.pattern = [value; 8];
        job.record.destination_first_ptr = buffer.as_mut_ptr();
        job.record.destination_length = 32;
        assert_eq!(unsafe { job.execute() }.unwrap(), Status::Ok);
        assert_eq!(buffer, [value; 32]);
    }
}
