// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Basic example: discovery, the engine API and a small batch.
//!
//! Run with: `RUST_LOG=debug cargo run --example basic`

use dsa_offload::batch::{self, BatchBuffer};
use dsa_offload::{
    is_dsa_available, is_dsa_configured, DsaEngine, HardwareSupport, Job, JobFlags, Operation, Path, Registry,
    Status,
};

fn main() {
    env_logger::init();

    println!("Intel DSA Basic Example");
    println!("=======================\n");

    println!("Checking DSA availability...");
    println!("  DSA bus present: {}", is_dsa_available());
    println!("  DSA configured: {}", is_dsa_configured());
    println!();

    println!("Discovering DSA devices...");
    let registry = Registry::global();
    match registry.support() {
        HardwareSupport::Available => {
            for device in registry.devices() {
                println!("  Device: {} (node {})", device.name(), device.numa_node());
                println!("    Capabilities: {:?}", device.capabilities().flags);
                for queue in device.queues() {
                    println!(
                        "      - {} (priority: {}, durable: {})",
                        queue.name(),
                        queue.priority(),
                        queue.is_durable()
                    );
                }
            }
        }
        HardwareSupport::Unsupported { status, reason } => {
            println!("  Hardware path disabled ({status}): {reason}");
            println!("  The auto path runs every job in software.");
        }
    }
    println!();

    let engine = DsaEngine::new(Path::Auto);

    println!("Computing CRC-32C...");
    let test_data = b"Hello, Intel DSA!";
    match engine.crc32(test_data) {
        Ok(crc) => println!("  CRC of {:?}: {:#010x}", String::from_utf8_lossy(test_data), crc),
        Err(e) => println!("  CRC failed: {}", e),
    }
    println!();

    println!("Testing memory copy...");
    let src = vec![0xABu8; 4096];
    let mut dst = vec![0u8; 4096];
    match engine.memcpy(&mut dst, &src) {
        Ok(()) => println!("  Copied 4KB, data matches: {}", src == dst),
        Err(e) => println!("  Memory copy failed: {}", e),
    }
    println!();

    println!("Testing memory fill...");
    let mut buffer = vec![0u8; 4096];
    let pattern = 0xDEADBEEFCAFEBABEu64;
    match engine.memset(&mut buffer, pattern) {
        Ok(()) => {
            println!("  Filled 4KB with pattern {:#018x}", pattern);
            println!("  First 8 bytes: {:02x?}", &buffer[0..8]);
        }
        Err(e) => println!("  Memory fill failed: {}", e),
    }
    println!();

    println!("Running a batch: fill, fenced copy, compare, nop...");
    match run_batch() {
        Ok(statuses) => println!("  Task statuses: {:?}", statuses),
        Err(e) => println!("  Batch failed: {}", e),
    }
    println!();

    println!("Done!");
}

fn run_batch() -> Result<Vec<Status>, dsa_offload::DsaError> {
    let mut staging = vec![0u8; 4096];
    let mut copy = vec![0u8; 4096];
    let mut buffer = vec![0u8; batch::size_for(4)?];

    let mut tasks = BatchBuffer::from_bytes(&mut buffer)?;
    tasks.set_fill(0, 0x5A5A_5A5A_5A5A_5A5A, staging.as_mut_ptr(), 4096, JobFlags::empty())?;
    tasks.set_mem_move(1, staging.as_ptr(), copy.as_mut_ptr(), 4096, JobFlags::FENCE)?;
    tasks.set_compare(2, staging.as_ptr(), copy.as_ptr(), 4096, 0, JobFlags::FENCE)?;
    tasks.set_nop(3, JobFlags::empty())?;
    let count = tasks.count();

    let mut job = Job::new(Path::Auto);
    job.record.set_operation(Operation::Batch);
    job.record.destination_first_ptr = buffer.as_mut_ptr();
    job.record.destination_length = buffer.len() as u32;
    // SAFETY: every buffer named by the batch outlives the job, and
    // `execute` waits for completion.
    let status = unsafe { job.execute()? };
    println!("  Batch status: {status}, tasks completed: {}", job.record.offset);

    // SAFETY: the batch buffer still holds the executed descriptors.
    let tasks = unsafe { BatchBuffer::from_raw(buffer.as_mut_ptr(), buffer.len())? };
    (0..count).map(|i| tasks.get_status(i)).collect()
}
