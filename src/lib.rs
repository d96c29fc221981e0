// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! # Job dispatch for the Intel Data Streaming Accelerator
//!
//! This crate runs bulk memory operations either on a DSA shared work queue
//! or on an equivalent software path, behind one job record.
//!
//! ## Supported Operations
//!
//! - Memory move, fill, compare and compare-with-pattern
//! - CRC-32C and copy-with-CRC
//! - Delta record create and apply
//! - DIF check, insert, strip and update
//! - Dualcast, cache flush, drain and no-op
//! - Batches of the above
//!
//! ## Execution paths
//!
//! | Path       | Behavior                                                   |
//! |------------|------------------------------------------------------------|
//! | `Software` | Runs synchronously in the calling thread                   |
//! | `Hardware` | Submits to a work queue; fails when none accepts the job   |
//! | `Auto`     | Submits to a work queue; runs in software when none does   |
//!
//! Devices are discovered once per process from sysfs
//! (`/sys/bus/dsa/devices`). A machine without usable shared work queues
//! pays for discovery once; hardware submissions then fail immediately.
//!
//! DSA does **not** work on WSL2 or other hosts without the IDXD driver.
//! The software path works everywhere.
//!
//! ## Example
//!
//! ```rust
//! use dsa_offload::{Job, Operation, Path, Status};
//!
//! let data = *b"123456789";
//! let mut crc = 0u32;
//!
//! let mut job = Job::new(Path::Software);
//! job.record.set_operation(Operation::Crc);
//! job.record.source_first_ptr = data.as_ptr() as *mut u8;
//! job.record.source_length = data.len() as u32;
//! job.record.crc_checksum_ptr = &mut crc;
//!
//! assert_eq!(unsafe { job.execute() }?, Status::Ok);
//! assert_eq!(crc, 0xE306_9283);
//! # Ok::<(), dsa_offload::DsaError>(())
//! ```
//!
//! ## Requirements (hardware path)
//!
//! - Intel Xeon Scalable 4th Gen (Sapphire Rapids) or later
//! - Linux kernel 5.11+ with the IDXD driver enabled
//! - Shared work queues configured via `accel-config`

pub mod batch;
pub mod capi;
pub mod config;
pub mod crc;
pub mod delta;
pub mod descriptor;
pub mod device;
pub mod dif;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod flags;
pub mod job;
pub mod kernels;
pub mod numa;
pub mod opcode;
pub mod registry;
pub mod status;
pub mod submit;
pub mod validation;
pub mod wq;

pub use batch::BatchBuffer;
pub use config::Config;
pub use descriptor::{CompletionRecord, ExecutionStatus, HwDescriptor};
pub use device::{discover_devices, is_dsa_available, is_dsa_configured, Capabilities, Device};
pub use dispatcher::{Dispatcher, SubmitStatus};
pub use engine::DsaEngine;
pub use error::{DsaError, DsaResult};
pub use flags::{DifFlags, JobFlags};
pub use job::{DifConfig, Job, JobRecord, Path};
pub use numa::{NUMA_ANY, NUMA_NONE};
pub use opcode::Operation;
pub use registry::{HardwareSupport, Registry};
pub use status::Status;
pub use submit::{Enqueue, SimulatedPortal};
pub use wq::Queue;
