// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Work queue management.
//!
//! A work queue is the interface through which applications submit work to DSA.
//! Each work queue has an associated portal (memory-mapped region) where
//! descriptors are submitted. Only enabled shared queues are used; they are
//! fed with ENQCMD, which reports back when the queue is full.
//!
//! # Platform Support
//!
//! Mapping a portal is only supported on x86_64 Linux. On other platforms,
//! [`Queue::open`] returns `DsaError::PlatformNotSupported`.

use crate::config::Config;
use crate::descriptor::RawDescriptor;
use crate::device::{read_sysfs_string, read_sysfs_u32};
use crate::error::{DsaError, DsaResult};
use crate::submit::Enqueue;
use std::fmt;
use std::path::{Path, PathBuf};

/// Work queue mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkQueueMode {
    /// Dedicated Work Queue - single client, not used by the dispatcher.
    Dedicated,
    /// Shared Work Queue - multiple clients, uses ENQCMD with PASID.
    Shared,
}

impl WorkQueueMode {
    fn parse(mode: &str) -> Option<Self> {
        match mode {
            "dedicated" => Some(Self::Dedicated),
            "shared" => Some(Self::Shared),
            _ => None,
        }
    }
}

/// Information about a work queue (from sysfs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkQueueInfo {
    /// Work queue name (e.g., "wq0.0").
    pub name: String,
    /// Sysfs directory of the queue.
    pub sysfs_path: PathBuf,
    /// State ("enabled", "disabled", etc.).
    pub state: String,
    /// Work queue mode, `None` when sysfs reports something unknown.
    pub mode: Option<WorkQueueMode>,
    /// Queue priority; higher is served first.
    pub priority: u32,
    /// Group the queue belongs to.
    pub group_id: Option<u32>,
}

impl WorkQueueInfo {
    /// Read the attributes of the queue at `path`.
    ///
    /// Missing attributes read as "unknown" or zero; they only make the
    /// queue unusable, they do not fail discovery.
    pub fn read(name: &str, path: &Path) -> Self {
        let state = read_sysfs_string(&path.join("state")).unwrap_or_else(|_| "unknown".to_string());
        let mode = read_sysfs_string(&path.join("mode"))
            .ok()
            .and_then(|m| WorkQueueMode::parse(&m));
        let priority = read_sysfs_u32(&path.join("priority")).unwrap_or(0);
        let group_id = read_sysfs_string(&path.join("group_id"))
            .ok()
            .and_then(|g| g.trim_start_matches("group").rsplit('.').next()?.parse().ok());

        Self {
            name: name.to_string(),
            sysfs_path: path.to_path_buf(),
            state,
            mode,
            priority,
            group_id,
        }
    }

    /// Enabled and shared.
    pub fn is_usable(&self) -> bool {
        self.state == "enabled" && self.mode == Some(WorkQueueMode::Shared)
    }

    /// Device number parsed from `wqD.Q`.
    pub fn device_index(&self) -> Option<u32> {
        self.name.strip_prefix("wq")?.split('.').next()?.parse().ok()
    }

    /// Whether the queue's group routes to traffic class B (durable memory).
    ///
    /// Looks at `<queue>/group/traffic_class_b` first and falls back to
    /// `<devices>/groupD.G/traffic_class_b`.
    ///
    /// # Errors
    ///
    /// Fails when the group cannot be found.
    pub fn read_durability(&self, devices_dir: &Path) -> DsaResult<bool> {
        let linked = self.sysfs_path.join("group").join("traffic_class_b");
        if let Ok(value) = read_sysfs_u32(&linked) {
            return Ok(value != 0);
        }

        let (Some(device), Some(group)) = (self.device_index(), self.group_id) else {
            return Err(DsaError::InvalidSysfs {
                path: self.sysfs_path.display().to_string(),
                value: "no group".to_string(),
            });
        };
        let path = devices_dir
            .join(format!("group{device}.{group}"))
            .join("traffic_class_b");
        Ok(read_sysfs_u32(&path)? != 0)
    }
}

/// One usable work queue: a portal plus its scheduling attributes.
pub struct Queue {
    name: String,
    priority: u32,
    durable: bool,
    portal: Box<dyn Enqueue>,
}

impl Queue {
    /// Wrap an existing portal.
    pub fn new(name: impl Into<String>, priority: u32, durable: bool, portal: Box<dyn Enqueue>) -> Self {
        Self {
            name: name.into(),
            priority,
            durable,
            portal,
        }
    }

    /// Open the character device of `info` and map its portal.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The device cannot be opened (permissions, not found)
    /// - Memory mapping fails
    /// - The queue's group cannot be resolved
    pub fn open(info: &WorkQueueInfo, config: &Config) -> DsaResult<Self> {
        let path = config.queue_device(&info.name);
        let (portal, durable) = portal::open(&path, config.portal_size, || {
            info.read_durability(&config.devices_dir())
        })?;
        Ok(Self::new(info.name.clone(), info.priority, durable, Box::new(portal)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// True if writes through this queue go to durable memory.
    pub fn is_durable(&self) -> bool {
        self.durable
    }

    /// Submit `desc` to the portal.
    ///
    /// # Safety
    ///
    /// See [`Enqueue::enqueue`].
    #[inline]
    pub unsafe fn enqueue(&self, desc: &RawDescriptor) -> bool {
        self.portal.enqueue(desc)
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("durable", &self.durable)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Linux Implementation
// ============================================================================

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
mod portal {
    use super::*;
    use crate::submit::{enqcmd, sfence};
    use std::fs::File;
    use std::os::unix::io::AsRawFd;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory-mapped ENQCMD portal of one shared work queue.
    pub struct MappedPortal {
        portal: *mut u8,
        size: usize,
        /// Next submission offset; cycles through the page in 64-byte steps.
        offset: AtomicUsize,
    }

    // SAFETY: MappedPortal can be sent between threads because:
    // - The portal pointer is valid for the lifetime of the mapping
    // - ENQCMD is atomic with respect to other submitters at the hardware level
    unsafe impl Send for MappedPortal {}

    // SAFETY: Concurrent enqueues only share the atomic offset; the caller
    // guarantees one descriptor in flight per completion record.
    unsafe impl Sync for MappedPortal {}

    /// Map the portal at `path`, then run `finish` to gather the remaining
    /// queue attributes. The mapping is released if `finish` fails.
    pub fn open<T>(
        path: &Path,
        size: usize,
        finish: impl FnOnce() -> DsaResult<T>,
    ) -> DsaResult<(MappedPortal, T)> {
        let file = File::options()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    DsaError::PermissionDenied(path.display().to_string())
                } else {
                    DsaError::Io(e)
                }
            })?;

        // SAFETY: a fresh shared write-only mapping of an open descriptor.
        let mapped = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_POPULATE,
                file.as_raw_fd(),
                0,
            )
        };
        // The mapping outlives the descriptor.
        drop(file);

        if mapped == libc::MAP_FAILED {
            return Err(DsaError::MmapFailed(format!(
                "mmap failed for {}: {}",
                path.display(),
                std::io::Error::last_os_error()
            )));
        }

        let mapped = scopeguard::guard(mapped, |addr| {
            log::warn!("unmapping portal {} after failed queue setup", path.display());
            // SAFETY: `addr` came from the mmap above and is not used after this.
            unsafe { libc::munmap(addr, size) };
        });
        let extra = finish()?;
        let portal = scopeguard::ScopeGuard::into_inner(mapped) as *mut u8;

        Ok((
            MappedPortal {
                portal,
                size,
                offset: AtomicUsize::new(0),
            },
            extra,
        ))
    }

    impl Enqueue for MappedPortal {
        unsafe fn enqueue(&self, desc: &RawDescriptor) -> bool {
            let offset = self.offset.fetch_add(64, Ordering::Relaxed) % self.size;
            sfence();
            enqcmd(self.portal.add(offset), desc)
        }
    }

    impl Drop for MappedPortal {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.portal as *mut libc::c_void, self.size);
            }
        }
    }
}

// ============================================================================
// Non-Linux Stub Implementation
// ============================================================================

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
mod portal {
    use super::*;

    /// Stub portal; never constructed.
    pub struct MappedPortal {
        _private: (),
    }

    impl Enqueue for MappedPortal {
        unsafe fn enqueue(&self, _desc: &RawDescriptor) -> bool {
            false
        }
    }

    pub fn open<T>(
        _path: &Path,
        _size: usize,
        _finish: impl FnOnce() -> DsaResult<T>,
    ) -> DsaResult<(MappedPortal, T)> {
        Err(DsaError::PlatformNotSupported)
    }
}

pub use portal::MappedPortal;
