// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Discovery configuration.

use std::path::PathBuf;

/// Default sysfs mount point.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys";

/// Default directory holding the work queue character devices.
pub const DEFAULT_DEV_ROOT: &str = "/dev/dsa";

/// Where and how much to discover.
///
/// The defaults match a stock IDXD installation. Tests point both roots at
/// a temporary tree.
///
/// # Example
///
/// ```
/// use dsa_offload::Config;
///
/// let config = Config::default().with_max_devices(2).with_device_prefix("iax");
/// assert_eq!(config.max_devices, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the sysfs tree (`<root>/bus/dsa/devices`).
    pub sysfs_root: PathBuf,
    /// Directory with the `wqD.Q` character devices.
    pub dev_root: PathBuf,
    /// Name prefix of accelerator devices.
    pub device_prefix: String,
    /// Devices kept after discovery.
    pub max_devices: usize,
    /// Queues kept per device.
    pub max_queues_per_device: usize,
    /// Bytes mapped per portal.
    pub portal_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            dev_root: PathBuf::from(DEFAULT_DEV_ROOT),
            device_prefix: "dsa".to_string(),
            max_devices: 8,
            max_queues_per_device: 8,
            portal_size: 4096,
        }
    }
}

impl Config {
    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    pub fn with_dev_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.dev_root = root.into();
        self
    }

    pub fn with_device_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.device_prefix = prefix.into();
        self
    }

    pub fn with_max_devices(mut self, max: usize) -> Self {
        self.max_devices = max;
        self
    }

    pub fn with_max_queues_per_device(mut self, max: usize) -> Self {
        self.max_queues_per_device = max;
        self
    }

    pub fn with_portal_size(mut self, size: usize) -> Self {
        self.portal_size = size;
        self
    }

    /// `<sysfs_root>/bus/dsa/devices`.
    pub fn devices_dir(&self) -> PathBuf {
        self.sysfs_root.join("bus").join("dsa").join("devices")
    }

    /// `<sysfs_root>/bus/node/devices`.
    pub fn nodes_dir(&self) -> PathBuf {
        self.sysfs_root.join("bus").join("node").join("devices")
    }

    /// Character device of a work queue.
    pub fn queue_device(&self, queue: &str) -> PathBuf {
        self.dev_root.join(queue)
    }
}
