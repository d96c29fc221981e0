// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Process-wide device and queue registry.
//!
//! Discovery runs once. Its outcome, including failure, is kept for the
//! lifetime of the registry so that a machine without usable queues pays
//! for discovery exactly once and fails every later hardware submission
//! immediately.

use crate::config::Config;
use crate::device::{discover_devices, Device};
use crate::error::DsaError;
use crate::status::Status;
use std::sync::{Arc, OnceLock};

/// Outcome of discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareSupport {
    /// At least one device with a usable queue was found.
    Available,
    /// Hardware submissions fail with `status`.
    Unsupported { status: Status, reason: String },
}

/// Read-only set of devices.
#[derive(Debug)]
pub struct Registry {
    devices: Vec<Device>,
    support: HardwareSupport,
}

impl Registry {
    /// Discover devices as described by `config`.
    ///
    /// Never fails: a discovery error is recorded as
    /// [`HardwareSupport::Unsupported`].
    pub fn discover(config: &Config) -> Self {
        match discover_devices(config) {
            Ok(devices) => {
                let registry = Self::from_devices(devices);
                match &registry.support {
                    HardwareSupport::Available => log::info!(
                        "DSA registry: {} device(s), {} queue(s)",
                        registry.devices.len(),
                        registry.queue_count()
                    ),
                    HardwareSupport::Unsupported { reason, .. } => {
                        log::info!("DSA registry: {reason}")
                    }
                }
                registry
            }
            Err(e) => {
                let status = match e {
                    DsaError::PlatformNotSupported => Status::LibaccelNotFound,
                    _ => Status::LibaccelError,
                };
                log::info!("DSA registry: hardware path disabled, {e}");
                Self::unsupported(status, e.to_string())
            }
        }
    }

    /// Registry over an explicit device list.
    pub fn from_devices(devices: Vec<Device>) -> Self {
        let support = if devices.is_empty() {
            HardwareSupport::Unsupported {
                status: Status::WorkQueuesNotAvailable,
                reason: "no enabled shared work queue found".to_string(),
            }
        } else {
            HardwareSupport::Available
        };
        Self { devices, support }
    }

    /// Registry without devices that reports `status` for every submission.
    pub fn unsupported(status: Status, reason: impl Into<String>) -> Self {
        Self {
            devices: Vec::new(),
            support: HardwareSupport::Unsupported {
                status,
                reason: reason.into(),
            },
        }
    }

    /// The process-wide registry, discovered with [`Config::default`] on
    /// first use.
    pub fn global() -> Arc<Registry> {
        static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Arc::new(Registry::discover(&Config::default())))
            .clone()
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn support(&self) -> &HardwareSupport {
        &self.support
    }

    pub fn is_available(&self) -> bool {
        self.support == HardwareSupport::Available
    }

    /// Status of a hardware submission that cannot be attempted, `None`
    /// when hardware is available.
    pub fn unavailable_status(&self) -> Option<Status> {
        match &self.support {
            HardwareSupport::Available => None,
            HardwareSupport::Unsupported { status, .. } => Some(*status),
        }
    }

    /// Total number of queues over all devices.
    pub fn queue_count(&self) -> usize {
        self.devices.iter().map(Device::queue_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Capabilities;
    use crate::submit::SimulatedPortal;
    use crate::wq::Queue;
    use std::fs;

    #[test]
    fn test_empty_registry_is_unsupported() {
        let registry = Registry::from_devices(Vec::new());
        assert!(!registry.is_available());
        assert_eq!(registry.unavailable_status(), Some(Status::WorkQueuesNotAvailable));
    }

    #[test]
    fn test_registry_with_device() {
        let device = Device::new(
            "dsa0",
            0,
            Capabilities::default(),
            vec![Queue::new("wq0.0", 1, false, Box::new(SimulatedPortal::new()))],
        );
        let registry = Registry::from_devices(vec![device]);
        assert!(registry.is_available());
        assert_eq!(registry.unavailable_status(), None);
        assert_eq!(registry.queue_count(), 1);
    }

    #[test]
    fn test_missing_bus_records_libaccel_not_found() {
        let config = Config::default().with_sysfs_root("/nonexistent/dsa-offload-registry");
        let registry = Registry::discover(&config);
        assert_eq!(registry.unavailable_status(), Some(Status::LibaccelNotFound));
    }

    #[test]
    fn test_bus_without_queues_records_not_available() {
        let root = std::env::temp_dir().join(format!("dsa-registry-{}", std::process::id()));
        let config = Config::default()
            .with_sysfs_root(&root)
            .with_dev_root(root.join("dev"));
        let dsa0 = config.devices_dir().join("dsa0");
        fs::create_dir_all(&dsa0).unwrap();
        fs::write(dsa0.join("state"), "enabled\n").unwrap();
        fs::write(dsa0.join("gen_cap"), "0x40915f0107\n").unwrap();
        fs::write(dsa0.join("numa_node"), "-1\n").unwrap();
        let wq = config.devices_dir().join("wq0.0");
        fs::create_dir_all(&wq).unwrap();
        fs::write(wq.join("state"), "disabled\n").unwrap();
        fs::write(wq.join("mode"), "shared\n").unwrap();

        let registry = Registry::discover(&config);
        assert!(registry.devices().is_empty());
        assert_eq!(registry.unavailable_status(), Some(Status::WorkQueuesNotAvailable));

        fs::remove_dir_all(&root).unwrap();
    }
}
