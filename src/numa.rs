// Intel Data Streaming Accelerator (DSA) Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! NUMA node resolution for the calling thread.
//!
//! The CPU-to-node map is read from `/sys/bus/node/devices/node*/cpulist`
//! once per process. CPUs missing from the map belong to node 0.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Job hint: pick the node of the submitting thread.
pub const NUMA_ANY: u32 = u32::MAX;

/// No preference: every device is eligible.
pub const NUMA_NONE: u32 = u32::MAX - 1;

/// CPU to NUMA node map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NumaTopology {
    nodes: HashMap<u32, u32>,
}

impl NumaTopology {
    /// Build from `(node, cpulist)` pairs.
    pub fn from_cpulists<'a>(lists: impl IntoIterator<Item = (u32, &'a str)>) -> Self {
        let mut nodes = HashMap::new();
        for (node, list) in lists {
            for cpu in parse_cpulist(list) {
                nodes.insert(cpu, node);
            }
        }
        Self { nodes }
    }

    /// Read `<dir>/nodeN/cpulist` for every node directory in `dir`.
    ///
    /// A missing or unreadable directory yields an empty topology.
    pub fn from_sysfs(dir: &Path) -> Self {
        let Ok(entries) = fs::read_dir(dir) else {
            log::debug!("no NUMA topology at {}", dir.display());
            return Self::default();
        };

        let mut lists = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(node) = name.strip_prefix("node").and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            if let Ok(list) = fs::read_to_string(entry.path().join("cpulist")) {
                lists.push((node, list));
            }
        }
        Self::from_cpulists(lists.iter().map(|(node, list)| (*node, list.as_str())))
    }

    /// Node of `cpu`, 0 when unknown.
    pub fn node_of(&self, cpu: u32) -> u32 {
        self.nodes.get(&cpu).copied().unwrap_or(0)
    }

    /// Number of CPUs in the map.
    pub fn cpu_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Parse a kernel CPU list such as `"0-3,8-11,16"`.
///
/// Malformed ranges are skipped.
pub fn parse_cpulist(list: &str) -> Vec<u32> {
    let mut cpus = Vec::new();
    for part in list.trim().split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                if let (Ok(lo), Ok(hi)) = (lo.parse::<u32>(), hi.parse::<u32>()) {
                    cpus.extend(lo..=hi);
                }
            }
            None => {
                if let Ok(cpu) = part.parse::<u32>() {
                    cpus.push(cpu);
                }
            }
        }
    }
    cpus
}

fn topology() -> &'static NumaTopology {
    static TOPOLOGY: OnceLock<NumaTopology> = OnceLock::new();
    TOPOLOGY.get_or_init(|| NumaTopology::from_sysfs(Path::new("/sys/bus/node/devices")))
}

/// CPU the calling thread runs on.
#[cfg(target_os = "linux")]
pub fn current_cpu() -> Option<u32> {
    // SAFETY: sched_getcpu has no preconditions.
    let cpu = unsafe { libc::sched_getcpu() };
    u32::try_from(cpu).ok()
}

#[cfg(not(target_os = "linux"))]
pub fn current_cpu() -> Option<u32> {
    None
}

/// Node of the calling thread, or [`NUMA_NONE`] when it cannot be told.
pub fn resolve() -> u32 {
    match current_cpu() {
        Some(cpu) => topology().node_of(cpu),
        None => NUMA_NONE,
    }
}

/// Turn a job hint into the node used for device selection.
pub fn resolve_hint(hint: u32) -> u32 {
    if hint == NUMA_ANY {
        resolve()
    } else {
        hint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpulist() {
        assert_eq!(parse_cpulist("0-3,8-9\n"), vec![0, 1, 2, 3, 8, 9]);
        assert_eq!(parse_cpulist("5"), vec![5]);
        assert_eq!(parse_cpulist(""), Vec::<u32>::new());
        assert_eq!(parse_cpulist("x,2"), vec![2]);
    }

    #[test]
    fn test_node_of() {
        let topo = NumaTopology::from_cpulists([(0, "0-3"), (1, "4-7")]);
        assert_eq!(topo.node_of(2), 0);
        assert_eq!(topo.node_of(5), 1);
        assert_eq!(topo.node_of(99), 0);
        assert_eq!(topo.cpu_count(), 8);
    }

    #[test]
    fn test_from_sysfs() {
        let dir = std::env::temp_dir().join(format!("dsa-numa-{}", std::process::id()));
        for (node, list) in [(0, "0-1"), (1, "2-3")] {
            let path = dir.join(format!("node{node}"));
            fs::create_dir_all(&path).unwrap();
            fs::write(path.join("cpulist"), list).unwrap();
        }
        fs::create_dir_all(dir.join("power")).unwrap();

        let topo = NumaTopology::from_sysfs(&dir);
        assert_eq!(topo.node_of(3), 1);
        assert_eq!(topo.node_of(1), 0);
        assert_eq!(topo, NumaTopology::from_sysfs(&dir));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_resolve_is_stable_for_explicit_hint() {
        assert_eq!(resolve_hint(3), 3);
        assert_eq!(resolve_hint(NUMA_NONE), NUMA_NONE);
    }
}
