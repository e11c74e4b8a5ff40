//! Worker topology: maps worker ids (0..N, the indices the runtime dispatches
//! tasks by) onto physical core ids, tracking NUMA membership and SMT sibling
//! pairs so the runtime can place a worker's tasks and memory on the same
//! node and avoid scheduling both SMT siblings as if they were independent
//! cores.

use std::fmt;

/// Compile-time cap on the number of workers a single runtime instance can
/// host. Matches the fixed-size worker arrays used throughout the runtime.
pub const MAX_CORES: usize = 128;

/// Ordering strategy used when building a [`CoreSet`] from the system's raw
/// core enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOrder {
    /// Use the system's native core numbering unchanged.
    Ascending,
    /// Group cores by NUMA node before assigning worker ids.
    NumaAware,
    /// Assign worker ids to all physical cores first, then to their SMT
    /// sibling threads.
    PhysicalThenSmt,
}

#[derive(Debug, Clone, Copy)]
struct CoreInfo {
    core_id: u16,
    numa_node: u8,
    is_smt: bool,
    sibling_core_id: Option<u16>,
}

/// The set of cores a runtime instance is pinned to, with worker-id to
/// core-id mapping and SMT/NUMA bookkeeping derived from it.
pub struct CoreSet {
    worker_core_map: Vec<u16>,
    worker_sibling_map: Vec<Option<u16>>,
    is_worker_on_smt_thread: Vec<bool>,
    numa_nodes: std::collections::BTreeSet<u8>,
}

impl CoreSet {
    /// Builds a core set by querying the host for `count` cores.
    pub fn build(count: u16, order: WorkerOrder) -> Self {
        let available = Self::enumerate_cores();
        let ordered = Self::apply_order(available, order);
        Self::from_core_ids(ordered.into_iter().take(count as usize).collect())
    }

    /// Builds a core set using every core the host reports.
    pub fn build_all(order: WorkerOrder) -> Self {
        let cores = num_cpus::get() as u16;
        Self::build(cores, order)
    }

    fn from_core_ids(core_ids: Vec<CoreInfo>) -> Self {
        let mut set = CoreSet {
            worker_core_map: Vec::with_capacity(core_ids.len()),
            worker_sibling_map: Vec::with_capacity(core_ids.len()),
            is_worker_on_smt_thread: Vec::with_capacity(core_ids.len()),
            numa_nodes: std::collections::BTreeSet::new(),
        };

        for info in core_ids {
            set.emplace_back(info);
        }

        set
    }

    fn emplace_back(&mut self, info: CoreInfo) {
        let worker_id = self.worker_core_map.len() as u16;

        self.worker_core_map.push(info.core_id);
        self.worker_sibling_map.push(None);
        self.is_worker_on_smt_thread.push(info.is_smt);

        if info.is_smt {
            if let Some(sibling_core_id) = info.sibling_core_id {
                for sibling_worker_id in 0..worker_id {
                    if self.worker_core_map[sibling_worker_id as usize] == sibling_core_id {
                        self.worker_sibling_map[worker_id as usize] = Some(sibling_worker_id);
                        self.worker_sibling_map[sibling_worker_id as usize] = Some(worker_id);
                        break;
                    }
                }
            }
        }

        self.numa_nodes.insert(info.numa_node);
    }

    pub fn count_cores(&self) -> u16 {
        self.worker_core_map.len() as u16
    }

    pub fn numa_node_count(&self) -> u16 {
        self.numa_nodes.len() as u16
    }

    pub fn core_id(&self, worker_id: u16) -> u16 {
        self.worker_core_map[worker_id as usize]
    }

    pub fn is_smt_worker(&self, worker_id: u16) -> bool {
        self.is_worker_on_smt_thread[worker_id as usize]
    }

    pub fn sibling_worker_id(&self, worker_id: u16) -> Option<u16> {
        self.worker_sibling_map[worker_id as usize]
    }

    pub fn has_core_of_numa_node(&self, numa_node_id: u8) -> bool {
        self.numa_nodes.contains(&numa_node_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.worker_core_map.iter().copied()
    }

    fn enumerate_cores() -> Vec<CoreInfo> {
        let count = num_cpus::get() as u16;
        let physical = num_cpus::get_physical() as u16;
        let smt_ratio = if physical > 0 { count / physical } else { 1 };

        (0..count)
            .map(|core_id| {
                let is_smt = smt_ratio > 1 && core_id >= physical;
                let sibling_core_id = if is_smt {
                    Some(core_id - physical)
                } else if smt_ratio > 1 && core_id + physical < count {
                    Some(core_id + physical)
                } else {
                    None
                };
                CoreInfo {
                    core_id,
                    numa_node: 0,
                    is_smt,
                    sibling_core_id,
                }
            })
            .collect()
    }

    fn apply_order(mut cores: Vec<CoreInfo>, order: WorkerOrder) -> Vec<CoreInfo> {
        match order {
            WorkerOrder::Ascending => cores,
            WorkerOrder::NumaAware => {
                cores.sort_by_key(|c| (c.numa_node, c.core_id));
                cores
            }
            WorkerOrder::PhysicalThenSmt => {
                cores.sort_by_key(|c| (c.is_smt, c.core_id));
                cores
            }
        }
    }
}

impl fmt::Display for CoreSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CoreSet[{} workers, {} NUMA nodes]", self.count_cores(), self.numa_node_count())
    }
}
