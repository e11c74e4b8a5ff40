//! The configuration schema itself: worker topology, prefetch depth,
//! ordering policy, epoch timer interval, server port, and persistence path.

use db_kernel::topology::{WorkerOrder, MAX_CORES};
use serde::{Deserialize, Serialize};

/// The prefetch pipeline's ring depth (spec §4.1): either a fixed depth or
/// `auto`, in which case the runtime chooses per-operator from measured
/// cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefetchDepth {
    Auto,
    Fixed(u8),
}

impl Default for PrefetchDepth {
    fn default() -> Self {
        PrefetchDepth::Auto
    }
}

/// Mirrors [`db_kernel::topology::WorkerOrder`] in a serde-friendly shape so
/// a config file can name the ordering policy without pulling in runtime
/// topology detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderingPolicy {
    Ascending,
    NumaAware,
    PhysicalThenSmt,
}

impl Default for OrderingPolicy {
    fn default() -> Self {
        OrderingPolicy::Ascending
    }
}

impl From<OrderingPolicy> for WorkerOrder {
    fn from(policy: OrderingPolicy) -> Self {
        match policy {
            OrderingPolicy::Ascending => WorkerOrder::Ascending,
            OrderingPolicy::NumaAware => WorkerOrder::NumaAware,
            OrderingPolicy::PhysicalThenSmt => WorkerOrder::PhysicalThenSmt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Number of workers to bind, one OS thread per core-set entry.
    pub cores: usize,
    pub prefetch_depth: PrefetchDepth,
    pub ordering: OrderingPolicy,
    /// Global epoch counter tick interval (spec §4.4 "every few ms").
    pub epoch_interval_ms: u64,
    pub server_port: u16,
    /// Path a `Database` is restored from / persisted to (spec §6).
    pub persistence_path: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            cores: num_cpus_fallback(),
            prefetch_depth: PrefetchDepth::default(),
            ordering: OrderingPolicy::default(),
            epoch_interval_ms: 4,
            server_port: 9876,
            persistence_path: None,
        }
    }
}

fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cores == 0 {
            return Err(ConfigError::Validation("cores must be at least 1".into()));
        }
        if self.cores > MAX_CORES {
            return Err(ConfigError::Validation(format!(
                "cores ({}) exceeds the compile-time cap of {}",
                self.cores, MAX_CORES
            )));
        }
        if let PrefetchDepth::Fixed(depth) = self.prefetch_depth {
            if depth as usize > crate::PREFETCH_MAX_DEPTH {
                return Err(ConfigError::Validation(format!(
                    "prefetch_depth ({}) exceeds the maximum ring depth of {}",
                    depth,
                    crate::PREFETCH_MAX_DEPTH
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(String),
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    #[error("invalid configuration: {0}")]
    Validation(String),
    #[error("io error: {0}")]
    Io(String),
}
