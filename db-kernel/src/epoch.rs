//! Epoch-based reclamation for tiles and plan nodes the runtime cannot free
//! the instant their last reader drops a reference, because other workers
//! may still hold a [`crate::resource::ResourcePointer`] into them.
//!
//! A global epoch counter advances periodically. Each worker publishes the
//! epoch it last observed before touching shared state. An object logically
//! removed in epoch `e` is only physically freed once every worker's
//! published epoch has moved past `e` — at that point no in-flight reader
//! could still be dereferencing it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub type Epoch = u64;

/// A value queued for reclamation once it is no longer possibly visible.
struct Garbage<T> {
    removed_at: Epoch,
    value: T,
}

/// Tracks the global epoch and each worker's last-observed epoch, and holds
/// deferred-free lists until reclamation is safe.
pub struct EpochManager<T> {
    global_epoch: AtomicU64,
    local_epochs: Vec<AtomicU64>,
    garbage: Mutex<Vec<Garbage<T>>>,
}

impl<T> EpochManager<T> {
    pub fn new(worker_count: usize) -> Self {
        Self {
            global_epoch: AtomicU64::new(0),
            local_epochs: (0..worker_count).map(|_| AtomicU64::new(u64::MAX)).collect(),
            garbage: Mutex::new(Vec::new()),
        }
    }

    /// Advances the global epoch. Called periodically by a dedicated epoch
    /// task, not by every worker.
    pub fn advance(&self) -> Epoch {
        self.global_epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_epoch(&self) -> Epoch {
        self.global_epoch.load(Ordering::SeqCst)
    }

    /// Called by a worker before it begins touching shared, possibly-freed
    /// state; publishes the epoch it is now operating in.
    pub fn enter(&self, worker_id: usize) -> Epoch {
        let epoch = self.current_epoch();
        self.local_epochs[worker_id].store(epoch, Ordering::SeqCst);
        epoch
    }

    /// Called by a worker once it is done touching shared state, so it does
    /// not block reclamation while idle.
    pub fn exit(&self, worker_id: usize) {
        self.local_epochs[worker_id].store(u64::MAX, Ordering::SeqCst);
    }

    fn min_local_epoch(&self) -> Epoch {
        self.local_epochs
            .iter()
            .map(|e| e.load(Ordering::SeqCst))
            .min()
            .unwrap_or(u64::MAX)
    }

    /// Defers `value`'s destruction until no worker could still observe it.
    pub fn defer(&self, value: T) {
        let removed_at = self.current_epoch();
        self.garbage.lock().unwrap().push(Garbage { removed_at, value });
    }

    /// Physically drops every garbage entry whose removal epoch is behind
    /// every worker's currently published epoch. Returns the count reclaimed.
    pub fn reclaim(&self) -> usize {
        let min_epoch = self.min_local_epoch();
        let mut garbage = self.garbage.lock().unwrap();
        let before = garbage.len();
        garbage.retain(|item| item.removed_at >= min_epoch);
        before - garbage.len()
    }

    /// Drops all pending garbage unconditionally. Only safe once the runtime
    /// is fully quiesced (shutdown).
    pub fn reclaim_all(&self) {
        self.garbage.lock().unwrap().clear();
    }

    pub fn pending_garbage(&self) -> usize {
        self.garbage.lock().unwrap().len()
    }
}
