//! Optimistic lock: readers never block, validated against a version counter.
//!
//! A writer increments the version to an odd value while holding the lock and
//! back to even on release; a reader snapshots the version before reading and
//! validates it is unchanged (and even) afterward. Retried on mismatch by the
//! caller.

use std::hint;
use std::sync::atomic::{AtomicU32, Ordering};

pub type Version = u32;

const LOCKED_BIT: u32 = 0b10;

pub struct OptimisticLock {
    version: AtomicU32,
}

impl Default for OptimisticLock {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimisticLock {
    pub const fn new() -> Self {
        Self {
            version: AtomicU32::new(0b100),
        }
    }

    /// Spins until the version is not locked, then returns it.
    pub fn read_valid(&self) -> Version {
        let mut version = self.version.load(Ordering::SeqCst);
        while Self::is_locked(version) {
            hint::spin_loop();
            version = self.version.load(Ordering::SeqCst);
        }
        version
    }

    pub fn is_valid(&self, version: Version) -> bool {
        version == self.version.load(Ordering::SeqCst)
    }

    pub fn try_lock(&self) -> bool {
        let version = self.read_valid();
        self.version
            .compare_exchange(
                version,
                version + LOCKED_BIT,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Blocks until the lock is acquired. `single_writer` skips the CAS retry
    /// loop for call sites already serialized by an outer exclusive lock.
    pub fn lock(&self, single_writer: bool) {
        if single_writer {
            self.version.fetch_add(LOCKED_BIT, Ordering::SeqCst);
            return;
        }

        let mut tries: u64 = 1;
        while !self.try_lock() {
            let wait = tries;
            tries += 1;
            for _ in 0..(wait * 32) {
                hint::spin_loop();
                std::sync::atomic::fence(Ordering::SeqCst);
            }
        }
    }

    pub fn unlock(&self) {
        self.version.fetch_add(LOCKED_BIT, Ordering::SeqCst);
    }

    fn is_locked(version: Version) -> bool {
        version & LOCKED_BIT == LOCKED_BIT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_validates_unmodified_snapshot() {
        let lock = OptimisticLock::new();
        let v = lock.read_valid();
        assert!(lock.is_valid(v));
    }

    #[test]
    fn write_invalidates_prior_snapshot() {
        let lock = OptimisticLock::new();
        let v = lock.read_valid();
        lock.lock(true);
        lock.unlock();
        assert!(!lock.is_valid(v));
    }

    #[test]
    fn try_lock_excludes_second_writer() {
        let lock = OptimisticLock::new();
        assert!(lock.try_lock());
        assert!(!lock.try_lock());
        lock.unlock();
        assert!(lock.try_lock());
    }
}
