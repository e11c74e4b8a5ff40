//! Worker-facing queue types backing the tasking runtime's dispatch paths.
//!
//! A worker owns one [`LocalQueue`] (only that worker touches it, so it needs
//! no synchronization) and one [`RemoteInbox`] that any other worker can push
//! into. [`StealQueue`] is the optional bounded channel a worker publishes
//! surplus work to for other workers to steal from. [`PriorityTiers`] groups
//! same-shaped queues by priority so a worker drains high-priority tiers
//! first.

use crossbeam_queue::{ArrayQueue, SegQueue};
use std::collections::VecDeque;

/// Single-producer, single-consumer queue for a worker's own ready tasks.
/// Only ever touched by the owning worker thread, so it is a plain
/// `VecDeque` with no synchronization.
pub struct LocalQueue<T> {
    items: VecDeque<T>,
}

impl<T> Default for LocalQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LocalQueue<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    pub fn push_back(&mut self, item: T) {
        self.items.push_back(item);
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Multi-producer, single-consumer inbox: any worker can hand a task to
/// another worker by pushing here; only the owning worker drains it.
pub struct RemoteInbox<T> {
    items: SegQueue<T>,
}

impl<T> Default for RemoteInbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RemoteInbox<T> {
    pub fn new() -> Self {
        Self {
            items: SegQueue::new(),
        }
    }

    pub fn push(&self, item: T) {
        self.items.push(item);
    }

    pub fn pop(&self) -> Option<T> {
        self.items.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Bounded multi-producer, multi-consumer queue a worker publishes surplus
/// ready work to, so idle workers can steal instead of going to sleep.
pub struct StealQueue<T> {
    items: ArrayQueue<T>,
}

impl<T> StealQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: ArrayQueue::new(capacity),
        }
    }

    pub fn try_push(&self, item: T) -> Result<(), T> {
        self.items.push(item)
    }

    pub fn steal(&self) -> Option<T> {
        self.items.pop()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Fixed tiers of same-shaped queues indexed by a contiguous priority range
/// `0..TIERS`, drained highest tier first.
pub struct PriorityTiers<T, const TIERS: usize> {
    queues: [LocalQueue<T>; TIERS],
}

impl<T, const TIERS: usize> Default for PriorityTiers<T, TIERS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const TIERS: usize> PriorityTiers<T, TIERS> {
    pub fn new() -> Self {
        Self {
            queues: std::array::from_fn(|_| LocalQueue::new()),
        }
    }

    pub fn push(&mut self, priority: usize, item: T) {
        self.queues[priority].push_back(item);
    }

    /// Pops from the highest-numbered nonempty tier.
    pub fn pop_highest(&mut self) -> Option<T> {
        for tier in (0..TIERS).rev() {
            if let Some(item) = self.queues[tier].pop_front() {
                return Some(item);
            }
        }
        None
    }

    pub fn tier_mut(&mut self, priority: usize) -> &mut LocalQueue<T> {
        &mut self.queues[priority]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_queue_is_fifo() {
        let mut q = LocalQueue::new();
        q.push_back(1);
        q.push_back(2);
        assert_eq!(q.pop_front(), Some(1));
        assert_eq!(q.pop_front(), Some(2));
        assert_eq!(q.pop_front(), None);
    }

    #[test]
    fn remote_inbox_crosses_threads() {
        let inbox = std::sync::Arc::new(RemoteInbox::new());
        let producer = std::sync::Arc::clone(&inbox);
        let handle = std::thread::spawn(move || {
            for i in 0..100 {
                producer.push(i);
            }
        });
        handle.join().unwrap();

        let mut drained = 0;
        while inbox.pop().is_some() {
            drained += 1;
        }
        assert_eq!(drained, 100);
    }

    #[test]
    fn priority_tiers_drain_highest_first() {
        let mut tiers: PriorityTiers<&'static str, 3> = PriorityTiers::new();
        tiers.push(0, "low");
        tiers.push(2, "high");
        tiers.push(1, "mid");

        assert_eq!(tiers.pop_highest(), Some("high"));
        assert_eq!(tiers.pop_highest(), Some("mid"));
        assert_eq!(tiers.pop_highest(), Some("low"));
        assert_eq!(tiers.pop_highest(), None);
    }

    #[test]
    fn steal_queue_respects_capacity() {
        let q: StealQueue<u32> = StealQueue::new(2);
        assert!(q.try_push(1).is_ok());
        assert!(q.try_push(2).is_ok());
        assert!(q.try_push(3).is_err());
        assert_eq!(q.steal(), Some(1));
    }
}
