//! Per-edge finalisation barrier: detects "no more tokens will flow on this
//! edge" so a binary node's build side can hand off to its probe side.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub struct FinalisationBarrier {
    in_flight: AtomicU64,
    producer_done: AtomicBool,
}

impl FinalisationBarrier {
    pub fn new() -> Self {
        Self {
            in_flight: AtomicU64::new(0),
            producer_done: AtomicBool::new(false),
        }
    }

    /// Called on `emit`.
    pub fn token_emitted(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    /// Called after the downstream `consume` for that token returns.
    pub fn token_consumed(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    /// Called once every producing worker has declared it will emit no more.
    pub fn mark_producer_done(&self) {
        self.producer_done.store(true, Ordering::Release);
    }

    /// True once producer-done is set and in-flight has reached zero. The
    /// acquire load pairs with the release stores above so the observer sees
    /// every prior `token_consumed`/`mark_producer_done`.
    pub fn is_finalised(&self) -> bool {
        self.producer_done.load(Ordering::Acquire) && self.in_flight.load(Ordering::Acquire) == 0
    }
}

impl Default for FinalisationBarrier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalises_once_drained_and_done() {
        let barrier = FinalisationBarrier::new();
        barrier.token_emitted();
        barrier.token_emitted();
        assert!(!barrier.is_finalised());

        barrier.mark_producer_done();
        assert!(!barrier.is_finalised());

        barrier.token_consumed();
        assert!(!barrier.is_finalised());

        barrier.token_consumed();
        assert!(barrier.is_finalised());
    }

    #[test]
    fn producer_done_without_drain_does_not_finalise() {
        let barrier = FinalisationBarrier::new();
        barrier.token_emitted();
        barrier.mark_producer_done();
        assert!(!barrier.is_finalised());
    }
}
