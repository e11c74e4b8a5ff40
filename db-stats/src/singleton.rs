//! Singleton histogram: an exact `value -> count` map, used for low-cardinality
//! CHAR and BOOL columns where an equi-depth cut would throw away precision
//! that's cheap to keep exactly.

use crate::histogram::{Histogram, HistogramKind};
use std::collections::BTreeMap;

/// Threshold below which a column's distinct-value count is kept exactly
/// instead of bucketed.
pub const SINGLETON_DISTINCT_THRESHOLD: u64 = 64;

#[derive(Debug, Clone)]
pub struct SingletonHistogram {
    count: u64,
    data: BTreeMap<i64, u64>,
}

impl SingletonHistogram {
    /// Reassembles a histogram from its persisted `(key, count)` pairs
    /// (persistence restore path).
    pub fn from_parts(count: u64, data: BTreeMap<i64, u64>) -> Self {
        Self { count, data }
    }

    pub fn data(&self) -> &BTreeMap<i64, u64> {
        &self.data
    }

    pub fn width(&self) -> usize {
        self.data.len()
    }
}

impl Histogram for SingletonHistogram {
    fn kind(&self) -> HistogramKind {
        HistogramKind::Singleton
    }

    fn approximate_equals(&self, key: i64) -> u64 {
        self.data.get(&key).copied().unwrap_or(0)
    }

    fn approximate_not_equals(&self, key: i64) -> u64 {
        self.count - self.approximate_equals(key)
    }

    // The source leaves these as range-query stubs returning 0: a singleton
    // histogram only ever backs equality lookups over unordered domains
    // (CHAR, BOOL) where range comparisons aren't meaningful plan inputs.
    fn approximate_lesser(&self, _key: i64) -> u64 {
        0
    }

    fn approximate_lesser_equals(&self, _key: i64) -> u64 {
        0
    }

    fn approximate_greater(&self, _key: i64) -> u64 {
        0
    }

    fn approximate_greater_equals(&self, _key: i64) -> u64 {
        0
    }

    fn approximate_between(&self, _min_key: i64, _max_key: i64) -> u64 {
        0
    }

    fn total_count(&self) -> u64 {
        self.count
    }
}

#[derive(Default)]
pub struct SingletonHistogramBuilder {
    data: BTreeMap<i64, u64>,
}

impl SingletonHistogramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: i64) {
        *self.data.entry(key).or_insert(0) += 1;
    }

    pub fn build(self) -> SingletonHistogram {
        let count = self.data.values().sum();
        SingletonHistogram {
            count,
            data: self.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_each_distinct_value_exactly() {
        let mut builder = SingletonHistogramBuilder::new();
        for _ in 0..3 {
            builder.insert(1);
        }
        builder.insert(2);
        let histogram = builder.build();
        assert_eq!(histogram.approximate_equals(1), 3);
        assert_eq!(histogram.approximate_equals(2), 1);
        assert_eq!(histogram.approximate_equals(3), 0);
        assert_eq!(histogram.total_count(), 4);
    }
}
