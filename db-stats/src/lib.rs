//! Per-column statistics: equi-depth and singleton histograms, HyperLogLog
//! distinct counts, and the per-table catalog the plan's cardinality
//! estimator reads from.

pub mod equi_depth;
pub mod histogram;
pub mod hll;
pub mod singleton;

pub use equi_depth::{EquiDepthBin, EquiDepthHistogram, EquiDepthHistogramBuilder};
pub use histogram::{Histogram, HistogramKind};
pub use hll::HyperLogLog;
pub use singleton::{SingletonHistogram, SingletonHistogramBuilder, SINGLETON_DISTINCT_THRESHOLD};

/// Either concrete histogram kind, so a column can carry one without the
/// estimator needing to know which.
#[derive(Clone)]
pub enum AnyHistogram {
    EquiDepth(EquiDepthHistogram),
    Singleton(SingletonHistogram),
}

impl AnyHistogram {
    pub fn as_histogram(&self) -> &dyn Histogram {
        match self {
            AnyHistogram::EquiDepth(h) => h,
            AnyHistogram::Singleton(h) => h,
        }
    }
}

/// Per-table statistics: row count plus, per column index, an optional
/// histogram and a distinct-value estimate. Absent histogram/distinct data
/// (column never profiled, or `update_statistics` never run) is represented
/// with `None`/`0` rather than a panic, matching how the estimator falls
/// back to `1/distinct_count` selectivity when nothing better is known.
#[derive(Clone)]
pub struct Statistics {
    row_count: u64,
    histograms: Vec<Option<AnyHistogram>>,
    distinct_counts: Vec<u64>,
}

impl Statistics {
    pub fn new(column_count: usize) -> Self {
        Self {
            row_count: 0,
            histograms: (0..column_count).map(|_| None).collect(),
            distinct_counts: vec![0; column_count],
        }
    }

    pub fn set_row_count(&mut self, count: u64) {
        self.row_count = count;
    }

    pub fn row_count(&self) -> u64 {
        self.row_count
    }

    pub fn set_histogram(&mut self, index: usize, histogram: AnyHistogram) {
        self.histograms[index] = Some(histogram);
    }

    pub fn histogram(&self, index: usize) -> Option<&dyn Histogram> {
        self.histograms[index].as_ref().map(|h| h.as_histogram())
    }

    /// The typed histogram, when a caller needs the concrete bin data
    /// (persistence) rather than just the `Histogram` trait's query surface.
    pub fn any_histogram(&self, index: usize) -> Option<&AnyHistogram> {
        self.histograms[index].as_ref()
    }

    pub fn set_distinct_count(&mut self, index: usize, count: u64) {
        self.distinct_counts[index] = count;
    }

    pub fn distinct_count(&self, index: usize) -> u64 {
        self.distinct_counts[index]
    }

    pub fn column_count(&self) -> usize {
        self.distinct_counts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_histogram_is_none_not_panic() {
        let stats = Statistics::new(3);
        assert!(stats.histogram(1).is_none());
        assert_eq!(stats.distinct_count(1), 0);
    }
}
