// db-kernel: RDTSC-based cycle counting
//
// Tasks may advertise an estimated execution cycle cost (spec §4.1 "Cycles"),
// used by the runtime's `auto` prefetch-distance heuristic. This module
// supplies the calibrated TSC reads that back those estimates and the
// `trace_id`-tagged span timings the tracing subsystem consumes.

use crate::platform::unsafe_ops::{read_tsc, read_tsc_serialized};
use std::sync::atomic::{AtomicU64, Ordering};

static CPU_FREQUENCY: AtomicU64 = AtomicU64::new(0);
static RDTSC_OVERHEAD: AtomicU64 = AtomicU64::new(0);

/// Result of calibrating the TSC against the wall clock.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationResult {
    pub cpu_freq_hz: u64,
    pub rdtsc_overhead_ticks: u64,
    pub ticks_per_ns: f64,
    pub confidence: f64,
}

/// A cycle-accurate stopwatch, started on construction.
pub struct CycleTimer {
    start_ticks: u64,
    overhead: u64,
}

impl CycleTimer {
    #[inline(always)]
    pub fn start() -> Self {
        Self {
            start_ticks: read_tsc(),
            overhead: RDTSC_OVERHEAD.load(Ordering::Relaxed),
        }
    }

    #[inline(always)]
    pub fn start_serialized() -> Self {
        Self {
            start_ticks: read_tsc_serialized(),
            overhead: RDTSC_OVERHEAD.load(Ordering::Relaxed),
        }
    }

    #[inline(always)]
    pub fn elapsed_ticks(&self) -> u64 {
        read_tsc()
            .saturating_sub(self.start_ticks)
            .saturating_sub(self.overhead)
    }

    #[inline(always)]
    pub fn reset(&mut self) {
        self.start_ticks = read_tsc();
    }
}

/// Calibrates the TSC frequency by racing it against `Instant`.
pub fn calibrate_tsc() -> CalibrationResult {
    const CALIBRATION_ROUNDS: usize = 50;
    const CALIBRATION_DURATION_MS: u64 = 5;

    let overhead = measure_rdtsc_overhead();
    RDTSC_OVERHEAD.store(overhead, Ordering::Relaxed);

    let mut frequencies = Vec::with_capacity(CALIBRATION_ROUNDS);
    for _ in 0..CALIBRATION_ROUNDS {
        let start_wall = std::time::Instant::now();
        let start_tsc = read_tsc_serialized();

        while start_wall.elapsed().as_millis() < CALIBRATION_DURATION_MS as u128 {
            std::hint::spin_loop();
        }

        let end_tsc = read_tsc_serialized();
        let elapsed_wall = start_wall.elapsed();

        let ticks = end_tsc.saturating_sub(start_tsc);
        let nanos = elapsed_wall.as_nanos().max(1) as u64;
        let freq_hz = (ticks as f64 * 1_000_000_000.0 / nanos as f64) as u64;
        frequencies.push(freq_hz);
    }

    frequencies.sort_unstable();
    let median_freq = frequencies[frequencies.len() / 2];

    let mean = frequencies.iter().sum::<u64>() as f64 / frequencies.len() as f64;
    let variance = frequencies
        .iter()
        .map(|&f| {
            let diff = f as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / frequencies.len() as f64;
    let std_dev = variance.sqrt();
    let confidence = if std_dev > 0.0 {
        1.0 / (1.0 + std_dev / mean)
    } else {
        1.0
    };

    CPU_FREQUENCY.store(median_freq, Ordering::Relaxed);

    CalibrationResult {
        cpu_freq_hz: median_freq,
        rdtsc_overhead_ticks: overhead,
        ticks_per_ns: median_freq as f64 / 1_000_000_000.0,
        confidence,
    }
}

fn measure_rdtsc_overhead() -> u64 {
    const ROUNDS: usize = 2000;
    let mut measurements = Vec::with_capacity(ROUNDS);

    for _ in 0..100 {
        let _ = read_tsc();
    }

    for _ in 0..ROUNDS {
        let start = read_tsc_serialized();
        std::hint::black_box(read_tsc());
        let end = read_tsc_serialized();
        measurements.push(end.saturating_sub(start));
    }

    measurements.sort_unstable();
    measurements[ROUNDS / 10]
}

/// Cached CPU frequency from the last calibration, or 0 if never calibrated.
pub fn cpu_frequency_hz() -> u64 {
    CPU_FREQUENCY.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_measures_nonzero_work() {
        let timer = CycleTimer::start();
        let mut sum = 0u64;
        for i in 0..1000 {
            sum = sum.wrapping_add(i);
        }
        std::hint::black_box(sum);
        assert!(timer.elapsed_ticks() > 0);
    }

    #[test]
    fn calibration_is_plausible() {
        let result = calibrate_tsc();
        assert!(result.cpu_freq_hz > 100_000_000);
        assert!(result.confidence > 0.0);
    }
}
