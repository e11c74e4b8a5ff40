//! 8-bit-precision HyperLogLog distinct-value counter, one instance per
//! column during `update_statistics`. Every value kind is reduced to a
//! single 64-bit key under a fixed seed before hashing, the same "one hash
//! function over a normalized key" shape the source's builder uses, so
//! INT/BIGINT/BOOL/DECIMAL/DATE all land in the same sketch implementation.

use xxhash_rust::xxh3::xxh3_64_with_seed;

const PRECISION: u32 = 8;
const NUM_REGISTERS: usize = 1 << PRECISION;
const SEED: u64 = 0xDA05B9E7B4;

#[derive(Clone)]
pub struct HyperLogLog {
    registers: [u8; NUM_REGISTERS],
}

impl Default for HyperLogLog {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperLogLog {
    pub fn new() -> Self {
        Self {
            registers: [0; NUM_REGISTERS],
        }
    }

    pub fn insert_int(&mut self, value: i64) {
        self.update(xxh3_64_with_seed(&value.to_le_bytes(), SEED));
    }

    pub fn insert_bytes(&mut self, bytes: &[u8]) {
        self.update(xxh3_64_with_seed(bytes, SEED));
    }

    fn update(&mut self, hash: u64) {
        let index = (hash & (NUM_REGISTERS as u64 - 1)) as usize;
        let remaining = hash >> PRECISION;
        let rank = (remaining.trailing_zeros() + 1).min(64 - PRECISION) as u8;
        self.registers[index] = self.registers[index].max(rank);
    }

    /// Standard HLL harmonic-mean estimator with small/large range
    /// corrections.
    pub fn estimate(&self) -> u64 {
        let m = NUM_REGISTERS as f64;
        let alpha = match NUM_REGISTERS {
            16 => 0.673,
            32 => 0.697,
            64 => 0.709,
            _ => 0.7213 / (1.0 + 1.079 / m),
        };

        let sum: f64 = self.registers.iter().map(|&r| 2f64.powi(-(r as i32))).sum();
        let raw_estimate = alpha * m * m / sum;

        let zero_registers = self.registers.iter().filter(|&&r| r == 0).count();
        if raw_estimate <= 2.5 * m && zero_registers > 0 {
            (m * (m / zero_registers as f64).ln()).round() as u64
        } else {
            raw_estimate.round() as u64
        }
    }

    pub fn merge(&mut self, other: &HyperLogLog) {
        for i in 0..NUM_REGISTERS {
            self.registers[i] = self.registers[i].max(other.registers[i]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimates_within_tolerance_of_known_distinct_count() {
        let mut hll = HyperLogLog::new();
        for i in 0..10_000i64 {
            hll.insert_int(i);
        }
        let estimate = hll.estimate() as f64;
        let error = (estimate - 10_000.0).abs() / 10_000.0;
        assert!(error < 0.1, "estimate {} too far from 10000", estimate);
    }

    #[test]
    fn empty_sketch_estimates_near_zero() {
        let hll = HyperLogLog::new();
        assert!(hll.estimate() < 10);
    }

    #[test]
    fn repeated_values_do_not_inflate_estimate() {
        let mut hll = HyperLogLog::new();
        for _ in 0..10_000 {
            hll.insert_int(42);
        }
        assert!(hll.estimate() <= 5);
    }
}
