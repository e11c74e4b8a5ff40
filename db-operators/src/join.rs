//! Join operators. Nested-loops accepts an arbitrary predicate; hash,
//! radix, and filtered-radix are restricted to equi-join columns and share
//! the same per-partition hash-table build/probe algorithm — the only
//! difference between the three is how the runtime distributes build
//! partitions across workers (spec §4.7 "Join"), so `JoinMethod` is carried
//! as a tag rather than three separate implementations, as in grouped
//! aggregation.

use crate::expr::{eval_with, Expr};
use db_dataflow::{AccessIntention, Annotation, Arity, DataflowNode, Emitter, NodeId, RecordSet, Target, Token};
use db_kernel::error::ExecutionError;
use db_storage::{PaxTile, RowView, Schema, Value, TUPLES_PER_TILE};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Above this estimated build-side cardinality the plan picks radix over
/// hash, mirroring `choose_aggregation_method`'s threshold for grouping.
pub const HASH_JOIN_CARDINALITY_THRESHOLD: u64 = 100_000;

/// Bit width of the filtered-radix build-side membership filter.
const BLOOM_BITS: usize = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMethod {
    NestedLoops,
    Hash,
    Radix,
    FilteredRadix,
}

/// Picks a join method the way `PhysicalOperatorRule` does: a predicate that
/// isn't a pure conjunction/disjunction of equalities can only run as
/// nested-loops; equi-joins pick hash or radix by estimated build-side
/// cardinality, and radix additionally upgrades to a bloom-filtered probe
/// once the probe side dwarfs the build side (spec SUPPLEMENTED FEATURES,
/// bloom-filtered radix join).
pub fn choose_join_method(has_only_equal_comparison: bool, build_cardinality: u64, probe_cardinality: u64) -> JoinMethod {
    if !has_only_equal_comparison {
        return JoinMethod::NestedLoops;
    }
    if build_cardinality <= HASH_JOIN_CARDINALITY_THRESHOLD {
        return JoinMethod::Hash;
    }
    if probe_cardinality > build_cardinality.saturating_mul(8) {
        JoinMethod::FilteredRadix
    } else {
        JoinMethod::Radix
    }
}

/// Which side of the join an output column is copied from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputColumn {
    Build(usize),
    Probe(usize),
}

fn bloom_index(key: i64) -> usize {
    let mut h = key as u64;
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51afd7_ed558ccd);
    h ^= h >> 33;
    (h as usize) % BLOOM_BITS
}

fn bloom_insert(bits: &mut [u64], key: i64) {
    let idx = bloom_index(key);
    bits[idx / 64] |= 1 << (idx % 64);
}

fn bloom_maybe_present(bits: &[u64], key: i64) -> bool {
    let idx = bloom_index(key);
    bits[idx / 64] & (1 << (idx % 64)) != 0
}

enum BuildState {
    NestedLoops(Vec<Vec<Value>>),
    Hashed {
        build_keys: Vec<usize>,
        probe_keys: Vec<usize>,
        table: FxHashMap<Vec<i64>, Vec<Vec<Value>>>,
        /// A coarse membership filter over build keys, `FilteredRadix` only;
        /// lets the probe side reject the common non-matching case with one
        /// bit test before touching the hash table.
        bloom: Option<Vec<u64>>,
    },
}

/// A binary dataflow node: input 0 is the build edge, input 1 is the probe
/// edge. Every build-side row is retained in full (not just the output
/// projection) so a nested-loops predicate can reference any build column.
pub struct Join {
    method: JoinMethod,
    predicate: Option<Expr>,
    build_column_count: usize,
    output_columns: Vec<OutputColumn>,
    output_schema: Arc<Schema>,
    successor: NodeId,
    state: Mutex<BuildState>,
}

impl Join {
    pub fn nested_loops(
        predicate: Expr,
        build_column_count: usize,
        output_columns: Vec<OutputColumn>,
        output_schema: Arc<Schema>,
        successor: NodeId,
    ) -> Self {
        Self {
            method: JoinMethod::NestedLoops,
            predicate: Some(predicate),
            build_column_count,
            output_columns,
            output_schema,
            successor,
            state: Mutex::new(BuildState::NestedLoops(Vec::new())),
        }
    }

    pub fn equi(
        method: JoinMethod,
        build_keys: Vec<usize>,
        probe_keys: Vec<usize>,
        build_column_count: usize,
        output_columns: Vec<OutputColumn>,
        output_schema: Arc<Schema>,
        successor: NodeId,
    ) -> Self {
        debug_assert_ne!(method, JoinMethod::NestedLoops, "equi-join methods only");
        let bloom = matches!(method, JoinMethod::FilteredRadix).then(|| vec![0u64; BLOOM_BITS / 64]);
        Self {
            method,
            predicate: None,
            build_column_count,
            output_columns,
            output_schema,
            successor,
            state: Mutex::new(BuildState::Hashed {
                build_keys,
                probe_keys,
                table: FxHashMap::default(),
                bloom,
            }),
        }
    }

    pub fn method(&self) -> JoinMethod {
        self.method
    }

    fn project(&self, build_row: &[Value], probe_view: &RowView<'_>) -> Vec<Value> {
        self.output_columns
            .iter()
            .map(|oc| match oc {
                OutputColumn::Build(i) => build_row[*i].clone(),
                OutputColumn::Probe(i) => probe_view.get(*i),
            })
            .collect()
    }
}

impl DataflowNode for Join {
    fn arity(&self) -> Arity {
        Arity::Binary
    }

    fn consume(
        &self,
        worker_id: u8,
        input_index: u8,
        token: Token,
        emitter: &mut dyn Emitter,
    ) -> Result<(), ExecutionError> {
        let tile = &token.record_set.tile;

        if input_index == 0 {
            let mut state = self.state.lock();
            for row in 0..tile.size() {
                if !token.record_set.is_live(row as usize) {
                    continue;
                }
                let view = tile.view(row);
                let values: Vec<Value> = (0..tile.schema().column_count()).map(|c| view.get(c)).collect();
                match &mut *state {
                    BuildState::NestedLoops(rows) => rows.push(values),
                    BuildState::Hashed { build_keys, table, bloom, .. } => {
                        let key: Option<Vec<i64>> = build_keys.iter().map(|&c| values[c].as_histogram_key()).collect();
                        if let Some(key) = key {
                            if let Some(bits) = bloom {
                                for &k in &key {
                                    bloom_insert(bits, k);
                                }
                            }
                            table.entry(key).or_default().push(values);
                        }
                    }
                }
            }
            return Ok(());
        }

        let mut output_rows: Vec<Vec<Value>> = Vec::new();
        {
            let state = self.state.lock();
            for row in 0..tile.size() {
                if !token.record_set.is_live(row as usize) {
                    continue;
                }
                let probe_view = tile.view(row);
                match &*state {
                    BuildState::NestedLoops(build_rows) => {
                        let predicate = self
                            .predicate
                            .as_ref()
                            .expect("nested-loops join always carries a predicate");
                        let build_count = self.build_column_count;
                        for build_row in build_rows {
                            let matched = matches!(
                                eval_with(predicate, &|c| if c < build_count {
                                    build_row[c].clone()
                                } else {
                                    probe_view.get(c - build_count)
                                })?,
                                Value::Bool(true)
                            );
                            if matched {
                                output_rows.push(self.project(build_row, &probe_view));
                            }
                        }
                    }
                    BuildState::Hashed { probe_keys, table, bloom, .. } => {
                        let key: Option<Vec<i64>> = probe_keys.iter().map(|&c| probe_view.get(c).as_histogram_key()).collect();
                        let Some(key) = key else { continue };
                        if let Some(bits) = bloom {
                            if !key.iter().all(|k| bloom_maybe_present(bits, *k)) {
                                continue;
                            }
                        }
                        if let Some(build_rows) = table.get(&key) {
                            for build_row in build_rows {
                                output_rows.push(self.project(build_row, &probe_view));
                            }
                        }
                    }
                }
            }
        }

        for chunk in output_rows.chunks(TUPLES_PER_TILE) {
            let mut out = PaxTile::new(self.output_schema.clone());
            for row_values in chunk {
                let mut row = out.allocate().expect("chunk sized to tile capacity");
                for (col, v) in row_values.iter().enumerate() {
                    row.set(col, v);
                }
            }
            emitter.emit(
                worker_id,
                self.successor,
                Token::new(RecordSet::new(Arc::new(out)), Annotation::new(Target::Local, AccessIntention::ReadOnly)),
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Comparison;
    use db_storage::{Column, ColumnType};

    struct Collector(Vec<Token>);
    impl Emitter for Collector {
        fn emit(&mut self, _w: u8, _f: NodeId, t: Token) {
            self.0.push(t);
        }
    }

    fn build_tile(values: &[(i32, i32)]) -> Arc<PaxTile> {
        let schema = Arc::new(Schema::new(vec![
            Column::new("id", ColumnType::Int32),
            Column::new("v", ColumnType::Int32),
        ]));
        let mut tile = PaxTile::new(schema);
        for (id, v) in values {
            let mut row = tile.allocate().unwrap();
            row.set(0, &Value::Int32(*id));
            row.set(1, &Value::Int32(*v));
        }
        Arc::new(tile)
    }

    fn probe_tile(values: &[(i32, i32)]) -> Arc<PaxTile> {
        build_tile(values)
    }

    fn token_for(tile: Arc<PaxTile>) -> Token {
        Token::new(RecordSet::new(tile), Annotation::new(Target::Local, AccessIntention::ReadOnly))
    }

    #[test]
    fn hash_join_matches_equal_keys() {
        let output_schema = Arc::new(Schema::new(vec![
            Column::new("build_v", ColumnType::Int32),
            Column::new("probe_v", ColumnType::Int32),
        ]));
        let join = Join::equi(
            JoinMethod::Hash,
            vec![0],
            vec![0],
            2,
            vec![OutputColumn::Build(1), OutputColumn::Probe(1)],
            output_schema,
            NodeId(1),
        );

        let mut emitter = Collector(Vec::new());
        join.consume(0, 0, token_for(build_tile(&[(1, 100), (2, 200)])), &mut emitter).unwrap();
        join.consume(0, 1, token_for(probe_tile(&[(1, 7), (3, 9)])), &mut emitter).unwrap();

        assert_eq!(emitter.0.len(), 1);
        let out = &emitter.0[0].record_set.tile;
        assert_eq!(out.size(), 1);
        assert_eq!(out.view(0).get(0), Value::Int32(100));
        assert_eq!(out.view(0).get(1), Value::Int32(7));
    }

    #[test]
    fn filtered_radix_rejects_non_matching_probe_via_bloom() {
        let output_schema = Arc::new(Schema::new(vec![Column::new("build_v", ColumnType::Int32)]));
        let join = Join::equi(
            JoinMethod::FilteredRadix,
            vec![0],
            vec![0],
            2,
            vec![OutputColumn::Build(1)],
            output_schema,
            NodeId(1),
        );

        let mut emitter = Collector(Vec::new());
        join.consume(0, 0, token_for(build_tile(&[(1, 100)])), &mut emitter).unwrap();
        join.consume(0, 1, token_for(probe_tile(&[(999, 0)])), &mut emitter).unwrap();
        assert!(emitter.0.is_empty());
    }

    #[test]
    fn nested_loops_supports_non_equality_predicate() {
        let output_schema = Arc::new(Schema::new(vec![
            Column::new("build_v", ColumnType::Int32),
            Column::new("probe_v", ColumnType::Int32),
        ]));
        // build.v < probe.v — column 1 on the build side, column 3 on the
        // combined row (build has 2 columns, so probe column 1 is index 3).
        let predicate = Expr::Compare(Comparison::Lt, Box::new(Expr::column(1)), Box::new(Expr::column(3)));
        let join = Join::nested_loops(
            predicate,
            2,
            vec![OutputColumn::Build(1), OutputColumn::Probe(1)],
            output_schema,
            NodeId(1),
        );

        let mut emitter = Collector(Vec::new());
        join.consume(0, 0, token_for(build_tile(&[(1, 5)])), &mut emitter).unwrap();
        join.consume(0, 1, token_for(probe_tile(&[(1, 10), (2, 1)])), &mut emitter).unwrap();

        assert_eq!(emitter.0.len(), 1);
        let out = &emitter.0[0].record_set.tile;
        assert_eq!(out.size(), 1);
        assert_eq!(out.view(0).get(1), Value::Int32(10));
    }
}
