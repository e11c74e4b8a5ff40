//! Simple (no grouping) and grouped (hash/radix) aggregation.
//!
//! Grouped aggregation's physical method only changes how group partitions
//! are distributed across workers by the runtime (hash-aggregation keeps a
//! single worker-local table; radix-aggregation partitions the key space so
//! each partition's table is owned and processed by one worker); the
//! per-partition accumulation algorithm below is identical for both, so
//! `AggregationMethod` is carried as a tag the plan's `PhysicalOperatorRule`
//! sets (spec §4.10.l) rather than two separate accumulator implementations.

use db_dataflow::{AccessIntention, Annotation, Arity, DataflowNode, Emitter, NodeId, RecordSet, Target, Token};
use db_kernel::error::ExecutionError;
use db_storage::{PaxTile, Schema, Value};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Above this estimated group cardinality the plan picks radix over hash
/// (spec §4.7 "Aggregation (grouped)").
pub const HASH_AGGREGATION_CARDINALITY_THRESHOLD: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMethod {
    Hash,
    Radix,
}

pub fn choose_aggregation_method(estimated_group_cardinality: u64) -> AggregationMethod {
    if estimated_group_cardinality <= HASH_AGGREGATION_CARDINALITY_THRESHOLD {
        AggregationMethod::Hash
    } else {
        AggregationMethod::Radix
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Sum,
    Count,
    Min,
    Max,
    Avg,
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    sum: i64,
    count: u64,
    min: Option<i64>,
    max: Option<i64>,
}

impl Accumulator {
    fn update(&mut self, value: &Value) {
        if value.is_null() {
            return;
        }
        let key = value.as_histogram_key().unwrap_or(0);
        self.sum += key;
        self.count += 1;
        self.min = Some(self.min.map_or(key, |m| m.min(key)));
        self.max = Some(self.max.map_or(key, |m| m.max(key)));
    }

    /// Aggregation over an empty input: `COUNT = 0`, every other aggregate
    /// is typed `NULL` (spec §8 boundary behaviours).
    fn finalize(&self, func: AggregateFunc, output_type: db_storage::ColumnType) -> Value {
        match func {
            AggregateFunc::Count => Value::Int64(self.count as i64),
            _ if self.count == 0 => Value::Null(output_type),
            AggregateFunc::Sum => Value::Int64(self.sum),
            AggregateFunc::Min => Value::Int64(self.min.unwrap()),
            AggregateFunc::Max => Value::Int64(self.max.unwrap()),
            AggregateFunc::Avg => Value::Int64(self.sum / self.count as i64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateSpec {
    pub func: AggregateFunc,
    pub input_column: usize,
}

/// Build side: a fixed-size accumulator per aggregate. Emits one row once
/// all inputs are consumed (`on_build_complete`).
pub struct SimpleAggregation {
    specs: Vec<AggregateSpec>,
    output_schema: Arc<Schema>,
    successor: NodeId,
    state: Mutex<Vec<Accumulator>>,
}

impl SimpleAggregation {
    pub fn new(specs: Vec<AggregateSpec>, output_schema: Arc<Schema>, successor: NodeId) -> Self {
        let state = vec![Accumulator::default(); specs.len()];
        Self {
            specs,
            output_schema,
            successor,
            state: Mutex::new(state),
        }
    }
}

impl DataflowNode for SimpleAggregation {
    fn arity(&self) -> Arity {
        Arity::Unary
    }

    fn consume(
        &self,
        _worker_id: u8,
        _input_index: u8,
        token: Token,
        _emitter: &mut dyn Emitter,
    ) -> Result<(), ExecutionError> {
        let tile = &token.record_set.tile;
        let mut state = self.state.lock();
        for row in 0..tile.size() {
            if !token.record_set.is_live(row as usize) {
                continue;
            }
            let view = tile.view(row);
            for (spec, acc) in self.specs.iter().zip(state.iter_mut()) {
                acc.update(&view.get(spec.input_column));
            }
        }
        Ok(())
    }

    fn on_build_complete(&self, emitter: &mut dyn Emitter) -> Result<(), ExecutionError> {
        let state = self.state.lock();
        let mut output = PaxTile::new(self.output_schema.clone());
        {
            let mut row = output.allocate().expect("fresh tile always has capacity for one row");
            for (col, (spec, acc)) in self.specs.iter().zip(state.iter()).enumerate() {
                let ty = self.output_schema.column(col).ty;
                row.set(col, &acc.finalize(spec.func, ty));
            }
        }
        emitter.emit(
            0,
            self.successor,
            Token::new(
                RecordSet::new(Arc::new(output)),
                Annotation::new(Target::Local, AccessIntention::ReadOnly),
            ),
        );
        Ok(())
    }
}

/// Grouped aggregation: a worker-local open-addressing-equivalent hash table
/// (an `FxHashMap` keyed by the group tuple) accumulating per group.
pub struct GroupedAggregation {
    group_by_columns: Vec<usize>,
    specs: Vec<AggregateSpec>,
    output_schema: Arc<Schema>,
    method: AggregationMethod,
    successor: NodeId,
    state: Mutex<FxHashMap<Vec<i64>, Vec<Accumulator>>>,
}

impl GroupedAggregation {
    pub fn new(
        group_by_columns: Vec<usize>,
        specs: Vec<AggregateSpec>,
        output_schema: Arc<Schema>,
        method: AggregationMethod,
        successor: NodeId,
    ) -> Self {
        Self {
            group_by_columns,
            specs,
            output_schema,
            method,
            successor,
            state: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn method(&self) -> AggregationMethod {
        self.method
    }
}

impl DataflowNode for GroupedAggregation {
    fn arity(&self) -> Arity {
        Arity::Unary
    }

    fn consume(
        &self,
        _worker_id: u8,
        _input_index: u8,
        token: Token,
        _emitter: &mut dyn Emitter,
    ) -> Result<(), ExecutionError> {
        let tile = &token.record_set.tile;
        let mut state = self.state.lock();
        for row in 0..tile.size() {
            if !token.record_set.is_live(row as usize) {
                continue;
            }
            let view = tile.view(row);
            let key: Vec<i64> = self
                .group_by_columns
                .iter()
                .map(|&c| view.get(c).as_histogram_key().unwrap_or(0))
                .collect();
            let entry = state
                .entry(key)
                .or_insert_with(|| vec![Accumulator::default(); self.specs.len()]);
            for (spec, acc) in self.specs.iter().zip(entry.iter_mut()) {
                acc.update(&view.get(spec.input_column));
            }
        }
        Ok(())
    }

    fn on_build_complete(&self, emitter: &mut dyn Emitter) -> Result<(), ExecutionError> {
        let state = self.state.lock();
        let mut groups: Vec<_> = state.iter().collect();
        groups.sort_by(|a, b| a.0.cmp(b.0));

        for chunk in groups.chunks(db_storage::TUPLES_PER_TILE) {
            let mut output = PaxTile::new(self.output_schema.clone());
            for (key, accs) in chunk {
                let mut row = output.allocate().expect("chunk sized to tile capacity");
                for (col, k) in key.iter().enumerate() {
                    row.set(col, &Value::Int64(*k));
                }
                let group_cols = self.group_by_columns.len();
                for (offset, (spec, acc)) in self.specs.iter().zip(accs.iter()).enumerate() {
                    let ty = self.output_schema.column(group_cols + offset).ty;
                    row.set(group_cols + offset, &acc.finalize(spec.func, ty));
                }
            }
            emitter.emit(
                0,
                self.successor,
                Token::new(
                    RecordSet::new(Arc::new(output)),
                    Annotation::new(Target::Local, AccessIntention::ReadOnly),
                ),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db_storage::{Column, ColumnType};

    struct Collector(Vec<Token>);
    impl Emitter for Collector {
        fn emit(&mut self, _w: u8, _f: NodeId, t: Token) {
            self.0.push(t);
        }
    }

    fn int_tile(values: &[i32]) -> Arc<PaxTile> {
        let schema = Arc::new(Schema::new(vec![Column::new("b", ColumnType::Int32)]));
        let mut tile = PaxTile::new(schema);
        for v in values {
            tile.allocate().unwrap().set(0, &Value::Int32(*v));
        }
        Arc::new(tile)
    }

    #[test]
    fn simple_sum_aggregates_across_tokens() {
        let output_schema = Arc::new(Schema::new(vec![Column::new("sum_b", ColumnType::Int64)]));
        let node = SimpleAggregation::new(
            vec![AggregateSpec { func: AggregateFunc::Sum, input_column: 0 }],
            output_schema,
            NodeId(1),
        );

        let mut emitter = Collector(Vec::new());
        let tile = int_tile(&[10, 20, 30, 40, 50]);
        let token = Token::new(RecordSet::new(tile), Annotation::new(Target::Local, AccessIntention::ReadOnly));
        node.consume(0, 0, token, &mut emitter).unwrap();
        node.on_build_complete(&mut emitter).unwrap();

        let out = &emitter.0[0].record_set.tile;
        assert_eq!(out.view(0).get(0), Value::Int64(150));
    }

    #[test]
    fn empty_input_count_is_zero_sum_is_null() {
        let output_schema = Arc::new(Schema::new(vec![
            Column::new("count_b", ColumnType::Int64),
            Column::new("sum_b", ColumnType::Int64),
        ]));
        let node = SimpleAggregation::new(
            vec![
                AggregateSpec { func: AggregateFunc::Count, input_column: 0 },
                AggregateSpec { func: AggregateFunc::Sum, input_column: 0 },
            ],
            output_schema,
            NodeId(1),
        );
        let mut emitter = Collector(Vec::new());
        node.on_build_complete(&mut emitter).unwrap();

        let out = &emitter.0[0].record_set.tile;
        assert_eq!(out.view(0).get(0), Value::Int64(0));
        assert!(matches!(out.view(0).get(1), Value::Null(_)));
    }

    #[test]
    fn grouped_aggregation_counts_per_group() {
        let schema = Arc::new(Schema::new(vec![
            Column::new("a", ColumnType::Int32),
            Column::new("b", ColumnType::Int32),
        ]));
        let mut tile = PaxTile::new(schema);
        for (a, b) in [(1, 10), (2, 20), (1, 11)] {
            let mut row = tile.allocate().unwrap();
            row.set(0, &Value::Int32(a));
            row.set(1, &Value::Int32(b));
        }

        let output_schema = Arc::new(Schema::new(vec![
            Column::new("a", ColumnType::Int64),
            Column::new("count", ColumnType::Int64),
        ]));
        let node = GroupedAggregation::new(
            vec![0],
            vec![AggregateSpec { func: AggregateFunc::Count, input_column: 1 }],
            output_schema,
            AggregationMethod::Hash,
            NodeId(1),
        );

        let token = Token::new(
            RecordSet::new(Arc::new(tile)),
            Annotation::new(Target::Local, AccessIntention::ReadOnly),
        );
        let mut emitter = Collector(Vec::new());
        node.consume(0, 0, token, &mut emitter).unwrap();
        node.on_build_complete(&mut emitter).unwrap();

        let out = &emitter.0[0].record_set.tile;
        assert_eq!(out.size(), 2);
    }
}
