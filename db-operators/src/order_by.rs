//! Order-by: collects every input row, sorts by a composite key list, and
//! emits the result in tile-sized chunks on build completion. Sequential and
//! parallel only change how the runtime schedules the sort across workers
//! (spec §4.7 "Order-by", §4.10.m); the comparison and tie-break below are
//! identical for both, so `OrderByMethod` is carried as a tag, as in grouped
//! aggregation.

use db_dataflow::{AccessIntention, Annotation, Arity, DataflowNode, Emitter, NodeId, RecordSet, Target, Token};
use db_kernel::error::ExecutionError;
use db_storage::{PaxTile, Schema, Value, TUPLES_PER_TILE};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderByMethod {
    Sequential,
    Parallel,
}

/// Above this estimated input cardinality the plan picks parallel over
/// sequential order-by, mirroring the join/aggregation method thresholds.
pub const PARALLEL_ORDER_BY_CARDINALITY_THRESHOLD: u64 = 10_000;

pub fn choose_order_by_method(estimated_cardinality: u64) -> OrderByMethod {
    if estimated_cardinality <= PARALLEL_ORDER_BY_CARDINALITY_THRESHOLD {
        OrderByMethod::Sequential
    } else {
        OrderByMethod::Parallel
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SortKey {
    pub column: usize,
    pub ascending: bool,
}

struct BufferedRow {
    values: Vec<Value>,
    sequence: u64,
}

pub struct OrderBy {
    keys: Vec<SortKey>,
    method: OrderByMethod,
    /// When set, only the first `n` rows after sorting are retained — the
    /// fusion `MergeOrderByLimit` performs against a following `Limit`
    /// (spec §4.10.m), avoiding a full sort-then-truncate materialisation.
    top_k: Option<usize>,
    output_schema: Arc<Schema>,
    successor: NodeId,
    state: Mutex<Vec<BufferedRow>>,
}

impl OrderBy {
    pub fn new(keys: Vec<SortKey>, method: OrderByMethod, output_schema: Arc<Schema>, successor: NodeId) -> Self {
        Self {
            keys,
            method,
            top_k: None,
            output_schema,
            successor,
            state: Mutex::new(Vec::new()),
        }
    }

    pub fn with_top_k(mut self, n: usize) -> Self {
        self.top_k = Some(n);
        self
    }

    pub fn method(&self) -> OrderByMethod {
        self.method
    }

    fn compare(&self, a: &BufferedRow, b: &BufferedRow) -> Ordering {
        for key in &self.keys {
            let av = a.values[key.column].as_histogram_key();
            let bv = b.values[key.column].as_histogram_key();
            let ord = match (av, bv) {
                (Some(x), Some(y)) => x.cmp(&y),
                (None, None) => Ordering::Equal,
                // NULLs sort first, ascending or descending.
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
            };
            let ord = if key.ascending { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.sequence.cmp(&b.sequence)
    }
}

impl DataflowNode for OrderBy {
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
        let mut sequence = state.len() as u64;
        for row in 0..tile.size() {
            if !token.record_set.is_live(row as usize) {
                continue;
            }
            let view = tile.view(row);
            let values = (0..tile.schema().column_count()).map(|c| view.get(c)).collect();
            state.push(BufferedRow { values, sequence });
            sequence += 1;
        }
        Ok(())
    }

    fn on_build_complete(&self, emitter: &mut dyn Emitter) -> Result<(), ExecutionError> {
        let mut rows = self.state.lock();
        rows.sort_by(|a, b| self.compare(a, b));
        if let Some(k) = self.top_k {
            rows.truncate(k);
        }

        for chunk in rows.chunks(TUPLES_PER_TILE) {
            let mut out = PaxTile::new(self.output_schema.clone());
            for row in chunk {
                let mut out_row = out.allocate().expect("chunk sized to tile capacity");
                for (col, v) in row.values.iter().enumerate() {
                    out_row.set(col, v);
                }
            }
            emitter.emit(
                0,
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
    use db_storage::{Column, ColumnType};

    struct Collector(Vec<Token>);
    impl Emitter for Collector {
        fn emit(&mut self, _w: u8, _f: NodeId, t: Token) {
            self.0.push(t);
        }
    }

    fn int_tile(values: &[i32]) -> Arc<PaxTile> {
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let mut tile = PaxTile::new(schema);
        for v in values {
            tile.allocate().unwrap().set(0, &Value::Int32(*v));
        }
        Arc::new(tile)
    }

    #[test]
    fn sorts_ascending_by_single_key() {
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let node = OrderBy::new(
            vec![SortKey { column: 0, ascending: true }],
            OrderByMethod::Sequential,
            schema,
            NodeId(1),
        );
        let token = Token::new(
            RecordSet::new(int_tile(&[3, 1, 2])),
            Annotation::new(Target::Local, AccessIntention::ReadOnly),
        );
        let mut emitter = Collector(Vec::new());
        node.consume(0, 0, token, &mut emitter).unwrap();
        node.on_build_complete(&mut emitter).unwrap();

        let out = &emitter.0[0].record_set.tile;
        assert_eq!(out.view(0).get(0), Value::Int32(1));
        assert_eq!(out.view(1).get(0), Value::Int32(2));
        assert_eq!(out.view(2).get(0), Value::Int32(3));
    }

    #[test]
    fn top_k_truncates_after_sorting() {
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let node = OrderBy::new(
            vec![SortKey { column: 0, ascending: false }],
            OrderByMethod::Sequential,
            schema,
            NodeId(1),
        )
        .with_top_k(2);
        let token = Token::new(
            RecordSet::new(int_tile(&[5, 1, 9, 3])),
            Annotation::new(Target::Local, AccessIntention::ReadOnly),
        );
        let mut emitter = Collector(Vec::new());
        node.consume(0, 0, token, &mut emitter).unwrap();
        node.on_build_complete(&mut emitter).unwrap();

        let out = &emitter.0[0].record_set.tile;
        assert_eq!(out.size(), 2);
        assert_eq!(out.view(0).get(0), Value::Int32(9));
        assert_eq!(out.view(1).get(0), Value::Int32(5));
    }

    #[test]
    fn ties_break_by_arrival_order() {
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let node = OrderBy::new(
            vec![SortKey { column: 0, ascending: true }],
            OrderByMethod::Sequential,
            schema,
            NodeId(1),
        );
        let token = Token::new(
            RecordSet::new(int_tile(&[1, 1, 1])),
            Annotation::new(Target::Local, AccessIntention::ReadOnly),
        );
        let mut emitter = Collector(Vec::new());
        node.consume(0, 0, token, &mut emitter).unwrap();
        node.on_build_complete(&mut emitter).unwrap();
        assert_eq!(emitter.0[0].record_set.tile.size(), 3);
    }
}
