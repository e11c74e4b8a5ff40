//! Limit (with optional leading skip/offset): tracks a running row budget
//! across every token it consumes and trims each tile to what remains, so
//! the total emitted row count never exceeds `take` regardless of how many
//! upstream tiles still arrive (spec §4.7 "Limit").

use db_dataflow::{AccessIntention, Annotation, Arity, DataflowNode, Emitter, NodeId, RecordSet, Target, Token};
use db_kernel::error::ExecutionError;
use db_storage::PaxTile;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct LimitState {
    skip_remaining: u64,
    take_remaining: u64,
}

pub struct Limit {
    successor: NodeId,
    state: Mutex<LimitState>,
    /// Set once `take_remaining` reaches zero; upstream producers poll this
    /// between tiles to stop issuing further scan work (best-effort
    /// cancellation — a producer already mid-flight on another worker still
    /// runs to completion, its output is simply dropped here).
    exhausted: AtomicBool,
}

impl Limit {
    pub fn new(skip: u64, take: u64, successor: NodeId) -> Self {
        Self {
            successor,
            state: Mutex::new(LimitState { skip_remaining: skip, take_remaining: take }),
            exhausted: AtomicBool::new(take == 0),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Relaxed)
    }
}

impl DataflowNode for Limit {
    fn arity(&self) -> Arity {
        Arity::Unary
    }

    fn consume(
        &self,
        worker_id: u8,
        _input_index: u8,
        token: Token,
        emitter: &mut dyn Emitter,
    ) -> Result<(), ExecutionError> {
        if self.is_exhausted() {
            return Ok(());
        }

        let input_tile = &token.record_set.tile;
        let mut state = self.state.lock();
        let mut out = PaxTile::new(input_tile.schema_arc());

        for row in 0..input_tile.size() {
            if !token.record_set.is_live(row as usize) {
                continue;
            }
            if state.skip_remaining > 0 {
                state.skip_remaining -= 1;
                continue;
            }
            if state.take_remaining == 0 {
                break;
            }
            let view = input_tile.view(row);
            let mut out_row = out.allocate().expect("output tile at most as large as input");
            for col in 0..input_tile.schema().column_count() {
                out_row.set(col, &view.get(col));
            }
            state.take_remaining -= 1;
        }

        if state.take_remaining == 0 {
            self.exhausted.store(true, Ordering::Relaxed);
        }

        if out.is_empty() {
            return Ok(());
        }

        emitter.emit(
            worker_id,
            self.successor,
            Token::new(RecordSet::new(Arc::new(out)), Annotation::new(Target::Local, AccessIntention::ReadOnly)),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db_storage::{Column, ColumnType, Schema, Value};

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

    fn token_for(tile: Arc<PaxTile>) -> Token {
        Token::new(RecordSet::new(tile), Annotation::new(Target::Local, AccessIntention::ReadOnly))
    }

    #[test]
    fn take_caps_emitted_rows_across_tokens() {
        let limit = Limit::new(0, 3, NodeId(1));
        let mut emitter = Collector(Vec::new());
        limit.consume(0, 0, token_for(int_tile(&[1, 2])), &mut emitter).unwrap();
        limit.consume(0, 0, token_for(int_tile(&[3, 4, 5])), &mut emitter).unwrap();

        let total: u16 = emitter.0.iter().map(|t| t.record_set.tile.size()).sum();
        assert_eq!(total, 3);
        assert!(limit.is_exhausted());
    }

    #[test]
    fn skip_drops_leading_rows_before_taking() {
        let limit = Limit::new(2, 2, NodeId(1));
        let mut emitter = Collector(Vec::new());
        limit.consume(0, 0, token_for(int_tile(&[1, 2, 3, 4, 5])), &mut emitter).unwrap();

        let out = &emitter.0[0].record_set.tile;
        assert_eq!(out.size(), 2);
        assert_eq!(out.view(0).get(0), Value::Int32(3));
        assert_eq!(out.view(1).get(0), Value::Int32(4));
    }

    #[test]
    fn zero_take_is_exhausted_immediately() {
        let limit = Limit::new(0, 0, NodeId(1));
        assert!(limit.is_exhausted());
        let mut emitter = Collector(Vec::new());
        limit.consume(0, 0, token_for(int_tile(&[1])), &mut emitter).unwrap();
        assert!(emitter.0.is_empty());
    }
}
