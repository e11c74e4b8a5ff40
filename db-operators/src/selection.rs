//! Evaluates a predicate against each row of an incoming token, updating its
//! mask; does not materialise a new tile.

use crate::expr::{eval, Expr};
use db_dataflow::{Arity, DataflowNode, Emitter, NodeId, RecordSet, RowMask, Token};
use db_kernel::error::ExecutionError;
use db_storage::Value;

pub struct Selection {
    predicate: Expr,
    successor: NodeId,
}

impl Selection {
    pub fn new(predicate: Expr, successor: NodeId) -> Self {
        Self { predicate, successor }
    }
}

impl DataflowNode for Selection {
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
        let tile = &token.record_set.tile;
        let mut mask = RowMask::all_true(tile.size() as usize);

        for row in 0..tile.size() {
            let row = row as usize;
            if !token.record_set.is_live(row) {
                mask.set(row, false);
                continue;
            }
            let view = tile.view(row as u16);
            let keep = matches!(eval(&self.predicate, &view)?, Value::Bool(true));
            mask.set(row, keep);
        }

        if mask.count_set() == 0 {
            return Ok(());
        }

        let record_set = RecordSet {
            tile: token.record_set.tile,
            mask: Some(mask),
            secondary: token.record_set.secondary,
        };
        let mut annotation = token.annotation;
        annotation.target = db_dataflow::Target::Local;
        emitter.emit(worker_id, self.successor, Token::new(record_set, annotation));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Comparison;
    use db_dataflow::{AccessIntention, Annotation, RecordSet as RS, Target};
    use db_storage::{Column, ColumnType, PaxTile, Schema};
    use std::sync::Arc;

    struct CollectingEmitter {
        tokens: Vec<Token>,
    }
    impl Emitter for CollectingEmitter {
        fn emit(&mut self, _worker_id: u8, _from: NodeId, token: Token) {
            self.tokens.push(token);
        }
    }

    #[test]
    fn masks_rows_failing_predicate() {
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let mut tile = PaxTile::new(schema);
        for v in [1, 2, 3, 4] {
            tile.allocate().unwrap().set(0, &Value::Int32(v));
        }
        let token = Token::new(
            RS::new(Arc::new(tile)),
            Annotation::new(Target::Local, AccessIntention::ReadOnly),
        );

        let predicate = Expr::Compare(Comparison::Gt, Box::new(Expr::column(0)), Box::new(Expr::literal(Value::Int32(2))));
        let node = Selection::new(predicate, NodeId(1));
        let mut emitter = CollectingEmitter { tokens: Vec::new() };
        node.consume(0, 0, token, &mut emitter).unwrap();

        assert_eq!(emitter.tokens.len(), 1);
        let mask = emitter.tokens[0].record_set.mask.as_ref().unwrap();
        assert_eq!(mask.count_set(), 2);
    }

    #[test]
    fn all_false_predicate_emits_nothing() {
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let mut tile = PaxTile::new(schema);
        tile.allocate().unwrap().set(0, &Value::Int32(1));
        let token = Token::new(
            RS::new(Arc::new(tile)),
            Annotation::new(Target::Local, AccessIntention::ReadOnly),
        );

        let predicate = Expr::Compare(Comparison::Gt, Box::new(Expr::column(0)), Box::new(Expr::literal(Value::Int32(100))));
        let node = Selection::new(predicate, NodeId(1));
        let mut emitter = CollectingEmitter { tokens: Vec::new() };
        node.consume(0, 0, token, &mut emitter).unwrap();
        assert!(emitter.tokens.is_empty());
    }
}
