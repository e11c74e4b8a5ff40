//! Appends computed columns to a new tile, one expression at a time.

use crate::expr::{eval, Expr};
use db_dataflow::{AccessIntention, Annotation, Arity, DataflowNode, Emitter, NodeId, RecordSet, Target, Token};
use db_kernel::error::ExecutionError;
use db_storage::{PaxTile, Schema};
use std::sync::Arc;

pub struct Arithmetic {
    output_schema: Arc<Schema>,
    input_column_count: usize,
    expressions: Vec<Expr>,
    successor: NodeId,
}

impl Arithmetic {
    pub fn new(output_schema: Arc<Schema>, input_column_count: usize, expressions: Vec<Expr>, successor: NodeId) -> Self {
        Self {
            output_schema,
            input_column_count,
            expressions,
            successor,
        }
    }
}

impl DataflowNode for Arithmetic {
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
        let input_tile = &token.record_set.tile;
        let mut output = PaxTile::new(self.output_schema.clone());

        for row in 0..input_tile.size() {
            if !token.record_set.is_live(row as usize) {
                continue;
            }
            let view = input_tile.view(row);
            let mut out_row = match output.allocate() {
                Some(r) => r,
                None => break,
            };
            for col in 0..self.input_column_count {
                out_row.set(col, &view.get(col));
            }
            for (offset, expr) in self.expressions.iter().enumerate() {
                let value = eval(expr, &view)?;
                out_row.set(self.input_column_count + offset, &value);
            }
        }

        if output.is_empty() {
            return Ok(());
        }

        emitter.emit(
            worker_id,
            self.successor,
            Token::new(
                RecordSet::new(Arc::new(output)),
                Annotation::new(Target::Local, AccessIntention::ReadOnly),
            ),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::ArithmeticOp;
    use db_storage::{Column, ColumnType, Value};

    #[test]
    fn appends_computed_column() {
        let input_schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let mut tile = PaxTile::new(input_schema.clone());
        tile.allocate().unwrap().set(0, &Value::Int32(10));

        let output_schema = Arc::new(Schema::new(vec![
            Column::new("a", ColumnType::Int32),
            Column::new("a_plus_1", ColumnType::Int32),
        ]));
        let expr = Expr::Arithmetic(ArithmeticOp::Add, Box::new(Expr::column(0)), Box::new(Expr::literal(Value::Int32(1))));
        let node = Arithmetic::new(output_schema, 1, vec![expr], NodeId(1));

        let token = Token::new(
            RecordSet::new(Arc::new(tile)),
            Annotation::new(Target::Local, AccessIntention::ReadOnly),
        );

        struct Collector(Vec<Token>);
        impl Emitter for Collector {
            fn emit(&mut self, _w: u8, _f: NodeId, t: Token) {
                self.0.push(t);
            }
        }
        let mut collector = Collector(Vec::new());
        node.consume(0, 0, token, &mut collector).unwrap();

        let out = &collector.0[0].record_set.tile;
        assert_eq!(out.view(0).get(1), Value::Int32(11));
    }
}
