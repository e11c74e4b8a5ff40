//! Materialises a new tile over a subset/reorder of the input schema,
//! copying only surviving (unmasked) rows.

use db_dataflow::{AccessIntention, Annotation, Arity, DataflowNode, Emitter, NodeId, RecordSet, Target, Token};
use db_kernel::error::ExecutionError;
use db_storage::{PaxTile, Schema};
use std::sync::Arc;

pub struct Projection {
    output_schema: Arc<Schema>,
    /// Index into the input schema for each output column, in order.
    source_columns: Vec<usize>,
    successor: NodeId,
}

impl Projection {
    pub fn new(output_schema: Arc<Schema>, source_columns: Vec<usize>, successor: NodeId) -> Self {
        Self {
            output_schema,
            source_columns,
            successor,
        }
    }

    /// True when the requested schema equals the input schema, order
    /// insensitive — the condition under which the optimizer removes this
    /// node entirely (`RemoveProjection`).
    pub fn is_identity(&self, input_schema: &Schema) -> bool {
        self.source_columns.len() == input_schema.column_count()
            && self
                .source_columns
                .iter()
                .enumerate()
                .all(|(out_idx, &in_idx)| {
                    input_schema.column(in_idx).name == self.output_schema.column(out_idx).name
                })
    }
}

impl DataflowNode for Projection {
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
            for (out_col, &in_col) in self.source_columns.iter().enumerate() {
                out_row.set(out_col, &view.get(in_col));
            }
        }

        if output.is_empty() {
            return Ok(());
        }

        let record_set = RecordSet::new(Arc::new(output));
        emitter.emit(
            worker_id,
            self.successor,
            Token::new(record_set, Annotation::new(Target::Local, AccessIntention::ReadOnly)),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db_dataflow::{AccessIntention, Annotation, Target};
    use db_storage::{Column, ColumnType, Value};

    #[test]
    fn reorders_and_drops_columns() {
        let input_schema = Arc::new(Schema::new(vec![
            Column::new("a", ColumnType::Int32),
            Column::new("b", ColumnType::Int64),
        ]));
        let mut tile = PaxTile::new(input_schema.clone());
        {
            let mut row = tile.allocate().unwrap();
            row.set(0, &Value::Int32(1));
            row.set(1, &Value::Int64(2));
        }

        let output_schema = Arc::new(Schema::new(vec![Column::new("b", ColumnType::Int64)]));
        let projection = Projection::new(output_schema, vec![1], NodeId(1));

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
        projection.consume(0, 0, token, &mut collector).unwrap();

        let out_tile = &collector.0[0].record_set.tile;
        assert_eq!(out_tile.schema().column_count(), 1);
        assert_eq!(out_tile.view(0).get(0), Value::Int64(2));
    }

    #[test]
    fn identity_projection_is_detected() {
        let input_schema = Schema::new(vec![Column::new("a", ColumnType::Int32)]);
        let output_schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let projection = Projection::new(output_schema, vec![0], NodeId(1));
        assert!(projection.is_identity(&input_schema));
    }
}
