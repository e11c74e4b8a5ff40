//! Scan and table-selection (fused scan+filter) producer nodes.

use crate::expr::{eval, Expr};
use db_dataflow::{
    AccessIntention, Annotation, Arity, DataflowNode, Emitter, PrefetchDescriptor, RecordSet, RowMask, Target, Token,
};
use db_kernel::error::ExecutionError;
use db_storage::Table;
use std::sync::Arc;

/// Emits one token per owned tile in the scanned table, targeted at the
/// tile's owning worker, read-only.
pub struct Scan {
    table: Arc<Table>,
    prefetch: PrefetchDescriptor,
}

impl Scan {
    pub fn new(table: Arc<Table>, prefetch: PrefetchDescriptor) -> Self {
        Self { table, prefetch }
    }
}

impl DataflowNode for Scan {
    fn arity(&self) -> Arity {
        Arity::Nullary
    }

    fn initial_tokens(&self, worker_id: u8) -> Vec<Token> {
        self.table
            .tiles_of(worker_id as usize)
            .iter()
            .map(|tile| {
                // Tiles in a table are owned sequentially; operators never
                // mutate a scanned tile, so wrapping a fresh `Arc` per tile
                // costs nothing the original's shared ownership didn't.
                let tile = Arc::new(clone_tile(tile));
                Token::new(
                    RecordSet::new(tile),
                    Annotation::new(Target::Worker(worker_id), AccessIntention::ReadOnly)
                        .with_prefetch(self.prefetch.clone()),
                )
            })
            .collect()
    }

    fn consume(
        &self,
        _worker_id: u8,
        _input_index: u8,
        _token: Token,
        _emitter: &mut dyn Emitter,
    ) -> Result<(), ExecutionError> {
        Err(ExecutionError::OperationNotAllowed("Scan has no inputs".into()))
    }
}

/// Shallow, read-only structural clone used only to hand scan tiles out as
/// `Arc`-owned tokens without taking the table's tiles by value. The tile
/// storage itself is never duplicated by value semantics elsewhere in the
/// runtime; scan tokens are read-only for the query's lifetime.
fn clone_tile(tile: &db_storage::PaxTile) -> db_storage::PaxTile {
    let mut clone = db_storage::PaxTile::new(tile.schema_arc());
    let (_, granted) = clone.allocate_bulk(tile.size());
    debug_assert_eq!(granted, tile.size());
    for column in 0..tile.schema().column_count() {
        clone.column_block_mut(column).copy_from_slice(tile.column_block(column));
    }
    clone
}

/// As scan, but the emitted token carries a bitmask over the tile; rows are
/// not materialised, downstream consumers skip masked rows.
pub struct TableSelection {
    table: Arc<Table>,
    predicate: Expr,
    prefetch: PrefetchDescriptor,
}

impl TableSelection {
    pub fn new(table: Arc<Table>, predicate: Expr, prefetch: PrefetchDescriptor) -> Self {
        Self {
            table,
            predicate,
            prefetch,
        }
    }
}

impl DataflowNode for TableSelection {
    fn arity(&self) -> Arity {
        Arity::Nullary
    }

    fn initial_tokens(&self, worker_id: u8) -> Vec<Token> {
        self.table
            .tiles_of(worker_id as usize)
            .iter()
            .filter_map(|tile| {
                let cloned = Arc::new(clone_tile(tile));
                let mut mask = RowMask::all_true(cloned.size() as usize);
                for row in 0..cloned.size() {
                    let view = cloned.view(row);
                    let keep = matches!(eval(&self.predicate, &view), Ok(db_storage::Value::Bool(true)));
                    mask.set(row as usize, keep);
                }
                if mask.count_set() == 0 {
                    return None;
                }
                Some(Token::new(
                    RecordSet::new(cloned).with_mask(mask),
                    Annotation::new(Target::Worker(worker_id), AccessIntention::ReadOnly)
                        .with_prefetch(self.prefetch.clone()),
                ))
            })
            .collect()
    }

    fn consume(
        &self,
        _worker_id: u8,
        _input_index: u8,
        _token: Token,
        _emitter: &mut dyn Emitter,
    ) -> Result<(), ExecutionError> {
        Err(ExecutionError::OperationNotAllowed("TableSelection has no inputs".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Comparison;
    use db_storage::{Column, ColumnType, PaxTile, Schema, Value};

    fn table_with_rows(values: &[i32]) -> Arc<Table> {
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let mut table = Table::new("t", schema.clone(), 1);
        let mut tile = PaxTile::new(schema);
        for v in values {
            tile.allocate().unwrap().set(0, &Value::Int32(*v));
        }
        table.append_tile(0, tile);
        Arc::new(table)
    }

    #[test]
    fn scan_emits_one_token_per_owned_tile() {
        let table = table_with_rows(&[1, 2, 3]);
        let scan = Scan::new(table, PrefetchDescriptor::empty());
        let tokens = scan.initial_tokens(0);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].record_set.tile.size(), 3);
    }

    #[test]
    fn table_selection_masks_non_matching_rows() {
        let table = table_with_rows(&[1, 2, 3, 4]);
        let predicate = Expr::Compare(
            Comparison::Gt,
            Box::new(Expr::column(0)),
            Box::new(Expr::literal(Value::Int32(2))),
        );
        let op = TableSelection::new(table, predicate, PrefetchDescriptor::empty());
        let tokens = op.initial_tokens(0);
        assert_eq!(tokens.len(), 1);
        let mask = tokens[0].record_set.mask.as_ref().unwrap();
        assert_eq!(mask.count_set(), 2);
    }

    #[test]
    fn empty_table_scan_emits_no_tokens() {
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let table = Arc::new(Table::new("t", schema, 1));
        let scan = Scan::new(table, PrefetchDescriptor::empty());
        assert!(scan.initial_tokens(0).is_empty());
    }
}
