//! PAX-layout tile: a fixed-capacity batch of up to [`TUPLES_PER_TILE`] rows,
//! stored as one contiguous column block per schema attribute rather than
//! row-major, so a scan touching three of ten columns only streams those
//! three blocks.

use crate::schema::{Schema, TILE_HEADER_SIZE, TUPLES_PER_TILE};
use crate::types::{ColumnType, Value};
use std::sync::Arc;

/// A writable handle to one row, valid only while the tile is being
/// populated by its owning worker.
pub struct RowViewMut<'a> {
    tile: &'a mut PaxTile,
    row: usize,
}

impl<'a> RowViewMut<'a> {
    pub fn set(&mut self, column: usize, value: &Value) {
        self.tile.write_column(column, self.row, value);
    }
}

/// A read-only handle to one row.
pub struct RowView<'a> {
    tile: &'a PaxTile,
    row: usize,
}

impl<'a> RowView<'a> {
    pub fn get(&self, column: usize) -> Value {
        self.tile.read_column(column, self.row)
    }
}

/// A fixed-capacity, cache-line-aligned PAX record batch. Once a tile has
/// been emitted as part of a token its `size` is frozen; callers that need
/// more rows allocate a new tile.
#[derive(Clone)]
pub struct PaxTile {
    schema: Arc<Schema>,
    data: Box<[u8]>,
    size: u16,
    is_client_tile: bool,
    is_temporary: bool,
    frozen: bool,
}

impl PaxTile {
    pub fn new(schema: Arc<Schema>) -> Self {
        let tile_size = schema.tile_size();
        Self {
            schema,
            data: vec![0u8; tile_size].into_boxed_slice(),
            size: 0,
            is_client_tile: false,
            is_temporary: true,
            frozen: false,
        }
    }

    pub fn new_client_tile(schema: Arc<Schema>) -> Self {
        let mut tile = Self::new(schema);
        tile.is_client_tile = true;
        tile.is_temporary = false;
        tile
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_arc(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    pub fn capacity(&self) -> u16 {
        TUPLES_PER_TILE as u16
    }

    pub fn size(&self) -> u16 {
        self.size
    }

    pub fn is_full(&self) -> bool {
        self.size as usize == TUPLES_PER_TILE
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_client_tile(&self) -> bool {
        self.is_client_tile
    }

    pub fn is_temporary(&self) -> bool {
        self.is_temporary
    }

    /// Freezes `size`; called once the tile is handed to a token.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Appends a single row, returning a writable view, or `None` if full.
    pub fn allocate(&mut self) -> Option<RowViewMut<'_>> {
        if self.is_full() || self.frozen {
            return None;
        }
        let row = self.size as usize;
        self.size += 1;
        Some(RowViewMut { tile: self, row })
    }

    /// Bulk-allocates up to `n` rows, returning `(start_row, granted)`.
    pub fn allocate_bulk(&mut self, n: u16) -> (u16, u16) {
        if self.frozen {
            return (self.size, 0);
        }
        let granted = n.min(TUPLES_PER_TILE as u16 - self.size);
        let start = self.size;
        self.size += granted;
        (start, granted)
    }

    /// Read-only view of row `i`. Undefined (panics in debug) if `i >= size`.
    pub fn view(&self, i: u16) -> RowView<'_> {
        debug_assert!(i < self.size, "row index out of bounds");
        RowView {
            tile: self,
            row: i as usize,
        }
    }

    fn column_base(&self, column: usize) -> usize {
        TILE_HEADER_SIZE + self.schema.pax_offset(column)
    }

    fn write_column(&mut self, column: usize, row: usize, value: &Value) {
        let ty = self.schema.column(column).ty;
        let base = self.column_base(column) + row * ty.size();
        write_raw(&mut self.data[base..base + ty.size()], &ty, value);
    }

    fn read_column(&self, column: usize, row: usize) -> Value {
        let ty = self.schema.column(column).ty;
        let base = self.column_base(column) + row * ty.size();
        read_raw(&self.data[base..base + ty.size()], &ty)
    }

    /// Raw bytes of an entire column block, used by serialization to copy a
    /// whole column at once rather than row by row.
    pub fn column_block(&self, column: usize) -> &[u8] {
        let ty = self.schema.column(column).ty;
        let base = self.column_base(column);
        &self.data[base..base + self.size as usize * ty.size()]
    }

    pub fn column_block_mut(&mut self, column: usize) -> &mut [u8] {
        let ty = self.schema.column(column).ty;
        let size = self.size as usize;
        let base = self.column_base(column);
        &mut self.data[base..base + size * ty.size()]
    }
}

fn write_raw(dst: &mut [u8], ty: &ColumnType, value: &Value) {
    match (ty, value) {
        (ColumnType::Int32, Value::Int32(v)) => dst.copy_from_slice(&v.to_le_bytes()),
        (ColumnType::Int64, Value::Int64(v)) => dst.copy_from_slice(&v.to_le_bytes()),
        (ColumnType::Decimal { .. }, Value::Decimal(v)) => dst.copy_from_slice(&v.to_le_bytes()),
        (ColumnType::Date, Value::Date(d)) => dst.copy_from_slice(&d.0.to_le_bytes()),
        (ColumnType::Bool, Value::Bool(b)) => dst[0] = *b as u8,
        (ColumnType::Char(_), Value::Char(bytes)) => {
            let n = bytes.len().min(dst.len());
            dst[..n].copy_from_slice(&bytes[..n]);
            for b in &mut dst[n..] {
                *b = 0;
            }
        }
        (_, Value::Null(_)) => dst.fill(0),
        _ => panic!("value kind does not match column type"),
    }
}

fn read_raw(src: &[u8], ty: &ColumnType) -> Value {
    match ty {
        ColumnType::Int32 => Value::Int32(i32::from_le_bytes(src.try_into().unwrap())),
        ColumnType::Int64 => Value::Int64(i64::from_le_bytes(src.try_into().unwrap())),
        ColumnType::Decimal { .. } => Value::Decimal(i64::from_le_bytes(src.try_into().unwrap())),
        ColumnType::Date => Value::Date(crate::types::Date(i32::from_le_bytes(src.try_into().unwrap()))),
        ColumnType::Bool => Value::Bool(src[0] != 0),
        ColumnType::Char(_) => Value::Char(src.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;

    fn int_schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Column::new("a", ColumnType::Int32),
            Column::new("b", ColumnType::Int64),
        ]))
    }

    #[test]
    fn allocate_then_view_round_trips() {
        let schema = int_schema();
        let mut tile = PaxTile::new(schema);
        {
            let mut row = tile.allocate().unwrap();
            row.set(0, &Value::Int32(7));
            row.set(1, &Value::Int64(99));
        }
        let view = tile.view(0);
        assert_eq!(view.get(0), Value::Int32(7));
        assert_eq!(view.get(1), Value::Int64(99));
    }

    #[test]
    fn allocate_fails_once_full() {
        let schema = int_schema();
        let mut tile = PaxTile::new(schema);
        let (_, granted) = tile.allocate_bulk(TUPLES_PER_TILE as u16);
        assert_eq!(granted, TUPLES_PER_TILE as u16);
        assert!(tile.is_full());
        assert!(tile.allocate().is_none());
    }

    #[test]
    fn bulk_allocate_caps_at_remaining_capacity() {
        let schema = int_schema();
        let mut tile = PaxTile::new(schema);
        let (start, granted) = tile.allocate_bulk(300);
        assert_eq!(start, 0);
        assert_eq!(granted, TUPLES_PER_TILE as u16);
    }
}
