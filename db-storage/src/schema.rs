//! Table schema: an ordered sequence of typed columns, plus the cache-line
//! aligned column offsets a PAX tile lays its column blocks out at.

use crate::types::ColumnType;

pub const CACHE_LINE: usize = 64;
pub const TILE_HEADER_SIZE: usize = 64;
pub const TUPLES_PER_TILE: usize = 256;

fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
    pub is_nullable: bool,
    pub is_primary_key: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            is_nullable: true,
            is_primary_key: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_nullable = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<Column>,
    offsets: Vec<usize>,
    tile_size: usize,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        let mut offsets = Vec::with_capacity(columns.len());
        let mut cursor = 0usize;
        for column in &columns {
            offsets.push(cursor);
            let block_size = align_up(TUPLES_PER_TILE * column.ty.size(), CACHE_LINE);
            cursor += block_size;
        }

        Self {
            columns,
            offsets,
            tile_size: TILE_HEADER_SIZE + cursor,
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Sum of each column's underlying type width; distinct from the
    /// cache-line padded `tile_size`.
    pub fn row_size(&self) -> usize {
        self.columns.iter().map(|c| c.ty.size()).sum()
    }

    /// Byte offset of column `i`'s block, relative to the tile header end.
    pub fn pax_offset(&self, index: usize) -> usize {
        self.offsets[index]
    }

    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// True when `other` has the same columns in the same order — the
    /// condition under which a projection is a no-op.
    pub fn is_same_shape(&self, other: &Schema) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(other.columns.iter())
                .all(|(a, b)| a.name == b.name && a.ty == b.ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_cache_line_aligned() {
        let schema = Schema::new(vec![
            Column::new("a", ColumnType::Int32),
            Column::new("b", ColumnType::Int64),
        ]);
        for i in 0..schema.column_count() {
            assert_eq!(schema.pax_offset(i) % CACHE_LINE, 0);
        }
    }

    #[test]
    fn row_size_matches_invariant() {
        let schema = Schema::new(vec![
            Column::new("a", ColumnType::Int32),
            Column::new("b", ColumnType::Bool),
        ]);
        assert_eq!(schema.row_size(), 4 + 1);
    }

    #[test]
    fn tile_size_respects_pax_offset_bound() {
        let schema = Schema::new(vec![Column::new("a", ColumnType::Int64)]);
        let aligned_block = align_up(TUPLES_PER_TILE * ColumnType::Int64.size(), CACHE_LINE);
        assert!(schema.pax_offset(0) + aligned_block <= schema.tile_size());
    }
}
