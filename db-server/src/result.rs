//! Result assembly and wire serialization for a completed query (spec §4.11).
//!
//! The sink of a dataflow graph appends emitted tokens' tiles here, keyed by
//! the final output schema; `serialize`/`deserialize` are exact inverses, as
//! required by spec §8's "serialize then deserialize is identity" invariant.

use db_kernel::error::IoError;
use db_storage::{Column, ColumnType, PaxTile, Schema};
use std::io::{Read, Write};
use std::sync::Arc;

/// Accumulates tiles emitted to the graph sink and serializes them per the
/// wire layout in spec §4.11.
pub struct QueryResult {
    schema: Arc<Schema>,
    /// Physical column order the payload is written in; defaults to the
    /// schema's declared order but may be permuted by the operator that
    /// produced the result (e.g. a projection that reorders columns).
    order: Vec<u16>,
    tiles: Vec<Arc<PaxTile>>,
}

impl QueryResult {
    pub fn new(schema: Arc<Schema>) -> Self {
        let order = (0..schema.column_count() as u16).collect();
        Self {
            schema,
            order,
            tiles: Vec::new(),
        }
    }

    pub fn with_order(schema: Arc<Schema>, order: Vec<u16>) -> Self {
        Self {
            schema,
            order,
            tiles: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn order(&self) -> &[u16] {
        &self.order
    }

    pub fn append_tile(&mut self, tile: Arc<PaxTile>) {
        self.tiles.push(tile);
    }

    pub fn tiles(&self) -> &[Arc<PaxTile>] {
        &self.tiles
    }

    pub fn row_count(&self) -> u64 {
        self.tiles.iter().map(|t| t.size() as u64).sum()
    }

    pub fn serialize<W: Write>(&self, w: &mut W) -> Result<(), IoError> {
        let mut body = Vec::new();
        write_header(&mut body, &self.schema)?;

        body.extend_from_slice(&(self.order.len() as u16).to_le_bytes());
        for &index in &self.order {
            body.extend_from_slice(&index.to_le_bytes());
        }

        body.extend_from_slice(&self.row_count().to_le_bytes());

        for &column in &self.order {
            for tile in &self.tiles {
                body.extend_from_slice(tile.column_block(column as usize));
            }
        }

        w.write_all(&(body.len() as u64).to_le_bytes())?;
        w.write_all(&body)?;
        Ok(())
    }

    pub fn deserialize<R: Read>(r: &mut R) -> Result<Self, IoError> {
        let mut size_buf = [0u8; 8];
        r.read_exact(&mut size_buf)?;
        let total_size = u64::from_le_bytes(size_buf) as usize;
        let mut body = vec![0u8; total_size];
        r.read_exact(&mut body)?;
        let mut cursor = body.as_slice();

        let schema = Arc::new(read_header(&mut cursor)?);

        let order_count = read_u16(&mut cursor)?;
        let mut order = Vec::with_capacity(order_count as usize);
        for _ in 0..order_count {
            order.push(read_u16(&mut cursor)?);
        }

        let row_count = read_u64(&mut cursor)? as usize;

        let mut result = QueryResult::with_order(schema.clone(), order.clone());
        let mut remaining = row_count;
        let mut column_cursors: Vec<&[u8]> = Vec::with_capacity(order.len());
        for &column in &order {
            let ty = schema.column(column as usize).ty;
            column_cursors.push(read_exact_len(&mut cursor, ty.size() * row_count)?);
        }

        while remaining > 0 {
            let granted = remaining.min(db_storage::TUPLES_PER_TILE);
            let mut tile = PaxTile::new_client_tile(schema.clone());
            let (_, actually_granted) = tile.allocate_bulk(granted as u16);
            debug_assert_eq!(actually_granted as usize, granted);
            for (slot, &column) in order.iter().enumerate() {
                let ty = schema.column(column as usize).ty;
                let bytes = ty.size() * granted;
                let (chunk, rest) = column_cursors[slot].split_at(bytes);
                tile.column_block_mut(column as usize).copy_from_slice(chunk);
                column_cursors[slot] = rest;
            }
            result.append_tile(Arc::new(tile));
            remaining -= granted;
        }

        Ok(result)
    }
}

fn write_header<W: Write>(w: &mut W, schema: &Schema) -> Result<(), IoError> {
    w.write_all(&(schema.column_count() as u16).to_le_bytes())?;
    for column in schema.columns() {
        w.write_all(&(column.name.len() as u16).to_le_bytes())?;
        w.write_all(column.name.as_bytes())?;
        w.write_all(&column.ty.type_id().to_le_bytes())?;
        match column.ty {
            ColumnType::Decimal { precision, scale } => w.write_all(&[precision, scale])?,
            ColumnType::Char(n) => w.write_all(&n.to_le_bytes())?,
            _ => {}
        }
        w.write_all(&[column.is_nullable as u8, column.is_primary_key as u8])?;
    }
    Ok(())
}

fn read_header(cursor: &mut &[u8]) -> Result<Schema, IoError> {
    let column_count = read_u16(cursor)?;
    let mut columns = Vec::with_capacity(column_count as usize);
    for _ in 0..column_count {
        let name_len = read_u16(cursor)? as usize;
        let name = String::from_utf8(read_exact_len(cursor, name_len)?.to_vec())
            .map_err(|e| IoError::MalformedFrame(e.to_string()))?;
        let type_id = {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(read_exact_len(cursor, 4)?);
            u32::from_le_bytes(buf)
        };
        let ty = match type_id {
            0 => ColumnType::Int32,
            1 => ColumnType::Int64,
            2 => {
                let bytes = read_exact_len(cursor, 2)?;
                ColumnType::Decimal {
                    precision: bytes[0],
                    scale: bytes[1],
                }
            }
            3 => ColumnType::Date,
            4 => {
                let mut buf = [0u8; 2];
                buf.copy_from_slice(read_exact_len(cursor, 2)?);
                ColumnType::Char(u16::from_le_bytes(buf))
            }
            5 => ColumnType::Bool,
            other => return Err(IoError::MalformedFrame(format!("unknown type id {other}"))),
        };
        let flags = read_exact_len(cursor, 2)?;
        let mut column = Column::new(name, ty);
        column.is_nullable = flags[0] != 0;
        column.is_primary_key = flags[1] != 0;
        columns.push(column);
    }
    Ok(Schema::new(columns))
}

fn read_u16(cursor: &mut &[u8]) -> Result<u16, IoError> {
    let bytes = read_exact_len(cursor, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u64(cursor: &mut &[u8]) -> Result<u64, IoError> {
    let bytes = read_exact_len(cursor, 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Ok(u64::from_le_bytes(buf))
}

fn read_exact_len<'a>(cursor: &mut &'a [u8], len: usize) -> Result<&'a [u8], IoError> {
    if cursor.len() < len {
        return Err(IoError::MalformedFrame("truncated query result".into()));
    }
    let (head, tail) = cursor.split_at(len);
    *cursor = tail;
    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use db_storage::{Column, ColumnType, Value};

    #[test]
    fn serialize_then_deserialize_is_identity() {
        let schema = Arc::new(Schema::new(vec![
            Column::new("a", ColumnType::Int32).not_null(),
            Column::new("b", ColumnType::Int64),
        ]));
        let mut tile = PaxTile::new_client_tile(schema.clone());
        for i in 0..5 {
            let mut row = tile.allocate().unwrap();
            row.set(0, &Value::Int32(i));
            row.set(1, &Value::Int64(i as i64 * 10));
        }

        let mut result = QueryResult::new(schema.clone());
        result.append_tile(Arc::new(tile));

        let mut buf = Vec::new();
        result.serialize(&mut buf).unwrap();
        let restored = QueryResult::deserialize(&mut buf.as_slice()).unwrap();

        assert_eq!(restored.row_count(), 5);
        assert_eq!(restored.schema().column_count(), 2);
        assert_eq!(restored.schema().column(0).name, "a");
        assert!(restored.schema().column(0).is_nullable == false);

        let restored_tile = &restored.tiles()[0];
        for i in 0..5u16 {
            assert_eq!(restored_tile.view(i).get(0), Value::Int32(i as i32));
            assert_eq!(restored_tile.view(i).get(1), Value::Int64(i as i64 * 10));
        }
    }

    #[test]
    fn empty_result_round_trips() {
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Bool)]));
        let result = QueryResult::new(schema);
        let mut buf = Vec::new();
        result.serialize(&mut buf).unwrap();
        let restored = QueryResult::deserialize(&mut buf.as_slice()).unwrap();
        assert_eq!(restored.row_count(), 0);
    }

    #[test]
    fn more_than_one_tile_worth_of_rows_splits_on_restore() {
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let mut result = QueryResult::new(schema.clone());
        let total = db_storage::TUPLES_PER_TILE + 10;
        let mut remaining = total;
        while remaining > 0 {
            let n = remaining.min(db_storage::TUPLES_PER_TILE);
            let mut tile = PaxTile::new_client_tile(schema.clone());
            for i in 0..n {
                tile.allocate().unwrap().set(0, &Value::Int32(i as i32));
            }
            result.append_tile(Arc::new(tile));
            remaining -= n;
        }

        let mut buf = Vec::new();
        result.serialize(&mut buf).unwrap();
        let restored = QueryResult::deserialize(&mut buf.as_slice()).unwrap();
        assert_eq!(restored.row_count(), total as u64);
        assert_eq!(restored.tiles().len(), 2);
    }
}
