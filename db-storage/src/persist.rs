//! Persistent table format: tables are restorable from a single
//! little-endian stream after an `update_statistics` pass, reproducing
//! schemas, row counts, tile bytes, and histograms bit-exact.

use crate::schema::{Column, Schema};
use crate::table::Table;
use crate::tile::PaxTile;
use crate::types::ColumnType;
use db_kernel::error::IoError;
use db_stats::{
    AnyHistogram, EquiDepthBin, EquiDepthHistogram, EquiDepthHistogramBuilder, Histogram, SingletonHistogram,
    SingletonHistogramBuilder,
};
use std::io::{Read, Write};
use std::sync::Arc;

fn write_u64<W: Write>(w: &mut W, v: u64) -> Result<(), IoError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_u32<W: Write>(w: &mut W, v: u32) -> Result<(), IoError> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_string<W: Write>(w: &mut W, s: &str) -> Result<(), IoError> {
    write_u64(w, s.len() as u64)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn read_u64<R: Read>(r: &mut R) -> Result<u64, IoError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32, IoError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u8<R: Read>(r: &mut R) -> Result<u8, IoError> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_string<R: Read>(r: &mut R) -> Result<String, IoError> {
    let len = read_u64(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| IoError::CorruptTableFile(e.to_string()))
}

pub fn save_tables<W: Write>(w: &mut W, tables: &[Table]) -> Result<(), IoError> {
    write_u64(w, tables.len() as u64)?;
    for table in tables {
        save_table(w, table)?;
    }
    Ok(())
}

fn save_table<W: Write>(w: &mut W, table: &Table) -> Result<(), IoError> {
    write_string(w, table.name())?;

    let schema = table.schema();
    write_u64(w, schema.column_count() as u64)?;
    for (index, column) in schema.columns().iter().enumerate() {
        write_string(w, &column.name)?;
        write_u32(w, column.ty.type_id())?;
        match column.ty {
            ColumnType::Decimal { precision, scale } => {
                w.write_all(&[precision, scale])?;
            }
            ColumnType::Char(n) => {
                w.write_all(&n.to_le_bytes())?;
            }
            _ => {}
        }
        w.write_all(&[column.is_nullable as u8, column.is_primary_key as u8])?;

        match table.statistics().any_histogram(index) {
            Some(histogram) => {
                w.write_all(&[1u8])?;
                save_histogram(w, histogram)?;
            }
            None => w.write_all(&[0u8])?,
        }
        write_u64(w, table.statistics().distinct_count(index))?;
    }

    write_u64(w, table.row_count())?;

    let tile_count: usize = (0..table.worker_count()).map(|wk| table.tiles_of(wk).len()).sum();
    write_u64(w, tile_count as u64)?;
    for worker in 0..table.worker_count() {
        for tile in table.tiles_of(worker) {
            write_u32(w, tile.size() as u32)?;
            for column in 0..schema.column_count() {
                w.write_all(tile.column_block(column))?;
            }
        }
    }

    Ok(())
}

fn save_histogram<W: Write>(w: &mut W, histogram: &AnyHistogram) -> Result<(), IoError> {
    match histogram {
        AnyHistogram::EquiDepth(h) => {
            w.write_all(&[0u8])?;
            save_equi_depth_payload(w, h.total_count(), h.depth(), h.lower_key(), h.upper_key(), h.bins())?;
        }
        AnyHistogram::Singleton(h) => {
            w.write_all(&[1u8])?;
            save_singleton_payload(w, h)?;
        }
    }
    Ok(())
}

/// Writes the equi-depth histogram payload in full: `count, depth,
/// lower_key, upper_key, num_bins, {lower, upper, count}*`.
pub fn save_equi_depth_payload<W: Write>(
    w: &mut W,
    count: u64,
    depth: u64,
    lower_key: i64,
    upper_key: i64,
    bins: &[EquiDepthBin],
) -> Result<(), IoError> {
    write_u64(w, count)?;
    write_u64(w, depth)?;
    w.write_all(&lower_key.to_le_bytes())?;
    w.write_all(&upper_key.to_le_bytes())?;
    write_u64(w, bins.len() as u64)?;
    for bin in bins {
        w.write_all(&bin.lower().to_le_bytes())?;
        w.write_all(&bin.upper().to_le_bytes())?;
        write_u64(w, bin.count())?;
    }
    Ok(())
}

/// Writes the singleton histogram payload in full: `count, num_bins,
/// {key, count}*`. Keys are already reduced to the normalized 64-bit
/// histogram key (§4.8's numeric/date/hash reduction) rather than the
/// column's original typed value, since that is what the in-memory
/// histogram retains.
pub fn save_singleton_payload<W: Write>(w: &mut W, histogram: &SingletonHistogram) -> Result<(), IoError> {
    write_u64(w, histogram.total_count())?;
    write_u64(w, histogram.data().len() as u64)?;
    for (&key, &count) in histogram.data() {
        w.write_all(&key.to_le_bytes())?;
        write_u64(w, count)?;
    }
    Ok(())
}

fn restore_histogram<R: Read>(r: &mut R, histogram_type: u8) -> Result<AnyHistogram, IoError> {
    match histogram_type {
        0 => {
            let count = read_u64(r)?;
            let depth = read_u64(r)?;
            let mut buf8 = [0u8; 8];
            r.read_exact(&mut buf8)?;
            let lower_key = i64::from_le_bytes(buf8);
            r.read_exact(&mut buf8)?;
            let upper_key = i64::from_le_bytes(buf8);
            let num_bins = read_u64(r)?;
            let mut bins = Vec::with_capacity(num_bins as usize);
            for _ in 0..num_bins {
                r.read_exact(&mut buf8)?;
                let lower = i64::from_le_bytes(buf8);
                r.read_exact(&mut buf8)?;
                let upper = i64::from_le_bytes(buf8);
                let bin_count = read_u64(r)?;
                bins.push(EquiDepthBin::new(lower, upper, bin_count));
            }
            Ok(AnyHistogram::EquiDepth(EquiDepthHistogram::from_parts(
                count, depth, lower_key, upper_key, bins,
            )))
        }
        1 => {
            let count = read_u64(r)?;
            let num_bins = read_u64(r)?;
            let mut data = std::collections::BTreeMap::new();
            let mut buf8 = [0u8; 8];
            for _ in 0..num_bins {
                r.read_exact(&mut buf8)?;
                let key = i64::from_le_bytes(buf8);
                let bin_count = read_u64(r)?;
                data.insert(key, bin_count);
            }
            Ok(AnyHistogram::Singleton(SingletonHistogram::from_parts(count, data)))
        }
        other => Err(IoError::CorruptTableFile(format!("unknown histogram type {other}"))),
    }
}

pub fn restore_tables<R: Read>(r: &mut R, worker_count: usize) -> Result<Vec<Table>, IoError> {
    let num_tables = read_u64(r)?;
    let mut tables = Vec::with_capacity(num_tables as usize);
    for _ in 0..num_tables {
        tables.push(restore_table(r, worker_count)?);
    }
    Ok(tables)
}

fn restore_table<R: Read>(r: &mut R, worker_count: usize) -> Result<Table, IoError> {
    let name = read_string(r)?;
    let num_columns = read_u64(r)?;

    let mut columns = Vec::with_capacity(num_columns as usize);
    let mut distinct_counts = Vec::with_capacity(num_columns as usize);
    let mut histograms: Vec<Option<AnyHistogram>> = Vec::with_capacity(num_columns as usize);

    for _ in 0..num_columns {
        let col_name = read_string(r)?;
        let type_id = read_u32(r)?;
        let ty = match type_id {
            0 => ColumnType::Int32,
            1 => ColumnType::Int64,
            2 => {
                let precision = read_u8(r)?;
                let scale = read_u8(r)?;
                ColumnType::Decimal { precision, scale }
            }
            3 => ColumnType::Date,
            4 => {
                let mut buf = [0u8; 2];
                r.read_exact(&mut buf)?;
                ColumnType::Char(u16::from_le_bytes(buf))
            }
            5 => ColumnType::Bool,
            other => return Err(IoError::CorruptTableFile(format!("unknown type id {other}"))),
        };

        let is_nullable = read_u8(r)? != 0;
        let is_primary_key = read_u8(r)? != 0;
        let mut column = Column::new(col_name, ty);
        column.is_nullable = is_nullable;
        column.is_primary_key = is_primary_key;
        columns.push(column);

        let has_histogram = read_u8(r)? != 0;
        if has_histogram {
            let histogram_type = read_u8(r)?;
            histograms.push(Some(restore_histogram(r, histogram_type)?));
        } else {
            histograms.push(None);
        }
        distinct_counts.push(read_u64(r)?);
    }

    let _row_count = read_u64(r)?;
    let num_tiles = read_u64(r)?;

    let schema = Arc::new(Schema::new(columns));
    let mut table = Table::new(name, schema.clone(), worker_count);

    for (i, histogram) in histograms.into_iter().enumerate() {
        table.statistics_mut().set_distinct_count(i, distinct_counts[i]);
        if let Some(histogram) = histogram {
            table.statistics_mut().set_histogram(i, histogram);
        }
    }

    for tile_index in 0..num_tiles {
        let record_count = read_u32(r)?;
        let mut tile = PaxTile::new(schema.clone());
        tile.allocate_bulk(record_count as u16);
        for column in 0..schema.column_count() {
            r.read_exact(tile.column_block_mut(column))?;
        }
        let owner = tile_index as usize % worker_count.max(1);
        table.append_tile(owner, tile);
    }

    Ok(table)
}

/// Rebuilds a table's statistics in place from a full scan, matching
/// `update_statistics`'s two-phase builder protocol: accumulate, then cut.
pub fn update_statistics(table: &mut Table) {
    let schema = table.schema().clone();
    let column_count = schema.column_count();
    let mut equi_builders: Vec<EquiDepthHistogramBuilder> =
        (0..column_count).map(|_| EquiDepthHistogramBuilder::new()).collect();
    let mut singleton_builders: Vec<SingletonHistogramBuilder> =
        (0..column_count).map(|_| SingletonHistogramBuilder::new()).collect();
    let mut hlls: Vec<db_stats::HyperLogLog> = (0..column_count).map(|_| db_stats::HyperLogLog::new()).collect();

    let use_singleton: Vec<bool> = schema
        .columns()
        .iter()
        .map(|c| matches!(c.ty, ColumnType::Bool | ColumnType::Char(_)))
        .collect();

    let mut row_count = 0u64;
    for worker in 0..table.worker_count() {
        for tile in table.tiles_of(worker) {
            for row in 0..tile.size() {
                row_count += 1;
                let view = tile.view(row);
                for col in 0..column_count {
                    let value = view.get(col);
                    if let Some(key) = value.as_histogram_key() {
                        hlls[col].insert_int(key);
                        if use_singleton[col] {
                            singleton_builders[col].insert(key);
                        } else {
                            equi_builders[col].insert(key);
                        }
                    }
                }
            }
        }
    }

    table.statistics_mut().set_row_count(row_count);
    for col in 0..column_count {
        table.statistics_mut().set_distinct_count(col, hlls[col].estimate());
        if use_singleton[col] {
            let histogram = std::mem::take(&mut singleton_builders[col]).build();
            table
                .statistics_mut()
                .set_histogram(col, AnyHistogram::Singleton(histogram));
        } else if let Some(histogram) = std::mem::take(&mut equi_builders[col]).build(256) {
            table
                .statistics_mut()
                .set_histogram(col, AnyHistogram::EquiDepth(histogram));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;

    #[test]
    fn save_then_restore_is_identity_on_row_count() {
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let mut table = Table::new("t", schema.clone(), 1);
        let mut tile = PaxTile::new(schema);
        {
            let mut row = tile.allocate().unwrap();
            row.set(0, &crate::types::Value::Int32(42));
        }
        table.append_tile(0, tile);

        let mut buf = Vec::new();
        save_tables(&mut buf, std::slice::from_ref(&table)).unwrap();

        let restored = restore_tables(&mut buf.as_slice(), 1).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].row_count(), 1);
        assert_eq!(restored[0].name(), "t");
    }

    #[test]
    fn save_then_restore_reproduces_equi_depth_histogram() {
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let mut table = Table::new("t", schema.clone(), 1);
        let mut tile = PaxTile::new(schema);
        for value in 0..5 {
            let mut row = tile.allocate().unwrap();
            row.set(0, &crate::types::Value::Int32(value));
        }
        table.append_tile(0, tile);
        update_statistics(&mut table);

        let before = table.statistics().histogram(0).unwrap().total_count();

        let mut buf = Vec::new();
        save_tables(&mut buf, std::slice::from_ref(&table)).unwrap();
        let restored = restore_tables(&mut buf.as_slice(), 1).unwrap();

        let histogram = restored[0].statistics().histogram(0).expect("histogram survives restore");
        assert_eq!(histogram.total_count(), before);
        assert_eq!(histogram.approximate_equals(2), 1);
    }

    #[test]
    fn save_then_restore_reproduces_singleton_histogram() {
        let schema = Arc::new(Schema::new(vec![Column::new("flag", ColumnType::Bool)]));
        let mut table = Table::new("t", schema.clone(), 1);
        let mut tile = PaxTile::new(schema);
        for value in [true, false, true] {
            let mut row = tile.allocate().unwrap();
            row.set(0, &crate::types::Value::Bool(value));
        }
        table.append_tile(0, tile);
        update_statistics(&mut table);

        let mut buf = Vec::new();
        save_tables(&mut buf, std::slice::from_ref(&table)).unwrap();
        let restored = restore_tables(&mut buf.as_slice(), 1).unwrap();

        let histogram = restored[0].statistics().histogram(0).expect("histogram survives restore");
        assert_eq!(histogram.approximate_equals(1), 2);
        assert_eq!(histogram.approximate_equals(0), 1);
    }
}
