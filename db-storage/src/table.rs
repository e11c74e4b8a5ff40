//! A named, schema'd sequence of tiles partitioned by owning worker, plus
//! its statistics catalog.

use crate::schema::Schema;
use crate::tile::PaxTile;
use db_stats::Statistics;
use std::sync::Arc;

#[derive(Clone)]
pub struct Table {
    name: String,
    schema: Arc<Schema>,
    tiles_by_worker: Vec<Vec<PaxTile>>,
    statistics: Statistics,
}

impl Table {
    pub fn new(name: impl Into<String>, schema: Arc<Schema>, worker_count: usize) -> Self {
        let column_count = schema.column_count();
        Self {
            name: name.into(),
            schema,
            tiles_by_worker: (0..worker_count).map(|_| Vec::new()).collect(),
            statistics: Statistics::new(column_count),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    pub fn statistics_mut(&mut self) -> &mut Statistics {
        &mut self.statistics
    }

    pub fn worker_count(&self) -> usize {
        self.tiles_by_worker.len()
    }

    /// Appends a tile to worker `owner`'s tile list (the Insert operator's
    /// contract).
    pub fn append_tile(&mut self, owner: usize, tile: PaxTile) {
        debug_assert!(
            tile.schema().is_same_shape(&self.schema),
            "tile schema does not match table schema"
        );
        self.tiles_by_worker[owner].push(tile);
    }

    pub fn tiles_of(&self, owner: usize) -> &[PaxTile] {
        &self.tiles_by_worker[owner]
    }

    pub fn tiles_of_mut(&mut self, owner: usize) -> &mut Vec<PaxTile> {
        &mut self.tiles_by_worker[owner]
    }

    pub fn row_count(&self) -> u64 {
        self.tiles_by_worker
            .iter()
            .flatten()
            .map(|t| t.size() as u64)
            .sum()
    }

    pub fn all_tiles(&self) -> impl Iterator<Item = (usize, &PaxTile)> {
        self.tiles_by_worker
            .iter()
            .enumerate()
            .flat_map(|(worker, tiles)| tiles.iter().map(move |t| (worker, t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;
    use crate::types::ColumnType;

    #[test]
    fn row_count_sums_across_workers() {
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let mut table = Table::new("t", schema.clone(), 2);

        let mut tile0 = PaxTile::new(schema.clone());
        tile0.allocate_bulk(3);
        table.append_tile(0, tile0);

        let mut tile1 = PaxTile::new(schema);
        tile1.allocate_bulk(2);
        table.append_tile(1, tile1);

        assert_eq!(table.row_count(), 5);
    }
}
