//! Copy (bulk load from a delimited file) and Insert (append received tiles
//! to a table) — the data-modification operators (spec §4.7 "Copy"/
//! "Insert").

use db_dataflow::{AccessIntention, Annotation, Arity, DataflowNode, Emitter, NodeId, RecordSet, Target, Token};
use db_kernel::error::ExecutionError;
use db_storage::{cast, PaxTile, Schema, Table, Value};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// A nullary producer that reads an entire delimited source file eagerly at
/// construction time, so a malformed source (bad path, a field that doesn't
/// cast to its column's type) fails plan construction rather than surfacing
/// mid-execution.
pub struct Copy {
    tiles: Vec<Arc<PaxTile>>,
    successor: NodeId,
}

impl Copy {
    pub fn open(
        path: impl AsRef<Path>,
        delimiter: char,
        schema: Arc<Schema>,
        successor: NodeId,
    ) -> Result<Self, ExecutionError> {
        let tiles = read_tiles(path.as_ref(), delimiter, &schema)?;
        Ok(Self {
            tiles: tiles.into_iter().map(Arc::new).collect(),
            successor,
        })
    }
}

impl DataflowNode for Copy {
    fn arity(&self) -> Arity {
        Arity::Nullary
    }

    fn requires_owner_affinity(&self) -> bool {
        false
    }

    fn initial_tokens(&self, worker_id: u8) -> Vec<Token> {
        // The file was read once at construction; every tile it produced is
        // issued from worker 0 and routed onward by Insert's own placement.
        if worker_id != 0 {
            return Vec::new();
        }
        self.tiles
            .iter()
            .map(|tile| {
                Token::new(
                    RecordSet::new(tile.clone()),
                    Annotation::new(Target::Local, AccessIntention::ReadOnly),
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
        Err(ExecutionError::OperationNotAllowed("Copy has no inputs".into()))
    }
}

fn read_tiles(path: &Path, delimiter: char, schema: &Arc<Schema>) -> Result<Vec<PaxTile>, ExecutionError> {
    let file = File::open(path)
        .map_err(|e| ExecutionError::OperationNotAllowed(format!("cannot open {}: {e}", path.display())))?;
    let reader = BufReader::new(file);

    let mut tiles = Vec::new();
    let mut current = PaxTile::new(schema.clone());

    for line in reader.lines() {
        let line = line.map_err(|e| ExecutionError::OperationNotAllowed(e.to_string()))?;
        if line.is_empty() {
            continue;
        }
        if current.is_full() {
            current.freeze();
            tiles.push(std::mem::replace(&mut current, PaxTile::new(schema.clone())));
        }
        let mut row = current.allocate().expect("just ensured spare capacity");
        for (col, field) in line.split(delimiter).enumerate() {
            if col >= schema.column_count() {
                break;
            }
            let ty = schema.column(col).ty;
            let raw = Value::Char(field.as_bytes().to_vec());
            let value = cast(&raw, ty)?;
            row.set(col, &value);
        }
    }

    if !current.is_empty() {
        current.freeze();
        tiles.push(current);
    }
    Ok(tiles)
}

/// Appends every tile it receives to the target table, owned by whichever
/// worker processed it — Insert never needs to route rows across workers,
/// since a table's tile ownership is simply defined by whoever appended it.
pub struct Insert {
    target: Arc<RwLock<Table>>,
    rows_inserted: AtomicU64,
}

impl Insert {
    pub fn new(target: Arc<RwLock<Table>>) -> Self {
        Self {
            target,
            rows_inserted: AtomicU64::new(0),
        }
    }

    pub fn rows_inserted(&self) -> u64 {
        self.rows_inserted.load(Ordering::Relaxed)
    }
}

impl DataflowNode for Insert {
    fn arity(&self) -> Arity {
        Arity::Unary
    }

    fn consume(
        &self,
        worker_id: u8,
        _input_index: u8,
        token: Token,
        _emitter: &mut dyn Emitter,
    ) -> Result<(), ExecutionError> {
        let tile = token.record_set.tile;
        let rows = tile.size() as u64;
        let mut table = self
            .target
            .write()
            .map_err(|_| ExecutionError::OperationNotAllowed("target table lock poisoned".into()))?;
        let owner = worker_id as usize % table.worker_count().max(1);
        table.append_tile(owner, (*tile).clone());
        self.rows_inserted.fetch_add(rows, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db_storage::{Column, ColumnType};

    struct Collector(Vec<Token>);
    impl Emitter for Collector {
        fn emit(&mut self, _w: u8, _f: NodeId, t: Token) {
            self.0.push(t);
        }
    }

    #[test]
    fn copy_parses_delimited_fields_into_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        std::fs::write(&path, "1,10\n2,20\n").unwrap();

        let schema = Arc::new(Schema::new(vec![
            Column::new("a", ColumnType::Int32),
            Column::new("b", ColumnType::Int32),
        ]));
        let copy = Copy::open(&path, ',', schema, NodeId(1)).unwrap();
        let tokens = copy.initial_tokens(0);
        assert_eq!(tokens.len(), 1);
        let tile = &tokens[0].record_set.tile;
        assert_eq!(tile.size(), 2);
        assert_eq!(tile.view(1).get(1), Value::Int32(20));
    }

    #[test]
    fn copy_rejects_a_field_that_does_not_cast() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        std::fs::write(&path, "notanumber\n").unwrap();
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        assert!(Copy::open(&path, ',', schema, NodeId(1)).is_err());
    }

    #[test]
    fn insert_appends_tile_to_owning_worker() {
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let table = Arc::new(RwLock::new(Table::new("t", schema.clone(), 2)));
        let insert = Insert::new(table.clone());

        let mut tile = PaxTile::new(schema);
        tile.allocate().unwrap().set(0, &Value::Int32(7));
        let token = Token::new(
            RecordSet::new(Arc::new(tile)),
            Annotation::new(Target::Local, AccessIntention::ReadOnly),
        );
        let mut emitter = Collector(Vec::new());
        insert.consume(1, 0, token, &mut emitter).unwrap();

        assert_eq!(insert.rows_inserted(), 1);
        assert_eq!(table.read().unwrap().tiles_of(1).len(), 1);
    }
}
