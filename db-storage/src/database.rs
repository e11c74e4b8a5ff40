//! A quiescent collection of tables, keyed by name. The persistence format
//! (spec §6) and DDL operators (spec §4.7 Create/Describe/Show) both operate
//! at this granularity rather than on a single table.

use crate::persist::{restore_tables, save_tables};
use crate::table::Table;
use db_kernel::error::IoError;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::{Arc, RwLock};

/// Tables are snapshot-read against a quiescent database (spec §1), so a
/// single `RwLock` per table is enough: DDL/insert/copy take a write lock,
/// every query path takes a read lock.
pub struct Database {
    tables: BTreeMap<String, Arc<RwLock<Table>>>,
    worker_count: usize,
}

impl Database {
    pub fn new(worker_count: usize) -> Self {
        Self {
            tables: BTreeMap::new(),
            worker_count,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn create_table(&mut self, table: Table) -> Result<(), IoError> {
        if self.tables.contains_key(table.name()) {
            return Err(IoError::CorruptTableFile(format!(
                "table '{}' already exists",
                table.name()
            )));
        }
        self.tables.insert(table.name().to_string(), Arc::new(RwLock::new(table)));
        Ok(())
    }

    pub fn table(&self, name: &str) -> Option<Arc<RwLock<Table>>> {
        self.tables.get(name).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn drop_table(&mut self, name: &str) -> bool {
        self.tables.remove(name).is_some()
    }

    pub fn save<W: Write>(&self, w: &mut W) -> Result<(), IoError> {
        let snapshots: Vec<Table> = self
            .tables
            .values()
            .map(|t| t.read().expect("table lock poisoned").clone())
            .collect();
        save_tables(w, &snapshots)
    }

    pub fn restore<R: Read>(r: &mut R, worker_count: usize) -> Result<Self, IoError> {
        let tables = restore_tables(r, worker_count)?;
        let mut db = Self::new(worker_count);
        for table in tables {
            db.tables.insert(table.name().to_string(), Arc::new(RwLock::new(table)));
        }
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, Schema};
    use crate::types::ColumnType;

    #[test]
    fn create_table_rejects_duplicate_name() {
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let mut db = Database::new(1);
        db.create_table(Table::new("t", schema.clone(), 1)).unwrap();
        assert!(db.create_table(Table::new("t", schema, 1)).is_err());
    }

    #[test]
    fn drop_table_removes_it() {
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let mut db = Database::new(1);
        db.create_table(Table::new("t", schema, 1)).unwrap();
        assert!(db.drop_table("t"));
        assert!(db.table("t").is_none());
    }

    #[test]
    fn save_then_restore_preserves_table_names() {
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let mut db = Database::new(1);
        db.create_table(Table::new("t", schema, 1)).unwrap();

        let mut buf = Vec::new();
        db.save(&mut buf).unwrap();
        let restored = Database::restore(&mut buf.as_slice(), 1).unwrap();
        assert_eq!(restored.table_names(), vec!["t".to_string()]);
    }
}
