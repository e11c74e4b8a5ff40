//! Data-definition and catalog-metadata operations. These read or mutate
//! the table catalog directly rather than flowing through the dataflow
//! graph, since they act on a table's existence or shape rather than its
//! rows (spec §4.7 "Create"/"Describe"/"Show tables"/"Update statistics").

use db_kernel::error::{ExecutionError, IoError};
use db_storage::{update_statistics, Database, Schema, Table};
use std::sync::Arc;

/// One row of a `Describe` result.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescription {
    pub name: String,
    pub type_name: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
}

pub fn describe_columns(schema: &Schema) -> Vec<ColumnDescription> {
    schema
        .columns()
        .iter()
        .map(|c| ColumnDescription {
            name: c.name.clone(),
            type_name: format!("{:?}", c.ty),
            is_nullable: c.is_nullable,
            is_primary_key: c.is_primary_key,
        })
        .collect()
}

/// Creates a fresh, empty table in `database`; rejects a duplicate name
/// rather than silently replacing it (spec §8 boundary behaviours).
pub fn create_table(database: &mut Database, name: impl Into<String>, schema: Arc<Schema>) -> Result<(), IoError> {
    let worker_count = database.worker_count();
    database.create_table(Table::new(name, schema, worker_count))
}

/// The `Show tables` result: every table name currently in the catalog.
pub fn show_tables(database: &Database) -> Vec<String> {
    database.table_names()
}

/// Looks up `name`'s schema for `Describe`.
pub fn describe_table(database: &Database, name: &str) -> Result<Vec<ColumnDescription>, ExecutionError> {
    let table = database
        .table(name)
        .ok_or_else(|| ExecutionError::SymbolNotFound(name.to_string()))?;
    let table = table
        .read()
        .map_err(|_| ExecutionError::OperationNotAllowed("table lock poisoned".into()))?;
    Ok(describe_columns(table.schema()))
}

/// Rebuilds `name`'s histograms and distinct-count estimates from a full
/// scan (spec §4.7 "Update statistics"); the plan's cardinality estimates
/// are only as fresh as the last call to this.
pub fn update_table_statistics(database: &Database, name: &str) -> Result<(), ExecutionError> {
    let table = database
        .table(name)
        .ok_or_else(|| ExecutionError::SymbolNotFound(name.to_string()))?;
    let mut table = table
        .write()
        .map_err(|_| ExecutionError::OperationNotAllowed("table lock poisoned".into()))?;
    update_statistics(&mut table);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use db_storage::{Column, ColumnType};

    fn int_schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]))
    }

    #[test]
    fn create_then_show_lists_the_table() {
        let mut db = Database::new(1);
        create_table(&mut db, "widgets", int_schema()).unwrap();
        assert_eq!(show_tables(&db), vec!["widgets".to_string()]);
    }

    #[test]
    fn describe_unknown_table_is_symbol_not_found() {
        let db = Database::new(1);
        assert!(matches!(
            describe_table(&db, "missing"),
            Err(ExecutionError::SymbolNotFound(_))
        ));
    }

    #[test]
    fn describe_known_table_reports_its_columns() {
        let mut db = Database::new(1);
        create_table(&mut db, "widgets", int_schema()).unwrap();
        let columns = describe_table(&db, "widgets").unwrap();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].name, "a");
    }

    #[test]
    fn update_statistics_is_idempotent_on_empty_table() {
        let mut db = Database::new(1);
        create_table(&mut db, "widgets", int_schema()).unwrap();
        update_table_statistics(&db, "widgets").unwrap();
        update_table_statistics(&db, "widgets").unwrap();
    }
}
