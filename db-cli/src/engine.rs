//! A minimal statement recognizer bridging the CLI boundary to the
//! dataflow/operator/storage crates.
//!
//! Full SQL lexing, parsing, and cost-based planning are explicitly external
//! collaborators relative to the runtime/storage/operator core (spec §1):
//! this module recognizes only the handful of statement shapes the CLI
//! needs to demonstrate scan, filter, and project end to end
//! (`SELECT <cols> FROM <table> [WHERE <col> <op> <literal>]`, `SHOW
//! TABLES`, `DESCRIBE <table>`). Anything wider belongs to a real front end
//! wired in ahead of this trait, not bolted onto it.

use db_dataflow::{DataflowNode, Emitter, NodeId, PrefetchDescriptor, Token};
use db_kernel::error::{DbError, ExecutionError, ParseError};
use db_operators::{Comparison, Expr, Projection, Scan, Selection};
use db_server::QueryEngine;
use db_storage::{Database, PaxTile, Schema, Value};
use std::sync::{Arc, RwLock};

pub struct LocalEngine {
    database: Arc<RwLock<Database>>,
}

impl LocalEngine {
    pub fn new(database: Arc<RwLock<Database>>) -> Self {
        Self { database }
    }

    /// Runs a scan, optional selection, and optional projection in sequence.
    /// No statement this boundary recognises produces a join, so the
    /// finalisation-barrier graph machinery in `db-dataflow` is unneeded
    /// here: each stage's output feeds the next directly through a
    /// `CollectingEmitter`, the way a single unary pipeline would.
    fn run_select(&self, table_name: &str, columns: &ColumnSelector, predicate: Option<RawPredicate<'_>>) -> Result<db_server::QueryResult, DbError> {
        let handle = {
            let db = self.database.read().expect("database lock poisoned");
            db.table(table_name)
                .ok_or_else(|| DbError::Execution(ExecutionError::SymbolNotFound(table_name.to_string())))?
        };
        let table = handle.read().expect("table lock poisoned");
        let input_schema = table.schema().clone();

        let (output_schema, source_columns) = columns.resolve(&input_schema)?;
        let predicate = predicate.map(|p| p.resolve(&input_schema)).transpose()?;

        let scan = Scan::new(Arc::new(table.clone()), PrefetchDescriptor::empty());
        let selection = predicate.map(|p| Selection::new(p, NodeId(0)));
        // Always materialise through a projection, even for `SELECT *`
        // (where it is an identity reorder): `Selection` never compacts a
        // tile, it only marks a `RowMask` over it, and `QueryResult`'s
        // serializer/row-count walk whole tiles with no mask of their own,
        // so a masked-but-unmaterialised tile would leak filtered-out rows
        // onto the wire.
        let projection = Projection::new(output_schema.clone(), source_columns, NodeId(0));

        let mut result = db_server::QueryResult::new(output_schema);
        for worker in 0..table.worker_count() as u8 {
            for token in scan.initial_tokens(worker) {
                let mut stage = vec![token];
                if let Some(selection) = &selection {
                    stage = run_stage(selection, worker, stage)?;
                }
                stage = run_stage(&projection, worker, stage)?;
                for token in stage {
                    result.append_tile(token.record_set.tile);
                }
            }
        }
        Ok(result)
    }
}

/// Feeds every token in `input` through `node.consume`, collecting what it
/// emits. `node`'s own id is irrelevant here — `CollectingEmitter` ignores
/// routing entirely, since there is exactly one consumer for its output.
fn run_stage(node: &dyn DataflowNode, worker_id: u8, input: Vec<Token>) -> Result<Vec<Token>, DbError> {
    let mut emitter = CollectingEmitter::default();
    for token in input {
        node.consume(worker_id, 0, token, &mut emitter).map_err(DbError::Execution)?;
    }
    Ok(emitter.tokens)
}

#[derive(Default)]
struct CollectingEmitter {
    tokens: Vec<Token>,
}

impl Emitter for CollectingEmitter {
    fn emit(&mut self, _worker_id: u8, _from: NodeId, token: Token) {
        self.tokens.push(token);
    }
}

enum ColumnSelector {
    Star,
    Named(Vec<String>),
}

impl ColumnSelector {
    fn resolve(&self, input: &Schema) -> Result<(Arc<Schema>, Vec<usize>), DbError> {
        match self {
            ColumnSelector::Star => {
                let indices = (0..input.column_count()).collect();
                Ok((Arc::new(input.clone()), indices))
            }
            ColumnSelector::Named(names) => {
                let mut indices = Vec::with_capacity(names.len());
                let mut columns = Vec::with_capacity(names.len());
                for name in names {
                    let idx = input
                        .index_of(name)
                        .ok_or_else(|| DbError::Parse(ParseError::new(format!("unknown column: {name}"))))?;
                    indices.push(idx);
                    columns.push(input.column(idx).clone());
                }
                Ok((Arc::new(Schema::new(columns)), indices))
            }
        }
    }
}

struct RawPredicate<'a> {
    column: &'a str,
    comparison: Comparison,
    literal: &'a str,
}

impl<'a> RawPredicate<'a> {
    fn resolve(&self, schema: &Schema) -> Result<Expr, DbError> {
        let idx = schema
            .index_of(self.column)
            .ok_or_else(|| DbError::Parse(ParseError::new(format!("unknown column: {}", self.column))))?;
        let ty = schema.column(idx).ty;
        let literal = parse_literal(self.literal, ty)?;
        Ok(Expr::Compare(
            self.comparison.clone(),
            Box::new(Expr::column(idx)),
            Box::new(Expr::literal(literal)),
        ))
    }
}

fn parse_literal(text: &str, ty: db_storage::ColumnType) -> Result<Value, DbError> {
    use db_storage::ColumnType;
    let text = text.trim_matches('\'').trim_matches('"');
    let malformed = || DbError::Parse(ParseError::new(format!("malformed literal: {text}")));
    match ty {
        ColumnType::Int32 => text.parse().map(Value::Int32).map_err(|_| malformed()),
        ColumnType::Int64 | ColumnType::Decimal { .. } => text.parse().map(Value::Int64).map_err(|_| malformed()),
        ColumnType::Date => text
            .parse()
            .map(|d| Value::Date(db_storage::Date(d)))
            .map_err(|_| malformed()),
        ColumnType::Bool => text.parse().map(Value::Bool).map_err(|_| malformed()),
        ColumnType::Char(_) => Ok(Value::Char(text.as_bytes().to_vec())),
    }
}

fn parse_comparison(op: &str) -> Option<Comparison> {
    match op {
        "=" => Some(Comparison::Eq),
        "!=" | "<>" => Some(Comparison::Ne),
        "<" => Some(Comparison::Lt),
        "<=" => Some(Comparison::Le),
        ">" => Some(Comparison::Gt),
        ">=" => Some(Comparison::Ge),
        _ => None,
    }
}

impl QueryEngine for LocalEngine {
    fn execute(&self, statement: &str) -> Result<db_server::QueryResult, DbError> {
        let stmt = statement.trim().trim_end_matches(';');
        let upper = stmt.to_ascii_uppercase();

        if upper == "SHOW TABLES" {
            let names = self.database.read().expect("database lock poisoned").table_names();
            let schema = Arc::new(Schema::new(vec![db_storage::Column::new("name", db_storage::ColumnType::Char(64))]));
            let mut tile = PaxTile::new_client_tile(schema.clone());
            for name in names {
                let mut bytes = name.into_bytes();
                bytes.resize(64, 0);
                tile.allocate()
                    .expect("client tile has unbounded capacity")
                    .set(0, &Value::Char(bytes));
            }
            let mut result = db_server::QueryResult::new(schema);
            result.append_tile(Arc::new(tile));
            return Ok(result);
        }

        if upper.starts_with("DESCRIBE ") {
            let table_name = stmt[9..].trim();
            let db = self.database.read().expect("database lock poisoned");
            let table = db
                .table(table_name)
                .ok_or_else(|| DbError::Execution(ExecutionError::SymbolNotFound(table_name.to_string())))?;
            let descriptions = db_operators::describe_columns(table.read().expect("table lock poisoned").schema());
            let schema = Arc::new(Schema::new(vec![
                db_storage::Column::new("name", db_storage::ColumnType::Char(64)),
                db_storage::Column::new("type", db_storage::ColumnType::Char(32)),
                db_storage::Column::new("nullable", db_storage::ColumnType::Bool),
            ]));
            let mut tile = PaxTile::new_client_tile(schema.clone());
            for description in descriptions {
                let mut name_bytes = description.name.into_bytes();
                name_bytes.resize(64, 0);
                let mut type_bytes = description.type_name.into_bytes();
                type_bytes.resize(32, 0);
                let mut row = tile.allocate().expect("client tile has unbounded capacity");
                row.set(0, &Value::Char(name_bytes));
                row.set(1, &Value::Char(type_bytes));
                row.set(2, &Value::Bool(description.is_nullable));
            }
            let mut result = db_server::QueryResult::new(schema);
            result.append_tile(Arc::new(tile));
            return Ok(result);
        }

        parse_and_run_select(self, stmt)
    }

    fn table_names(&self) -> Vec<String> {
        self.database.read().expect("database lock poisoned").table_names()
    }
}

/// `SELECT <* | col[, col...]> FROM <table> [WHERE <col> <op> <literal>]`.
fn parse_and_run_select(engine: &LocalEngine, stmt: &str) -> Result<db_server::QueryResult, DbError> {
    let rest = strip_keyword(stmt, "SELECT").ok_or_else(unsupported_statement)?;
    let (projection_text, rest) = split_keyword(rest, "FROM").ok_or_else(unsupported_statement)?;
    let (table_text, where_text) = match split_keyword(rest, "WHERE") {
        Some((table, predicate)) => (table, Some(predicate)),
        None => (rest, None),
    };

    let columns = if projection_text.trim() == "*" {
        ColumnSelector::Star
    } else {
        ColumnSelector::Named(projection_text.split(',').map(|c| c.trim().to_string()).collect())
    };
    let table_name = table_text.trim().to_string();

    let predicate = match where_text {
        Some(text) => Some(parse_predicate(text)?),
        None => None,
    };

    engine.run_select(&table_name, &columns, predicate)
}

fn parse_predicate(text: &str) -> Result<RawPredicate<'_>, DbError> {
    let text = text.trim();
    for op in ["!=", "<>", ">=", "<=", "=", "<", ">"] {
        if let Some(pos) = text.find(op) {
            let column = text[..pos].trim();
            let literal = text[pos + op.len()..].trim();
            let comparison = parse_comparison(op).expect("op drawn from the recognised list above");
            return Ok(RawPredicate { column, comparison, literal });
        }
    }
    Err(unsupported_statement())
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let text = text.trim_start();
    if text.len() >= keyword.len() && text[..keyword.len()].eq_ignore_ascii_case(keyword) {
        Some(&text[keyword.len()..])
    } else {
        None
    }
}

/// Splits `text` at the first case-insensitive occurrence of `keyword`,
/// treated as a whole word (surrounded by whitespace or string boundaries).
fn split_keyword<'a>(text: &'a str, keyword: &str) -> Option<(&'a str, &'a str)> {
    let upper = text.to_ascii_uppercase();
    let pattern = format!(" {} ", keyword);
    upper.find(&pattern).map(|pos| {
        let before = &text[..pos];
        let after = &text[pos + pattern.len()..];
        (before, after)
    })
}

fn unsupported_statement() -> DbError {
    DbError::Parse(ParseError::new(
        "only SHOW TABLES, DESCRIBE <table>, and SELECT <cols> FROM <table> [WHERE <col> <op> <lit>] are recognised at this boundary",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use db_storage::{Column, ColumnType, Table};

    fn sample_database() -> Arc<RwLock<Database>> {
        let schema = Arc::new(Schema::new(vec![
            Column::new("id", ColumnType::Int32).primary_key(),
            Column::new("amount", ColumnType::Int64),
        ]));
        let mut db = Database::new(1);
        let mut table = Table::new("orders", schema, 1);
        {
            let tile = table.tiles_of_mut(0);
            let mut t = PaxTile::new(table.schema().clone());
            for i in 0..3 {
                let mut row = t.allocate().unwrap();
                row.set(0, &Value::Int32(i));
                row.set(1, &Value::Int64((i as i64) * 100));
            }
            tile.push(t);
        }
        db.create_table(table).unwrap();
        Arc::new(RwLock::new(db))
    }

    #[test]
    fn show_tables_lists_created_tables() {
        let engine = LocalEngine::new(sample_database());
        let result = engine.execute("SHOW TABLES").unwrap();
        assert_eq!(result.row_count(), 1);
    }

    #[test]
    fn select_star_scans_every_row() {
        let engine = LocalEngine::new(sample_database());
        let result = engine.execute("SELECT * FROM orders").unwrap();
        assert_eq!(result.row_count(), 3);
        assert_eq!(result.schema().column_count(), 2);
    }

    #[test]
    fn select_with_projection_narrows_schema() {
        let engine = LocalEngine::new(sample_database());
        let result = engine.execute("SELECT amount FROM orders").unwrap();
        assert_eq!(result.schema().column_count(), 1);
        assert_eq!(result.schema().column(0).name, "amount");
    }

    #[test]
    fn select_with_where_filters_rows() {
        let engine = LocalEngine::new(sample_database());
        let result = engine.execute("SELECT * FROM orders WHERE id > 0").unwrap();
        assert_eq!(result.row_count(), 2);
    }

    #[test]
    fn unknown_table_is_reported() {
        let engine = LocalEngine::new(sample_database());
        assert!(engine.execute("SELECT * FROM nonexistent").is_err());
    }
}
