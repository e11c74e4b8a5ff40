//! PAX tile layout, the column type/value system operators compute over,
//! tables, and the persistent table file format.

pub mod database;
pub mod persist;
pub mod schema;
pub mod table;
pub mod tile;
pub mod types;

pub use database::Database;
pub use persist::{restore_tables, save_tables, update_statistics};
pub use schema::{Column, Schema, CACHE_LINE, TILE_HEADER_SIZE, TUPLES_PER_TILE};
pub use table::Table;
pub use tile::{PaxTile, RowView, RowViewMut};
pub use types::{cast, ColumnType, Date, Value};
