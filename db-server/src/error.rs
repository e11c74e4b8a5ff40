pub use db_kernel::error::{DbError, DbResult, IoError};
