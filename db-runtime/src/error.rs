//! Re-exports the shared error hierarchy; the runtime itself raises nothing
//! beyond what a dispatched task's execution already reports through
//! `db_kernel::error::ExecutionError`.

pub use db_kernel::error::{DbError, DbResult, ExecutionError};
