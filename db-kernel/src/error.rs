//! Flat error hierarchy shared by every crate above `db-kernel`.
//!
//! One `thiserror`-derived enum per boundary kind rather than ad hoc
//! `String`/`Box<dyn Error>` plumbing, matching how the runtime's warm-path
//! crate reports query failures.

use thiserror::Error;

/// Top-level error returned across crate boundaries.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("io error: {0}")]
    Io(#[from] IoError),
}

/// Raised only at the statement-parsing boundary; nothing downstream produces
/// this variant once a statement has become a logical plan.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("unknown column: {0} on table {1}")]
    UnknownColumn(String, String),

    #[error("ambiguous column reference: {0}")]
    AmbiguousColumn(String),

    #[error("malformed plan: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("rule {rule} failed to apply: {reason}")]
    RuleFailed { rule: String, reason: String },

    #[error("cycle detected while rewriting plan")]
    Cycle,
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("operator not implemented: {0}")]
    NotImplemented(String),

    #[error("cast error: cannot convert {from} to {to}")]
    Cast { from: String, to: String },

    #[error("operation not allowed: {0}")]
    OperationNotAllowed(String),

    #[error("symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("expression not found: {0}")]
    ExpressionNotFound(String),

    #[error("could not compile expression: {0}")]
    CouldNotCompile(String),
}

#[derive(Debug, Error)]
pub enum IoError {
    #[error("{0}")]
    Std(#[from] std::io::Error),

    #[error("malformed wire frame: {0}")]
    MalformedFrame(String),

    #[error("table file corrupt: {0}")]
    CorruptTableFile(String),
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_carry_messages() {
        let err: DbError = PlanError::UnknownTable("orders".into()).into();
        assert!(err.to_string().contains("orders"));
    }
}
