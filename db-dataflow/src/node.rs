//! The dataflow node contract: arity, annotation generation for producers,
//! and per-token consumption.

use crate::token::Token;
use db_kernel::error::ExecutionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Nullary,
    Unary,
    Binary,
}

/// What a node's `execute` returned: whether the task frees itself and
/// whether a follow-up task runs in-place or must be rescheduled (spec §4.1
/// "Task results").
pub enum TaskResult {
    Remove,
    Succeed(Box<dyn FnOnce(&mut dyn Emitter) -> Result<TaskResult, ExecutionError>>),
    SucceedAndRemove(Box<dyn FnOnce(&mut dyn Emitter) -> Result<TaskResult, ExecutionError>>),
    Stop,
}

/// Handed to a node's `consume` so it can hand tokens downstream without
/// knowing the graph's edge bookkeeping.
pub trait Emitter {
    fn emit(&mut self, worker_id: u8, from: NodeId, token: Token);
}

/// A node in the dataflow graph. Binary nodes (joins) distinguish their
/// build edge (input 0) from their probe edge (input 1) in `consume` via
/// `input_index`.
pub trait DataflowNode: Send + Sync {
    fn arity(&self) -> Arity;

    /// True when a token for this node must be consumed on the worker that
    /// owns its tile (the default for almost every operator).
    fn requires_owner_affinity(&self) -> bool {
        true
    }

    /// For producer (nullary) nodes: the initial set of tokens to schedule,
    /// one per owned tile for a scan, or a single empty token otherwise.
    fn initial_tokens(&self, _worker_id: u8) -> Vec<Token> {
        Vec::new()
    }

    fn consume(
        &self,
        worker_id: u8,
        input_index: u8,
        token: Token,
        emitter: &mut dyn Emitter,
    ) -> Result<(), ExecutionError>;

    /// Invoked once a binary node's build edge finalises (§4.2 step 3).
    fn on_build_complete(&self, _emitter: &mut dyn Emitter) -> Result<(), ExecutionError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{AccessIntention, Annotation, RecordSet, Target};
    use db_storage::{Column, ColumnType, PaxTile, Schema};
    use std::sync::Arc;

    struct RecordingEmitter {
        emitted: Vec<(u8, NodeId)>,
    }

    impl Emitter for RecordingEmitter {
        fn emit(&mut self, worker_id: u8, from: NodeId, _token: Token) {
            self.emitted.push((worker_id, from));
        }
    }

    struct PassThrough;

    impl DataflowNode for PassThrough {
        fn arity(&self) -> Arity {
            Arity::Unary
        }

        fn consume(
            &self,
            worker_id: u8,
            _input_index: u8,
            token: Token,
            emitter: &mut dyn Emitter,
        ) -> Result<(), ExecutionError> {
            emitter.emit(worker_id, NodeId(0), token);
            Ok(())
        }
    }

    #[test]
    fn consume_emits_through_the_trait_object() {
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let tile = Arc::new(PaxTile::new(schema));
        let token = Token::new(
            RecordSet::new(tile),
            Annotation::new(Target::Local, AccessIntention::ReadOnly),
        );

        let node = PassThrough;
        let mut emitter = RecordingEmitter { emitted: Vec::new() };
        node.consume(0, 0, token, &mut emitter).unwrap();
        assert_eq!(emitter.emitted.len(), 1);
    }
}
