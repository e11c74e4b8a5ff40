//! Materialises a logical plan into an executable DAG: producer nodes route
//! tokens to consumers on the worker that owns the referenced tile, with a
//! per-edge finalisation barrier gating binary nodes' build/probe hand-off.

pub mod barrier;
pub mod graph;
pub mod node;
pub mod token;

pub use barrier::FinalisationBarrier;
pub use graph::{DataflowGraph, EdgeId, GraphEmitter};
pub use node::{Arity, DataflowNode, Emitter, NodeId, TaskResult};
pub use token::{AccessIntention, Annotation, PrefetchDescriptor, RecordSet, RowMask, Target, Token};
