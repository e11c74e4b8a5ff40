//! The dataflow graph itself: an arena of nodes plus edges carrying a
//! finalisation barrier. Edges are index pairs, not references, so the graph
//! has no reference cycles even though finalisation needs a back-edge count
//! (spec §9 "Cyclic graphs").

use crate::barrier::FinalisationBarrier;
use crate::node::{DataflowNode, Emitter, NodeId};
use crate::token::Token;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeId(pub u32);

pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    /// 0 for a unary node's single input, or a binary node's build side; 1
    /// for a binary node's probe side.
    pub input_index: u8,
    pub barrier: FinalisationBarrier,
}

pub struct DataflowGraph {
    nodes: Vec<Box<dyn DataflowNode>>,
    edges: Vec<Edge>,
    /// Every node has at most one successor edge (spec §4.2: "single
    /// successor"), except a join's two input edges which both target the
    /// same join node.
    successor_of: FxHashMap<u32, EdgeId>,
}

impl DataflowGraph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            successor_of: FxHashMap::default(),
        }
    }

    pub fn add_node(&mut self, node: Box<dyn DataflowNode>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &dyn DataflowNode {
        self.nodes[id.0 as usize].as_ref()
    }

    /// Connects `from`'s output to `to`'s input slot `input_index`,
    /// allocating a fresh finalisation barrier for the edge.
    pub fn connect(&mut self, from: NodeId, to: NodeId, input_index: u8) -> EdgeId {
        let edge_id = EdgeId(self.edges.len() as u32);
        self.edges.push(Edge {
            from,
            to,
            input_index,
            barrier: FinalisationBarrier::new(),
        });
        self.successor_of.insert(from.0, edge_id);
        edge_id
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.0 as usize]
    }

    pub fn successor_edge(&self, from: NodeId) -> Option<EdgeId> {
        self.successor_of.get(&from.0).copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Default for DataflowGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes `emit` calls from a node's `consume` to the node's successor edge,
/// bumping that edge's in-flight counter and collecting `(target, token)`
/// pairs for the runtime to schedule as tasks.
pub struct GraphEmitter<'g> {
    graph: &'g DataflowGraph,
    outbox: Vec<(NodeId, u8, Token)>,
}

impl<'g> GraphEmitter<'g> {
    pub fn new(graph: &'g DataflowGraph) -> Self {
        Self {
            graph,
            outbox: Vec::new(),
        }
    }

    pub fn drain(self) -> Vec<(NodeId, u8, Token)> {
        self.outbox
    }
}

impl<'g> Emitter for GraphEmitter<'g> {
    fn emit(&mut self, worker_id: u8, from: NodeId, token: Token) {
        let _ = worker_id;
        if let Some(edge_id) = self.graph.successor_edge(from) {
            let edge = self.graph.edge(edge_id);
            edge.barrier.token_emitted();
            self.outbox.push((edge.to, edge.input_index, token));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Arity;
    use crate::token::{AccessIntention, Annotation, RecordSet, Target};
    use db_kernel::error::ExecutionError;
    use db_storage::{Column, ColumnType, PaxTile, Schema};
    use std::sync::Arc;

    struct Sink;
    impl DataflowNode for Sink {
        fn arity(&self) -> Arity {
            Arity::Unary
        }
        fn consume(
            &self,
            _worker_id: u8,
            _input_index: u8,
            _token: Token,
            _emitter: &mut dyn Emitter,
        ) -> Result<(), ExecutionError> {
            Ok(())
        }
    }

    struct Forward;
    impl DataflowNode for Forward {
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
    fn emit_bumps_successor_edge_in_flight() {
        let mut graph = DataflowGraph::new();
        let forward = graph.add_node(Box::new(Forward));
        let sink = graph.add_node(Box::new(Sink));
        let edge_id = graph.connect(forward, sink, 0);

        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let tile = Arc::new(PaxTile::new(schema));
        let token = Token::new(
            RecordSet::new(tile),
            Annotation::new(Target::Local, AccessIntention::ReadOnly),
        );

        let mut emitter = GraphEmitter::new(&graph);
        graph.node(forward).consume(0, 0, token, &mut emitter).unwrap();
        let routed = emitter.drain();

        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].0, sink);
        assert!(!graph.edge(edge_id).barrier.is_finalised());
    }
}
