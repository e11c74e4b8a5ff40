//! Logical plan node kinds and the cached per-node output relation (schema
//! plus estimated cardinality) the optimizer recomputes whenever a rule
//! marks the plan as changed (spec §4.9).

use db_operators::{AggregateSpec, AggregationMethod, Expr, JoinMethod, OrderByMethod, OutputColumn, SortKey};
use db_storage::Schema;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// A node's recomputed output: schema plus estimated row count. Producer
/// nodes seed this from the catalog; every other node recomputes it from
/// its children via `CardinalityEstimator`.
#[derive(Debug, Clone)]
pub struct Relation {
    pub schema: Arc<Schema>,
    pub cardinality: u64,
}

#[derive(Debug, Clone)]
pub enum LogicalNode {
    Table {
        name: String,
        schema: Arc<Schema>,
        cardinality: u64,
    },
    /// A scan fused with a predicate over the scanned table directly
    /// (`MergeTableSelection`'s target shape).
    TableSelection {
        name: String,
        schema: Arc<Schema>,
        table_cardinality: u64,
        predicate: Expr,
        selectivity: Option<f64>,
    },
    Selection {
        predicate: Expr,
        /// Cached by `AnnotatePredicates`; `None` until that rule has run
        /// over this node at least once.
        selectivity: Option<f64>,
    },
    Projection {
        output_schema: Arc<Schema>,
        source_columns: Vec<usize>,
    },
    Arithmetic {
        output_schema: Arc<Schema>,
        input_column_count: usize,
        expressions: Vec<Expr>,
    },
    Aggregation {
        group_by_columns: Vec<usize>,
        specs: Vec<AggregateSpec>,
        output_schema: Arc<Schema>,
        method: Option<AggregationMethod>,
    },
    Join {
        output_schema: Arc<Schema>,
        output_columns: Vec<OutputColumn>,
        predicate: Expr,
        build_column_count: usize,
        method: Option<JoinMethod>,
    },
    OrderBy {
        keys: Vec<SortKey>,
        method: Option<OrderByMethod>,
        top_k: Option<usize>,
    },
    Limit {
        skip: u64,
        take: u64,
    },
    Copy {
        path: String,
        delimiter: char,
        schema: Arc<Schema>,
    },
    Insert {
        table: String,
    },
    Create {
        table: String,
        schema: Arc<Schema>,
    },
    Describe {
        table: String,
    },
    ShowTables,
    UpdateStatistics {
        table: String,
    },
}

impl LogicalNode {
    /// How many children this node's shape expects — 0 for producers, 1 for
    /// everything unary, 2 only for joins (spec §4.9 "joins are the only
    /// binary [node]").
    pub fn arity(&self) -> usize {
        match self {
            LogicalNode::Table { .. }
            | LogicalNode::TableSelection { .. }
            | LogicalNode::Copy { .. }
            | LogicalNode::Create { .. }
            | LogicalNode::Describe { .. }
            | LogicalNode::ShowTables
            | LogicalNode::UpdateStatistics { .. } => 0,
            LogicalNode::Join { .. } => 2,
            _ => 1,
        }
    }

    pub fn is_selection(&self) -> bool {
        matches!(self, LogicalNode::Selection { .. })
    }

    pub fn predicate(&self) -> Option<&Expr> {
        match self {
            LogicalNode::Selection { predicate, .. } | LogicalNode::TableSelection { predicate, .. } => Some(predicate),
            LogicalNode::Join { predicate, .. } => Some(predicate),
            _ => None,
        }
    }

    pub fn predicate_mut(&mut self) -> Option<&mut Expr> {
        match self {
            LogicalNode::Selection { predicate, .. } | LogicalNode::TableSelection { predicate, .. } => Some(predicate),
            LogicalNode::Join { predicate, .. } => Some(predicate),
            _ => None,
        }
    }

    /// Cached selectivity set by `AnnotatePredicates`; `None` for anything
    /// that isn't a filtering node, or for a selection it hasn't visited yet.
    pub fn selectivity(&self) -> Option<f64> {
        match self {
            LogicalNode::Selection { selectivity, .. } | LogicalNode::TableSelection { selectivity, .. } => *selectivity,
            _ => None,
        }
    }

    pub fn set_selectivity(&mut self, value: f64) {
        match self {
            LogicalNode::Selection { selectivity, .. } | LogicalNode::TableSelection { selectivity, .. } => {
                *selectivity = Some(value);
            }
            _ => {}
        }
    }
}
