//! Drives the fixed a-through-m rule pipeline to convergence (spec §4.10).

use crate::cardinality::CardinalityEstimator;
use crate::rules::{all_rules, StatsCatalog};
use crate::view::PlanView;

/// A plan still being rewritten after this many full a-m passes indicates a
/// rule cycling rather than slow convergence.
const MAX_ROUNDS: usize = 64;

pub struct Optimizer;

impl Optimizer {
    /// Runs every rule in spec order. A rule that reports `multi_pass` is
    /// re-applied back to back until it stops changing anything before the
    /// pipeline moves to the next rule; a rule that reports
    /// `affects_relation` triggers a full relation recompute once it has
    /// settled. The whole ordered pipeline repeats until a complete round
    /// makes no change.
    pub fn optimize(view: &mut PlanView, catalog: &dyn StatsCatalog) {
        CardinalityEstimator::recompute_all(view);
        let rules = all_rules();

        for _ in 0..MAX_ROUNDS {
            let mut round_changed = false;
            for rule in &rules {
                let mut changed = rule.apply(view, catalog);
                if changed && rule.multi_pass() {
                    while rule.apply(view, catalog) {}
                }
                if changed && rule.affects_relation() {
                    CardinalityEstimator::recompute_all(view);
                }
                round_changed |= changed;
            }
            if !round_changed {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::LogicalNode;
    use db_operators::Expr;
    use db_stats::Statistics;
    use db_storage::{Column, ColumnType, Schema, Value};
    use std::sync::Arc;

    struct NoStats;
    impl StatsCatalog for NoStats {
        fn statistics_for(&self, _table: &str) -> Option<Statistics> {
            None
        }
    }

    #[test]
    fn merges_selection_over_table_into_table_selection() {
        let mut view = PlanView::new();
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let table = view.alloc(LogicalNode::Table { name: "t".into(), schema, cardinality: 100 });
        let predicate = Expr::Compare(db_operators::Comparison::Eq, Box::new(Expr::column(0)), Box::new(Expr::literal(Value::Int32(1))));
        let selection = view.alloc(LogicalNode::Selection { predicate, selectivity: None });
        view.attach(selection, table);
        view.set_root(selection);

        Optimizer::optimize(&mut view, &NoStats);

        assert!(matches!(view.node(view.root()), LogicalNode::TableSelection { .. }));
    }

    #[test]
    fn merges_stacked_selections_into_one_and_tree() {
        let mut view = PlanView::new();
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32), Column::new("b", ColumnType::Int32)]));
        let table = view.alloc(LogicalNode::Table { name: "t".into(), schema, cardinality: 100 });
        let p1 = Expr::Compare(db_operators::Comparison::Eq, Box::new(Expr::column(0)), Box::new(Expr::literal(Value::Int32(1))));
        let p2 = Expr::Compare(db_operators::Comparison::Eq, Box::new(Expr::column(1)), Box::new(Expr::literal(Value::Int32(2))));
        let inner = view.alloc(LogicalNode::Selection { predicate: p2, selectivity: None });
        view.attach(inner, table);
        let outer = view.alloc(LogicalNode::Selection { predicate: p1, selectivity: None });
        view.attach(outer, inner);
        view.set_root(outer);

        Optimizer::optimize(&mut view, &NoStats);

        // Both predicates collapse into one TableSelection over a single AND tree.
        assert!(matches!(view.node(view.root()), LogicalNode::TableSelection { .. }));
    }
}
