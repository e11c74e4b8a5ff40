//! A plain cost model: the sum of every join's build-side cardinality in
//! the plan (spec §4.10, closing paragraph). Used to compare two rewrites
//! of the same subtree when a rule could apply either way.

use crate::node::LogicalNode;
use crate::view::PlanView;

pub struct CostModel;

impl CostModel {
    pub fn cost(view: &PlanView) -> u64 {
        let mut total = 0u64;
        view.walk_post_order(view.root(), &mut |v, id| {
            if let LogicalNode::Join { .. } = v.node(id) {
                let build_side = v.children_of(id)[0];
                total += v.relation(build_side).map(|r| r.cardinality).unwrap_or(0);
            }
        });
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cardinality::CardinalityEstimator;
    use crate::node::Relation;
    use db_operators::{Expr, JoinMethod, OutputColumn};
    use db_storage::{Column, ColumnType, Schema};
    use std::sync::Arc;

    #[test]
    fn sums_build_side_cardinality_of_every_join() {
        let mut view = PlanView::new();
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let left = view.alloc(LogicalNode::Table { name: "l".into(), schema: schema.clone(), cardinality: 10 });
        let right = view.alloc(LogicalNode::Table { name: "r".into(), schema: schema.clone(), cardinality: 1000 });
        let join = view.alloc(LogicalNode::Join {
            output_schema: schema,
            output_columns: vec![OutputColumn::Build(0)],
            predicate: Expr::Compare(db_operators::Comparison::Eq, Box::new(Expr::column(0)), Box::new(Expr::column(1))),
            build_column_count: 1,
            method: Some(JoinMethod::Hash),
        });
        view.attach(join, left);
        view.attach(join, right);
        view.set_root(join);

        CardinalityEstimator::recompute_all(&mut view);
        let _: &Relation = view.relation(left).unwrap();
        assert_eq!(CostModel::cost(&view), 10);
    }
}
