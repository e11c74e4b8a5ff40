//! Selectivity formulas and bottom-up relation (schema + cardinality)
//! recomputation (spec §4.9).

use crate::node::{LogicalNode, NodeId, Relation};
use crate::view::PlanView;
use db_operators::{Comparison, Expr};
use db_stats::{Histogram, Statistics};
use db_storage::Schema;
use std::sync::Arc;

pub struct CardinalityEstimator;

impl CardinalityEstimator {
    /// Selectivity of `predicate` against `stats`, the statistics catalog of
    /// the table the predicate's columns are drawn from. Equality and range
    /// comparisons consult the referenced column's histogram when one is
    /// present; `AND` multiplies, `OR` sums (clamped to 1.0); a missing
    /// histogram falls back to `1/distinct_count` for equality or `0.5`
    /// otherwise.
    pub fn selectivity(predicate: &Expr, stats: Option<&Statistics>) -> f64 {
        match predicate {
            Expr::Compare(op, lhs, rhs) => match column_and_key(lhs, rhs) {
                Some((column, key)) => column_comparison_selectivity(op, column, key, stats),
                None => 0.5,
            },
            Expr::Between(value, lo, hi) => {
                let (Expr::Column(column), Expr::Literal(lo_value), Expr::Literal(hi_value)) =
                    (value.as_ref(), lo.as_ref(), hi.as_ref())
                else {
                    return 0.5;
                };
                let (Some(lo_key), Some(hi_key)) = (lo_value.as_histogram_key(), hi_value.as_histogram_key()) else {
                    return 0.5;
                };
                match stats.and_then(|s| s.histogram(*column)) {
                    Some(h) => ratio(h.approximate_between(lo_key, hi_key), stats.map(Statistics::row_count).unwrap_or(0)),
                    None => 0.5,
                }
            }
            Expr::In(value, list) => {
                let total: f64 = list
                    .iter()
                    .map(|candidate| {
                        let as_eq = Expr::Compare(Comparison::Eq, value.clone(), Box::new(candidate.clone()));
                        Self::selectivity(&as_eq, stats)
                    })
                    .sum();
                total.min(1.0)
            }
            Expr::And(l, r) => Self::selectivity(l, stats) * Self::selectivity(r, stats),
            Expr::Or(l, r) => (Self::selectivity(l, stats) + Self::selectivity(r, stats)).min(1.0),
            Expr::Not(inner) => 1.0 - Self::selectivity(inner, stats),
            _ => 0.5,
        }
    }

    /// Recomputes every node's output relation bottom-up, reading cached
    /// selection selectivity rather than recomputing it — call after
    /// `AnnotatePredicates` and again after any rule reporting
    /// `affects_relation`.
    pub fn recompute_all(view: &mut PlanView) {
        let root = view.root();
        recompute_node(view, root);
    }
}

/// A plain `column = literal` or `literal = column` comparison's column and
/// normalized key, if the expression has that shape.
fn column_and_key(lhs: &Expr, rhs: &Expr) -> Option<(usize, i64)> {
    match (lhs, rhs) {
        (Expr::Column(c), Expr::Literal(v)) | (Expr::Literal(v), Expr::Column(c)) => v.as_histogram_key().map(|k| (*c, k)),
        _ => None,
    }
}

fn column_comparison_selectivity(op: &Comparison, column: usize, key: i64, stats: Option<&Statistics>) -> f64 {
    let Some(stats) = stats else {
        return match op {
            Comparison::Eq => 1.0,
            _ => 0.5,
        };
    };
    match stats.histogram(column) {
        Some(h) => {
            let count = match op {
                Comparison::Eq => h.approximate_equals(key),
                Comparison::Ne => h.approximate_not_equals(key),
                Comparison::Lt => h.approximate_lesser(key),
                Comparison::Le => h.approximate_lesser_equals(key),
                Comparison::Gt => h.approximate_greater(key),
                Comparison::Ge => h.approximate_greater_equals(key),
            };
            ratio(count, stats.row_count())
        }
        None => match op {
            Comparison::Eq => 1.0 / stats.distinct_count(column).max(1) as f64,
            _ => 0.5,
        },
    }
}

fn ratio(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (count as f64 / total as f64).min(1.0)
    }
}

fn empty_relation() -> Relation {
    Relation { schema: Arc::new(Schema::new(Vec::new())), cardinality: 0 }
}

fn recompute_node(view: &mut PlanView, node: NodeId) {
    let children = view.children_of(node).to_vec();
    for child in &children {
        recompute_node(view, *child);
    }

    let relation = match view.node(node).clone() {
        LogicalNode::Table { schema, cardinality, .. } => Relation { schema, cardinality },
        LogicalNode::TableSelection { schema, table_cardinality, selectivity, .. } => {
            let sel = selectivity.unwrap_or(1.0);
            Relation { schema, cardinality: ((table_cardinality as f64) * sel).ceil() as u64 }
        }
        LogicalNode::Selection { selectivity, .. } => {
            let child = view.relation(children[0]).expect("child relation computed").clone();
            let sel = selectivity.unwrap_or(1.0);
            Relation { schema: child.schema, cardinality: ((child.cardinality as f64) * sel).ceil() as u64 }
        }
        LogicalNode::Projection { output_schema, .. } | LogicalNode::Arithmetic { output_schema, .. } => {
            let child = view.relation(children[0]).expect("child relation computed").clone();
            Relation { schema: output_schema, cardinality: child.cardinality }
        }
        LogicalNode::Aggregation { group_by_columns, output_schema, .. } => {
            let child = view.relation(children[0]).expect("child relation computed").clone();
            let cardinality = if group_by_columns.is_empty() {
                1
            } else {
                (child.cardinality as f64).sqrt().ceil() as u64
            };
            Relation { schema: output_schema, cardinality }
        }
        // Join cardinality formula is unspecified by the source material;
        // the containment-assumption estimate (product over the larger
        // side) degrades to `min(build, probe)`, a conservative default
        // when no join-key distinct count is tracked at this layer.
        LogicalNode::Join { output_schema, .. } => {
            let build = view.relation(children[0]).expect("child relation computed").clone();
            let probe = view.relation(children[1]).expect("child relation computed").clone();
            Relation { schema: output_schema, cardinality: build.cardinality.min(probe.cardinality).max(1) }
        }
        LogicalNode::OrderBy { .. } => view.relation(children[0]).expect("child relation computed").clone(),
        LogicalNode::Limit { skip, take } => {
            let child = view.relation(children[0]).expect("child relation computed").clone();
            Relation { schema: child.schema, cardinality: child.cardinality.saturating_sub(skip).min(take) }
        }
        LogicalNode::Copy { schema, .. } => Relation { schema, cardinality: 0 },
        LogicalNode::Create { schema, .. } => Relation { schema, cardinality: 0 },
        LogicalNode::Insert { .. }
        | LogicalNode::Describe { .. }
        | LogicalNode::ShowTables
        | LogicalNode::UpdateStatistics { .. } => empty_relation(),
    };
    view.set_relation(node, relation);
}

#[cfg(test)]
mod tests {
    use super::*;
    use db_stats::{AnyHistogram, EquiDepthHistogramBuilder};

    #[test]
    fn equality_without_histogram_falls_back_to_distinct_count() {
        let mut stats = Statistics::new(1);
        stats.set_row_count(100);
        stats.set_distinct_count(0, 10);
        let predicate = Expr::Compare(Comparison::Eq, Box::new(Expr::column(0)), Box::new(Expr::literal(db_storage::Value::Int64(5))));
        assert_eq!(CardinalityEstimator::selectivity(&predicate, Some(&stats)), 0.1);
    }

    #[test]
    fn and_multiplies_component_selectivities() {
        let mut stats = Statistics::new(1);
        stats.set_row_count(100);
        stats.set_distinct_count(0, 10);
        let eq = Expr::Compare(Comparison::Eq, Box::new(Expr::column(0)), Box::new(Expr::literal(db_storage::Value::Int64(5))));
        let and = Expr::And(Box::new(eq.clone()), Box::new(eq));
        assert_eq!(CardinalityEstimator::selectivity(&and, Some(&stats)), 0.01);
    }

    #[test]
    fn histogram_backed_equality_uses_approximate_equals() {
        let mut builder = EquiDepthHistogramBuilder::new();
        for v in 0..100i64 {
            builder.insert(v % 10);
        }
        let histogram = builder.build(4).unwrap();
        let mut stats = Statistics::new(1);
        stats.set_row_count(100);
        stats.set_histogram(0, AnyHistogram::EquiDepth(histogram));

        let predicate = Expr::Compare(Comparison::Eq, Box::new(Expr::column(0)), Box::new(Expr::literal(db_storage::Value::Int64(3))));
        let sel = CardinalityEstimator::selectivity(&predicate, Some(&stats));
        assert!(sel > 0.0 && sel <= 1.0);
    }
}
