//! The fixed 13-rule optimizer pipeline (spec §4.10). Each rule is a small
//! struct implementing [`Rule`]; `all_rules` returns them in the exact order
//! the pipeline applies them in.

use crate::cardinality::CardinalityEstimator;
use crate::node::{LogicalNode, NodeId};
use crate::view::PlanView;
use db_operators::{choose_aggregation_method, choose_join_method, choose_order_by_method};
use db_operators::{Comparison, Expr};
use db_stats::Statistics;
use db_storage::{Column, ColumnType, Date, Schema, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Resolves a table's statistics catalog entry by name — implemented by
/// whatever owns the `Database` (spec §4.8's per-table `Statistics`).
pub trait StatsCatalog {
    fn statistics_for(&self, table: &str) -> Option<Statistics>;
}

pub trait Rule {
    fn name(&self) -> &'static str;

    /// Whether the pipeline should keep re-applying this rule to the same
    /// plan until a round produces no change, rather than running it once.
    fn multi_pass(&self) -> bool {
        false
    }

    /// Whether this rule changes a node's schema or cardinality, so the
    /// optimizer driver must recompute relations after it runs.
    fn affects_relation(&self) -> bool {
        false
    }

    /// Applies the rule once across the whole plan; returns whether it
    /// changed anything.
    fn apply(&self, view: &mut PlanView, catalog: &dyn StatsCatalog) -> bool;
}

fn all_node_ids(view: &PlanView) -> Vec<NodeId> {
    let mut ids = Vec::new();
    view.walk_post_order(view.root(), &mut |_, id| ids.push(id));
    ids
}

/// Walks down through unary nodes from `node` to find the table this
/// predicate's columns would be resolved against, for selectivity lookups.
/// Stops (returns `None`) at a `Join`, since a predicate over a join's
/// combined row can't be attributed to one table.
fn nearest_table_name(view: &PlanView, node: NodeId) -> Option<String> {
    match view.node(node) {
        LogicalNode::Table { name, .. } | LogicalNode::TableSelection { name, .. } => Some(name.clone()),
        LogicalNode::Join { .. } => None,
        _ => {
            let children = view.children_of(node);
            if children.len() == 1 {
                nearest_table_name(view, children[0])
            } else {
                None
            }
        }
    }
}

/// a. Computes and caches selectivity on every selection node.
pub struct AnnotatePredicates;

impl Rule for AnnotatePredicates {
    fn name(&self) -> &'static str {
        "AnnotatePredicates"
    }

    fn apply(&self, view: &mut PlanView, catalog: &dyn StatsCatalog) -> bool {
        let mut changed = false;
        for id in all_node_ids(view) {
            let predicate = match view.node(id) {
                LogicalNode::Selection { predicate, .. } | LogicalNode::TableSelection { predicate, .. } => predicate.clone(),
                _ => continue,
            };
            let table = nearest_table_name(view, id);
            let stats = table.and_then(|t| catalog.statistics_for(&t));
            let selectivity = CardinalityEstimator::selectivity(&predicate, stats.as_ref());
            view.node_mut(id).set_selectivity(selectivity);
            changed = true;
        }
        changed
    }

    fn affects_relation(&self) -> bool {
        true
    }
}

/// Folds any fully-constant subtree (no column reference) to its evaluated
/// literal; shared by `EvaluatePredicate` and `RemoveFixedValueCast`, which
/// differ only in which expressions they're allowed to touch.
fn fold_constants(expr: &Expr) -> Expr {
    if !matches!(expr, Expr::Column(_) | Expr::Literal(_)) && expr.is_constant() {
        if let Ok(value) = db_operators::eval_with(expr, &|_| unreachable!("constant subtree reads no column")) {
            return Expr::Literal(value);
        }
    }
    match expr {
        Expr::Cast(inner, ty) => Expr::Cast(Box::new(fold_constants(inner)), *ty),
        Expr::Not(inner) => Expr::Not(Box::new(fold_constants(inner))),
        Expr::Compare(op, l, r) => Expr::Compare(op.clone(), Box::new(fold_constants(l)), Box::new(fold_constants(r))),
        Expr::Arithmetic(op, l, r) => Expr::Arithmetic(op.clone(), Box::new(fold_constants(l)), Box::new(fold_constants(r))),
        Expr::And(l, r) => Expr::And(Box::new(fold_constants(l)), Box::new(fold_constants(r))),
        Expr::Or(l, r) => Expr::Or(Box::new(fold_constants(l)), Box::new(fold_constants(r))),
        Expr::Between(v, lo, hi) => Expr::Between(Box::new(fold_constants(v)), Box::new(fold_constants(lo)), Box::new(fold_constants(hi))),
        Expr::In(v, list) => Expr::In(Box::new(fold_constants(v)), list.iter().map(fold_constants).collect()),
        other => other.clone(),
    }
}

fn rewrite_predicate(view: &mut PlanView, id: NodeId, rewrite: impl Fn(&Expr) -> Expr) -> bool {
    let Some(predicate) = view.node(id).predicate() else { return false };
    let rewritten = rewrite(predicate);
    if rewritten == *predicate {
        return false;
    }
    *view.node_mut(id).predicate_mut().expect("checked above") = rewritten;
    true
}

/// b. Constant-folds arithmetic and casts embedded in predicates.
pub struct EvaluatePredicate;

impl Rule for EvaluatePredicate {
    fn name(&self) -> &'static str {
        "EvaluatePredicate"
    }

    fn apply(&self, view: &mut PlanView, _catalog: &dyn StatsCatalog) -> bool {
        let mut changed = false;
        for id in all_node_ids(view) {
            if view.node(id).predicate().is_some() {
                changed |= rewrite_predicate(view, id, fold_constants);
            }
        }
        changed
    }
}

/// Replaces `Cast(literal, ty)` with its evaluated literal, wherever an
/// expression tree appears in the plan (predicates and arithmetic alike).
fn remove_fixed_casts(expr: &Expr) -> Expr {
    match expr {
        Expr::Cast(inner, ty) => {
            let inner = remove_fixed_casts(inner);
            if inner.is_constant() {
                if let Ok(value) = db_operators::eval_with(&Expr::Cast(Box::new(inner.clone()), *ty), &|_| {
                    unreachable!("constant subtree reads no column")
                }) {
                    return Expr::Literal(value);
                }
            }
            Expr::Cast(Box::new(inner), *ty)
        }
        Expr::Not(inner) => Expr::Not(Box::new(remove_fixed_casts(inner))),
        Expr::Compare(op, l, r) => Expr::Compare(op.clone(), Box::new(remove_fixed_casts(l)), Box::new(remove_fixed_casts(r))),
        Expr::Arithmetic(op, l, r) => Expr::Arithmetic(op.clone(), Box::new(remove_fixed_casts(l)), Box::new(remove_fixed_casts(r))),
        Expr::And(l, r) => Expr::And(Box::new(remove_fixed_casts(l)), Box::new(remove_fixed_casts(r))),
        Expr::Or(l, r) => Expr::Or(Box::new(remove_fixed_casts(l)), Box::new(remove_fixed_casts(r))),
        Expr::Between(v, lo, hi) => {
            Expr::Between(Box::new(remove_fixed_casts(v)), Box::new(remove_fixed_casts(lo)), Box::new(remove_fixed_casts(hi)))
        }
        Expr::In(v, list) => Expr::In(Box::new(remove_fixed_casts(v)), list.iter().map(remove_fixed_casts).collect()),
        other => other.clone(),
    }
}

/// c. Drops casts whose child is already a constant.
pub struct RemoveFixedValueCast;

impl Rule for RemoveFixedValueCast {
    fn name(&self) -> &'static str {
        "RemoveFixedValueCast"
    }

    fn apply(&self, view: &mut PlanView, _catalog: &dyn StatsCatalog) -> bool {
        let mut changed = false;
        for id in all_node_ids(view) {
            if view.node(id).predicate().is_some() {
                changed |= rewrite_predicate(view, id, remove_fixed_casts);
            }
            if let LogicalNode::Arithmetic { expressions, .. } = view.node_mut(id) {
                for e in expressions.iter_mut() {
                    let rewritten = remove_fixed_casts(e);
                    if rewritten != *e {
                        *e = rewritten;
                        changed = true;
                    }
                }
            }
        }
        changed
    }
}

/// Flattens a right-leaning `AND` tree into its conjuncts.
fn flatten_and(expr: &Expr, out: &mut Vec<Expr>) {
    match expr {
        Expr::And(l, r) => {
            flatten_and(l, out);
            flatten_and(r, out);
        }
        other => out.push(other.clone()),
    }
}

fn rebuild_and(mut conjuncts: Vec<Expr>) -> Expr {
    let mut tree = conjuncts.pop().expect("at least one conjunct");
    while let Some(next) = conjuncts.pop() {
        tree = Expr::And(Box::new(next), Box::new(tree));
    }
    tree
}

fn same_column(a: &Expr, column: usize) -> bool {
    matches!(a, Expr::Column(c) if *c == column)
}

/// Integer-domain successor/predecessor of a literal, used to turn a strict
/// bound (`Gt`/`Lt`) into the equivalent inclusive one (`Ge`/`Le`) so it can
/// be folded into `BETWEEN`, which only has inclusive bounds. Only defined
/// for the fixed-width integer-like domains (`INT32`, `INT64`, `DATE`) where
/// "next representable value" is unambiguous; `DECIMAL` and `CHAR` are left
/// untouched.
fn step_literal(expr: &Expr, delta: i64) -> Option<Expr> {
    match expr {
        Expr::Literal(Value::Int32(v)) => Some(Expr::Literal(Value::Int32((*v as i64 + delta) as i32))),
        Expr::Literal(Value::Int64(v)) => Some(Expr::Literal(Value::Int64(v + delta))),
        Expr::Literal(Value::Date(d)) => Some(Expr::Literal(Value::Date(Date(d.0 + delta as i32)))),
        _ => None,
    }
}

fn literals_equal(a: &Expr, b: &Expr) -> bool {
    matches!((a, b), (Expr::Literal(l), Expr::Literal(r)) if l == r)
}

/// d. Collapses `col >= lo AND col <= hi` (either order, and strict `>`/`<`
/// bounds on integer-like domains) into `BETWEEN`, further collapsing the
/// degenerate `BETWEEN(a, a)` into `= a`.
pub struct CondenseRangePredicatesToBetween;

impl Rule for CondenseRangePredicatesToBetween {
    fn name(&self) -> &'static str {
        "CondenseRangePredicatesToBetween"
    }

    fn apply(&self, view: &mut PlanView, _catalog: &dyn StatsCatalog) -> bool {
        let mut changed = false;
        for id in all_node_ids(view) {
            let Some(predicate) = view.node(id).predicate() else { continue };
            let mut conjuncts = Vec::new();
            flatten_and(predicate, &mut conjuncts);
            if conjuncts.len() < 2 {
                continue;
            }

            let mut merged: Vec<Expr> = Vec::new();
            let mut consumed = vec![false; conjuncts.len()];
            for i in 0..conjuncts.len() {
                if consumed[i] {
                    continue;
                }
                let lower_bound: Option<Box<Expr>> = match &conjuncts[i] {
                    Expr::Compare(Comparison::Ge, lhs, lo) if matches!(lhs.as_ref(), Expr::Column(_)) => {
                        Some(lo.clone())
                    }
                    Expr::Compare(Comparison::Gt, lhs, lo) if matches!(lhs.as_ref(), Expr::Column(_)) => {
                        step_literal(lo, 1).map(Box::new)
                    }
                    _ => None,
                };
                let Some(lo) = lower_bound else {
                    merged.push(conjuncts[i].clone());
                    continue;
                };
                let Expr::Compare(_, lhs, _) = &conjuncts[i] else { unreachable!() };
                let Expr::Column(column) = lhs.as_ref() else { unreachable!() };

                let upper = (i + 1..conjuncts.len()).filter(|&j| !consumed[j]).find_map(|j| match &conjuncts[j] {
                    Expr::Compare(Comparison::Le, l2, hi) if same_column(l2, *column) => Some((j, hi.clone())),
                    Expr::Compare(Comparison::Lt, l2, hi) if same_column(l2, *column) => {
                        step_literal(hi, -1).map(|hi| (j, Box::new(hi)))
                    }
                    _ => None,
                });

                if let Some((j, hi)) = upper {
                    if literals_equal(&lo, &hi) {
                        merged.push(Expr::Compare(Comparison::Eq, Box::new(Expr::Column(*column)), lo));
                    } else {
                        merged.push(Expr::Between(Box::new(Expr::Column(*column)), lo, hi));
                    }
                    consumed[i] = true;
                    consumed[j] = true;
                    continue;
                }
                merged.push(conjuncts[i].clone());
            }

            if merged.len() < conjuncts.len() {
                *view.node_mut(id).predicate_mut().expect("checked above") = rebuild_and(merged);
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
mod condense_range_tests {
    use super::*;
    use crate::node::LogicalNode;
    use std::sync::Arc;

    fn selection_view(predicate: Expr) -> PlanView {
        let mut view = PlanView::new();
        let schema = Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]));
        let table = view.alloc(LogicalNode::Table { name: "t".into(), schema, cardinality: 100 });
        let selection = view.alloc(LogicalNode::Selection { predicate, selectivity: None });
        view.attach(selection, table);
        view.set_root(selection);
        view
    }

    struct NoStats;
    impl StatsCatalog for NoStats {
        fn statistics_for(&self, _table: &str) -> Option<Statistics> {
            None
        }
    }

    #[test]
    fn condenses_ge_and_le_into_between() {
        let predicate = Expr::And(
            Box::new(Expr::Compare(Comparison::Ge, Box::new(Expr::column(0)), Box::new(Expr::literal(Value::Int32(2))))),
            Box::new(Expr::Compare(Comparison::Le, Box::new(Expr::column(0)), Box::new(Expr::literal(Value::Int32(5))))),
        );
        let mut view = selection_view(predicate);
        assert!(CondenseRangePredicatesToBetween.apply(&mut view, &NoStats));
        let rewritten = view.node(view.root()).predicate().unwrap();
        assert!(matches!(rewritten, Expr::Between(..)));
    }

    #[test]
    fn degenerate_between_collapses_to_equality() {
        let predicate = Expr::And(
            Box::new(Expr::Compare(Comparison::Ge, Box::new(Expr::column(0)), Box::new(Expr::literal(Value::Int32(3))))),
            Box::new(Expr::Compare(Comparison::Le, Box::new(Expr::column(0)), Box::new(Expr::literal(Value::Int32(3))))),
        );
        let mut view = selection_view(predicate);
        assert!(CondenseRangePredicatesToBetween.apply(&mut view, &NoStats));
        let rewritten = view.node(view.root()).predicate().unwrap();
        assert!(matches!(rewritten, Expr::Compare(Comparison::Eq, ..)));
    }

    #[test]
    fn strict_bounds_on_integer_column_condense_too() {
        let predicate = Expr::And(
            Box::new(Expr::Compare(Comparison::Gt, Box::new(Expr::column(0)), Box::new(Expr::literal(Value::Int32(1))))),
            Box::new(Expr::Compare(Comparison::Lt, Box::new(Expr::column(0)), Box::new(Expr::literal(Value::Int32(3))))),
        );
        let mut view = selection_view(predicate);
        assert!(CondenseRangePredicatesToBetween.apply(&mut view, &NoStats));
        // `a > 1 AND a < 3` on an INT32 column is exactly `a = 2`.
        let rewritten = view.node(view.root()).predicate().unwrap();
        assert!(matches!(rewritten, Expr::Compare(Comparison::Eq, ..)));
    }
}

/// e. Merges a `Selection` stacked directly over another `Selection` into
/// one `AND`, most-selective conjunct first.
pub struct MergePredicates;

impl Rule for MergePredicates {
    fn name(&self) -> &'static str {
        "MergePredicates"
    }

    fn multi_pass(&self) -> bool {
        true
    }

    fn affects_relation(&self) -> bool {
        true
    }

    fn apply(&self, view: &mut PlanView, _catalog: &dyn StatsCatalog) -> bool {
        for id in all_node_ids(view) {
            if !view.node(id).is_selection() {
                continue;
            }
            let children = view.children_of(id).to_vec();
            if children.len() != 1 || !view.node(children[0]).is_selection() {
                continue;
            }
            let inner = children[0];

            let (outer_predicate, outer_sel) = match view.node(id) {
                LogicalNode::Selection { predicate, selectivity } => (predicate.clone(), *selectivity),
                _ => unreachable!(),
            };
            let (inner_predicate, inner_sel) = match view.node(inner) {
                LogicalNode::Selection { predicate, selectivity } => (predicate.clone(), *selectivity),
                _ => unreachable!(),
            };

            let (first, second) = match (outer_sel, inner_sel) {
                (Some(o), Some(i)) if i < o => (inner_predicate, outer_predicate),
                _ => (outer_predicate, inner_predicate),
            };
            let merged_selectivity = match (outer_sel, inner_sel) {
                (Some(o), Some(i)) => Some(o * i),
                _ => None,
            };

            *view.node_mut(id) = LogicalNode::Selection {
                predicate: Expr::And(Box::new(first), Box::new(second)),
                selectivity: merged_selectivity,
            };
            let grandchildren = view.detach_children(inner);
            view.free_leaf(inner);
            for gc in grandchildren {
                view.attach(id, gc);
            }
            return true;
        }
        false
    }
}

fn predicate_columns(expr: &Expr, out: &mut BTreeSet<usize>) {
    match expr {
        Expr::Column(c) => {
            out.insert(*c);
        }
        Expr::Literal(_) => {}
        Expr::Cast(inner, _) | Expr::Not(inner) => predicate_columns(inner, out),
        Expr::Compare(_, l, r) | Expr::Arithmetic(_, l, r) | Expr::And(l, r) | Expr::Or(l, r) => {
            predicate_columns(l, out);
            predicate_columns(r, out);
        }
        Expr::Between(v, lo, hi) => {
            predicate_columns(v, out);
            predicate_columns(lo, out);
            predicate_columns(hi, out);
        }
        Expr::In(v, list) => {
            predicate_columns(v, out);
            for item in list {
                predicate_columns(item, out);
            }
        }
    }
}

fn shift_columns(expr: &Expr, delta: i64) -> Expr {
    match expr {
        Expr::Column(c) => Expr::Column((*c as i64 + delta) as usize),
        Expr::Literal(v) => Expr::Literal(v.clone()),
        Expr::Cast(inner, ty) => Expr::Cast(Box::new(shift_columns(inner, delta)), *ty),
        Expr::Not(inner) => Expr::Not(Box::new(shift_columns(inner, delta))),
        Expr::Compare(op, l, r) => Expr::Compare(op.clone(), Box::new(shift_columns(l, delta)), Box::new(shift_columns(r, delta))),
        Expr::Arithmetic(op, l, r) => Expr::Arithmetic(op.clone(), Box::new(shift_columns(l, delta)), Box::new(shift_columns(r, delta))),
        Expr::And(l, r) => Expr::And(Box::new(shift_columns(l, delta)), Box::new(shift_columns(r, delta))),
        Expr::Or(l, r) => Expr::Or(Box::new(shift_columns(l, delta)), Box::new(shift_columns(r, delta))),
        Expr::Between(v, lo, hi) => {
            Expr::Between(Box::new(shift_columns(v, delta)), Box::new(shift_columns(lo, delta)), Box::new(shift_columns(hi, delta)))
        }
        Expr::In(v, list) => Expr::In(Box::new(shift_columns(v, delta)), list.iter().map(|e| shift_columns(e, delta)).collect()),
    }
}

/// f. Moves a selection as close to its lowest providing child as possible,
/// across projections, arithmetic, and order-by, and through whichever side
/// of a join actually provides its columns. Does nothing when the only
/// thing below is more selections (no benefit; `MergePredicates` handles
/// that shape).
pub struct PredicatePushDown;

impl Rule for PredicatePushDown {
    fn name(&self) -> &'static str {
        "PredicatePushDown"
    }

    fn multi_pass(&self) -> bool {
        true
    }

    fn apply(&self, view: &mut PlanView, _catalog: &dyn StatsCatalog) -> bool {
        for id in all_node_ids(view) {
            if !view.node(id).is_selection() {
                continue;
            }
            let children = view.children_of(id).to_vec();
            if children.len() != 1 {
                continue;
            }
            let child = children[0];
            let predicate = view.node(id).predicate().expect("selection carries a predicate").clone();
            let mut cols = BTreeSet::new();
            predicate_columns(&predicate, &mut cols);

            match view.node(child).clone() {
                LogicalNode::Selection { .. } => continue,
                LogicalNode::OrderBy { .. } => {
                    let grandchild = view.children_of(child)[0];
                    view.move_between(child, grandchild, id);
                    return true;
                }
                LogicalNode::Arithmetic { input_column_count, .. } => {
                    if cols.iter().all(|&c| c < input_column_count) {
                        let grandchild = view.children_of(child)[0];
                        view.move_between(child, grandchild, id);
                        return true;
                    }
                }
                LogicalNode::Projection { source_columns, .. } => {
                    if cols.iter().all(|&c| c < source_columns.len()) {
                        let grandchild = view.children_of(child)[0];
                        let new_predicate = remap_through_projection(&predicate, &source_columns);
                        *view.node_mut(id).predicate_mut().expect("selection") = new_predicate;
                        view.move_between(child, grandchild, id);
                        return true;
                    }
                }
                LogicalNode::Join { build_column_count, .. } => {
                    let build_child = view.children_of(child)[0];
                    let probe_child = view.children_of(child)[1];
                    if !cols.is_empty() && cols.iter().all(|&c| c < build_column_count) {
                        view.move_between(child, build_child, id);
                        return true;
                    }
                    if !cols.is_empty() && cols.iter().all(|&c| c >= build_column_count) {
                        let shifted = shift_columns(&predicate, -(build_column_count as i64));
                        *view.node_mut(id).predicate_mut().expect("selection") = shifted;
                        view.move_between(child, probe_child, id);
                        return true;
                    }
                }
                _ => {}
            }
        }
        false
    }
}

fn remap_through_projection(expr: &Expr, source_columns: &[usize]) -> Expr {
    match expr {
        Expr::Column(c) => Expr::Column(source_columns[*c]),
        Expr::Literal(v) => Expr::Literal(v.clone()),
        Expr::Cast(inner, ty) => Expr::Cast(Box::new(remap_through_projection(inner, source_columns)), *ty),
        Expr::Not(inner) => Expr::Not(Box::new(remap_through_projection(inner, source_columns))),
        Expr::Compare(op, l, r) => Expr::Compare(
            op.clone(),
            Box::new(remap_through_projection(l, source_columns)),
            Box::new(remap_through_projection(r, source_columns)),
        ),
        Expr::Arithmetic(op, l, r) => Expr::Arithmetic(
            op.clone(),
            Box::new(remap_through_projection(l, source_columns)),
            Box::new(remap_through_projection(r, source_columns)),
        ),
        Expr::And(l, r) => Expr::And(
            Box::new(remap_through_projection(l, source_columns)),
            Box::new(remap_through_projection(r, source_columns)),
        ),
        Expr::Or(l, r) => Expr::Or(
            Box::new(remap_through_projection(l, source_columns)),
            Box::new(remap_through_projection(r, source_columns)),
        ),
        Expr::Between(v, lo, hi) => Expr::Between(
            Box::new(remap_through_projection(v, source_columns)),
            Box::new(remap_through_projection(lo, source_columns)),
            Box::new(remap_through_projection(hi, source_columns)),
        ),
        Expr::In(v, list) => Expr::In(
            Box::new(remap_through_projection(v, source_columns)),
            list.iter().map(|e| remap_through_projection(e, source_columns)).collect(),
        ),
    }
}

/// Does `expr` reference at least one column below `build_column_count` and
/// at least one at or above it?
fn references_both_sides(expr: &Expr, build_column_count: usize) -> bool {
    let mut cols = BTreeSet::new();
    predicate_columns(expr, &mut cols);
    cols.iter().any(|&c| c < build_column_count) && cols.iter().any(|&c| c >= build_column_count)
}

/// Finds the first `OR` subtree that is purely repeated equalities against
/// one column, returning that column and its literal alternatives.
fn find_or_equality_subtree(expr: &Expr) -> Option<(usize, Vec<Expr>)> {
    match expr {
        Expr::Or(_, _) => {
            let mut column = None;
            let mut literals = Vec::new();
            if collect_or_equalities(expr, &mut column, &mut literals) {
                column.map(|c| (c, literals))
            } else {
                None
            }
        }
        Expr::And(l, r) => find_or_equality_subtree(l).or_else(|| find_or_equality_subtree(r)),
        _ => None,
    }
}

fn collect_or_equalities(expr: &Expr, column: &mut Option<usize>, literals: &mut Vec<Expr>) -> bool {
    match expr {
        Expr::Or(l, r) => collect_or_equalities(l, column, literals) && collect_or_equalities(r, column, literals),
        Expr::Compare(Comparison::Eq, l, r) => {
            let (c, lit) = match (l.as_ref(), r.as_ref()) {
                (Expr::Column(c), lit) if lit.is_constant() => (*c, lit.clone()),
                (lit, Expr::Column(c)) if lit.is_constant() => (*c, lit.clone()),
                _ => return false,
            };
            if *column.get_or_insert(c) != c {
                return false;
            }
            literals.push(lit);
            true
        }
        _ => false,
    }
}

/// g. For a multi-source predicate that can't be fully pushed down,
/// synthesizes an `IN` pre-filter over whichever single column its OR
/// branches agree on, and inserts it directly above that column's source —
/// a conservative, additive pre-filter; the original predicate stays above
/// the join to finish the job.
pub struct PreSelection;

impl Rule for PreSelection {
    fn name(&self) -> &'static str {
        "PreSelection"
    }

    fn apply(&self, view: &mut PlanView, _catalog: &dyn StatsCatalog) -> bool {
        for id in all_node_ids(view) {
            if !view.node(id).is_selection() {
                continue;
            }
            let children = view.children_of(id).to_vec();
            if children.len() != 1 {
                continue;
            }
            let join = children[0];
            let LogicalNode::Join { build_column_count, .. } = view.node(join) else { continue };
            let build_column_count = *build_column_count;

            let predicate = view.node(id).predicate().expect("selection carries a predicate").clone();
            if !references_both_sides(&predicate, build_column_count) {
                continue;
            }
            let Some((column, literals)) = find_or_equality_subtree(&predicate) else { continue };
            if literals.len() < 2 {
                continue;
            }

            let join_children = view.children_of(join).to_vec();
            let (side_child, local_column) = if column < build_column_count {
                (join_children[0], column)
            } else {
                (join_children[1], column - build_column_count)
            };

            let derived = view.alloc(LogicalNode::Selection {
                predicate: Expr::In(Box::new(Expr::Column(local_column)), literals),
                selectivity: None,
            });
            view.insert_between(join, side_child, derived);
            return true;
        }
        false
    }
}

fn arithmetic_columns(expr: &Expr, out: &mut BTreeSet<usize>) {
    predicate_columns(expr, out)
}

/// h. When an arithmetic expression mixes columns from both sides of a
/// join directly below it, computes each side's sub-expression as an extra
/// trailing column pushed below the join, and rewrites the mixed expression
/// to combine the two precomputed attributes instead.
pub struct SplitArithmetic;

impl Rule for SplitArithmetic {
    fn name(&self) -> &'static str {
        "SplitArithmetic"
    }

    fn affects_relation(&self) -> bool {
        true
    }

    fn apply(&self, view: &mut PlanView, _catalog: &dyn StatsCatalog) -> bool {
        for id in all_node_ids(view) {
            let LogicalNode::Arithmetic { expressions, input_column_count, .. } = view.node(id).clone() else { continue };
            let children = view.children_of(id).to_vec();
            if children.len() != 1 {
                continue;
            }
            let join = children[0];
            let LogicalNode::Join { build_column_count, output_schema, .. } = view.node(join).clone() else { continue };

            for (expr_index, expr) in expressions.iter().enumerate() {
                let Expr::Arithmetic(op, l, r) = expr else { continue };
                let mut l_cols = BTreeSet::new();
                let mut r_cols = BTreeSet::new();
                arithmetic_columns(l, &mut l_cols);
                arithmetic_columns(r, &mut r_cols);
                let l_is_build = l_cols.iter().all(|&c| c < build_column_count);
                let r_is_probe = r_cols.iter().all(|&c| c >= build_column_count);
                if l_cols.is_empty() || r_cols.is_empty() || !l_is_build || !r_is_probe {
                    continue;
                }

                let join_children = view.children_of(join).to_vec();
                let build_child = join_children[0];
                let probe_child = join_children[1];
                let Some(build_relation) = view.relation(build_child).cloned() else { continue };
                let Some(probe_relation) = view.relation(probe_child).cloned() else { continue };

                let derived_type = ColumnType::Int64;
                let build_new_col = build_relation.schema.column_count();
                let probe_new_col = probe_relation.schema.column_count();

                let build_output_schema = append_column(&build_relation.schema, "split_build", derived_type);
                let build_arith = view.alloc(LogicalNode::Arithmetic {
                    output_schema: build_output_schema,
                    input_column_count: build_relation.schema.column_count(),
                    expressions: vec![(**l).clone()],
                });
                view.insert_between(join, build_child, build_arith);

                let probe_output_schema = append_column(&probe_relation.schema, "split_probe", derived_type);
                let probe_arith = view.alloc(LogicalNode::Arithmetic {
                    output_schema: probe_output_schema,
                    input_column_count: probe_relation.schema.column_count(),
                    expressions: vec![shift_columns(r, -(build_column_count as i64))],
                });
                view.insert_between(join, probe_child, probe_arith);

                let new_join_output_column_count = output_schema.column_count() + 2;
                let new_output_schema = append_column(&append_column(&output_schema, "split_build", derived_type), "split_probe", derived_type);
                if let LogicalNode::Join { output_columns, output_schema, .. } = view.node_mut(join) {
                    output_columns.push(db_operators::OutputColumn::Build(build_new_col));
                    output_columns.push(db_operators::OutputColumn::Probe(probe_new_col));
                    *output_schema = new_output_schema;
                }

                let new_expr = Expr::Arithmetic(
                    op.clone(),
                    Box::new(Expr::Column(new_join_output_column_count - 2)),
                    Box::new(Expr::Column(new_join_output_column_count - 1)),
                );
                if let LogicalNode::Arithmetic { expressions, .. } = view.node_mut(id) {
                    expressions[expr_index] = new_expr;
                }
                return true;
            }
        }
        false
    }
}

fn append_column(schema: &Arc<Schema>, name: &str, ty: ColumnType) -> Arc<Schema> {
    let mut columns: Vec<Column> = schema.columns().to_vec();
    columns.push(Column::new(name, ty));
    Arc::new(Schema::new(columns))
}

/// Collects every column a node's own shape requires from each of its
/// children, given the set of its own output columns still needed above it.
fn needed_by_children(node: &LogicalNode, needed_here: &BTreeSet<usize>) -> Vec<BTreeSet<usize>> {
    match node {
        LogicalNode::Selection { predicate, .. } => {
            let mut cols = needed_here.clone();
            predicate_columns(predicate, &mut cols);
            vec![cols]
        }
        LogicalNode::Arithmetic { input_column_count, expressions, .. } => {
            let mut cols = BTreeSet::new();
            for &c in needed_here {
                if c < *input_column_count {
                    cols.insert(c);
                } else if let Some(expr) = expressions.get(c - input_column_count) {
                    predicate_columns(expr, &mut cols);
                }
            }
            vec![cols]
        }
        LogicalNode::Aggregation { group_by_columns, specs, .. } => {
            let mut cols: BTreeSet<usize> = group_by_columns.iter().copied().collect();
            cols.extend(specs.iter().map(|s| s.input_column));
            vec![cols]
        }
        LogicalNode::Join { predicate, build_column_count, output_columns, .. } => {
            let mut build_cols = BTreeSet::new();
            let mut probe_cols = BTreeSet::new();
            for &c in needed_here {
                match output_columns.get(c) {
                    Some(db_operators::OutputColumn::Build(b)) => {
                        build_cols.insert(*b);
                    }
                    Some(db_operators::OutputColumn::Probe(p)) => {
                        probe_cols.insert(*p);
                    }
                    None => {}
                }
            }
            let mut predicate_cols = BTreeSet::new();
            predicate_columns(predicate, &mut predicate_cols);
            for c in predicate_cols {
                if c < *build_column_count {
                    build_cols.insert(c);
                } else {
                    probe_cols.insert(c - build_column_count);
                }
            }
            vec![build_cols, probe_cols]
        }
        LogicalNode::OrderBy { keys, .. } => {
            let mut cols = needed_here.clone();
            cols.extend(keys.iter().map(|k| k.column));
            vec![cols]
        }
        LogicalNode::Limit { .. } => vec![needed_here.clone()],
        LogicalNode::Projection { .. } | LogicalNode::Copy { .. } | LogicalNode::Table { .. } | LogicalNode::TableSelection { .. } => {
            Vec::new()
        }
        LogicalNode::Insert { .. } | LogicalNode::Create { .. } | LogicalNode::Describe { .. } | LogicalNode::ShowTables | LogicalNode::UpdateStatistics { .. } => {
            Vec::new()
        }
    }
}

/// i. Before a join, aggregation, arithmetic, or order-by, inserts a
/// projection retaining only the columns still needed above it, when doing
/// so would actually drop columns.
pub struct EarlyProjection;

impl Rule for EarlyProjection {
    fn name(&self) -> &'static str {
        "EarlyProjection"
    }

    fn affects_relation(&self) -> bool {
        true
    }

    fn apply(&self, view: &mut PlanView, _catalog: &dyn StatsCatalog) -> bool {
        let root = view.root();
        let Some(root_relation) = view.relation(root) else { return false };
        let root_needed: BTreeSet<usize> = (0..root_relation.schema.column_count()).collect();

        let mut insertions: Vec<(NodeId, NodeId, Vec<usize>)> = Vec::new();
        let mut stack = vec![(root, root_needed)];
        while let Some((node, needed)) = stack.pop() {
            let is_materialising = matches!(
                view.node(node),
                LogicalNode::Join { .. } | LogicalNode::Aggregation { .. } | LogicalNode::Arithmetic { .. } | LogicalNode::OrderBy { .. }
            );
            let child_needs = needed_by_children(view.node(node), &needed);
            for (child, child_needed) in view.children_of(node).to_vec().into_iter().zip(child_needs) {
                if is_materialising {
                    if let Some(child_relation) = view.relation(child) {
                        let full = child_relation.schema.column_count();
                        if child_needed.len() < full && !child_needed.is_empty() {
                            insertions.push((node, child, child_needed.iter().copied().collect()));
                        }
                    }
                }
                stack.push((child, child_needed));
            }
        }

        let mut changed = false;
        for (parent, child, source_columns) in insertions {
            let Some(child_relation) = view.relation(child) else { continue };
            let columns: Vec<Column> = source_columns.iter().map(|&c| child_relation.schema.column(c).clone()).collect();
            let output_schema = Arc::new(Schema::new(columns));
            let projection = view.alloc(LogicalNode::Projection { output_schema, source_columns });
            view.insert_between(parent, child, projection);
            changed = true;
        }
        changed
    }
}

/// j. Drops a projection whose output schema already matches its child's.
pub struct RemoveProjection;

impl Rule for RemoveProjection {
    fn name(&self) -> &'static str {
        "RemoveProjection"
    }

    fn multi_pass(&self) -> bool {
        true
    }

    fn affects_relation(&self) -> bool {
        true
    }

    fn apply(&self, view: &mut PlanView, _catalog: &dyn StatsCatalog) -> bool {
        for id in all_node_ids(view) {
            let LogicalNode::Projection { output_schema, source_columns } = view.node(id) else { continue };
            let is_identity = source_columns.iter().enumerate().all(|(i, &c)| i == c);
            if !is_identity {
                continue;
            }
            let children = view.children_of(id).to_vec();
            let Some(child_relation) = view.relation(children[0]) else { continue };
            if output_schema.is_same_shape(&child_relation.schema) {
                view.erase(id);
                return true;
            }
        }
        false
    }
}

/// k. Collapses `Selection` directly over `Table` into one `TableSelection`.
pub struct MergeTableSelection;

impl Rule for MergeTableSelection {
    fn name(&self) -> &'static str {
        "MergeTableSelection"
    }

    fn apply(&self, view: &mut PlanView, _catalog: &dyn StatsCatalog) -> bool {
        for id in all_node_ids(view) {
            if !view.node(id).is_selection() {
                continue;
            }
            let children = view.children_of(id).to_vec();
            if children.len() != 1 {
                continue;
            }
            let table_id = children[0];
            let LogicalNode::Table { name, schema, cardinality } = view.node(table_id).clone() else { continue };
            let LogicalNode::Selection { predicate, selectivity } = view.node(id).clone() else { continue };

            *view.node_mut(id) = LogicalNode::TableSelection {
                name,
                schema,
                table_cardinality: cardinality,
                predicate,
                selectivity,
            };
            view.detach_children(id);
            view.free_leaf(table_id);
            return true;
        }
        false
    }
}

/// l. Sets each join/aggregation/order-by's physical method from the
/// cardinality thresholds in `db_operators`.
pub struct PhysicalOperatorRule;

impl Rule for PhysicalOperatorRule {
    fn name(&self) -> &'static str {
        "PhysicalOperatorRule"
    }

    fn apply(&self, view: &mut PlanView, _catalog: &dyn StatsCatalog) -> bool {
        let mut changed = false;
        for id in all_node_ids(view) {
            let children = view.children_of(id).to_vec();
            match view.node(id).clone() {
                LogicalNode::Join { predicate, method: None, .. } => {
                    let Some(build) = view.relation(children[0]) else { continue };
                    let Some(probe) = view.relation(children[1]) else { continue };
                    let chosen = choose_join_method(predicate.has_only_equal_comparison(), build.cardinality, probe.cardinality);
                    if let LogicalNode::Join { method, .. } = view.node_mut(id) {
                        *method = Some(chosen);
                        changed = true;
                    }
                }
                LogicalNode::Aggregation { group_by_columns, method: None, .. } => {
                    let Some(child) = view.relation(children[0]) else { continue };
                    let estimated_groups = if group_by_columns.is_empty() { 1 } else { child.cardinality };
                    let chosen = choose_aggregation_method(estimated_groups);
                    if let LogicalNode::Aggregation { method, .. } = view.node_mut(id) {
                        *method = Some(chosen);
                        changed = true;
                    }
                }
                LogicalNode::OrderBy { method: None, .. } => {
                    let Some(child) = view.relation(children[0]) else { continue };
                    let chosen = choose_order_by_method(child.cardinality);
                    if let LogicalNode::OrderBy { method, .. } = view.node_mut(id) {
                        *method = Some(chosen);
                        changed = true;
                    }
                }
                _ => {}
            }
        }
        changed
    }
}

/// m. Folds `Limit(OrderBy)` into `OrderBy` with a cached top-k, when the
/// limit has no offset (an offset can't be served by a pure top-k heap).
pub struct MergeOrderByLimit;

impl Rule for MergeOrderByLimit {
    fn name(&self) -> &'static str {
        "MergeOrderByLimit"
    }

    fn affects_relation(&self) -> bool {
        true
    }

    fn apply(&self, view: &mut PlanView, _catalog: &dyn StatsCatalog) -> bool {
        for id in all_node_ids(view) {
            let LogicalNode::Limit { skip, take } = view.node(id).clone() else { continue };
            if skip != 0 {
                continue;
            }
            let children = view.children_of(id).to_vec();
            if !matches!(view.node(children[0]), LogicalNode::OrderBy { .. }) {
                continue;
            }
            let order_by = children[0];
            if let LogicalNode::OrderBy { top_k, .. } = view.node_mut(order_by) {
                *top_k = Some(take as usize);
            }
            view.erase(id);
            return true;
        }
        false
    }
}

/// The fixed pipeline, in spec order a through m.
pub fn all_rules() -> Vec<Box<dyn Rule>> {
    vec![
        Box::new(AnnotatePredicates),
        Box::new(EvaluatePredicate),
        Box::new(RemoveFixedValueCast),
        Box::new(CondenseRangePredicatesToBetween),
        Box::new(MergePredicates),
        Box::new(PredicatePushDown),
        Box::new(PreSelection),
        Box::new(SplitArithmetic),
        Box::new(EarlyProjection),
        Box::new(RemoveProjection),
        Box::new(MergeTableSelection),
        Box::new(PhysicalOperatorRule),
        Box::new(MergeOrderByLimit),
    ]
}
