//! `PlanView`: an arena of `LogicalNode`s plus parent/children edges. Rules
//! mutate a plan by rewiring edges rather than rebuilding a tree, so the
//! arena exposes the four edit primitives spec §4.9 names: `replace`,
//! `erase`, `insert_between`, and `move_between`.

use crate::node::{LogicalNode, NodeId, Relation};

pub struct PlanView {
    nodes: Vec<Option<LogicalNode>>,
    relations: Vec<Option<Relation>>,
    parent: Vec<Option<NodeId>>,
    children: Vec<Vec<NodeId>>,
    root: Option<NodeId>,
}

impl PlanView {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            relations: Vec::new(),
            parent: Vec::new(),
            children: Vec::new(),
            root: None,
        }
    }

    /// Allocates a fresh, parentless, childless node and returns its id.
    /// Callers wire it into the tree with `attach`/`set_root`.
    pub fn alloc(&mut self, node: LogicalNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(node));
        self.relations.push(None);
        self.parent.push(None);
        self.children.push(Vec::new());
        id
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    pub fn root(&self) -> NodeId {
        self.root.expect("plan view has no root")
    }

    pub fn node(&self, id: NodeId) -> &LogicalNode {
        self.nodes[id.0 as usize].as_ref().expect("node was erased")
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut LogicalNode {
        self.nodes[id.0 as usize].as_mut().expect("node was erased")
    }

    pub fn relation(&self, id: NodeId) -> Option<&Relation> {
        self.relations[id.0 as usize].as_ref()
    }

    pub fn set_relation(&mut self, id: NodeId, relation: Relation) {
        self.relations[id.0 as usize] = Some(relation);
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.parent[id.0 as usize]
    }

    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        &self.children[id.0 as usize]
    }

    /// Appends `child` as a new child of `parent` — join build/probe edges
    /// are distinguished by order, so callers must attach build before probe.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.children[parent.0 as usize].push(child);
        self.parent[child.0 as usize] = Some(parent);
    }

    fn replace_child_link(&mut self, parent: NodeId, old_child: NodeId, new_child: NodeId) {
        for slot in &mut self.children[parent.0 as usize] {
            if *slot == old_child {
                *slot = new_child;
            }
        }
    }

    /// Substitutes `new` for `old` wherever `old` sat — in `old`'s parent's
    /// child list, or as the plan root if `old` had none. `old`'s own
    /// children are left untouched; callers that want them carried onto
    /// `new` must `attach` them separately.
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        match self.parent[old.0 as usize] {
            Some(parent) => {
                self.replace_child_link(parent, old, new);
                self.parent[new.0 as usize] = Some(parent);
            }
            None => {
                self.root = Some(new);
                self.parent[new.0 as usize] = None;
            }
        }
    }

    /// Removes `node`, which must be unary, splicing its parent directly to
    /// its sole child — `RemoveProjection`'s shape.
    pub fn erase(&mut self, node: NodeId) {
        let children = std::mem::take(&mut self.children[node.0 as usize]);
        assert_eq!(children.len(), 1, "erase only splices unary nodes");
        let only_child = children[0];
        self.replace(node, only_child);
        self.nodes[node.0 as usize] = None;
    }

    /// Inserts `new` on the edge between `parent` and `child`: `parent`'s
    /// link to `child` is redirected through `new`, and `new`'s sole child
    /// becomes `child` — `EarlyProjection`/`PreSelection`/`SplitArithmetic`'s
    /// shape.
    pub fn insert_between(&mut self, parent: NodeId, child: NodeId, new: NodeId) {
        self.replace_child_link(parent, child, new);
        self.parent[new.0 as usize] = Some(parent);
        self.children[new.0 as usize] = vec![child];
        self.parent[child.0 as usize] = Some(new);
    }

    /// Detaches `node_to_move` (unary) from its current position, splicing
    /// its old parent to its old child, then reinserts it on the edge
    /// between `new_parent` and `new_child` — the move `PredicatePushDown`
    /// makes when it walks a selection past a node it doesn't depend on.
    pub fn move_between(&mut self, new_parent: NodeId, new_child: NodeId, node_to_move: NodeId) {
        let children = self.children[node_to_move.0 as usize].clone();
        assert_eq!(children.len(), 1, "move_between only relocates unary nodes");
        let carried_child = children[0];
        self.replace(node_to_move, carried_child);
        self.insert_between(new_parent, new_child, node_to_move);
    }

    /// Detaches and returns `id`'s children without touching `id`'s own
    /// parent link — used when a rule replaces a node's kind in place
    /// (`MergeTableSelection` folding a child `Table` into its parent
    /// `Selection`) and needs to drop the now-redundant child.
    pub fn detach_children(&mut self, id: NodeId) -> Vec<NodeId> {
        std::mem::take(&mut self.children[id.0 as usize])
    }

    /// Frees a node that has no children and no incoming edges — the
    /// caller is responsible for having detached it first.
    pub fn free_leaf(&mut self, id: NodeId) {
        debug_assert!(self.children[id.0 as usize].is_empty());
        self.nodes[id.0 as usize] = None;
    }

    /// Visits every live node in post-order (children before parent) —
    /// what cardinality recomputation and cost summation both need.
    pub fn walk_post_order(&self, node: NodeId, f: &mut impl FnMut(&PlanView, NodeId)) {
        for child in self.children_of(node).to_vec() {
            self.walk_post_order(child, f);
        }
        f(self, node);
    }
}

impl Default for PlanView {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db_storage::{Column, ColumnType, Schema};
    use std::sync::Arc;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![Column::new("a", ColumnType::Int32)]))
    }

    fn table(view: &mut PlanView) -> NodeId {
        view.alloc(LogicalNode::Table { name: "t".into(), schema: schema(), cardinality: 10 })
    }

    fn selection(view: &mut PlanView) -> NodeId {
        use db_operators::Expr;
        view.alloc(LogicalNode::Selection {
            predicate: Expr::literal(db_storage::Value::Bool(true)),
            selectivity: None,
        })
    }

    #[test]
    fn erase_splices_parent_to_child() {
        let mut view = PlanView::new();
        let t = table(&mut view);
        let sel = selection(&mut view);
        view.attach(sel, t);
        view.set_root(sel);

        view.erase(sel);
        assert_eq!(view.root(), t);
        assert_eq!(view.parent_of(t), None);
    }

    #[test]
    fn insert_between_splices_in_a_new_edge() {
        let mut view = PlanView::new();
        let t = table(&mut view);
        let sel = selection(&mut view);
        view.attach(sel, t);
        view.set_root(sel);

        let extra = selection(&mut view);
        view.insert_between(sel, t, extra);

        assert_eq!(view.children_of(sel), &[extra]);
        assert_eq!(view.children_of(extra), &[t]);
        assert_eq!(view.parent_of(t), Some(extra));
    }

    #[test]
    fn replace_at_root_updates_root() {
        let mut view = PlanView::new();
        let t = table(&mut view);
        view.set_root(t);

        let t2 = table(&mut view);
        view.replace(t, t2);
        assert_eq!(view.root(), t2);
    }

    #[test]
    fn move_between_relocates_a_unary_node() {
        // root -> sel -> mid -> t ; move sel down to sit between mid and t.
        let mut view = PlanView::new();
        let t = table(&mut view);
        let mid = selection(&mut view);
        view.attach(mid, t);
        let sel = selection(&mut view);
        view.attach(sel, mid);
        view.set_root(sel);

        view.move_between(mid, t, sel);
        assert_eq!(view.root(), mid);
        assert_eq!(view.children_of(mid), &[sel]);
        assert_eq!(view.children_of(sel), &[t]);
    }
}
