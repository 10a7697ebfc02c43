//! Traversal index.
//!
//! The visible rows of a pivot tree, in display order. A row is visible when
//! every ancestor is expanded. Rows are laid out pre-order, so a row's
//! visible descendants are the `ndesc` rows right after it and its next
//! sibling sits at `idx + 1 + ndesc`. Siblings are ordered by the active
//! aggregate sorts, falling back to the tree's natural order.

use crate::config::SortOrder;
use crate::stree::{MergeResult, NodeId, STree, ROOT};
use core::cmp::Ordering;
use hashbrown::{HashMap, HashSet};

/// One visible row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TravNode {
    /// Persistent tree node shown by this row
    pub tnid: NodeId,
    pub expanded: bool,
    pub depth: usize,
    /// Number of visible descendants
    pub ndesc: usize,
    /// Distance back to the parent row; 0 for the root
    pub rel_pidx: usize,
}

/// The flattened, ordered row sequence of one pivot tree.
#[derive(Clone, Debug)]
pub struct Traversal {
    nodes: Vec<TravNode>,
    positions: HashMap<NodeId, usize>,
    expanded: HashSet<NodeId>,
    expand_depth: usize,
    sorts: Vec<(usize, SortOrder)>,
}

impl Traversal {
    /// Creates the traversal of `tree`, expanding every node shallower than
    /// `expand_depth`. `sorts` are (aggregate, order) pairs.
    pub fn new(tree: &STree, expand_depth: usize, sorts: Vec<(usize, SortOrder)>) -> Self {
        let mut trav = Self {
            nodes: Vec::new(),
            positions: HashMap::new(),
            expanded: HashSet::new(),
            expand_depth,
            sorts,
        };
        trav.set_depth(tree, expand_depth);
        trav
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn get(&self, idx: usize) -> Option<&TravNode> {
        self.nodes.get(idx)
    }

    pub fn nodes(&self) -> &[TravNode] {
        &self.nodes
    }

    /// Returns the tree node shown at row `idx`.
    pub fn tree_node(&self, idx: usize) -> Option<NodeId> {
        self.nodes.get(idx).map(|n| n.tnid)
    }

    /// Returns the row showing tree node `tnid`, if visible.
    pub fn index_of(&self, tnid: NodeId) -> Option<usize> {
        self.positions.get(&tnid).copied()
    }

    pub fn parent_index(&self, idx: usize) -> Option<usize> {
        match self.nodes.get(idx) {
            Some(n) if n.rel_pidx > 0 => Some(idx - n.rel_pidx),
            _ => None,
        }
    }

    pub fn expand_depth(&self) -> usize {
        self.expand_depth
    }

    pub fn sorts(&self) -> &[(usize, SortOrder)] {
        &self.sorts
    }

    fn cmp_siblings(&self, tree: &STree, a: NodeId, b: NodeId) -> Ordering {
        for (agg, order) in &self.sorts {
            let ord = tree.get_aggregate(a, *agg).cmp(&tree.get_aggregate(b, *agg));
            let ord = match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        tree.cmp_natural(a, b)
    }

    fn sorted_children(&self, tree: &STree, id: NodeId) -> Vec<NodeId> {
        let mut children = tree.children(id).to_vec();
        if !self.sorts.is_empty() {
            children.sort_by(|a, b| self.cmp_siblings(tree, *a, *b));
        }
        children
    }

    fn can_expand(tree: &STree, id: NodeId) -> bool {
        tree.node_depth(id) < tree.depth()
    }

    /// Lays out the visible subtree under `start`, `start` included.
    fn walk(&self, tree: &STree, start: NodeId) -> Vec<TravNode> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let expanded = self.expanded.contains(&id);
            out.push(TravNode {
                tnid: id,
                expanded,
                depth: tree.node_depth(id),
                ndesc: 0,
                rel_pidx: 0,
            });
            if expanded {
                stack.extend(self.sorted_children(tree, id).into_iter().rev());
            }
        }
        out
    }

    /// Recomputes parent offsets, descendant counts and row positions from
    /// the depths of a pre-order sequence.
    fn rethread(&mut self) {
        let mut open: Vec<usize> = Vec::new();
        for i in 0..self.nodes.len() {
            let depth = self.nodes[i].depth;
            while let Some(top) = open.last() {
                if self.nodes[*top].depth >= depth {
                    open.pop();
                } else {
                    break;
                }
            }
            self.nodes[i].rel_pidx = open.last().map(|p| i - p).unwrap_or(0);
            self.nodes[i].ndesc = 0;
            open.push(i);
        }
        for i in (0..self.nodes.len()).rev() {
            let rel = self.nodes[i].rel_pidx;
            if rel > 0 {
                let ndesc = self.nodes[i].ndesc;
                self.nodes[i - rel].ndesc += 1 + ndesc;
            }
        }
        self.positions.clear();
        for (i, n) in self.nodes.iter().enumerate() {
            self.positions.insert(n.tnid, i);
        }
    }

    /// Re-lays out every row from the tree, keeping expansion state.
    pub fn rebuild(&mut self, tree: &STree) {
        self.expanded.retain(|id| tree.is_live(*id));
        self.nodes = self.walk(tree, ROOT);
        self.rethread();
    }

    /// Expands every node shallower than `depth` and collapses the rest.
    pub fn set_depth(&mut self, tree: &STree, depth: usize) {
        self.expand_depth = depth;
        self.expanded.clear();
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            if tree.node_depth(id) < depth && Self::can_expand(tree, id) {
                self.expanded.insert(id);
                stack.extend_from_slice(tree.children(id));
            }
        }
        self.rebuild(tree);
    }

    /// Re-sorts with new aggregate sorts.
    pub fn sort_by(&mut self, tree: &STree, sorts: Vec<(usize, SortOrder)>) {
        self.sorts = sorts;
        self.rebuild(tree);
    }

    /// Expands row `idx`, returning the number of rows added.
    pub fn expand(&mut self, tree: &STree, idx: usize) -> usize {
        let node = match self.nodes.get(idx) {
            Some(n) if !n.expanded && Self::can_expand(tree, n.tnid) => *n,
            _ => return 0,
        };
        self.expanded.insert(node.tnid);
        let sub = self.walk(tree, node.tnid);
        let added = sub.len() - 1;
        self.nodes[idx].expanded = true;
        self.nodes.splice(idx + 1..idx + 1, sub.into_iter().skip(1));
        self.rethread();
        added
    }

    /// Collapses row `idx`, returning the number of rows removed.
    pub fn collapse(&mut self, idx: usize) -> usize {
        let node = match self.nodes.get(idx) {
            Some(n) if n.expanded => *n,
            _ => return 0,
        };
        self.expanded.remove(&node.tnid);
        self.nodes[idx].expanded = false;
        self.nodes.drain(idx + 1..idx + 1 + node.ndesc);
        self.rethread();
        node.ndesc
    }

    /// Visible child rows of the row at `pidx`, as (start, len) blocks.
    fn child_blocks(&self, pidx: usize) -> Vec<(usize, usize)> {
        let end = pidx + 1 + self.nodes[pidx].ndesc;
        let mut blocks = Vec::new();
        let mut i = pidx + 1;
        while i < end {
            let len = 1 + self.nodes[i].ndesc;
            blocks.push((i, len));
            i += len;
        }
        blocks
    }

    fn mark_expanded(&mut self, tree: &STree, tnid: NodeId) {
        if Self::can_expand(tree, tnid) && tree.node_depth(tnid) < self.expand_depth {
            self.expanded.insert(tnid);
        }
    }

    /// Inserts a newly created tree node, if its parent row is expanded.
    pub fn add_node(&mut self, tree: &STree, tnid: NodeId) {
        self.add_nodes(tree, &[tnid]);
    }

    /// Inserts newly created tree nodes under their expanded parent rows.
    ///
    /// A node whose parent is also new is laid out by its parent's walk.
    /// Insertion points are found against the current rows, then every
    /// subtree is merged in with a single pass.
    pub fn add_nodes(&mut self, tree: &STree, added: &[NodeId]) {
        for id in added {
            self.mark_expanded(tree, *id);
        }
        let new: HashSet<NodeId> = added.iter().copied().collect();

        // (row to insert before, depth, node)
        let mut inserts: Vec<(usize, usize, NodeId)> = Vec::new();
        for &tnid in added {
            if self.positions.contains_key(&tnid) {
                continue;
            }
            let parent = match tree.parent(tnid) {
                Some(p) if !new.contains(&p) => p,
                _ => continue,
            };
            let pidx = match self.index_of(parent) {
                Some(pidx) if self.nodes[pidx].expanded => pidx,
                _ => continue,
            };
            let blocks = self.child_blocks(pidx);
            let pos = blocks.partition_point(|(start, _)| {
                self.cmp_siblings(tree, self.nodes[*start].tnid, tnid) == Ordering::Less
            });
            let at = match blocks.get(pos) {
                Some((start, _)) => *start,
                None => pidx + 1 + self.nodes[pidx].ndesc,
            };
            inserts.push((at, tree.node_depth(tnid), tnid));
        }
        if inserts.is_empty() {
            return;
        }

        // At a shared row, a subtree closing a deeper parent goes first.
        inserts.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then(b.1.cmp(&a.1))
                .then_with(|| self.cmp_siblings(tree, a.2, b.2))
        });
        let mut nodes = Vec::with_capacity(self.nodes.len() + inserts.len());
        let mut pending = inserts.into_iter().peekable();
        for (i, node) in self.nodes.iter().enumerate() {
            while let Some((_, _, tnid)) = pending.next_if(|(at, ..)| *at == i) {
                nodes.extend(self.walk(tree, tnid));
            }
            nodes.push(*node);
        }
        for (_, _, tnid) in pending {
            nodes.extend(self.walk(tree, tnid));
        }
        self.nodes = nodes;
        self.rethread();
    }

    /// Removes the rows of pruned tree nodes.
    pub fn drop_tree_indices(&mut self, removed: &[NodeId]) {
        if removed.is_empty() {
            return;
        }
        let removed: HashSet<NodeId> = removed.iter().copied().collect();
        self.expanded.retain(|id| !removed.contains(id));
        self.nodes.retain(|n| !removed.contains(&n.tnid));
        self.rethread();
    }

    /// Restores sibling order under the parents of changed nodes.
    ///
    /// Parents go deepest first: reordering under one parent only moves rows
    /// deeper than it, so the positions of shallower parents stay valid until
    /// the single rethread at the end.
    pub fn reposition(&mut self, tree: &STree, updated: &[NodeId]) {
        let mut parents: Vec<NodeId> = updated
            .iter()
            .filter_map(|id| tree.parent(*id))
            .collect::<HashSet<NodeId>>()
            .into_iter()
            .collect();
        parents.sort_by_key(|p| core::cmp::Reverse(tree.node_depth(*p)));

        let mut moved = false;
        for parent in parents {
            let pidx = match self.index_of(parent) {
                Some(p) if self.nodes[p].expanded => p,
                _ => continue,
            };
            let mut blocks = self.child_blocks(pidx);
            let sorted = blocks.windows(2).all(|w| {
                self.cmp_siblings(tree, self.nodes[w[0].0].tnid, self.nodes[w[1].0].tnid)
                    != Ordering::Greater
            });
            if sorted {
                continue;
            }
            blocks.sort_by(|a, b| self.cmp_siblings(tree, self.nodes[a.0].tnid, self.nodes[b.0].tnid));
            let reordered: Vec<TravNode> = blocks
                .iter()
                .flat_map(|(start, len)| self.nodes[*start..*start + *len].iter().copied())
                .collect();
            let start = pidx + 1;
            self.nodes[start..start + reordered.len()].copy_from_slice(&reordered);
            moved = true;
        }
        if moved {
            self.rethread();
        }
    }

    /// Applies one merge: drops pruned rows, inserts new ones and restores
    /// sibling order.
    pub fn update(&mut self, tree: &STree, result: &MergeResult) {
        if result.is_empty() {
            return;
        }
        // Large structural changes re-linearize in one pass.
        if result.added.len() + result.removed.len() > self.nodes.len() {
            for id in &result.added {
                self.mark_expanded(tree, *id);
            }
            self.rebuild(tree);
            return;
        }
        self.drop_tree_indices(&result.removed);
        self.add_nodes(tree, &result.added);
        self.reposition(tree, &result.updated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{compute, Kernel, Slot};
    use crate::config::{AggKind, AggSpec, Config, ResolvedAgg};
    use crate::dtree::DenseTree;
    use crate::strand::Strand;
    use tessera_core::schema::SchemaBuilder;
    use tessera_core::{DataType, Scalar};

    fn aggregates() -> Vec<ResolvedAgg> {
        let schema = SchemaBuilder::new("t")
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .add_column("v", DataType::Int64)
            .unwrap()
            .primary_key("id")
            .unwrap()
            .build()
            .unwrap();
        Config::builder()
            .aggregate(AggSpec::new("sum", AggKind::Sum, "v"))
            .build()
            .unwrap()
            .resolve(&schema)
            .unwrap()
            .aggregates
    }

    fn strand(path: &[&str], pkey: i64, count: i64, out: Option<i64>, inp: Option<i64>) -> Strand {
        let path: Vec<Scalar> = path.iter().map(|s| Scalar::from(*s)).collect();
        let slot = |v: Option<i64>| v.map(|v| Slot::Value(Scalar::Int64(v))).unwrap_or_default();
        Strand {
            sort_keys: path.clone(),
            path,
            pkey: Scalar::Int64(pkey),
            row: 0,
            count,
            slots: vec![(slot(out), slot(inp))],
        }
    }

    fn merge(tree: &mut STree, mut strands: Vec<Strand>) -> MergeResult {
        strands.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.pkey.cmp(&b.pkey)));
        let dtree = DenseTree::build(&strands, tree.depth());
        let kernels: Vec<Kernel> = aggregates().iter().map(|a| a.kernel).collect();
        let aggs = compute(&dtree, &strands, &kernels);
        tree.merge(&dtree, &aggs, &strands)
    }

    fn labels(trav: &Traversal, tree: &STree) -> Vec<Vec<Scalar>> {
        (0..trav.len())
            .map(|i| tree.get_path(trav.tree_node(i).unwrap()))
            .collect()
    }

    fn check_consistent(trav: &Traversal) {
        for (i, n) in trav.nodes().iter().enumerate() {
            let end = i + 1 + n.ndesc;
            assert!(end <= trav.len());
            if let Some(next) = trav.get(end) {
                assert!(next.depth <= n.depth);
            }
        }
    }

    fn sample() -> STree {
        let mut tree = STree::new(2, &aggregates());
        merge(
            &mut tree,
            vec![
                strand(&["a", "x"], 1, 1, None, Some(1)),
                strand(&["a", "y"], 2, 1, None, Some(5)),
                strand(&["b", "x"], 3, 1, None, Some(3)),
            ],
        );
        tree
    }

    #[test]
    fn test_fully_expanded_layout() {
        let tree = sample();
        let trav = Traversal::new(&tree, 2, Vec::new());
        assert_eq!(trav.len(), 6);
        let root = trav.get(0).unwrap();
        assert_eq!(root.ndesc, 5);
        assert_eq!(trav.get(1).unwrap().ndesc, 2);
        assert_eq!(trav.parent_index(2), Some(1));
        assert_eq!(trav.parent_index(4), Some(0));
        assert_eq!(trav.parent_index(0), None);
        assert_eq!(labels(&trav, &tree)[4], vec![Scalar::from("b")]);
        check_consistent(&trav);
    }

    #[test]
    fn test_expand_collapse() {
        let tree = sample();
        let mut trav = Traversal::new(&tree, 1, Vec::new());
        assert_eq!(trav.len(), 3);
        assert_eq!(trav.expand(&tree, 1), 2);
        assert_eq!(trav.len(), 5);
        assert_eq!(trav.expand(&tree, 1), 0);
        assert_eq!(trav.expand(&tree, 2), 0);
        assert_eq!(trav.get(0).unwrap().ndesc, 4);
        check_consistent(&trav);

        assert_eq!(trav.collapse(0), 4);
        assert_eq!(trav.len(), 1);
        assert_eq!(trav.expand(&tree, 0), 4);
        assert_eq!(trav.len(), 5);
        assert_eq!(trav.collapse(99), 0);
        assert_eq!(trav.expand(&tree, 99), 0);
    }

    #[test]
    fn test_sort_by_aggregate() {
        let tree = sample();
        let mut trav = Traversal::new(&tree, 1, Vec::new());
        trav.sort_by(&tree, vec![(0, SortOrder::Desc)]);
        let order = labels(&trav, &tree);
        assert_eq!(order[1], vec![Scalar::from("a")]);
        trav.sort_by(&tree, vec![(0, SortOrder::Asc)]);
        let order = labels(&trav, &tree);
        assert_eq!(order[1], vec![Scalar::from("b")]);
    }

    #[test]
    fn test_incremental_update_matches_rebuild() {
        let mut tree = sample();
        let mut trav = Traversal::new(&tree, 2, vec![(0, SortOrder::Desc)]);

        let result = merge(
            &mut tree,
            vec![
                strand(&["c", "z"], 4, 1, None, Some(2)),
                strand(&["a", "y"], 2, -1, Some(5), None),
                strand(&["b", "x"], 3, 0, Some(3), Some(10)),
            ],
        );
        trav.update(&tree, &result);
        check_consistent(&trav);

        let fresh = Traversal::new(&tree, 2, vec![(0, SortOrder::Desc)]);
        assert_eq!(labels(&trav, &tree), labels(&fresh, &tree));
        assert_eq!(trav.nodes(), fresh.nodes());
    }

    #[test]
    fn test_first_batch_expands_to_depth() {
        let mut tree = STree::new(2, &aggregates());
        let mut trav = Traversal::new(&tree, 2, Vec::new());
        assert_eq!(trav.len(), 1);
        let result = merge(
            &mut tree,
            vec![
                strand(&["east", "NY"], 1, 1, None, Some(10)),
                strand(&["east", "BO"], 2, 1, None, Some(5)),
                strand(&["west", "LA"], 3, 1, None, Some(7)),
            ],
        );
        trav.update(&tree, &result);
        assert_eq!(trav.len(), 6);
        assert_eq!(
            labels(&trav, &tree)[2],
            vec![Scalar::from("east"), Scalar::from("BO")]
        );
        let fresh = Traversal::new(&tree, 2, Vec::new());
        assert_eq!(trav.nodes(), fresh.nodes());
    }

    #[test]
    fn test_batched_inserts_land_in_order() {
        let mut tree = sample();
        let mut trav = Traversal::new(&tree, 2, Vec::new());
        // "a/z" and "ab" share an insertion row
        let result = merge(
            &mut tree,
            vec![
                strand(&["a", "w"], 4, 1, None, Some(1)),
                strand(&["a", "z"], 5, 1, None, Some(1)),
                strand(&["b", "y"], 6, 1, None, Some(1)),
                strand(&["ab", "x"], 8, 1, None, Some(1)),
            ],
        );
        assert!(result.added.len() + result.removed.len() <= trav.len());
        trav.update(&tree, &result);
        check_consistent(&trav);
        let fresh = Traversal::new(&tree, 2, Vec::new());
        assert_eq!(labels(&trav, &tree), labels(&fresh, &tree));
        assert_eq!(trav.nodes(), fresh.nodes());
    }

    #[test]
    fn test_pruned_rows_dropped() {
        let mut tree = sample();
        let mut trav = Traversal::new(&tree, 2, Vec::new());
        let result = merge(&mut tree, vec![strand(&["b", "x"], 3, -1, Some(3), None)]);
        trav.update(&tree, &result);
        assert_eq!(trav.len(), 4);
        assert!(labels(&trav, &tree).iter().all(|p| p.first() != Some(&Scalar::from("b"))));
        check_consistent(&trav);
    }
}
