//! Pivoted axes.
//!
//! An axis pairs a persistent tree with the traversal presenting it. When
//! totals are hidden the root row is skipped, so presented row `i` is
//! traversal row `i + 1`.

use tessera_core::Scalar;
use tessera_pivot::{
    compute, DenseTree, Kernel, MergeResult, NodeId, ResolvedAgg, STree, SortOrder, Strand,
    Totals, Traversal, ROOT,
};

/// Builds the batch tree for `strands` and merges it into `tree`.
pub(crate) fn merge_strands(tree: &mut STree, strands: &[Strand], kernels: &[Kernel]) -> MergeResult {
    let dtree = DenseTree::build(strands, tree.depth());
    let aggs = compute(&dtree, strands, kernels);
    tree.merge(&dtree, &aggs, strands)
}

#[derive(Clone, Debug)]
pub(crate) struct Axis {
    tree: STree,
    trav: Traversal,
    offset: usize,
}

impl Axis {
    pub fn new(
        depth: usize,
        aggregates: &[ResolvedAgg],
        expand_depth: usize,
        sorts: Vec<(usize, SortOrder)>,
        totals: Totals,
    ) -> Self {
        let tree = STree::new(depth, aggregates);
        let trav = Traversal::new(&tree, expand_depth, sorts);
        // A flat axis only has the total row, which always shows.
        let offset = match totals {
            Totals::Hidden if depth > 0 => 1,
            _ => 0,
        };
        Self { tree, trav, offset }
    }

    #[inline]
    pub fn tree(&self) -> &STree {
        &self.tree
    }

    pub fn apply(&mut self, strands: &[Strand], kernels: &[Kernel]) -> MergeResult {
        let result = merge_strands(&mut self.tree, strands, kernels);
        self.trav.update(&self.tree, &result);
        result
    }

    pub fn len(&self) -> usize {
        self.trav.len().saturating_sub(self.offset)
    }

    /// Returns the tree node of presented row `row`.
    pub fn node(&self, row: usize) -> Option<NodeId> {
        self.trav.tree_node(row.checked_add(self.offset)?)
    }

    pub fn path(&self, row: usize) -> Vec<Scalar> {
        self.node(row)
            .map(|n| self.tree.get_path(n))
            .unwrap_or_default()
    }

    pub fn is_total(&self, row: usize) -> bool {
        self.node(row) == Some(ROOT)
    }

    pub fn expand(&mut self, row: usize) -> usize {
        match row.checked_add(self.offset) {
            Some(idx) => self.trav.expand(&self.tree, idx),
            None => 0,
        }
    }

    pub fn collapse(&mut self, row: usize) -> usize {
        match row.checked_add(self.offset) {
            Some(idx) => self.trav.collapse(idx),
            None => 0,
        }
    }

    pub fn set_depth(&mut self, depth: usize) {
        self.trav.set_depth(&self.tree, depth);
    }

    pub fn sort_by(&mut self, sorts: Vec<(usize, SortOrder)>) {
        self.trav.sort_by(&self.tree, sorts);
    }

    pub fn clear(&mut self) {
        self.tree.clear();
        let depth = self.trav.expand_depth();
        self.trav.set_depth(&self.tree, depth);
    }
}
