//! Persistent pivot tree.
//!
//! Long-lived grouping tree merged from one batch tree per step. Nodes live
//! in an arena addressed by integer ids; freed ids go on a free list and are
//! reused. Children are kept ordered by (sort value, pivot value) and found
//! through a (parent, value) index. A node whose live row count drops to zero
//! is pruned, except the root.
//!
//! A node's sort value is its pivot value, or the value of the pivot's proxy
//! sort column. With a proxy column the node keeps the key of the last
//! entering row, the one with the greatest primary key in its batch; rows of
//! one group are expected to agree on it. Leaving rows never move a node.

use crate::aggregate::{AggCell, BatchAggregates, Kernel};
use crate::config::{InvalidMode, ResolvedAgg};
use crate::dtree::DenseTree;
use crate::strand::Strand;
use core::cmp::Ordering;
use hashbrown::HashMap;
use std::collections::BTreeSet;
use tessera_core::{fatal, Scalar};
use tracing::trace;

/// Identifier of a persistent tree node.
pub type NodeId = usize;

/// The root's id; the root is never pruned.
pub const ROOT: NodeId = 0;

#[derive(Clone, Debug)]
struct TreeNode {
    parent: Option<NodeId>,
    depth: usize,
    value: Scalar,
    sort_value: Scalar,
    children: Vec<NodeId>,
    count: i64,
    aggs: Vec<AggCell>,
    /// Live primary keys; only kept on nodes at the tree's full depth
    pkeys: BTreeSet<Scalar>,
    live: bool,
}

impl TreeNode {
    fn new(parent: Option<NodeId>, depth: usize, value: Scalar, sort_value: Scalar, kernels: &[Kernel]) -> Self {
        Self {
            parent,
            depth,
            value,
            sort_value,
            children: Vec::new(),
            count: 0,
            aggs: kernels.iter().map(AggCell::new).collect(),
            pkeys: BTreeSet::new(),
            live: true,
        }
    }

    fn cmp_key(&self, other: &TreeNode) -> Ordering {
        self.sort_value
            .cmp(&other.sort_value)
            .then_with(|| self.value.cmp(&other.value))
    }
}

/// Nodes created, pruned and changed by one merge.
///
/// `added` is in breadth-first order, parents before children.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeResult {
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
    pub updated: Vec<NodeId>,
}

impl MergeResult {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

/// The persistent grouping tree of one context.
#[derive(Clone, Debug)]
pub struct STree {
    nodes: Vec<TreeNode>,
    free: Vec<NodeId>,
    index: HashMap<(NodeId, Scalar), NodeId>,
    depth: usize,
    kernels: Vec<Kernel>,
    modes: Vec<InvalidMode>,
}

impl STree {
    /// Creates a tree grouping `depth` levels deep with one aggregate column
    /// per spec.
    pub fn new(depth: usize, aggregates: &[ResolvedAgg]) -> Self {
        let kernels: Vec<Kernel> = aggregates.iter().map(|a| a.kernel).collect();
        let root = TreeNode::new(None, 0, Scalar::None, Scalar::None, &kernels);
        Self {
            nodes: vec![root],
            free: Vec::new(),
            index: HashMap::new(),
            depth,
            kernels,
            modes: aggregates.iter().map(|a| a.invalid_mode).collect(),
        }
    }

    /// Drops every node but an empty root.
    pub fn clear(&mut self) {
        self.nodes.truncate(1);
        self.nodes[ROOT] = TreeNode::new(None, 0, Scalar::None, Scalar::None, &self.kernels);
        self.free.clear();
        self.index.clear();
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        ROOT
    }

    /// Returns the grouping depth.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// Returns true if the root has no live rows.
    pub fn is_empty(&self) -> bool {
        self.nodes[ROOT].count == 0
    }

    #[inline]
    pub fn num_aggregates(&self) -> usize {
        self.kernels.len()
    }

    fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id).filter(|n| n.live)
    }

    #[inline]
    pub fn is_live(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Returns the pivot value of a node; `None` for the root.
    pub fn value(&self, id: NodeId) -> Scalar {
        self.get(id).map(|n| n.value.clone()).unwrap_or_default()
    }

    pub fn sort_value(&self, id: NodeId) -> Scalar {
        self.get(id).map(|n| n.sort_value.clone()).unwrap_or_default()
    }

    pub fn node_depth(&self, id: NodeId) -> usize {
        self.get(id).map(|n| n.depth).unwrap_or(0)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent)
    }

    /// Returns the children of a node in natural order.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Returns the live row count under a node.
    pub fn count(&self, id: NodeId) -> i64 {
        self.get(id).map(|n| n.count).unwrap_or(0)
    }

    /// Returns the live primary keys of a full-depth node.
    pub fn pkeys(&self, id: NodeId) -> Vec<Scalar> {
        self.get(id)
            .map(|n| n.pkeys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the presented value of aggregate `agg` at a node.
    pub fn get_aggregate(&self, id: NodeId, agg: usize) -> Scalar {
        match (self.get(id), self.kernels.get(agg), self.modes.get(agg)) {
            (Some(node), Some(kernel), Some(mode)) => {
                kernel.value(&node.aggs[agg], node.count, *mode)
            }
            _ => Scalar::None,
        }
    }

    /// Orders two nodes by (sort value, pivot value).
    pub fn cmp_natural(&self, a: NodeId, b: NodeId) -> Ordering {
        match (self.get(a), self.get(b)) {
            (Some(x), Some(y)) => x.cmp_key(y),
            _ => a.cmp(&b),
        }
    }

    /// Finds the node at a path of pivot values.
    pub fn find_path(&self, path: &[Scalar]) -> Option<NodeId> {
        path.iter().try_fold(ROOT, |parent, value| {
            self.index.get(&(parent, value.clone())).copied()
        })
    }

    /// Returns the pivot values from the root to a node.
    pub fn get_path(&self, id: NodeId) -> Vec<Scalar> {
        let mut path = Vec::new();
        let mut cur = self.get(id);
        while let Some(node) = cur {
            if node.parent.is_none() {
                break;
            }
            path.push(node.value.clone());
            cur = node.parent.and_then(|p| self.get(p));
        }
        path.reverse();
        path
    }

    fn find_or_create(&mut self, parent: NodeId, value: &Scalar, sort_value: &Scalar) -> (NodeId, bool) {
        if let Some(id) = self.index.get(&(parent, value.clone())) {
            return (*id, false);
        }
        let depth = self.nodes[parent].depth + 1;
        let node = TreeNode::new(Some(parent), depth, value.clone(), sort_value.clone(), &self.kernels);
        let id = match self.free.pop() {
            Some(id) => {
                self.nodes[id] = node;
                id
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        self.attach(parent, id);
        self.index.insert((parent, value.clone()), id);
        (id, true)
    }

    fn attach(&mut self, parent: NodeId, id: NodeId) {
        let node = &self.nodes[id];
        let pos = self.nodes[parent]
            .children
            .partition_point(|c| self.nodes[*c].cmp_key(node) == Ordering::Less);
        self.nodes[parent].children.insert(pos, id);
    }

    fn detach(&mut self, parent: NodeId, id: NodeId) {
        self.nodes[parent].children.retain(|c| *c != id);
    }

    fn set_sort_value(&mut self, id: NodeId, sort_value: &Scalar) {
        if self.nodes[id].sort_value == *sort_value {
            return;
        }
        match self.nodes[id].parent {
            Some(parent) => {
                self.detach(parent, id);
                self.nodes[id].sort_value = sort_value.clone();
                self.attach(parent, id);
            }
            None => self.nodes[id].sort_value = sort_value.clone(),
        }
    }

    fn prune(&mut self, id: NodeId) {
        let parent = match self.nodes[id].parent {
            Some(p) => p,
            None => return,
        };
        self.detach(parent, id);
        let value = self.nodes[id].value.clone();
        self.index.remove(&(parent, value));
        let node = &mut self.nodes[id];
        node.live = false;
        node.children.clear();
        node.pkeys.clear();
        self.free.push(id);
    }

    /// Merges one batch tree and its aggregates.
    pub fn merge(&mut self, tree: &DenseTree, aggs: &BatchAggregates, strands: &[Strand]) -> MergeResult {
        let mut result = MergeResult::default();
        if strands.is_empty() {
            return result;
        }
        if tree.depth() != self.depth {
            fatal!(
                "batch tree depth {} does not match tree depth {}",
                tree.depth(),
                self.depth
            );
        }

        let mut map = vec![ROOT; tree.len()];
        for (i, bnode) in tree.nodes().iter().enumerate() {
            let sid = match bnode.parent {
                Some(p) => {
                    let (sid, created) = self.find_or_create(map[p], &bnode.value, &bnode.sort_value);
                    if created {
                        result.added.push(sid);
                    } else {
                        result.updated.push(sid);
                    }
                    sid
                }
                None => {
                    result.updated.push(ROOT);
                    ROOT
                }
            };
            map[i] = sid;
            let leaves = tree.leaves_of(i);

            self.nodes[sid].count += aggs.counts[i];
            for (k, kernel) in self.kernels.iter().enumerate() {
                let cell = &mut self.nodes[sid].aggs[k];
                cell.add_invalid(aggs.invalid[k][i]);
                if kernel.is_accumulated() {
                    cell.roll_in(kernel, &aggs.columns[k][i]);
                    continue;
                }
                for s in leaves {
                    let (out, inp) = &strands[*s].slots[k];
                    if let Some(v) = out.value() {
                        cell.add_value(v, -1);
                    }
                    if let Some(v) = inp.value() {
                        cell.add_value(v, 1);
                    }
                }
            }

            // leaves are in primary key order within a node
            if bnode.depth > 0 {
                let entering = leaves.iter().rev().find(|s| strands[**s].count >= 0);
                if let Some(s) = entering {
                    let key = strands[*s].sort_keys[bnode.depth - 1].clone();
                    self.set_sort_value(sid, &key);
                }
            }

            if bnode.depth == self.depth {
                let pkeys = &mut self.nodes[sid].pkeys;
                for s in leaves.iter().filter(|s| strands[**s].count < 0) {
                    pkeys.remove(&strands[*s].pkey);
                }
                for s in leaves.iter().filter(|s| strands[**s].count > 0) {
                    pkeys.insert(strands[*s].pkey.clone());
                }
            }
        }

        // Deepest first, so children go before their parents.
        for sid in map.iter().rev() {
            let node = &self.nodes[*sid];
            if !node.live || *sid == ROOT {
                continue;
            }
            match node.count {
                0 => {
                    self.prune(*sid);
                    result.removed.push(*sid);
                }
                c if c < 0 => fatal!("node {} has negative row count {}", sid, c),
                _ => {}
            }
        }
        if !result.removed.is_empty() {
            result.added.retain(|id| self.nodes[*id].live);
            result.updated.retain(|id| self.nodes[*id].live);
        }

        trace!(
            added = result.added.len(),
            removed = result.removed.len(),
            updated = result.updated.len(),
            live = self.len(),
            "merged batch tree"
        );
        result
    }
}
