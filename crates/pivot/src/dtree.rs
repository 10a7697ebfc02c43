//! Dense batch grouping tree.
//!
//! Built once per batch from the strands, breadth first. The root covers
//! every strand; each level partitions a node's leaf range by the distinct
//! pivot value at that depth, counting first and then assigning contiguous
//! offsets so the partition is stable. Children therefore follow the order of
//! the (pre-sorted) strands, and every node's leaves are one contiguous range
//! of `leaves`, which index back into the strand table.

use crate::strand::Strand;
use hashbrown::HashMap;
use tessera_core::Scalar;

/// A node of the batch tree.
#[derive(Clone, Debug, PartialEq)]
pub struct DenseNode {
    pub depth: usize,
    /// Pivot value at this depth; `None` for the root
    pub value: Scalar,
    pub sort_value: Scalar,
    pub parent: Option<usize>,
    /// Index of the first child
    pub fcidx: usize,
    pub nchild: usize,
    /// Index of the first leaf in `leaves`
    pub flidx: usize,
    pub nleaves: usize,
}

/// A breadth-first batch tree over a strand table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DenseTree {
    nodes: Vec<DenseNode>,
    leaves: Vec<usize>,
    depth: usize,
}

impl DenseTree {
    /// Groups `strands` by the first `depth` levels of their paths.
    ///
    /// With `depth == 0` the tree is a single root over every strand.
    pub fn build(strands: &[Strand], depth: usize) -> Self {
        let mut leaves: Vec<usize> = (0..strands.len()).collect();
        let mut nodes = vec![DenseNode {
            depth: 0,
            value: Scalar::None,
            sort_value: Scalar::None,
            parent: None,
            fcidx: 0,
            nchild: 0,
            flidx: 0,
            nleaves: strands.len(),
        }];
        let mut scratch = Vec::with_capacity(strands.len());

        let mut idx = 0;
        while idx < nodes.len() {
            let node_depth = nodes[idx].depth;
            if node_depth >= depth || nodes[idx].nleaves == 0 {
                idx += 1;
                continue;
            }
            let range = nodes[idx].flidx..nodes[idx].flidx + nodes[idx].nleaves;

            // Count per distinct value, in first-appearance order.
            let mut groups: HashMap<&Scalar, usize> = HashMap::new();
            let mut order: Vec<(&Scalar, usize)> = Vec::new();
            for leaf in &leaves[range.clone()] {
                let value = &strands[*leaf].path[node_depth];
                match groups.get(value) {
                    Some(g) => order[*g].1 += 1,
                    None => {
                        groups.insert(value, order.len());
                        order.push((value, 1));
                    }
                }
            }

            // Offsets, then a stable scatter.
            let mut offsets = Vec::with_capacity(order.len());
            let mut next = range.start;
            for (_, count) in &order {
                offsets.push(next);
                next += count;
            }
            let mut cursor = offsets.clone();
            scratch.clear();
            scratch.resize(range.len(), 0);
            for leaf in &leaves[range.clone()] {
                let g = groups[&strands[*leaf].path[node_depth]];
                scratch[cursor[g] - range.start] = *leaf;
                cursor[g] += 1;
            }
            leaves[range].copy_from_slice(&scratch);

            let fcidx = nodes.len();
            for (g, (value, count)) in order.iter().enumerate() {
                let first = leaves[offsets[g]];
                nodes.push(DenseNode {
                    depth: node_depth + 1,
                    value: (*value).clone(),
                    sort_value: strands[first].sort_keys[node_depth].clone(),
                    parent: Some(idx),
                    fcidx: 0,
                    nchild: 0,
                    flidx: offsets[g],
                    nleaves: *count,
                });
            }
            nodes[idx].fcidx = fcidx;
            nodes[idx].nchild = order.len();
            idx += 1;
        }

        Self {
            nodes,
            leaves,
            depth,
        }
    }

    /// Returns all nodes in breadth-first order.
    #[inline]
    pub fn nodes(&self) -> &[DenseNode] {
        &self.nodes
    }

    #[inline]
    pub fn node(&self, idx: usize) -> Option<&DenseNode> {
        self.nodes.get(idx)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the grouping depth the tree was built with.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the strand indices under a node.
    pub fn leaves_of(&self, idx: usize) -> &[usize] {
        match self.nodes.get(idx) {
            Some(n) => &self.leaves[n.flidx..n.flidx + n.nleaves],
            None => &[],
        }
    }

    /// Returns the pivot values from the root to a node.
    pub fn path(&self, idx: usize) -> Vec<Scalar> {
        let mut path = Vec::new();
        let mut cur = self.nodes.get(idx);
        while let Some(node) = cur {
            if node.parent.is_none() {
                break;
            }
            path.push(node.value.clone());
            cur = node.parent.and_then(|p| self.nodes.get(p));
        }
        path.reverse();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strand(path: &[&str], pkey: i64) -> Strand {
        let path: Vec<Scalar> = path.iter().map(|s| Scalar::from(*s)).collect();
        Strand {
            sort_keys: path.clone(),
            path,
            pkey: Scalar::Int64(pkey),
            row: 0,
            count: 1,
            slots: Vec::new(),
        }
    }

    #[test]
    fn test_zero_pivots_single_root() {
        let strands = vec![strand(&["a"], 1), strand(&["b"], 2)];
        let tree = DenseTree::build(&strands, 0);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.leaves_of(0), &[0, 1]);
        assert!(tree.path(0).is_empty());
    }

    #[test]
    fn test_partition_stable() {
        let strands = vec![
            strand(&["a", "x"], 1),
            strand(&["a", "y"], 2),
            strand(&["b", "x"], 3),
            strand(&["a", "x"], 4),
        ];
        let tree = DenseTree::build(&strands, 2);
        let root = tree.node(0).unwrap();
        assert_eq!((root.fcidx, root.nchild), (1, 2));
        assert_eq!(tree.node(1).unwrap().value, Scalar::from("a"));
        // the range of "a" is regrouped by the next level: x first, then y
        assert_eq!(tree.leaves_of(1), &[0, 3, 1]);
        assert_eq!(tree.leaves_of(2), &[2]);

        let a = tree.node(1).unwrap();
        assert_eq!(a.nchild, 2);
        let ax = a.fcidx;
        assert_eq!(tree.path(ax), vec![Scalar::from("a"), Scalar::from("x")]);
        assert_eq!(tree.leaves_of(ax), &[0, 3]);
        assert_eq!(tree.node(ax).unwrap().parent, Some(1));
    }

    #[test]
    fn test_empty() {
        let tree = DenseTree::build(&[], 3);
        assert_eq!(tree.len(), 1);
        assert!(tree.leaves_of(0).is_empty());
        assert!(tree.leaves_of(9).is_empty());
    }
}
