use std::cmp::Ordering;
use std::collections::HashSet;

use super::super::node::Node;
use super::super::page;
use super::{BTree, KeyCodec, ValCodec, MAX_DEPTH};
use crate::types::{NodeDefect, PageId, Result};

/// Shape of a tree as observed by [`BTree::verify`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TreeReport {
    /// Levels from root to leaves; a lone root leaf has height 1.
    pub height: usize,
    /// Branch pages reachable from the root.
    pub branches: usize,
    /// Leaf pages reachable from the root.
    pub leaves: usize,
    /// Non-root leaves holding no entries.
    pub empty_leaves: usize,
    /// Entries across all leaves.
    pub entries: usize,
}

struct Walk {
    report: TreeReport,
    leaf_depth: Option<usize>,
    leaves: Vec<PageId>,
    visited: HashSet<PageId>,
}

fn violation(what: &'static str) -> crate::types::TreeError {
    NodeDefect::Malformed(what).into()
}

impl<K: KeyCodec, V: ValCodec> BTree<K, V> {
    pub(super) fn verify_structure(&self) -> Result<TreeReport> {
        let mut walk = Walk {
            report: TreeReport::default(),
            leaf_depth: None,
            leaves: Vec::new(),
            visited: HashSet::new(),
        };
        self.walk(self.root, None, None, 0, &mut walk)?;
        self.check_leaf_chain(&walk.leaves)?;
        walk.report.height = walk.leaf_depth.map_or(0, |depth| depth + 1);
        tracing::debug!(
            target: "varitree::stats",
            height = walk.report.height,
            branches = walk.report.branches,
            leaves = walk.report.leaves,
            empty_leaves = walk.report.empty_leaves,
            entries = walk.report.entries,
            "verified tree"
        );
        Ok(walk.report)
    }

    /// Checks the subtree at `id` holds only keys in `[lower, upper)`.
    fn walk(
        &self,
        id: PageId,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        depth: usize,
        walk: &mut Walk,
    ) -> Result<()> {
        if depth >= MAX_DEPTH {
            return Err(violation("tree deeper than maximum depth"));
        }
        if !walk.visited.insert(id) {
            return Err(violation("page reachable from two parents"));
        }
        let node = self.read_node(id)?;
        if !page::fits(&node, self.page_size) {
            return Err(violation("node exceeds page size"));
        }
        let in_range = |key: &[u8]| {
            lower.map_or(true, |lo| K::compare_encoded(key, lo) != Ordering::Less)
                && upper.map_or(true, |hi| K::compare_encoded(key, hi) == Ordering::Less)
        };
        match node {
            Node::Leaf(leaf) => {
                match walk.leaf_depth {
                    None => walk.leaf_depth = Some(depth),
                    Some(expected) if expected != depth => {
                        return Err(violation("leaves at different depths"));
                    }
                    Some(_) => {}
                }
                for pair in leaf.entries.windows(2) {
                    if K::compare_encoded(&pair[0].0, &pair[1].0) != Ordering::Less {
                        return Err(violation("leaf keys not strictly increasing"));
                    }
                }
                if leaf.entries.iter().any(|(key, _)| !in_range(key)) {
                    return Err(violation("leaf key outside parent separator range"));
                }
                walk.report.leaves += 1;
                walk.report.entries += leaf.entries.len();
                if leaf.entries.is_empty() && id != self.root {
                    walk.report.empty_leaves += 1;
                }
                walk.leaves.push(id);
                Ok(())
            }
            Node::Branch(branch) => {
                walk.report.branches += 1;
                for pair in branch.entries.windows(2) {
                    if K::compare_encoded(&pair[0].0, &pair[1].0) != Ordering::Less {
                        return Err(violation("branch separators not strictly increasing"));
                    }
                }
                if branch.entries.iter().any(|(sep, _)| !in_range(sep)) {
                    return Err(violation("separator outside parent range"));
                }
                let mut child_lower = lower;
                let mut child = branch.leftmost;
                for (sep, next_child) in &branch.entries {
                    self.walk(child, child_lower, Some(sep), depth + 1, walk)?;
                    child_lower = Some(sep);
                    child = *next_child;
                }
                self.walk(child, child_lower, upper, depth + 1, walk)
            }
        }
    }

    /// The `next` chain from the leftmost leaf must visit exactly the leaves of the walk, in order.
    fn check_leaf_chain(&self, in_order: &[PageId]) -> Result<()> {
        let mut current = in_order.first().copied();
        for expected in in_order {
            match current {
                Some(id) if id == *expected => {
                    current = self.read_leaf(id)?.next;
                }
                _ => return Err(violation("leaf chain disagrees with tree order")),
            }
        }
        if current.is_some() {
            return Err(violation("leaf chain continues past the last leaf"));
        }
        Ok(())
    }
}
