use super::super::node::{branch_split_point, leaf_split_point, BranchNode, LeafNode, Node};
use super::super::page;
use super::super::separator::check_separator;
use super::{BTree, KeyCodec, PathFrame, ValCodec};
use crate::types::{PageId, Result, TreeError};

impl<K: KeyCodec, V: ValCodec> BTree<K, V> {
    /// Writes `key -> value` into its leaf, splitting as needed. Returns the replaced value bytes.
    pub(super) fn apply_put(&self, key: &[u8], value: Vec<u8>) -> Result<Option<Vec<u8>>> {
        let (path, leaf_id, mut leaf) = self.descend_with_path(key)?;
        let previous = leaf.upsert(key.to_vec(), value, K::compare_encoded);
        if self.fits(leaf.used_bytes()) {
            self.write_node(leaf_id, &Node::Leaf(leaf))?;
        } else {
            self.split_leaf(path, leaf_id, leaf)?;
        }
        Ok(previous)
    }

    fn split_leaf(&self, path: Vec<PathFrame>, leaf_id: PageId, mut left: LeafNode) -> Result<()> {
        let capacity = page::payload_capacity(self.page_size);
        let at = leaf_split_point(&left.footprints(), capacity).ok_or(
            TreeError::CapacityExceeded {
                needed: left.used_bytes(),
                available: capacity,
            },
        )?;
        let right = left.split_off(at);
        let separator = match (left.entries.last(), right.entries.first()) {
            (Some((low, _)), Some((high, _))) => self.leaf_separator(low, high)?,
            _ => return Err(TreeError::Invalid("leaf split produced an empty half")),
        };
        self.stats.inc_leaf_splits();

        if path.is_empty() {
            let left_id = self.store.allocate()?;
            let right_id = self.store.allocate()?;
            left.next = Some(right_id);
            tracing::debug!(
                target: "varitree::split",
                root = leaf_id.0,
                left = left_id.0,
                right = right_id.0,
                left_entries = left.entries.len(),
                right_entries = right.entries.len(),
                "root leaf split"
            );
            self.write_node(right_id, &Node::Leaf(right))?;
            self.write_node(left_id, &Node::Leaf(left))?;
            return self.rewrite_root(left_id, separator, right_id);
        }

        let right_id = self.store.allocate()?;
        left.next = Some(right_id);
        tracing::debug!(
            target: "varitree::split",
            left = leaf_id.0,
            right = right_id.0,
            left_entries = left.entries.len(),
            right_entries = right.entries.len(),
            separator_len = separator.len(),
            "leaf split"
        );
        self.write_node(right_id, &Node::Leaf(right))?;
        self.write_node(leaf_id, &Node::Leaf(left))?;
        self.propagate_split(path, separator, right_id)
    }

    /// Router between the last key of a left leaf and the first key of its right sibling.
    fn leaf_separator(&self, low: &[u8], high: &[u8]) -> Result<Vec<u8>> {
        match &self.options.separator {
            None => Ok(high.to_vec()),
            Some(strategy) => {
                let separator = strategy.separator(low, high);
                check_separator(&separator, low, high, K::compare_encoded)?;
                Ok(separator)
            }
        }
    }

    /// Inserts `separator -> right` into the parents on `path`, splitting branches bottom-up.
    fn propagate_split(
        &self,
        mut path: Vec<PathFrame>,
        mut separator: Vec<u8>,
        mut right: PageId,
    ) -> Result<()> {
        while let Some(frame) = path.pop() {
            let PathFrame {
                page_id,
                mut node,
                child_idx,
            } = frame;
            node.insert_split(child_idx, separator, right);
            if self.fits(node.used_bytes()) {
                return self.write_node(page_id, &Node::Branch(node));
            }

            let capacity = page::payload_capacity(self.page_size);
            let mid = branch_split_point(&node.footprints(), capacity).ok_or(
                TreeError::CapacityExceeded {
                    needed: node.used_bytes(),
                    available: capacity,
                },
            )?;
            let (promoted, right_half) = node.split_at(mid);
            self.stats.inc_branch_splits();

            if path.is_empty() {
                let left_id = self.store.allocate()?;
                let right_id = self.store.allocate()?;
                tracing::debug!(
                    target: "varitree::split",
                    root = page_id.0,
                    left = left_id.0,
                    right = right_id.0,
                    "root branch split"
                );
                self.write_node(left_id, &Node::Branch(node))?;
                self.write_node(right_id, &Node::Branch(right_half))?;
                return self.rewrite_root(left_id, promoted, right_id);
            }

            let right_id = self.store.allocate()?;
            tracing::debug!(
                target: "varitree::split",
                left = page_id.0,
                right = right_id.0,
                left_children = node.child_count(),
                right_children = right_half.child_count(),
                "branch split"
            );
            self.write_node(right_id, &Node::Branch(right_half))?;
            self.write_node(page_id, &Node::Branch(node))?;
            separator = promoted;
            right = right_id;
        }
        Err(TreeError::Invalid("split propagated past the root"))
    }

    /// Rewrites the root page as a branch over two freshly written halves.
    fn rewrite_root(&self, left: PageId, separator: Vec<u8>, right: PageId) -> Result<()> {
        let mut root = BranchNode::new(left);
        root.entries.push((separator, right));
        self.stats.inc_root_splits();
        self.write_node(self.root, &Node::Branch(root))
    }
}
