use super::super::node::Node;
use super::{BTree, KeyCodec, ValCodec};
use crate::types::Result;

impl<K: KeyCodec, V: ValCodec> BTree<K, V> {
    /// Removes `key` from its leaf and rewrites the leaf. Returns the removed value bytes.
    ///
    /// Leaves are never merged or rebalanced; an emptied leaf stays in the chain.
    pub(super) fn apply_remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let (leaf_id, mut leaf) = self.find_leaf(key)?;
        let Some(previous) = leaf.remove(key, K::compare_encoded) else {
            return Ok(None);
        };
        if leaf.entries.is_empty() && leaf_id != self.root {
            tracing::debug!(target: "varitree::split", leaf = leaf_id.0, "leaf emptied");
        }
        self.write_node(leaf_id, &Node::Leaf(leaf))?;
        self.stats.inc_tombstones_applied();
        Ok(Some(previous))
    }
}
