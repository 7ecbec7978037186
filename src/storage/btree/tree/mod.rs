use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::node::{BranchNode, LeafNode, Node};
use super::page;
use super::pending::PendingBuffer;
use super::separator::SeparatorStrategy;
use super::stats::BTreeStats;
use crate::primitives::pager::PageStore;
use crate::types::{NodeDefect, PageId, Result, TreeError};

mod api;
mod delete;
mod insert;
mod verify;

pub use verify::TreeReport;

/// Descents deeper than this are treated as a cycle in corrupted pages.
pub(crate) const MAX_DEPTH: usize = 64;

/// Trait implemented by key types that can be encoded for storage in the tree.
pub trait KeyCodec: Sized {
    /// Encode `key` into `out`.
    fn encode_key(key: &Self, out: &mut Vec<u8>);

    /// Compare two encoded keys. This is the tree's ordering.
    fn compare_encoded(a: &[u8], b: &[u8]) -> Ordering;

    /// Decode a key from its encoded representation.
    fn decode_key(bytes: &[u8]) -> Result<Self>;
}

/// Trait implemented by value types that can be stored in the tree.
pub trait ValCodec: Sized {
    /// Encode `value` into `out`.
    fn encode_val(value: &Self, out: &mut Vec<u8>);

    /// Decode a value from `src`.
    fn decode_val(src: &[u8]) -> Result<Self>;
}

/// Configuration fixed when a tree is created or opened.
#[derive(Clone)]
pub struct TreeOptions {
    /// Buffer mutations in memory and encode them into pages on flush.
    pub deferred_encoding: bool,
    /// Shortens separators promoted by leaf splits. `None` promotes the right half's first key.
    pub separator: Option<Arc<dyn SeparatorStrategy>>,
    /// Verify page checksums on every node read.
    pub verify_checksums: bool,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            deferred_encoding: true,
            separator: None,
            verify_checksums: true,
        }
    }
}

impl TreeOptions {
    /// Sets [`TreeOptions::deferred_encoding`].
    pub fn deferred_encoding(mut self, enabled: bool) -> Self {
        self.deferred_encoding = enabled;
        self
    }

    /// Sets [`TreeOptions::separator`].
    pub fn separator(mut self, strategy: impl SeparatorStrategy + 'static) -> Self {
        self.separator = Some(Arc::new(strategy));
        self
    }

    /// Sets [`TreeOptions::verify_checksums`].
    pub fn verify_checksums(mut self, enabled: bool) -> Self {
        self.verify_checksums = enabled;
        self
    }
}

impl fmt::Debug for TreeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeOptions")
            .field("deferred_encoding", &self.deferred_encoding)
            .field("separator", &self.separator.as_ref().map(|s| s.name()))
            .field("verify_checksums", &self.verify_checksums)
            .finish()
    }
}

/// Mutable state guarded by the tree lock.
pub(crate) struct TreeState<K, V> {
    pub(super) pending: PendingBuffer<K, V>,
}

/// Page-backed B+tree mapping `K` to `V`.
///
/// The root page id is fixed for the lifetime of the tree: a root split moves
/// both halves to new pages and rewrites the root in place as a branch.
pub struct BTree<K: KeyCodec, V: ValCodec> {
    pub(super) store: Arc<dyn PageStore>,
    pub(super) root: PageId,
    pub(super) page_size: usize,
    pub(super) options: TreeOptions,
    pub(super) stats: Arc<BTreeStats>,
    pub(super) state: RwLock<TreeState<K, V>>,
}

/// Branch visited on the way down, with the index of the child taken.
pub(super) struct PathFrame {
    pub(super) page_id: PageId,
    pub(super) node: BranchNode,
    pub(super) child_idx: usize,
}

impl<K: KeyCodec, V: ValCodec> BTree<K, V> {
    pub(crate) fn read_node(&self, id: PageId) -> Result<Node> {
        let bytes = self.store.read(id)?;
        page::decode(&bytes, id, self.options.verify_checksums)
    }

    pub(crate) fn read_leaf(&self, id: PageId) -> Result<LeafNode> {
        self.read_node(id)?.into_leaf()
    }

    pub(super) fn write_node(&self, id: PageId, node: &Node) -> Result<()> {
        let bytes = page::encode(node, id, self.page_size)?;
        self.store.write(id, &bytes)?;
        self.stats.inc_page_writes();
        Ok(())
    }

    pub(super) fn fits(&self, used_bytes: usize) -> bool {
        page::encoded_len_for(used_bytes) <= self.page_size
    }

    /// Descends to the leaf covering `key` without recording the path.
    pub(crate) fn find_leaf(&self, key: &[u8]) -> Result<(PageId, LeafNode)> {
        self.stats.inc_searches();
        let mut current = self.root;
        for _ in 0..MAX_DEPTH {
            match self.read_node(current)? {
                Node::Leaf(leaf) => {
                    tracing::trace!(target: "varitree::search", leaf = current.0, "reached leaf");
                    return Ok((current, leaf));
                }
                Node::Branch(branch) => {
                    self.stats.inc_branch_visits();
                    let idx = branch.child_index(key, K::compare_encoded);
                    tracing::trace!(
                        target: "varitree::search",
                        branch = current.0,
                        child_idx = idx,
                        "descend"
                    );
                    current = branch.child_at(idx);
                }
            }
        }
        Err(NodeDefect::Malformed("descent exceeded maximum depth").into())
    }

    /// Descends to the leaf covering `key`, returning the branches visited root first.
    pub(super) fn descend_with_path(
        &self,
        key: &[u8],
    ) -> Result<(Vec<PathFrame>, PageId, LeafNode)> {
        self.stats.inc_searches();
        let mut path = Vec::new();
        let mut current = self.root;
        for _ in 0..MAX_DEPTH {
            match self.read_node(current)? {
                Node::Leaf(leaf) => return Ok((path, current, leaf)),
                Node::Branch(branch) => {
                    self.stats.inc_branch_visits();
                    let child_idx = branch.child_index(key, K::compare_encoded);
                    let child = branch.child_at(child_idx);
                    path.push(PathFrame {
                        page_id: current,
                        node: branch,
                        child_idx,
                    });
                    current = child;
                }
            }
        }
        Err(NodeDefect::Malformed("descent exceeded maximum depth").into())
    }

    pub(crate) fn leftmost_leaf(&self) -> Result<(PageId, LeafNode)> {
        let mut current = self.root;
        for _ in 0..MAX_DEPTH {
            match self.read_node(current)? {
                Node::Leaf(leaf) => return Ok((current, leaf)),
                Node::Branch(branch) => current = branch.leftmost,
            }
        }
        Err(NodeDefect::Malformed("descent exceeded maximum depth").into())
    }

    /// Reads the persisted value bytes for `key`, ignoring pending entries.
    pub(super) fn lookup_persisted(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let (_, leaf) = self.find_leaf(key)?;
        Ok(leaf
            .get(key, K::compare_encoded)
            .map(|value| value.to_vec()))
    }

    /// Rejects keys whose leaf or branch record could exceed half a page.
    pub(super) fn check_key(&self, key: &[u8]) -> Result<()> {
        let available = page::max_entry_len(self.page_size);
        let needed = page::branch_record_len(key);
        if needed > available {
            return Err(TreeError::CapacityExceeded { needed, available });
        }
        Ok(())
    }

    /// Rejects entries whose leaf record exceeds half a page.
    pub(super) fn check_entry(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_key(key)?;
        let available = page::max_entry_len(self.page_size);
        let needed = page::leaf_record_len(key, value);
        if needed > available {
            return Err(TreeError::CapacityExceeded { needed, available });
        }
        Ok(())
    }
}

pub(super) fn encode_key<K: KeyCodec>(key: &K) -> Vec<u8> {
    let mut buf = Vec::new();
    K::encode_key(key, &mut buf);
    buf
}

pub(super) fn encode_val<V: ValCodec>(value: &V) -> Vec<u8> {
    let mut buf = Vec::new();
    V::encode_val(value, &mut buf);
    buf
}
