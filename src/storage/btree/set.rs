use std::ops::Bound;
use std::sync::Arc;

use crate::primitives::pager::PageStore;
use crate::types::{PageId, Result};

use super::cursor::Cursor;
use super::tree::{BTree, KeyCodec, TreeOptions, TreeReport};

/// Ordered set of keys stored as a tree with unit values.
pub struct BTreeSet<K: KeyCodec> {
    tree: BTree<K, ()>,
}

/// Cursor over the keys of a [`BTreeSet`].
pub struct SetCursor<'a, K: KeyCodec> {
    inner: Cursor<'a, K, ()>,
}

impl<'a, K: KeyCodec> Iterator for SetCursor<'a, K> {
    type Item = Result<K>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|entry| entry.map(|(key, ())| key))
    }
}

impl<K: KeyCodec> BTreeSet<K> {
    /// Formats `root` as an empty set.
    pub fn create(store: Arc<dyn PageStore>, root: PageId, opts: TreeOptions) -> Result<Self> {
        BTree::create(store, root, opts).map(|tree| Self { tree })
    }

    /// Allocates a root page and creates an empty set on it.
    pub fn create_new(store: Arc<dyn PageStore>, opts: TreeOptions) -> Result<Self> {
        BTree::create_new(store, opts).map(|tree| Self { tree })
    }

    /// Attaches to an existing set rooted at `root`.
    pub fn open(store: Arc<dyn PageStore>, root: PageId, opts: TreeOptions) -> Result<Self> {
        BTree::open(store, root, opts).map(|tree| Self { tree })
    }

    /// Adds `key`; returns `true` if it was not already present.
    pub fn add(&self, key: &K) -> Result<bool> {
        self.tree.put_if_absent(key, ())
    }

    /// Returns `true` if `key` is present.
    pub fn contains(&self, key: &K) -> Result<bool> {
        self.tree.contains_key(key)
    }

    /// Removes `key`; returns `true` if it was present.
    pub fn remove(&self, key: &K) -> Result<bool> {
        self.tree.remove(key).map(|previous| previous.is_some())
    }

    /// Keys within the bounds, in order.
    pub fn scan(&self, lower: Bound<K>, upper: Bound<K>) -> Result<SetCursor<'_, K>> {
        Ok(SetCursor {
            inner: self.tree.scan(lower, upper)?,
        })
    }

    /// Every key, in order.
    pub fn iter(&self) -> Result<SetCursor<'_, K>> {
        self.scan(Bound::Unbounded, Bound::Unbounded)
    }

    /// Applies pending mutations to the pages.
    pub fn flush(&self) -> Result<()> {
        self.tree.flush()
    }

    /// Flushes and syncs the store.
    pub fn close(self) -> Result<()> {
        self.tree.close()
    }

    /// Checks structural invariants.
    pub fn verify(&self) -> Result<TreeReport> {
        self.tree.verify()
    }

    /// Root page identifier.
    pub fn root_page(&self) -> PageId {
        self.tree.root_page()
    }

    /// The underlying tree.
    pub fn as_tree(&self) -> &BTree<K, ()> {
        &self.tree
    }
}
