use std::ops::Bound;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockWriteGuard};

use super::super::cursor::Cursor;
use super::super::node::{LeafNode, Node};
use super::super::page;
use super::super::pending::{OrderedKey, PendingBuffer};
use super::super::stats::{BTreeStats, BTreeStatsSnapshot};
use super::{encode_key, encode_val, BTree, KeyCodec, TreeOptions, TreeReport, TreeState, ValCodec};
use crate::primitives::pager::PageStore;
use crate::types::{page::check_page_size, PageId, Result, TreeError};

impl<K: KeyCodec, V: ValCodec> BTree<K, V> {
    /// Formats `root` as an empty leaf and attaches a tree to it.
    pub fn create(store: Arc<dyn PageStore>, root: PageId, opts: TreeOptions) -> Result<Self> {
        if root.is_none() {
            return Err(TreeError::Invalid("page 0 is reserved"));
        }
        let tree = Self::attach(store, root, opts)?;
        tree.write_node(root, &Node::Leaf(LeafNode::new(None)))?;
        tracing::debug!(target: "varitree::split", root = root.0, "created tree");
        Ok(tree)
    }

    /// Allocates a root page from `store` and creates an empty tree on it.
    pub fn create_new(store: Arc<dyn PageStore>, opts: TreeOptions) -> Result<Self> {
        let root = store.allocate()?;
        Self::create(store, root, opts)
    }

    /// Attaches to an existing tree rooted at `root` without writing.
    pub fn open(store: Arc<dyn PageStore>, root: PageId, opts: TreeOptions) -> Result<Self> {
        if root.is_none() {
            return Err(TreeError::Invalid("page 0 is reserved"));
        }
        let tree = Self::attach(store, root, opts)?;
        tree.read_node(root)?;
        Ok(tree)
    }

    fn attach(store: Arc<dyn PageStore>, root: PageId, options: TreeOptions) -> Result<Self> {
        let page_size = store.page_size();
        check_page_size(page_size)?;
        let page_size = page_size as usize;
        if page::max_entry_len(page_size) < page::branch_record_len(&[]) {
            return Err(TreeError::Invalid("page size too small for tree nodes"));
        }
        Ok(Self {
            store,
            root,
            page_size,
            options,
            stats: Arc::new(BTreeStats::default()),
            state: RwLock::new(TreeState {
                pending: PendingBuffer::default(),
            }),
        })
    }

    /// Return the root page identifier.
    pub fn root_page(&self) -> PageId {
        self.root
    }

    /// Options the tree was attached with.
    pub fn options(&self) -> &TreeOptions {
        &self.options
    }

    /// Access the live statistics counters for this tree.
    pub fn stats(&self) -> Arc<BTreeStats> {
        Arc::clone(&self.stats)
    }

    /// Snapshot the current statistics counters.
    pub fn stats_snapshot(&self) -> BTreeStatsSnapshot {
        self.stats.snapshot()
    }

    /// Emit the current statistics to the tracing sink.
    pub fn emit_stats(&self) {
        self.stats.emit_tracing();
    }

    /// Number of mutations waiting in the pending buffer.
    pub fn pending_len(&self) -> usize {
        self.state.read().pending.len()
    }

    /// Returns `true` if `key` is present, pending writes included.
    pub fn contains_key(&self, key: &K) -> Result<bool> {
        let encoded = encode_key(key);
        let state = self.state.read();
        if let Some(entry) = state.pending.lookup(&OrderedKey::new(encoded.clone())) {
            return Ok(entry.value.is_some());
        }
        let (_, leaf) = self.find_leaf(&encoded)?;
        Ok(leaf.get(&encoded, K::compare_encoded).is_some())
    }

    /// Stores `value` under `key`, returning the previous value.
    ///
    /// With deferred encoding the value is only staged; it reaches a page on the
    /// next flush. Entries too large for half a page fail here in both modes.
    pub fn put(&self, key: &K, value: V) -> Result<Option<V>> {
        let encoded = encode_key(key);
        self.check_key(&encoded)?;
        let mut state = self.state.write();
        self.put_locked(&mut state, encoded, value)
    }

    /// Stores `value` only if `key` is absent. Returns `true` if it was stored.
    pub fn put_if_absent(&self, key: &K, value: V) -> Result<bool> {
        let encoded = encode_key(key);
        self.check_key(&encoded)?;
        let mut state = self.state.write();
        let present = match state.pending.lookup(&OrderedKey::new(encoded.clone())) {
            Some(entry) => entry.value.is_some(),
            None => self.lookup_persisted(&encoded)?.is_some(),
        };
        if present {
            return Ok(false);
        }
        self.put_locked(&mut state, encoded, value)?;
        Ok(true)
    }

    fn put_locked(
        &self,
        state: &mut TreeState<K, V>,
        encoded: Vec<u8>,
        value: V,
    ) -> Result<Option<V>> {
        if self.options.deferred_encoding {
            self.check_entry(&encoded, &encode_val(&value))?;
            let key = OrderedKey::new(encoded);
            let persisted = if state.pending.lookup(&key).is_some() {
                None
            } else {
                self.lookup_persisted(key.as_bytes())?
            };
            let replaced = state.pending.stage(key, Some(value));
            self.stats.inc_staged(replaced.is_some());
            return match replaced {
                Some(entry) => Ok(entry.value),
                None => persisted.map(|bytes| V::decode_val(&bytes)).transpose(),
            };
        }
        let value = encode_val(&value);
        self.check_entry(&encoded, &value)?;
        self.apply_put(&encoded, value)?
            .map(|bytes| V::decode_val(&bytes))
            .transpose()
    }

    /// Removes `key`, returning its value.
    ///
    /// With deferred encoding a tombstone is staged and applied on the next flush.
    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        let encoded = encode_key(key);
        let mut state = self.state.write();
        if !self.options.deferred_encoding {
            return self
                .apply_remove(&encoded)?
                .map(|bytes| V::decode_val(&bytes))
                .transpose();
        }
        let key = OrderedKey::new(encoded);
        if state.pending.lookup(&key).is_some() {
            let replaced = state.pending.stage(key, None);
            self.stats.inc_staged(true);
            return Ok(replaced.and_then(|entry| entry.value));
        }
        let Some(bytes) = self.lookup_persisted(key.as_bytes())? else {
            return Ok(None);
        };
        state.pending.stage(key, None);
        self.stats.inc_staged(false);
        V::decode_val(&bytes).map(Some)
    }

    /// Applies every pending mutation to the pages.
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.write();
        self.flush_locked(&mut state)
    }

    /// Flushes pending mutations and syncs the store.
    pub fn close(self) -> Result<()> {
        self.flush()?;
        self.store.sync()
    }

    pub(super) fn flush_locked(&self, state: &mut TreeState<K, V>) -> Result<()> {
        if state.pending.is_empty() {
            return Ok(());
        }
        let total = state.pending.len();
        let mut drained = state.pending.drain();
        let mut applied = 0u64;
        let mut tombstones = 0u64;
        while let Some((key, entry)) = drained.next() {
            let outcome = match &entry.value {
                Some(value) => self.apply_put(key.as_bytes(), encode_val(value)).map(|_| ()),
                None => {
                    tombstones += 1;
                    self.apply_remove(key.as_bytes()).map(|_| ())
                }
            };
            if let Err(err) = outcome {
                let failed_stamp = entry.stamp;
                let remaining: Vec<_> = drained.collect();
                state.pending.restore(key, entry);
                for (key, entry) in remaining {
                    state.pending.restore(key, entry);
                }
                tracing::debug!(
                    target: "varitree::pending",
                    applied,
                    failed_stamp,
                    restored = state.pending.len(),
                    error = %err,
                    "flush aborted"
                );
                self.stats.add_flushed(applied);
                return Err(err);
            }
            applied += 1;
        }
        self.stats.add_flushed(applied);
        tracing::debug!(
            target: "varitree::pending",
            total,
            applied,
            tombstones,
            "flushed pending entries"
        );
        Ok(())
    }

    /// Flushes, then returns a cursor over `[lower, upper]` as given by the bounds.
    ///
    /// The cursor holds the tree's read lock until dropped.
    pub fn scan(&self, lower: Bound<K>, upper: Bound<K>) -> Result<Cursor<'_, K, V>> {
        let mut state = self.state.write();
        self.flush_locked(&mut state)?;
        let guard = RwLockWriteGuard::downgrade(state);
        Cursor::new(self, guard, lower, upper)
    }

    /// Flushes, then returns a cursor over every entry in key order.
    pub fn iter(&self) -> Result<Cursor<'_, K, V>> {
        self.scan(Bound::Unbounded, Bound::Unbounded)
    }

    /// Smallest entry in the tree.
    pub fn first(&self) -> Result<Option<(K, V)>> {
        self.iter()?.next().transpose()
    }

    /// Flushes, then checks structural invariants over the whole tree.
    pub fn verify(&self) -> Result<TreeReport> {
        let mut state = self.state.write();
        self.flush_locked(&mut state)?;
        let guard = RwLockWriteGuard::downgrade(state);
        let report = self.verify_structure()?;
        drop(guard);
        Ok(report)
    }
}

impl<K: KeyCodec, V: ValCodec + Clone> BTree<K, V> {
    /// Returns the value stored under `key`, pending writes included.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        let encoded = encode_key(key);
        let state = self.state.read();
        if let Some(entry) = state.pending.lookup(&OrderedKey::new(encoded.clone())) {
            return Ok(entry.value.clone());
        }
        match self.lookup_persisted(&encoded)? {
            Some(bytes) => V::decode_val(&bytes).map(Some),
            None => Ok(None),
        }
    }
}

impl<K: KeyCodec, V: ValCodec> Drop for BTree<K, V> {
    fn drop(&mut self) {
        let mut state = self.state.write();
        if state.pending.is_empty() {
            return;
        }
        let pending = state.pending.len();
        if let Err(err) = self.flush_locked(&mut state) {
            tracing::warn!(
                target: "varitree::pending",
                root = self.root.0,
                pending,
                error = %err,
                "failed to flush pending entries on drop"
            );
        }
    }
}
