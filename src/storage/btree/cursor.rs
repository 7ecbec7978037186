use std::cmp::Ordering;
use std::ops::Bound;

use parking_lot::RwLockReadGuard;

use crate::types::Result;

use super::node::LeafNode;
use super::tree::{BTree, KeyCodec, TreeState, ValCodec};

/// Forward cursor over a key range of a [`BTree`].
///
/// The cursor holds the tree's read lock until dropped: writers block while it
/// is alive, and mutating the same tree from the thread that owns a live
/// cursor deadlocks.
pub struct Cursor<'a, K: KeyCodec, V: ValCodec> {
    tree: &'a BTree<K, V>,
    _guard: RwLockReadGuard<'a, TreeState<K, V>>,
    upper: EncodedBound,
    leaf: LeafNode,
    slot_index: usize,
    done: bool,
}

impl<'a, K: KeyCodec, V: ValCodec> Cursor<'a, K, V> {
    pub(crate) fn new(
        tree: &'a BTree<K, V>,
        guard: RwLockReadGuard<'a, TreeState<K, V>>,
        lo: Bound<K>,
        hi: Bound<K>,
    ) -> Result<Self> {
        let lower = EncodedBound::from_bound::<K>(lo);
        let upper = EncodedBound::from_bound::<K>(hi);
        let done = EncodedBound::range_is_empty::<K>(&lower, &upper);
        let mut cursor = Self {
            tree,
            _guard: guard,
            upper,
            leaf: LeafNode::default(),
            slot_index: 0,
            done,
        };
        if !cursor.done {
            cursor.initialize(&lower)?;
        }
        Ok(cursor)
    }

    fn initialize(&mut self, lower: &EncodedBound) -> Result<()> {
        self.leaf = match lower.key_bytes() {
            Some(key) => self.tree.find_leaf(key)?.1,
            None => self.tree.leftmost_leaf()?.1,
        };
        self.slot_index = self
            .leaf
            .entries
            .partition_point(|(key, _)| !lower.allows::<K>(key));
        Ok(())
    }

    /// Advances to the next non-empty leaf; returns `false` at the end of the chain.
    fn advance_to_next_leaf(&mut self) -> Result<bool> {
        let Some(next_id) = self.leaf.next else {
            self.finish();
            return Ok(false);
        };
        self.leaf = self.tree.read_leaf(next_id)?;
        self.slot_index = 0;
        Ok(true)
    }

    fn finish(&mut self) {
        self.done = true;
        self.leaf = LeafNode::default();
        self.slot_index = 0;
    }

    fn next_entry(&mut self) -> Result<Option<(K, V)>> {
        loop {
            if self.done {
                return Ok(None);
            }
            let Some((key, value)) = self.leaf.entries.get(self.slot_index) else {
                if !self.advance_to_next_leaf()? {
                    return Ok(None);
                }
                continue;
            };
            if self.upper.is_past_upper::<K>(key) {
                self.finish();
                return Ok(None);
            }
            let typed_key = K::decode_key(key)?;
            let value = V::decode_val(value)?;
            self.slot_index += 1;
            return Ok(Some((typed_key, value)));
        }
    }
}

impl<'a, K: KeyCodec, V: ValCodec> Iterator for Cursor<'a, K, V> {
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entry() {
            Ok(entry) => entry.map(Ok),
            Err(err) => {
                self.finish();
                Some(Err(err))
            }
        }
    }
}

#[derive(Clone)]
enum EncodedBound {
    Unbounded,
    Included(Vec<u8>),
    Excluded(Vec<u8>),
}

impl EncodedBound {
    fn from_bound<K: KeyCodec>(bound: Bound<K>) -> Self {
        match bound {
            Bound::Unbounded => EncodedBound::Unbounded,
            Bound::Included(key) => {
                let mut buf = Vec::new();
                K::encode_key(&key, &mut buf);
                EncodedBound::Included(buf)
            }
            Bound::Excluded(key) => {
                let mut buf = Vec::new();
                K::encode_key(&key, &mut buf);
                EncodedBound::Excluded(buf)
            }
        }
    }

    fn key_bytes(&self) -> Option<&[u8]> {
        match self {
            EncodedBound::Unbounded => None,
            EncodedBound::Included(bytes) | EncodedBound::Excluded(bytes) => Some(bytes.as_slice()),
        }
    }

    /// Lower-bound check.
    fn allows<K: KeyCodec>(&self, key: &[u8]) -> bool {
        match self {
            EncodedBound::Unbounded => true,
            EncodedBound::Included(bound) => K::compare_encoded(key, bound) != Ordering::Less,
            EncodedBound::Excluded(bound) => K::compare_encoded(key, bound) == Ordering::Greater,
        }
    }

    fn is_past_upper<K: KeyCodec>(&self, key: &[u8]) -> bool {
        match self {
            EncodedBound::Unbounded => false,
            EncodedBound::Included(bound) => K::compare_encoded(key, bound) == Ordering::Greater,
            EncodedBound::Excluded(bound) => K::compare_encoded(key, bound) != Ordering::Less,
        }
    }

    fn range_is_empty<K: KeyCodec>(lower: &EncodedBound, upper: &EncodedBound) -> bool {
        let Some(lo) = lower.key_bytes() else {
            return false;
        };
        let Some(hi) = upper.key_bytes() else {
            return false;
        };
        match K::compare_encoded(lo, hi) {
            Ordering::Greater => true,
            Ordering::Equal => !matches!(
                (lower, upper),
                (EncodedBound::Included(_), EncodedBound::Included(_))
            ),
            Ordering::Less => false,
        }
    }
}
