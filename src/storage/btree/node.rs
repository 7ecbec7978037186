use std::cmp::Ordering;

use crate::types::{NodeDefect, PageId, Result};

use super::page::{branch_record_len, leaf_record_len};

/// Ordering over encoded keys, supplied by the key codec.
pub type KeyCmp = fn(&[u8], &[u8]) -> Ordering;

/// Decoded form of one tree page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    /// Key/value entries plus the next-leaf link.
    Leaf(LeafNode),
    /// Routers to child pages.
    Branch(BranchNode),
}

impl Node {
    /// Variant name used in diagnostics.
    pub fn variant(&self) -> &'static str {
        match self {
            Node::Leaf(_) => "leaf",
            Node::Branch(_) => "branch",
        }
    }

    /// Unwraps a leaf, reporting `WrongVariant` for a branch.
    pub fn into_leaf(self) -> Result<LeafNode> {
        match self {
            Node::Leaf(leaf) => Ok(leaf),
            other => Err(NodeDefect::WrongVariant {
                expected: "leaf",
                found: other.variant(),
            }
            .into()),
        }
    }

    /// Unwraps a branch, reporting `WrongVariant` for a leaf.
    pub fn into_branch(self) -> Result<BranchNode> {
        match self {
            Node::Branch(branch) => Ok(branch),
            other => Err(NodeDefect::WrongVariant {
                expected: "branch",
                found: other.variant(),
            }
            .into()),
        }
    }

    /// Bytes used by the entries of this node, slot directory included.
    pub fn used_bytes(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.used_bytes(),
            Node::Branch(branch) => branch.used_bytes(),
        }
    }
}

/// Leaf node holding encoded keys and values in key order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LeafNode {
    /// Entries sorted by key.
    pub entries: Vec<(Vec<u8>, Vec<u8>)>,
    /// Following leaf in key order.
    pub next: Option<PageId>,
}

impl LeafNode {
    /// Creates an empty leaf.
    pub fn new(next: Option<PageId>) -> Self {
        Self {
            entries: Vec::new(),
            next,
        }
    }

    /// Binary-searches for `key`.
    pub fn search(&self, key: &[u8], cmp: KeyCmp) -> std::result::Result<usize, usize> {
        self.entries.binary_search_by(|(k, _)| cmp(k, key))
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &[u8], cmp: KeyCmp) -> Option<&[u8]> {
        self.search(key, cmp)
            .ok()
            .map(|idx| self.entries[idx].1.as_slice())
    }

    /// Replaces the value for `key` or inserts it at its sorted position.
    pub fn upsert(&mut self, key: Vec<u8>, value: Vec<u8>, cmp: KeyCmp) -> Option<Vec<u8>> {
        match self.search(&key, cmp) {
            Ok(idx) => Some(std::mem::replace(&mut self.entries[idx].1, value)),
            Err(idx) => {
                self.entries.insert(idx, (key, value));
                None
            }
        }
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &[u8], cmp: KeyCmp) -> Option<Vec<u8>> {
        self.search(key, cmp)
            .ok()
            .map(|idx| self.entries.remove(idx).1)
    }

    /// Per-entry footprints used by the split policy.
    pub fn footprints(&self) -> Vec<usize> {
        self.entries
            .iter()
            .map(|(k, v)| leaf_record_len(k, v))
            .collect()
    }

    /// Bytes used by the entries, slot directory included.
    pub fn used_bytes(&self) -> usize {
        self.entries.iter().map(|(k, v)| leaf_record_len(k, v)).sum()
    }

    /// Moves the entries from `at` onwards into a new leaf.
    ///
    /// The caller relinks `next` once the right page id is known.
    pub fn split_off(&mut self, at: usize) -> LeafNode {
        LeafNode {
            entries: self.entries.split_off(at),
            next: self.next,
        }
    }
}

/// Branch node: `leftmost` routes keys below the first separator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchNode {
    /// Child holding keys below every separator.
    pub leftmost: PageId,
    /// `(separator, child)` pairs in separator order; `child` holds keys `>= separator`.
    pub entries: Vec<(Vec<u8>, PageId)>,
}

impl BranchNode {
    /// Creates a branch with a single child.
    pub fn new(leftmost: PageId) -> Self {
        Self {
            leftmost,
            entries: Vec::new(),
        }
    }

    /// Index of the child covering `key`; `0` is the leftmost child.
    ///
    /// A key equal to a separator routes right.
    pub fn child_index(&self, key: &[u8], cmp: KeyCmp) -> usize {
        self.entries
            .partition_point(|(sep, _)| cmp(sep, key) != Ordering::Greater)
    }

    /// Child page at `idx` as returned by [`BranchNode::child_index`].
    pub fn child_at(&self, idx: usize) -> PageId {
        if idx == 0 {
            self.leftmost
        } else {
            self.entries[idx - 1].1
        }
    }

    /// Number of children.
    pub fn child_count(&self) -> usize {
        self.entries.len() + 1
    }

    /// Records a split of the child at `child_idx`: `right` now holds keys `>= separator`.
    pub fn insert_split(&mut self, child_idx: usize, separator: Vec<u8>, right: PageId) {
        self.entries.insert(child_idx, (separator, right));
    }

    /// Per-entry footprints used by the split policy.
    pub fn footprints(&self) -> Vec<usize> {
        self.entries
            .iter()
            .map(|(sep, _)| branch_record_len(sep))
            .collect()
    }

    /// Bytes used by the entries, slot directory included.
    pub fn used_bytes(&self) -> usize {
        self.entries.iter().map(|(sep, _)| branch_record_len(sep)).sum()
    }

    /// Splits around the entry at `mid`, returning the promoted separator and the right half.
    ///
    /// The promoted entry's child becomes the right half's leftmost child.
    pub fn split_at(&mut self, mid: usize) -> (Vec<u8>, BranchNode) {
        let mut tail = self.entries.split_off(mid);
        let rest = tail.split_off(1);
        let (promoted, right_leftmost) = tail.remove(0);
        (
            promoted,
            BranchNode {
                leftmost: right_leftmost,
                entries: rest,
            },
        )
    }
}

/// Leaf split index: entries `[..s]` stay left, `[s..]` move right.
///
/// Picks the `s` minimising the byte imbalance among splits where both halves
/// fit in `capacity`.
pub fn leaf_split_point(footprints: &[usize], capacity: usize) -> Option<usize> {
    let total: usize = footprints.iter().sum();
    let mut left = 0usize;
    let mut best: Option<(usize, usize)> = None;
    for s in 1..footprints.len() {
        left += footprints[s - 1];
        let right = total - left;
        if left > capacity || right > capacity {
            continue;
        }
        let diff = left.abs_diff(right);
        if best.map_or(true, |(_, d)| diff < d) {
            best = Some((s, diff));
        }
    }
    best.map(|(s, _)| s)
}

/// Branch split index: entry `mid` is promoted, `[..mid]` stays left, `[mid + 1..]` moves right.
pub fn branch_split_point(footprints: &[usize], capacity: usize) -> Option<usize> {
    let total: usize = footprints.iter().sum();
    let mut left = 0usize;
    let mut best: Option<(usize, usize)> = None;
    for (mid, &promoted) in footprints.iter().enumerate() {
        let right = total - left - promoted;
        if left <= capacity && right <= capacity {
            let diff = left.abs_diff(right);
            if best.map_or(true, |(_, d)| diff < d) {
                best = Some((mid, diff));
            }
        }
        left += promoted;
    }
    best.map(|(mid, _)| mid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TreeError;

    fn bytewise(a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    #[test]
    fn leaf_upsert_keeps_order_and_replaces() {
        let mut leaf = LeafNode::new(None);
        for k in [b"m", b"c", b"x", b"a"] {
            assert!(leaf.upsert(k.to_vec(), b"1".to_vec(), bytewise).is_none());
        }
        let old = leaf.upsert(b"c".to_vec(), b"2".to_vec(), bytewise);
        assert_eq!(old, Some(b"1".to_vec()));
        let keys: Vec<&[u8]> = leaf.entries.iter().map(|(k, _)| k.as_slice()).collect();
        let expected: Vec<&[u8]> = vec![b"a", b"c", b"m", b"x"];
        assert_eq!(keys, expected);
        assert_eq!(leaf.get(b"c", bytewise), Some(&b"2"[..]));
        assert_eq!(leaf.remove(b"m", bytewise), Some(b"1".to_vec()));
        assert_eq!(leaf.remove(b"m", bytewise), None);
    }

    #[test]
    fn branch_routes_equal_keys_right() {
        let branch = BranchNode {
            leftmost: PageId(1),
            entries: vec![(b"g".to_vec(), PageId(2)), (b"p".to_vec(), PageId(3))],
        };
        let route = |k: &[u8]| branch.child_at(branch.child_index(k, bytewise));
        assert_eq!(route(b"a"), PageId(1));
        assert_eq!(route(b"g"), PageId(2));
        assert_eq!(route(b"h"), PageId(2));
        assert_eq!(route(b"p"), PageId(3));
        assert_eq!(route(b"zz"), PageId(3));
    }

    #[test]
    fn branch_split_promotes_middle_entry() {
        let mut branch = BranchNode {
            leftmost: PageId(10),
            entries: (0u8..5).map(|i| (vec![b'a' + i], PageId(11 + i as u64))).collect(),
        };
        let (promoted, right) = branch.split_at(2);
        assert_eq!(promoted, b"c");
        assert_eq!(branch.entries.len(), 2);
        assert_eq!(right.leftmost, PageId(13));
        assert_eq!(right.entries, vec![(b"d".to_vec(), PageId(14)), (b"e".to_vec(), PageId(15))]);
    }

    #[test]
    fn leaf_split_point_balances_bytes() {
        assert_eq!(leaf_split_point(&[10, 10, 10, 10], 30), Some(2));
        assert_eq!(leaf_split_point(&[25, 5, 5, 5], 30), Some(1));
        assert_eq!(leaf_split_point(&[40], 30), None);
    }

    #[test]
    fn branch_split_point_excludes_promoted_entry() {
        assert_eq!(branch_split_point(&[10, 10, 10], 15), Some(1));
        assert_eq!(branch_split_point(&[10, 10, 10, 10], 20), Some(1));
    }

    #[test]
    fn wrong_variant_is_reported() {
        let err = Node::Branch(BranchNode::new(PageId(4)))
            .into_leaf()
            .unwrap_err();
        assert!(matches!(
            err,
            TreeError::CorruptNode(NodeDefect::WrongVariant {
                expected: "leaf",
                found: "branch"
            })
        ));
    }
}
