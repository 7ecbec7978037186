//! Per-tree buffer of mutations that have not been encoded into pages yet.
//!
//! Keys are encoded when staged so the buffer can order them with the key
//! codec; values stay typed until flush. One entry per key: a later stage
//! replaces the earlier one, so a remove followed by a re-insert leaves only
//! the value, and a put followed by a remove leaves only the tombstone.

use std::cmp::Ordering;
use std::collections::btree_map::IntoIter;
use std::collections::BTreeMap;
use std::marker::PhantomData;

use super::tree::KeyCodec;

/// Encoded key ordered by `K::compare_encoded`.
pub(crate) struct OrderedKey<K> {
    bytes: Vec<u8>,
    _codec: PhantomData<fn() -> K>,
}

impl<K: KeyCodec> OrderedKey<K> {
    pub(crate) fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            _codec: PhantomData,
        }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl<K: KeyCodec> PartialEq for OrderedKey<K> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: KeyCodec> Eq for OrderedKey<K> {}

impl<K: KeyCodec> PartialOrd for OrderedKey<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: KeyCodec> Ord for OrderedKey<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        K::compare_encoded(&self.bytes, &other.bytes)
    }
}

/// A staged write: `None` is a tombstone.
pub(crate) struct PendingEntry<V> {
    pub(crate) value: Option<V>,
    pub(crate) stamp: u64,
}

pub(crate) struct PendingBuffer<K, V> {
    entries: BTreeMap<OrderedKey<K>, PendingEntry<V>>,
    clock: u64,
}

impl<K: KeyCodec, V> Default for PendingBuffer<K, V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            clock: 0,
        }
    }
}

impl<K: KeyCodec, V> PendingBuffer<K, V> {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records `value` for `key`, returning the entry it replaced.
    pub(crate) fn stage(
        &mut self,
        key: OrderedKey<K>,
        value: Option<V>,
    ) -> Option<PendingEntry<V>> {
        self.clock += 1;
        self.entries.insert(
            key,
            PendingEntry {
                value,
                stamp: self.clock,
            },
        )
    }

    pub(crate) fn lookup(&self, key: &OrderedKey<K>) -> Option<&PendingEntry<V>> {
        self.entries.get(key)
    }

    /// Puts back an entry taken by [`PendingBuffer::drain`], keeping its stamp.
    pub(crate) fn restore(&mut self, key: OrderedKey<K>, entry: PendingEntry<V>) {
        self.entries.insert(key, entry);
    }

    /// Empties the buffer, yielding entries in ascending key order.
    pub(crate) fn drain(&mut self) -> IntoIter<OrderedKey<K>, PendingEntry<V>> {
        std::mem::take(&mut self.entries).into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(v: i64) -> OrderedKey<i64> {
        let mut out = Vec::new();
        i64::encode_key(&v, &mut out);
        OrderedKey::new(out)
    }

    #[test]
    fn last_stage_wins_and_stamps_advance() {
        let mut buffer: PendingBuffer<i64, &str> = PendingBuffer::default();
        assert!(buffer.stage(key(3), Some("a")).is_none());
        let replaced = buffer.stage(key(3), None).expect("replaces pending put");
        assert_eq!(replaced.value, Some("a"));
        let replaced = buffer.stage(key(3), Some("b")).expect("replaces tombstone");
        assert!(replaced.value.is_none());

        let entry = buffer.lookup(&key(3)).expect("pending");
        assert_eq!(entry.value, Some("b"));
        assert_eq!(entry.stamp, 3);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn drain_uses_codec_order() {
        let mut buffer: PendingBuffer<i64, ()> = PendingBuffer::default();
        for v in [10, -5, 0, -300, 7] {
            buffer.stage(key(v), Some(()));
        }
        assert!(buffer.lookup(&key(-300)).is_some());
        let order: Vec<i64> = buffer
            .drain()
            .map(|(k, _)| i64::decode_key(&k.into_bytes()).unwrap())
            .collect();
        assert_eq!(order, vec![-300, -5, 0, 7, 10]);
        assert!(buffer.is_empty());
    }
}
