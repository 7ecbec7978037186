#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Once};

use proptest::prelude::*;
use tracing_subscriber::EnvFilter;
use varitree::{BTree, MemPager, PageStore, ShortestSeparator, TreeOptions};

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

#[derive(Debug, Clone)]
enum Operation {
    Put { key: Vec<u8>, value: Vec<u8> },
    Remove { key: Vec<u8> },
    Flush,
}

fn arb_key() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        "[a-c]{0,3}".prop_map(String::into_bytes),
        ("shared/prefix/", "[a-z]{1,6}").prop_map(|(p, s)| format!("{p}{s}").into_bytes()),
        prop::collection::vec(any::<u8>(), 0..12),
    ]
}

fn arb_operation() -> impl Strategy<Value = Operation> {
    prop_oneof![
        5 => (arb_key(), prop::collection::vec(any::<u8>(), 0..40))
            .prop_map(|(key, value)| Operation::Put { key, value }),
        2 => arb_key().prop_map(|key| Operation::Remove { key }),
        1 => Just(Operation::Flush),
    ]
}

fn arb_options() -> impl Strategy<Value = TreeOptions> {
    (any::<bool>(), any::<bool>()).prop_map(|(deferred, prefix)| {
        let opts = TreeOptions::default().deferred_encoding(deferred);
        if prefix {
            opts.separator(ShortestSeparator)
        } else {
            opts
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_tree_matches_btreemap(
        ops in prop::collection::vec(arb_operation(), 1..200),
        opts in arb_options(),
    ) {
        init_tracing();
        let store: Arc<dyn PageStore> = Arc::new(MemPager::new(256).unwrap());
        let tree = BTree::<Vec<u8>, Vec<u8>>::create_new(store, opts).unwrap();
        let mut model = BTreeMap::new();

        for op in ops {
            match op {
                Operation::Put { key, value } => {
                    let previous = tree.put(&key, value.clone()).unwrap();
                    prop_assert_eq!(previous, model.insert(key, value));
                }
                Operation::Remove { key } => {
                    prop_assert_eq!(tree.remove(&key).unwrap(), model.remove(&key));
                }
                Operation::Flush => tree.flush().unwrap(),
            }
        }

        for (key, value) in &model {
            let stored = tree.get(key).unwrap();
            prop_assert_eq!(stored.as_ref(), Some(value));
        }
        let scanned: Vec<(Vec<u8>, Vec<u8>)> =
            tree.iter().unwrap().collect::<varitree::Result<_>>().unwrap();
        let expected: Vec<(Vec<u8>, Vec<u8>)> = model.into_iter().collect();
        prop_assert_eq!(scanned, expected);
        let report = tree.verify().unwrap();
        prop_assert!(report.height >= 1);
    }

    #[test]
    fn prop_scan_respects_bounds(
        keys in prop::collection::btree_set(any::<u64>(), 0..300),
        lo in any::<u64>(),
        hi in any::<u64>(),
        lo_inclusive in any::<bool>(),
        hi_inclusive in any::<bool>(),
    ) {
        init_tracing();
        let store: Arc<dyn PageStore> = Arc::new(MemPager::new(256).unwrap());
        let tree = BTree::<u64, u64>::create_new(store, TreeOptions::default()).unwrap();
        for key in &keys {
            tree.put(key, key.wrapping_mul(3)).unwrap();
        }
        let lower = if lo_inclusive { Bound::Included(lo) } else { Bound::Excluded(lo) };
        let upper = if hi_inclusive { Bound::Included(hi) } else { Bound::Excluded(hi) };
        let expected: Vec<u64> = keys
            .iter()
            .copied()
            .filter(|k| match lower { Bound::Included(l) => *k >= l, Bound::Excluded(l) => *k > l, Bound::Unbounded => true })
            .filter(|k| match upper { Bound::Included(h) => *k <= h, Bound::Excluded(h) => *k < h, Bound::Unbounded => true })
            .collect();
        let scanned: Vec<u64> = tree
            .scan(lower, upper)
            .unwrap()
            .map(|entry| entry.map(|(key, _)| key))
            .collect::<varitree::Result<_>>()
            .unwrap();
        prop_assert_eq!(scanned, expected);
    }
}
