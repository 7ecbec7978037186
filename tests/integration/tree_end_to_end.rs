#![allow(missing_docs)]

use std::ops::Bound;
use std::sync::Arc;

use varitree::{
    BTree, BTreeSet, MemPager, PageStore, Result, SeparatorStrategy, ShortestSeparator,
    TreeError, TreeOptions,
};

fn mem_store(page_size: u32) -> Result<(Arc<MemPager>, Arc<dyn PageStore>)> {
    let pager = Arc::new(MemPager::new(page_size)?);
    let store: Arc<dyn PageStore> = pager.clone();
    Ok((pager, store))
}

#[test]
fn scattered_inserts_scan_in_order() -> Result<()> {
    let (_, store) = mem_store(106)?;
    let opts = TreeOptions::default().deferred_encoding(false);
    let tree = BTree::<u64, u64>::create_new(store, opts)?;
    for key in [5u64, 3, 8, 1, 4, 7, 9, 2, 6] {
        tree.put(&key, key * 100)?;
    }
    let entries: Vec<(u64, u64)> = tree.iter()?.collect::<Result<_>>()?;
    let expected: Vec<(u64, u64)> = (1..=9).map(|k| (k, k * 100)).collect();
    assert_eq!(entries, expected);

    let report = tree.verify()?;
    assert!(report.height >= 2, "root should have split: {report:?}");
    assert_eq!(report.entries, 9);
    Ok(())
}

#[test]
fn deferred_and_eager_trees_agree() -> Result<()> {
    let (_, deferred_store) = mem_store(512)?;
    let (_, eager_store) = mem_store(512)?;
    let deferred = BTree::<String, Vec<u8>>::create_new(deferred_store, TreeOptions::default())?;
    let eager = BTree::<String, Vec<u8>>::create_new(
        eager_store,
        TreeOptions::default().deferred_encoding(false),
    )?;

    for round in 0u32..3 {
        for i in 0u32..300 {
            let key = format!("user:{:05}", (i * 37 + round) % 300);
            let value = format!("{round}-{i}").into_bytes();
            assert_eq!(deferred.put(&key, value.clone())?, eager.put(&key, value)?);
        }
        for i in (0u32..300).step_by(7 + round as usize) {
            let key = format!("user:{i:05}");
            assert_eq!(deferred.remove(&key)?, eager.remove(&key)?);
        }
    }

    let left: Vec<(String, Vec<u8>)> = deferred.iter()?.collect::<Result<_>>()?;
    let right: Vec<(String, Vec<u8>)> = eager.iter()?.collect::<Result<_>>()?;
    assert_eq!(left, right);
    assert_eq!(deferred.verify()?.entries, left.len());
    assert!(
        deferred.stats_snapshot().page_writes < eager.stats_snapshot().page_writes,
        "collapsing staged writes should save page writes"
    );
    Ok(())
}

#[test]
fn prefix_separators_keep_branches_small() -> Result<()> {
    let (_, plain_store) = mem_store(1024)?;
    let (_, prefix_store) = mem_store(1024)?;
    let plain = BTree::<Vec<u8>, u64>::create_new(plain_store, TreeOptions::default())?;
    let prefixed = BTree::<Vec<u8>, u64>::create_new(
        prefix_store,
        TreeOptions::default().separator(ShortestSeparator),
    )?;
    assert_eq!(
        prefixed
            .options()
            .separator
            .as_ref()
            .map(|strategy| strategy.name().to_string()),
        Some(ShortestSeparator.name().to_string())
    );

    for i in 0u64..2_000 {
        let key = format!("/var/lib/objects/bucket-17/{:010}", i * 7919 % 2_000).into_bytes();
        plain.put(&key, i)?;
        prefixed.put(&key, i)?;
    }
    let plain_report = plain.verify()?;
    let prefixed_report = prefixed.verify()?;
    assert_eq!(plain_report.entries, 2_000);
    assert_eq!(prefixed_report.entries, 2_000);
    assert!(prefixed_report.branches <= plain_report.branches);

    let window: Vec<Vec<u8>> = prefixed
        .scan(
            Bound::Included(b"/var/lib/objects/bucket-17/0000000100".to_vec()),
            Bound::Excluded(b"/var/lib/objects/bucket-17/0000000105".to_vec()),
        )?
        .map(|entry| entry.map(|(key, _)| key))
        .collect::<Result<_>>()?;
    assert_eq!(window.len(), 5);
    Ok(())
}

#[test]
fn key_too_large_for_page_is_rejected() -> Result<()> {
    let (_, store) = mem_store(128)?;
    let tree = BTree::<String, u64>::create_new(store, TreeOptions::default())?;
    let err = tree.put(&"k".repeat(100), 1).unwrap_err();
    assert!(matches!(err, TreeError::CapacityExceeded { .. }), "got {err:?}");
    assert_eq!(tree.pending_len(), 0);
    Ok(())
}

#[test]
fn set_facade_tracks_membership() -> Result<()> {
    let (_, store) = mem_store(256)?;
    let set = BTreeSet::<i64>::create_new(store, TreeOptions::default())?;
    for value in -50i64..50 {
        assert!(set.add(&(value * 3))?);
    }
    assert!(!set.add(&0)?);
    for value in (-150i64..150).step_by(6) {
        assert!(set.remove(&value)?);
    }
    let remaining: Vec<i64> = set.iter()?.collect::<Result<_>>()?;
    assert_eq!(remaining.len(), 50);
    assert!(remaining.windows(2).all(|w| w[0] < w[1]));
    assert!(remaining.iter().all(|v| v.rem_euclid(6) == 3));
    assert!(set.contains(&-147)?);
    assert!(!set.contains(&-150)?);
    Ok(())
}
