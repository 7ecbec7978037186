#![allow(missing_docs)]

use std::sync::Arc;

use tempfile::tempdir;
use varitree::{BTree, FilePager, PageStore, PagerOptions, Result, TreeError, TreeOptions};

#[test]
fn tree_survives_close_and_reopen() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("tree.vt");

    let root = {
        let opts = PagerOptions {
            page_size: 512,
            ..PagerOptions::default()
        };
        let store: Arc<dyn PageStore> = Arc::new(FilePager::create(&path, opts)?);
        let tree = BTree::<u64, String>::create_new(store, TreeOptions::default())?;
        for key in 0u64..2_000 {
            tree.put(&key, format!("value-{key}"))?;
        }
        for key in (0u64..2_000).step_by(3) {
            tree.remove(&key)?;
        }
        let root = tree.root_page();
        tree.close()?;
        root
    };

    let pager = Arc::new(FilePager::open(&path)?);
    assert!(pager.page_count() > 2);
    let store: Arc<dyn PageStore> = pager.clone();
    let tree = BTree::<u64, String>::open(store, root, TreeOptions::default())?;
    assert_eq!(tree.get(&1)?, Some("value-1".to_string()));
    assert_eq!(tree.get(&3)?, None);
    assert_eq!(tree.get(&1_999)?, Some("value-1999".to_string()));

    let report = tree.verify()?;
    assert_eq!(report.entries, 2_000 - 667);
    assert!(report.height >= 2);
    Ok(())
}

#[test]
fn reopen_after_drop_sees_pending_writes() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("drop.vt");
    let root = {
        let store: Arc<dyn PageStore> =
            Arc::new(FilePager::create(&path, PagerOptions::default())?);
        let tree = BTree::<Vec<u8>, Vec<u8>>::create_new(store, TreeOptions::default())?;
        tree.put(&b"alpha".to_vec(), b"1".to_vec())?;
        tree.put(&b"beta".to_vec(), b"2".to_vec())?;
        assert_eq!(tree.pending_len(), 2);
        tree.root_page()
    };

    let store: Arc<dyn PageStore> = Arc::new(FilePager::open(&path)?);
    let tree = BTree::<Vec<u8>, Vec<u8>>::open(store, root, TreeOptions::default())?;
    assert_eq!(tree.get(&b"alpha".to_vec())?, Some(b"1".to_vec()));
    assert_eq!(tree.get(&b"beta".to_vec())?, Some(b"2".to_vec()));
    Ok(())
}

#[test]
fn damaged_tree_page_is_reported_after_reopen() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("damaged.vt");
    let root = {
        let store: Arc<dyn PageStore> =
            Arc::new(FilePager::create(&path, PagerOptions::default())?);
        let tree = BTree::<u64, u64>::create_new(store, TreeOptions::default())?;
        tree.put(&1, 1)?;
        let root = tree.root_page();
        tree.close()?;
        root
    };

    let mut bytes = std::fs::read(&path)?;
    let offset = root.0 as usize * 4096 + 100;
    bytes[offset] ^= 0xFF;
    std::fs::write(&path, &bytes)?;

    let store: Arc<dyn PageStore> = Arc::new(FilePager::open(&path)?);
    let err = match BTree::<u64, u64>::open(store, root, TreeOptions::default()) {
        Ok(_) => panic!("damaged root must not open"),
        Err(err) => err,
    };
    assert!(matches!(err, TreeError::CorruptNode(_)), "got {err:?}");
    Ok(())
}
