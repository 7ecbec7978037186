//! Persistent, page-backed B+tree index.
//!
//! Nodes hold as many entries as fit in one page, leaf splits can promote
//! shortened separators, and mutations can be buffered in memory and encoded
//! into pages in one batch.
//!
//! ```no_run
//! use std::sync::Arc;
//! use varitree::{BTree, MemPager, PageStore, TreeOptions};
//!
//! # fn main() -> varitree::Result<()> {
//! let store: Arc<dyn PageStore> = Arc::new(MemPager::new(4096)?);
//! let tree: BTree<u64, String> = BTree::create_new(store, TreeOptions::default())?;
//! tree.put(&7, "seven".to_string())?;
//! assert_eq!(tree.get(&7)?.as_deref(), Some("seven"));
//! for entry in tree.iter()? {
//!     let (key, value) = entry?;
//!     println!("{key} => {value}");
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod primitives;
pub mod storage;
pub mod types;

pub use primitives::pager::{FilePager, MemPager, PageStore, PagerOptions, PagerStats};
pub use storage::btree::{
    BTree, BTreeSet, BTreeStats, BTreeStatsSnapshot, Cursor, KeyCodec, SeparatorStrategy,
    SetCursor, ShortestSeparator, TreeOptions, TreeReport, ValCodec,
};
pub use types::{NodeDefect, PageId, Result, TreeError};
