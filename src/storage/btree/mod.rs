#![forbid(unsafe_code)]

//! Page-backed B+tree with variable fanout, simple-prefix separators and
//! deferred encoding.

/// Slotted page layout for tree nodes.
pub mod page;

/// Encoding and decoding utilities for keys and values.
pub mod codecs;
mod cursor;
/// In-memory node model and split policy.
pub mod node;
mod pending;
pub mod separator;
mod set;
mod stats;
mod tree;

pub use cursor::Cursor;
pub use node::{BranchNode, LeafNode, Node};
pub use separator::{SeparatorStrategy, ShortestSeparator};
pub use set::{BTreeSet, SetCursor};
pub use stats::{BTreeStats, BTreeStatsSnapshot};
pub use tree::{BTree, KeyCodec, TreeOptions, TreeReport, ValCodec};
