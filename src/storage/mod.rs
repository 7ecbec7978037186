//! Index structures built on the page store.

/// Page-backed B+tree index.
///
/// Map and set semantics over any [`crate::primitives::pager::PageStore`].
pub mod btree;
