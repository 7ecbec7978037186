use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Snapshot of tree statistics at a point in time.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BTreeStatsSnapshot {
    /// Number of root-to-leaf descents
    pub searches: u64,
    /// Number of branch pages visited during descents
    pub branch_visits: u64,
    /// Number of leaf page splits performed
    pub leaf_splits: u64,
    /// Number of branch page splits performed
    pub branch_splits: u64,
    /// Number of root splits (height increases)
    pub root_splits: u64,
    /// Number of mutations recorded in the pending buffer
    pub staged: u64,
    /// Staged mutations that overwrote an unflushed entry for the same key
    pub collapsed: u64,
    /// Pending entries applied to pages by flushes
    pub flushed: u64,
    /// Deletions applied to leaf pages
    pub tombstones_applied: u64,
    /// Node pages written back to the store
    pub page_writes: u64,
}

/// Thread-safe statistics tracking for tree operations.
#[derive(Default)]
pub struct BTreeStats {
    searches: AtomicU64,
    branch_visits: AtomicU64,
    leaf_splits: AtomicU64,
    branch_splits: AtomicU64,
    root_splits: AtomicU64,
    staged: AtomicU64,
    collapsed: AtomicU64,
    flushed: AtomicU64,
    tombstones_applied: AtomicU64,
    page_writes: AtomicU64,
}

impl BTreeStats {
    /// Returns the number of root-to-leaf descents.
    pub fn searches(&self) -> u64 {
        self.searches.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of leaf splits.
    pub fn leaf_splits(&self) -> u64 {
        self.leaf_splits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of branch splits.
    pub fn branch_splits(&self) -> u64 {
        self.branch_splits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of root splits.
    pub fn root_splits(&self) -> u64 {
        self.root_splits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of node pages written.
    pub fn page_writes(&self) -> u64 {
        self.page_writes.load(AtomicOrdering::Relaxed)
    }

    pub(crate) fn inc_searches(&self) {
        self.searches.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_branch_visits(&self) {
        self.branch_visits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_leaf_splits(&self) {
        self.leaf_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_branch_splits(&self) {
        self.branch_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_root_splits(&self) {
        self.root_splits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_staged(&self, collapsed: bool) {
        self.staged.fetch_add(1, AtomicOrdering::Relaxed);
        if collapsed {
            self.collapsed.fetch_add(1, AtomicOrdering::Relaxed);
        }
    }

    pub(crate) fn add_flushed(&self, n: u64) {
        self.flushed.fetch_add(n, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_tombstones_applied(&self) {
        self.tombstones_applied
            .fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_page_writes(&self) {
        self.page_writes.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Creates a snapshot of all current statistics.
    pub fn snapshot(&self) -> BTreeStatsSnapshot {
        BTreeStatsSnapshot {
            searches: self.searches(),
            branch_visits: self.branch_visits.load(AtomicOrdering::Relaxed),
            leaf_splits: self.leaf_splits(),
            branch_splits: self.branch_splits(),
            root_splits: self.root_splits(),
            staged: self.staged.load(AtomicOrdering::Relaxed),
            collapsed: self.collapsed.load(AtomicOrdering::Relaxed),
            flushed: self.flushed.load(AtomicOrdering::Relaxed),
            tombstones_applied: self.tombstones_applied.load(AtomicOrdering::Relaxed),
            page_writes: self.page_writes(),
        }
    }

    /// Emits current statistics to the tracing infrastructure.
    pub fn emit_tracing(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            target: "varitree::stats",
            searches = snapshot.searches,
            branch_visits = snapshot.branch_visits,
            leaf_splits = snapshot.leaf_splits,
            branch_splits = snapshot.branch_splits,
            root_splits = snapshot.root_splits,
            staged = snapshot.staged,
            collapsed = snapshot.collapsed,
            flushed = snapshot.flushed,
            tombstones_applied = snapshot.tombstones_applied,
            page_writes = snapshot.page_writes,
            "btree stats snapshot"
        );
    }
}
