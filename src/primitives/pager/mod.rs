#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::types::{page::DEFAULT_PAGE_SIZE, PageId, Result};

mod file;
mod mem;

pub use file::FilePager;
pub use mem::MemPager;

/// Paged byte storage consumed by the tree engine.
///
/// Implementations own page bytes and any durability or isolation guarantees;
/// the engine never caches a page beyond one operation.
pub trait PageStore: Send + Sync + 'static {
    /// Returns the page size in bytes.
    fn page_size(&self) -> u32;
    /// Allocates a zeroed page. Never returns [`PageId::NONE`].
    fn allocate(&self) -> Result<PageId>;
    /// Returns a copy of the page, exactly [`PageStore::page_size`] bytes long.
    fn read(&self, id: PageId) -> Result<Vec<u8>>;
    /// Replaces the page contents. Shorter images are zero-padded; longer ones fail with
    /// [`crate::TreeError::CapacityExceeded`].
    fn write(&self, id: PageId, data: &[u8]) -> Result<()>;
    /// Returns the page to the store.
    fn free(&self, id: PageId) -> Result<()>;
    /// Flushes buffered writes to durable storage.
    fn sync(&self) -> Result<()> {
        Ok(())
    }
    /// Returns a snapshot of the I/O counters.
    fn stats(&self) -> PagerStats {
        PagerStats::default()
    }
}

/// Options for creating a file-backed store.
#[derive(Clone, Debug)]
pub struct PagerOptions {
    /// Page size in bytes.
    pub page_size: u32,
    /// Whether every page write is followed by an fsync.
    pub sync_on_write: bool,
}

impl Default for PagerOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            sync_on_write: false,
        }
    }
}

/// Snapshot of page store activity.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagerStats {
    /// Pages read.
    pub reads: u64,
    /// Pages written through [`PageStore::write`].
    pub writes: u64,
    /// Pages handed out by [`PageStore::allocate`].
    pub allocations: u64,
    /// Pages returned through [`PageStore::free`].
    pub frees: u64,
}

#[derive(Default)]
pub(crate) struct IoCounters {
    reads: AtomicU64,
    writes: AtomicU64,
    allocations: AtomicU64,
    frees: AtomicU64,
}

impl IoCounters {
    pub(crate) fn inc_reads(&self) {
        self.reads.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_writes(&self) {
        self.writes.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_allocations(&self) {
        self.allocations.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_frees(&self) {
        self.frees.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> PagerStats {
        PagerStats {
            reads: self.reads.load(AtomicOrdering::Relaxed),
            writes: self.writes.load(AtomicOrdering::Relaxed),
            allocations: self.allocations.load(AtomicOrdering::Relaxed),
            frees: self.frees.load(AtomicOrdering::Relaxed),
        }
    }
}
