use std::collections::HashMap;

use parking_lot::RwLock;

use super::{IoCounters, PageStore, PagerStats};
use crate::types::{page::check_page_size, PageId, Result, TreeError};

/// In-memory page store.
///
/// All pages are lost when the store is dropped. Freed ids are recycled.
pub struct MemPager {
    page_size: u32,
    state: RwLock<MemState>,
    counters: IoCounters,
}

struct MemState {
    pages: HashMap<PageId, Box<[u8]>>,
    free: Vec<PageId>,
    next: u64,
}

impl MemPager {
    /// Creates an empty store with pages of `page_size` bytes.
    pub fn new(page_size: u32) -> Result<Self> {
        check_page_size(page_size)?;
        Ok(Self {
            page_size,
            state: RwLock::new(MemState {
                pages: HashMap::new(),
                free: Vec::new(),
                next: 1,
            }),
            counters: IoCounters::default(),
        })
    }

    /// Number of pages currently allocated.
    pub fn page_count(&self) -> usize {
        self.state.read().pages.len()
    }

    /// Returns `true` if `id` is currently allocated.
    pub fn is_allocated(&self, id: PageId) -> bool {
        self.state.read().pages.contains_key(&id)
    }

    /// Overwrites raw page bytes without format checks; used to inject damage in tests.
    pub fn poke(&self, id: PageId, offset: usize, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.write();
        let page = state
            .pages
            .get_mut(&id)
            .ok_or(TreeError::UnknownPage(id))?;
        let end = offset
            .checked_add(bytes.len())
            .filter(|end| *end <= page.len())
            .ok_or(TreeError::Invalid("poke beyond page end"))?;
        page[offset..end].copy_from_slice(bytes);
        Ok(())
    }
}

impl PageStore for MemPager {
    fn page_size(&self) -> u32 {
        self.page_size
    }

    fn allocate(&self) -> Result<PageId> {
        let mut state = self.state.write();
        let id = match state.free.pop() {
            Some(id) => id,
            None => {
                let id = PageId(state.next);
                state.next += 1;
                id
            }
        };
        state
            .pages
            .insert(id, vec![0u8; self.page_size as usize].into_boxed_slice());
        self.counters.inc_allocations();
        tracing::debug!(target: "varitree::pager", page = id.0, "allocated page");
        Ok(id)
    }

    fn read(&self, id: PageId) -> Result<Vec<u8>> {
        let state = self.state.read();
        let page = state.pages.get(&id).ok_or(TreeError::UnknownPage(id))?;
        self.counters.inc_reads();
        Ok(page.to_vec())
    }

    fn write(&self, id: PageId, data: &[u8]) -> Result<()> {
        let page_size = self.page_size as usize;
        if data.len() > page_size {
            return Err(TreeError::CapacityExceeded {
                needed: data.len(),
                available: page_size,
            });
        }
        let mut state = self.state.write();
        let page = state
            .pages
            .get_mut(&id)
            .ok_or(TreeError::UnknownPage(id))?;
        page[..data.len()].copy_from_slice(data);
        page[data.len()..].fill(0);
        self.counters.inc_writes();
        Ok(())
    }

    fn free(&self, id: PageId) -> Result<()> {
        let mut state = self.state.write();
        if state.pages.remove(&id).is_none() {
            return Err(TreeError::UnknownPage(id));
        }
        state.free.push(id);
        self.counters.inc_frees();
        tracing::debug!(target: "varitree::pager", page = id.0, "freed page");
        Ok(())
    }

    fn stats(&self) -> PagerStats {
        self.counters.snapshot()
    }
}
