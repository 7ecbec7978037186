use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{IoCounters, PageStore, PagerOptions, PagerStats};
use crate::primitives::bytes::ord;
use crate::primitives::io::{FileIo, StdFileIo};
use crate::types::checksum::page_crc32;
use crate::types::page::{
    check_page_size, clear_crc32, header, PageHeader, PageKind, PAGE_HDR_LEN,
};
use crate::types::{PageId, Result, TreeError};

const META_PAGE: PageId = PageId(0);

mod meta {
    //! Byte offsets of the meta page payload.
    use core::ops::Range;

    pub const PAGE_COUNT: Range<usize> = 24..32;
    pub const FREE_HEAD: Range<usize> = 32..40;
    pub const FREE_COUNT: Range<usize> = 40..48;
}

const FREE_NEXT: core::ops::Range<usize> = PAGE_HDR_LEN..PAGE_HDR_LEN + 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FileMeta {
    /// Number of page slots in the file, including the meta page.
    page_count: u64,
    free_head: Option<PageId>,
    free_count: u64,
}

/// Page store backed by a single file.
///
/// Page `0` holds store metadata; freed pages are threaded on a singly linked
/// free chain whose head lives in the meta page.
pub struct FilePager {
    io: Arc<dyn FileIo>,
    page_size: u32,
    sync_on_write: bool,
    meta: Mutex<FileMeta>,
    counters: IoCounters,
}

impl FilePager {
    /// Creates a fresh store at `path`, discarding any existing contents.
    pub fn create(path: impl AsRef<Path>, opts: PagerOptions) -> Result<Self> {
        check_page_size(opts.page_size)?;
        let io: Arc<dyn FileIo> = Arc::new(StdFileIo::open(path.as_ref())?);
        io.set_len(0)?;
        io.set_len(opts.page_size as u64)?;
        let pager = Self {
            io,
            page_size: opts.page_size,
            sync_on_write: opts.sync_on_write,
            meta: Mutex::new(FileMeta {
                page_count: 1,
                free_head: None,
                free_count: 0,
            }),
            counters: IoCounters::default(),
        };
        {
            let meta = pager.meta.lock();
            pager.write_meta(&meta)?;
        }
        pager.io.sync()?;
        tracing::info!(
            target: "varitree::pager",
            path = %path.as_ref().display(),
            page_size = opts.page_size,
            "created file store"
        );
        Ok(pager)
    }

    /// Opens an existing store created by [`FilePager::create`].
    ///
    /// The page size comes from the meta page; writes are not synced individually.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_inner(path.as_ref(), false)
    }

    /// Opens an existing store, applying `opts`.
    ///
    /// `opts.page_size` must match the size the store was created with.
    pub fn open_with(path: impl AsRef<Path>, opts: PagerOptions) -> Result<Self> {
        let pager = Self::open_inner(path.as_ref(), opts.sync_on_write)?;
        if pager.page_size != opts.page_size {
            return Err(TreeError::Invalid("page size differs from the store's"));
        }
        Ok(pager)
    }

    fn open_inner(path: &Path, sync_on_write: bool) -> Result<Self> {
        let io: Arc<dyn FileIo> = Arc::new(StdFileIo::open(path)?);
        if io.len()? < PAGE_HDR_LEN as u64 {
            return Err(TreeError::Corruption("file too short for meta page"));
        }
        let mut hdr = [0u8; PAGE_HDR_LEN];
        io.read_at(0, &mut hdr)?;
        let header = PageHeader::decode(&hdr).map_err(|_| TreeError::Corruption("meta header"))?;
        if header.kind != PageKind::Meta || header.page_no != META_PAGE {
            return Err(TreeError::Corruption("page 0 is not a meta page"));
        }
        let page_size = header.page_size;
        check_page_size(page_size).map_err(|_| TreeError::Corruption("meta page size"))?;
        let mut page = vec![0u8; page_size as usize];
        io.read_at(0, &mut page)?;
        if page_crc32(META_PAGE.0, &page) != header.crc32 {
            return Err(TreeError::Corruption("meta page checksum mismatch"));
        }
        let meta = FileMeta {
            page_count: ord::get_u64_be(&page[meta::PAGE_COUNT]),
            free_head: PageId::from_link(ord::get_u64_be(&page[meta::FREE_HEAD])),
            free_count: ord::get_u64_be(&page[meta::FREE_COUNT]),
        };
        if meta.page_count == 0 || io.len()? < meta.page_count * page_size as u64 {
            return Err(TreeError::Corruption("meta page count exceeds file length"));
        }
        tracing::info!(
            target: "varitree::pager",
            path = %path.display(),
            page_size,
            sync_on_write,
            pages = meta.page_count,
            free = meta.free_count,
            "opened file store"
        );
        Ok(Self {
            io,
            page_size,
            sync_on_write,
            meta: Mutex::new(meta),
            counters: IoCounters::default(),
        })
    }

    /// Number of page slots in the file, including the meta page.
    pub fn page_count(&self) -> u64 {
        self.meta.lock().page_count
    }

    /// Whether every page write is followed by an fsync.
    pub fn sync_on_write(&self) -> bool {
        self.sync_on_write
    }

    /// Number of pages currently on the free chain.
    pub fn free_count(&self) -> u64 {
        self.meta.lock().free_count
    }

    fn offset(&self, id: PageId) -> u64 {
        id.0 * self.page_size as u64
    }

    fn check_id(&self, meta: &FileMeta, id: PageId) -> Result<()> {
        if id.is_none() || id.0 >= meta.page_count {
            return Err(TreeError::UnknownPage(id));
        }
        Ok(())
    }

    fn write_meta(&self, meta: &FileMeta) -> Result<()> {
        let mut page = vec![0u8; self.page_size as usize];
        PageHeader::new(META_PAGE, PageKind::Meta, self.page_size)?.encode(&mut page)?;
        ord::put_u64_be(&mut page[meta::PAGE_COUNT], meta.page_count);
        ord::put_u64_be(&mut page[meta::FREE_HEAD], PageId::to_link(meta.free_head));
        ord::put_u64_be(&mut page[meta::FREE_COUNT], meta.free_count);
        stamp_crc(META_PAGE, &mut page)?;
        self.io.write_at(0, &page)
    }

    fn read_free_link(&self, id: PageId) -> Result<Option<PageId>> {
        let mut page = vec![0u8; self.page_size as usize];
        self.io.read_at(self.offset(id), &mut page)?;
        let header = PageHeader::decode(&page).map_err(|_| TreeError::Corruption("free chain"))?;
        if header.kind != PageKind::Free || header.page_no != id {
            return Err(TreeError::Corruption("free chain points at a live page"));
        }
        if page_crc32(id.0, &page) != header.crc32 {
            return Err(TreeError::Corruption("free page checksum mismatch"));
        }
        Ok(PageId::from_link(ord::get_u64_be(&page[FREE_NEXT])))
    }
}

fn stamp_crc(id: PageId, page: &mut [u8]) -> Result<()> {
    clear_crc32(page)?;
    let crc = page_crc32(id.0, page);
    page[header::CRC32].copy_from_slice(&crc.to_be_bytes());
    Ok(())
}

impl PageStore for FilePager {
    fn page_size(&self) -> u32 {
        self.page_size
    }

    fn allocate(&self) -> Result<PageId> {
        let mut meta = self.meta.lock();
        let mut next = *meta;
        let id = match meta.free_head {
            Some(head) => {
                next.free_head = self.read_free_link(head)?;
                next.free_count = next.free_count.saturating_sub(1);
                head
            }
            None => {
                let id = PageId(meta.page_count);
                next.page_count += 1;
                self.io.set_len(next.page_count * self.page_size as u64)?;
                id
            }
        };
        self.io
            .write_at(self.offset(id), &vec![0u8; self.page_size as usize])?;
        self.write_meta(&next)?;
        *meta = next;
        self.counters.inc_allocations();
        tracing::debug!(target: "varitree::pager", page = id.0, "allocated page");
        Ok(id)
    }

    fn read(&self, id: PageId) -> Result<Vec<u8>> {
        {
            let meta = self.meta.lock();
            self.check_id(&meta, id)?;
        }
        let mut page = vec![0u8; self.page_size as usize];
        self.io.read_at(self.offset(id), &mut page)?;
        self.counters.inc_reads();
        Ok(page)
    }

    fn write(&self, id: PageId, data: &[u8]) -> Result<()> {
        let page_size = self.page_size as usize;
        if data.len() > page_size {
            return Err(TreeError::CapacityExceeded {
                needed: data.len(),
                available: page_size,
            });
        }
        {
            let meta = self.meta.lock();
            self.check_id(&meta, id)?;
        }
        if data.len() == page_size {
            self.io.write_at(self.offset(id), data)?;
        } else {
            let mut page = vec![0u8; page_size];
            page[..data.len()].copy_from_slice(data);
            self.io.write_at(self.offset(id), &page)?;
        }
        if self.sync_on_write {
            self.io.sync()?;
        }
        self.counters.inc_writes();
        Ok(())
    }

    fn free(&self, id: PageId) -> Result<()> {
        let mut meta = self.meta.lock();
        self.check_id(&meta, id)?;
        let mut page = vec![0u8; self.page_size as usize];
        PageHeader::new(id, PageKind::Free, self.page_size)?.encode(&mut page)?;
        ord::put_u64_be(&mut page[FREE_NEXT], PageId::to_link(meta.free_head));
        stamp_crc(id, &mut page)?;
        self.io.write_at(self.offset(id), &page)?;
        let next = FileMeta {
            free_head: Some(id),
            free_count: meta.free_count + 1,
            ..*meta
        };
        self.write_meta(&next)?;
        *meta = next;
        self.counters.inc_frees();
        tracing::debug!(target: "varitree::pager", page = id.0, "freed page");
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.io.sync()
    }

    fn stats(&self) -> PagerStats {
        self.counters.snapshot()
    }
}
