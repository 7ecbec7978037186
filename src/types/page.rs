//! Shared on-page header stamped by the node codec and the page stores.

use core::convert::TryFrom;

use super::{NodeDefect, PageId, Result, TreeError};
use crate::primitives::bytes::ord;

/// Magic bytes opening every formatted page.
pub const PAGE_MAGIC: [u8; 4] = *b"VTRE";
/// Current on-page format version.
pub const PAGE_FORMAT_VERSION: u16 = 1;
/// Default page size used by [`crate::primitives::pager::PagerOptions`].
pub const DEFAULT_PAGE_SIZE: u32 = 4096;
/// Length of the common page header.
pub const PAGE_HDR_LEN: usize = 24;
/// Smallest page size a store accepts.
pub const MIN_PAGE_SIZE: u32 = 64;
/// Largest page size a store accepts; node offsets are stored as `u16`.
pub const MAX_PAGE_SIZE: u32 = 65536;

pub mod header {
    //! Byte offsets for fixed header fields.
    use core::ops::Range;

    pub const MAGIC: Range<usize> = 0..4;
    pub const FORMAT_VERSION: Range<usize> = 4..6;
    pub const PAGE_KIND: usize = 6;
    pub const RESERVED: usize = 7;
    pub const PAGE_SIZE: Range<usize> = 8..12;
    pub const PAGE_NO: Range<usize> = 12..20;
    pub const CRC32: Range<usize> = 20..24;
}

/// Role of a page inside a store.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PageKind {
    /// Store metadata (file stores only).
    Meta = 1,
    /// A released page threaded on the free chain.
    Free = 2,
    /// A B+tree leaf node.
    Leaf = 3,
    /// A B+tree branch node.
    Branch = 4,
}

impl PageKind {
    /// Returns the on-page tag for this kind.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for PageKind {
    type Error = TreeError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(PageKind::Meta),
            2 => Ok(PageKind::Free),
            3 => Ok(PageKind::Leaf),
            4 => Ok(PageKind::Branch),
            other => Err(NodeDefect::UnknownTag(other).into()),
        }
    }
}

/// Decoded form of the common page header.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PageHeader {
    /// Format version the page was written with.
    pub format_version: u16,
    /// Role of the page.
    pub kind: PageKind,
    /// Page size the page was formatted for.
    pub page_size: u32,
    /// Page number the image belongs to.
    pub page_no: PageId,
    /// Checksum over the page number and everything after the header.
    pub crc32: u32,
}

impl PageHeader {
    /// Creates a header with a zero checksum.
    pub fn new(page_no: PageId, kind: PageKind, page_size: u32) -> Result<Self> {
        if (page_size as usize) < PAGE_HDR_LEN {
            return Err(TreeError::Invalid("page size smaller than header"));
        }
        Ok(Self {
            format_version: PAGE_FORMAT_VERSION,
            kind,
            page_size,
            page_no,
            crc32: 0,
        })
    }

    /// Returns the header with `crc32` set.
    pub fn with_crc32(mut self, crc32: u32) -> Self {
        self.crc32 = crc32;
        self
    }

    /// Writes the header into the first [`PAGE_HDR_LEN`] bytes of `dst`.
    pub fn encode(&self, dst: &mut [u8]) -> Result<()> {
        if dst.len() < PAGE_HDR_LEN {
            return Err(TreeError::Invalid("page header buffer too small"));
        }
        let hdr = &mut dst[..PAGE_HDR_LEN];
        hdr[header::MAGIC].copy_from_slice(&PAGE_MAGIC);
        hdr[header::FORMAT_VERSION].copy_from_slice(&self.format_version.to_be_bytes());
        hdr[header::PAGE_KIND] = self.kind.as_u8();
        hdr[header::RESERVED] = 0;
        hdr[header::PAGE_SIZE].copy_from_slice(&self.page_size.to_be_bytes());
        hdr[header::PAGE_NO].copy_from_slice(&self.page_no.0.to_be_bytes());
        hdr[header::CRC32].copy_from_slice(&self.crc32.to_be_bytes());
        Ok(())
    }

    /// Parses the header from the start of `src`.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < PAGE_HDR_LEN {
            return Err(NodeDefect::Truncated("page header").into());
        }
        let hdr = &src[..PAGE_HDR_LEN];
        if hdr[header::MAGIC] != PAGE_MAGIC {
            return Err(NodeDefect::Malformed("invalid page magic").into());
        }
        let format_version = ord::get_u16_be(&hdr[header::FORMAT_VERSION]);
        if format_version != PAGE_FORMAT_VERSION {
            return Err(NodeDefect::Malformed("unsupported page format version").into());
        }
        if hdr[header::RESERVED] != 0 {
            return Err(NodeDefect::Malformed("page header reserved byte not zero").into());
        }
        let kind = PageKind::try_from(hdr[header::PAGE_KIND])?;
        let page_size = ord::get_u32_be(&hdr[header::PAGE_SIZE]);
        if (page_size as usize) < PAGE_HDR_LEN {
            return Err(NodeDefect::Malformed("page size smaller than header").into());
        }
        let page_no = PageId(ord::get_u64_be(&hdr[header::PAGE_NO]));
        let crc32 = ord::get_u32_be(&hdr[header::CRC32]);
        Ok(Self {
            format_version,
            kind,
            page_size,
            page_no,
            crc32,
        })
    }
}

/// Validates a page size against the supported range.
pub fn check_page_size(page_size: u32) -> Result<()> {
    if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(TreeError::Invalid("page size outside supported range"));
    }
    Ok(())
}

/// Zeroes the checksum field so the page can be hashed.
pub fn clear_crc32(buf: &mut [u8]) -> Result<()> {
    if buf.len() < header::CRC32.end {
        return Err(TreeError::Invalid("page header buffer too small"));
    }
    buf[header::CRC32].fill(0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_header_roundtrip() {
        let mut buf = [0u8; PAGE_HDR_LEN];
        let header = PageHeader::new(PageId(42), PageKind::Leaf, DEFAULT_PAGE_SIZE)
            .unwrap()
            .with_crc32(0xDEAD_BEEF);
        header.encode(&mut buf).unwrap();
        let decoded = PageHeader::decode(&buf).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn clear_crc32_zeroes_field() {
        let mut buf = [0xFFu8; PAGE_HDR_LEN];
        clear_crc32(&mut buf).unwrap();
        assert!(buf[header::CRC32].iter().all(|&b| b == 0));
    }

    #[test]
    fn page_kind_from_u8_rejects_unknown() {
        let err = PageKind::try_from(0).unwrap_err();
        assert!(matches!(
            err,
            TreeError::CorruptNode(NodeDefect::UnknownTag(0))
        ));
    }

    #[test]
    fn decode_rejects_short_and_foreign_pages() {
        let err = PageHeader::decode(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, TreeError::CorruptNode(NodeDefect::Truncated(_))));
        let err = PageHeader::decode(&[0u8; PAGE_HDR_LEN]).unwrap_err();
        assert!(matches!(err, TreeError::CorruptNode(NodeDefect::Malformed(_))));
    }

    #[test]
    fn page_size_bounds() {
        assert!(check_page_size(MIN_PAGE_SIZE).is_ok());
        assert!(check_page_size(MAX_PAGE_SIZE).is_ok());
        assert!(check_page_size(MIN_PAGE_SIZE - 1).is_err());
        assert!(check_page_size(MAX_PAGE_SIZE + 1).is_err());
    }
}
