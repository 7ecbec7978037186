#![forbid(unsafe_code)]
//! Identifiers, the error taxonomy and the common page header shared by every layer.

use std::fmt;

/// Checksum helpers for page payloads.
pub mod checksum;
/// Fixed header stamped at the start of every page.
pub mod page;

/// Identifier of a page inside a [`crate::primitives::pager::PageStore`].
///
/// Page `0` is reserved: on-page links use it to encode "no page".
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PageId(pub u64);

impl PageId {
    /// The reserved page id, never handed out by an allocator.
    pub const NONE: PageId = PageId(0);

    /// Returns `true` for the reserved id.
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Decodes an on-page link where `0` means absent.
    pub(crate) fn from_link(raw: u64) -> Option<PageId> {
        if raw == 0 {
            None
        } else {
            Some(PageId(raw))
        }
    }

    /// Encodes an optional page as an on-page link.
    pub(crate) fn to_link(page: Option<PageId>) -> u64 {
        page.map(|p| p.0).unwrap_or(0)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Structural defects detected while decoding a node page.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeDefect {
    /// The node variant tag is neither leaf nor branch.
    #[error("unknown node tag {0:#04x}")]
    UnknownTag(u8),
    /// The page holds a valid node of the other variant.
    #[error("expected {expected} node, found {found}")]
    WrongVariant {
        /// Variant the caller required.
        expected: &'static str,
        /// Variant stored on the page.
        found: &'static str,
    },
    /// The payload ends before a header, record or slot directory does.
    #[error("truncated payload: {0}")]
    Truncated(&'static str),
    /// Offsets, lengths or header fields are inconsistent.
    #[error("malformed layout: {0}")]
    Malformed(&'static str),
    /// The stored CRC32 does not match the page contents.
    #[error("checksum mismatch")]
    Checksum,
    /// A key or value codec rejected the stored bytes.
    #[error("codec rejected bytes: {0}")]
    Codec(&'static str),
}

/// Errors surfaced by the tree engine and the page stores beneath it.
#[derive(thiserror::Error, Debug)]
pub enum TreeError {
    /// I/O failure reported by a file-backed page store.
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// A node page could not be decoded.
    #[error("corrupt node: {0}")]
    CorruptNode(#[from] NodeDefect),
    /// A single entry or page image is larger than one page can hold.
    #[error("capacity exceeded: {needed} bytes needed, {available} available")]
    CapacityExceeded {
        /// Bytes the entry or page image requires.
        needed: usize,
        /// Bytes available for it.
        available: usize,
    },
    /// The page id is not allocated in the store.
    #[error("page {0} is not allocated")]
    UnknownPage(PageId),
    /// Store-level metadata is damaged.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// The caller violated an API contract.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TreeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_links_roundtrip_through_zero() {
        assert_eq!(PageId::from_link(0), None);
        assert_eq!(PageId::from_link(9), Some(PageId(9)));
        assert_eq!(PageId::to_link(None), 0);
        assert_eq!(PageId::to_link(Some(PageId(9))), 9);
        assert!(PageId::NONE.is_none());
    }

    #[test]
    fn node_defects_render_distinct_messages() {
        let tag = TreeError::from(NodeDefect::UnknownTag(7)).to_string();
        let truncated = TreeError::from(NodeDefect::Truncated("slot directory")).to_string();
        assert!(tag.contains("unknown node tag 0x07"));
        assert!(truncated.contains("truncated payload"));
        assert_ne!(tag, truncated);
    }
}
