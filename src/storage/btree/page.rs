//! Slotted page layout for tree nodes.
//!
//! ```text
//! [page header 24B][node header 16B][records ...][free][slot directory]
//! ```
//!
//! Records are packed upward from the node header in key order; the slot
//! directory grows down from the end of the page and holds one
//! `offset:u16 | len:u16` entry per record. Offsets are relative to the
//! payload (the bytes after the page header).

use std::convert::TryFrom;

use smallvec::SmallVec;

use crate::primitives::bytes::{ord, var};
use crate::types::checksum::page_crc32;
use crate::types::page::{clear_crc32, header, PageHeader, PageKind, PAGE_HDR_LEN};
use crate::types::{NodeDefect, PageId, Result, TreeError};

use super::node::{BranchNode, LeafNode, Node};

/// Length of the node header at the start of the payload.
pub const NODE_HDR_LEN: usize = 16;

const TAG_OFFSET: usize = 0;
const FLAGS_OFFSET: usize = 1;
const NSLOTS_OFFSET: usize = 2;
const FREE_START_OFFSET: usize = 4;
const FREE_END_OFFSET: usize = 6;
const LINK_OFFSET: usize = 8;

/// Branch record header length (`child:u64` + `sep_len:u16`).
pub const BRANCH_RECORD_HEADER_LEN: usize = 10;

/// Size in bytes of a single slot directory entry (offset + length).
pub const SLOT_ENTRY_LEN: usize = 4;

/// Node variant tag stored in the node header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeTag {
    /// Leaf node with key/value records.
    Leaf = 1,
    /// Branch node with separator/child records.
    Branch = 2,
}

impl NodeTag {
    /// Converts a byte value to a tag.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Leaf),
            2 => Ok(Self::Branch),
            other => Err(NodeDefect::UnknownTag(other).into()),
        }
    }

    fn page_kind(self) -> PageKind {
        match self {
            NodeTag::Leaf => PageKind::Leaf,
            NodeTag::Branch => PageKind::Branch,
        }
    }
}

/// Node header decoded from the payload.
#[derive(Clone, Debug)]
pub struct Header {
    /// Node variant.
    pub tag: NodeTag,
    /// Reserved flags, written as zero.
    pub flags: u8,
    /// Number of records in the slot directory.
    pub slot_count: u16,
    /// Offset to the start of free space in the payload.
    pub free_start: u16,
    /// Offset to the end of free space in the payload.
    pub free_end: u16,
    /// Next leaf for leaves, leftmost child for branches; `0` means none.
    pub link: u64,
}

impl Header {
    /// Decodes the node header from `payload`.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < NODE_HDR_LEN {
            return Err(NodeDefect::Truncated("node header").into());
        }
        let tag = NodeTag::from_u8(payload[TAG_OFFSET])?;
        let flags = payload[FLAGS_OFFSET];
        let slot_count = ord::get_u16_be(&payload[NSLOTS_OFFSET..]);
        let free_start = ord::get_u16_be(&payload[FREE_START_OFFSET..]);
        let free_end = ord::get_u16_be(&payload[FREE_END_OFFSET..]);
        let link = ord::get_u64_be(&payload[LINK_OFFSET..]);

        let slot_bytes = slot_count as usize * SLOT_ENTRY_LEN;
        if NODE_HDR_LEN + slot_bytes > payload.len() {
            return Err(NodeDefect::Truncated("slot directory").into());
        }
        if (free_start as usize) < NODE_HDR_LEN
            || free_start > free_end
            || free_end as usize > payload.len()
        {
            return Err(NodeDefect::Malformed("free space pointers out of range").into());
        }
        let slot_start = payload.len() - slot_bytes;
        if slot_start < free_end as usize {
            return Err(NodeDefect::Malformed("free_end overlaps slot directory").into());
        }
        Ok(Self {
            tag,
            flags,
            slot_count,
            free_start,
            free_end,
            link,
        })
    }

    /// Access the slot directory for the payload.
    pub fn slot_directory<'a>(&self, payload: &'a [u8]) -> SlotDirectory<'a> {
        let slot_bytes = self.slot_count as usize * SLOT_ENTRY_LEN;
        SlotDirectory {
            slots: &payload[payload.len() - slot_bytes..],
        }
    }
}

/// View over the slot directory at the tail of a page.
pub struct SlotDirectory<'a> {
    slots: &'a [u8],
}

impl<'a> SlotDirectory<'a> {
    /// Returns the number of slots in the directory.
    pub fn len(&self) -> usize {
        self.slots.len() / SLOT_ENTRY_LEN
    }

    /// Returns `true` when the directory has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns the (start, length) tuple for `idx`.
    pub fn extent(&self, idx: usize) -> Result<(u16, u16)> {
        if idx >= self.len() {
            return Err(TreeError::Invalid("slot index out of range"));
        }
        let off = idx * SLOT_ENTRY_LEN;
        let entry = &self.slots[off..off + SLOT_ENTRY_LEN];
        Ok((ord::get_u16_be(entry), ord::get_u16_be(&entry[2..])))
    }
}

const INLINE_SLOT_EXTENTS: usize = 32;

#[derive(Clone, Copy, Debug, Default)]
struct SlotExtent {
    start: u16,
    end: u16,
}

/// Validated extents for all slots on a page.
pub struct SlotExtents {
    extents: SmallVec<[SlotExtent; INLINE_SLOT_EXTENTS]>,
}

impl SlotExtents {
    /// Builds the extent table, rejecting records outside the record area or overlapping.
    pub fn build(header: &Header, payload: &[u8], slots: &SlotDirectory<'_>) -> Result<Self> {
        let free_start = header.free_start as usize;
        let mut extents = SmallVec::with_capacity(slots.len());
        let mut ordered: SmallVec<[(usize, usize); INLINE_SLOT_EXTENTS]> =
            SmallVec::with_capacity(slots.len());
        for idx in 0..slots.len() {
            let (start_u16, len_u16) = slots.extent(idx)?;
            let start = start_u16 as usize;
            let len = len_u16 as usize;
            if len == 0 {
                return Err(NodeDefect::Malformed("record length zero").into());
            }
            if start < NODE_HDR_LEN {
                return Err(NodeDefect::Malformed("record overlaps node header").into());
            }
            let end = start + len;
            if end > payload.len() || end > free_start {
                return Err(NodeDefect::Malformed("record extent beyond free_start").into());
            }
            extents.push(SlotExtent {
                start: start_u16,
                end: u16::try_from(end)
                    .map_err(|_| NodeDefect::Malformed("record extent beyond u16"))?,
            });
            ordered.push((start, end));
        }
        ordered.sort_unstable_by_key(|entry| entry.0);
        let mut prev_end = NODE_HDR_LEN;
        for (start, end) in ordered {
            if start < prev_end {
                return Err(NodeDefect::Malformed("record extents overlap").into());
            }
            prev_end = end;
        }
        Ok(Self { extents })
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.extents.len()
    }

    /// Returns `true` when the page holds no records.
    pub fn is_empty(&self) -> bool {
        self.extents.is_empty()
    }

    /// Returns the raw bytes for `slot_idx`.
    pub fn record_slice<'a>(&self, payload: &'a [u8], slot_idx: usize) -> Result<&'a [u8]> {
        let extent = self
            .extents
            .get(slot_idx)
            .ok_or(TreeError::Invalid("slot index out of bounds"))?;
        Ok(&payload[extent.start as usize..extent.end as usize])
    }
}

/// Reference to a leaf record stored on-page (`varint key_len | varint val_len | key | value`).
#[derive(Clone, Copy, Debug)]
pub struct LeafRecordRef<'a> {
    /// Encoded key.
    pub key: &'a [u8],
    /// Encoded value.
    pub value: &'a [u8],
}

/// Reference to a branch record stored on-page (`child:u64 | sep_len:u16 | separator`).
#[derive(Clone, Copy, Debug)]
pub struct BranchRecordRef<'a> {
    /// Separator bytes.
    pub separator: &'a [u8],
    /// Child holding keys at or above the separator.
    pub child: PageId,
}

/// Encodes a leaf record into `dst`.
pub fn encode_leaf_record(key: &[u8], value: &[u8], dst: &mut Vec<u8>) {
    var::encode_u64(key.len() as u64, dst);
    var::encode_u64(value.len() as u64, dst);
    dst.extend_from_slice(key);
    dst.extend_from_slice(value);
}

/// Decodes a leaf record; the record must span `buf` exactly.
pub fn decode_leaf_record(buf: &[u8]) -> Result<LeafRecordRef<'_>> {
    let (key_len, rest) = split_len(buf, "leaf record key length")?;
    let (val_len, rest) = split_len(rest, "leaf record value length")?;
    if rest.len() < key_len {
        return Err(NodeDefect::Truncated("leaf record key").into());
    }
    let (key, value) = rest.split_at(key_len);
    if value.len() < val_len {
        return Err(NodeDefect::Truncated("leaf record value").into());
    }
    if value.len() != val_len {
        return Err(NodeDefect::Malformed("leaf record length mismatch").into());
    }
    Ok(LeafRecordRef { key, value })
}

/// Splits a varint length off the front of `buf`.
fn split_len<'a>(buf: &'a [u8], field: &'static str) -> Result<(usize, &'a [u8])> {
    let Some((raw, used)) = var::decode_u64(buf) else {
        return Err(if buf.len() >= 10 {
            NodeDefect::Malformed("record varint too long")
        } else {
            NodeDefect::Truncated(field)
        }
        .into());
    };
    let len = usize::try_from(raw).map_err(|_| NodeDefect::Malformed("record length overflow"))?;
    Ok((len, &buf[used..]))
}

/// Encodes a branch record into `dst`.
pub fn encode_branch_record(separator: &[u8], child: PageId, dst: &mut Vec<u8>) -> Result<()> {
    let sep_len = u16::try_from(separator.len()).map_err(|_| TreeError::CapacityExceeded {
        needed: separator.len(),
        available: u16::MAX as usize,
    })?;
    dst.extend_from_slice(&child.0.to_be_bytes());
    dst.extend_from_slice(&sep_len.to_be_bytes());
    dst.extend_from_slice(separator);
    Ok(())
}

/// Decodes a branch record; the record must span `buf` exactly.
pub fn decode_branch_record(buf: &[u8]) -> Result<BranchRecordRef<'_>> {
    if buf.len() < BRANCH_RECORD_HEADER_LEN {
        return Err(NodeDefect::Truncated("branch record header").into());
    }
    let child = PageId(ord::get_u64_be(buf));
    if child.is_none() {
        return Err(NodeDefect::Malformed("branch record points at page 0").into());
    }
    let sep_len = ord::get_u16_be(&buf[8..]) as usize;
    let end = BRANCH_RECORD_HEADER_LEN + sep_len;
    if buf.len() < end {
        return Err(NodeDefect::Truncated("branch separator").into());
    }
    if buf.len() != end {
        return Err(NodeDefect::Malformed("branch record length mismatch").into());
    }
    Ok(BranchRecordRef {
        separator: &buf[BRANCH_RECORD_HEADER_LEN..end],
        child,
    })
}

/// Page bytes available to records and slots.
pub fn payload_capacity(page_size: usize) -> usize {
    page_size.saturating_sub(PAGE_HDR_LEN + NODE_HDR_LEN)
}

/// Largest footprint a single entry may have: half the record area.
pub fn max_entry_len(page_size: usize) -> usize {
    payload_capacity(page_size) / 2
}

/// Bytes one leaf entry consumes, slot included.
pub fn leaf_record_len(key: &[u8], value: &[u8]) -> usize {
    var::encoded_len_u64(key.len() as u64)
        + var::encoded_len_u64(value.len() as u64)
        + key.len()
        + value.len()
        + SLOT_ENTRY_LEN
}

/// Bytes one branch entry consumes, slot included.
pub fn branch_record_len(separator: &[u8]) -> usize {
    BRANCH_RECORD_HEADER_LEN + separator.len() + SLOT_ENTRY_LEN
}

/// Full page bytes the node needs.
pub fn encoded_len(node: &Node) -> usize {
    encoded_len_for(node.used_bytes())
}

/// Full page bytes for a node whose entries use `used_bytes`.
pub fn encoded_len_for(used_bytes: usize) -> usize {
    PAGE_HDR_LEN + NODE_HDR_LEN + used_bytes
}

/// Returns `true` if the node encodes within `page_size` bytes.
pub fn fits(node: &Node, page_size: usize) -> bool {
    encoded_len(node) <= page_size
}

fn to_u16(value: usize) -> Result<u16> {
    u16::try_from(value).map_err(|_| TreeError::Invalid("page offset exceeds u16"))
}

/// Encodes `node` as the full image of page `page_id`, checksum included.
pub fn encode(node: &Node, page_id: PageId, page_size: usize) -> Result<Vec<u8>> {
    let needed = encoded_len(node);
    if needed > page_size {
        return Err(TreeError::CapacityExceeded {
            needed,
            available: page_size,
        });
    }
    let (tag, link, slot_count) = match node {
        Node::Leaf(leaf) => (NodeTag::Leaf, PageId::to_link(leaf.next), leaf.entries.len()),
        Node::Branch(branch) => {
            if branch.leftmost.is_none() {
                return Err(TreeError::Invalid("branch without leftmost child"));
            }
            (NodeTag::Branch, branch.leftmost.0, branch.entries.len())
        }
    };

    let mut records = Vec::with_capacity(node.used_bytes());
    let mut slots: SmallVec<[(u16, u16); INLINE_SLOT_EXTENTS]> =
        SmallVec::with_capacity(slot_count);
    let mut push_slot = |records: &Vec<u8>, before: usize| -> Result<()> {
        slots.push((
            to_u16(NODE_HDR_LEN + before)?,
            to_u16(records.len() - before)?,
        ));
        Ok(())
    };
    match node {
        Node::Leaf(leaf) => {
            for (key, value) in &leaf.entries {
                let before = records.len();
                encode_leaf_record(key, value, &mut records);
                push_slot(&records, before)?;
            }
        }
        Node::Branch(branch) => {
            for (sep, child) in &branch.entries {
                let before = records.len();
                encode_branch_record(sep, *child, &mut records)?;
                push_slot(&records, before)?;
            }
        }
    }

    let mut page = vec![0u8; page_size];
    PageHeader::new(page_id, tag.page_kind(), to_u32(page_size)?)?.encode(&mut page)?;
    let payload = &mut page[PAGE_HDR_LEN..];
    let free_start = NODE_HDR_LEN + records.len();
    let free_end = payload.len() - slots.len() * SLOT_ENTRY_LEN;
    payload[NODE_HDR_LEN..free_start].copy_from_slice(&records);
    payload[TAG_OFFSET] = tag as u8;
    payload[FLAGS_OFFSET] = 0;
    ord::put_u16_be(&mut payload[NSLOTS_OFFSET..], to_u16(slots.len())?);
    ord::put_u16_be(&mut payload[FREE_START_OFFSET..], to_u16(free_start)?);
    ord::put_u16_be(&mut payload[FREE_END_OFFSET..], to_u16(free_end)?);
    ord::put_u64_be(&mut payload[LINK_OFFSET..], link);
    for (idx, (offset, len)) in slots.iter().enumerate() {
        let pos = free_end + idx * SLOT_ENTRY_LEN;
        ord::put_u16_be(&mut payload[pos..], *offset);
        ord::put_u16_be(&mut payload[pos + 2..], *len);
    }
    stamp_checksum(page_id, &mut page)?;
    Ok(page)
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| TreeError::Invalid("page size exceeds u32"))
}

/// Recomputes and stores the page checksum.
pub(crate) fn stamp_checksum(page_id: PageId, page: &mut [u8]) -> Result<()> {
    clear_crc32(page)?;
    let crc = page_crc32(page_id.0, page);
    page[header::CRC32].copy_from_slice(&crc.to_be_bytes());
    Ok(())
}

/// Decodes the node stored in `page`, the image of page `page_id`.
pub fn decode(page: &[u8], page_id: PageId, verify_checksum: bool) -> Result<Node> {
    let page_header = PageHeader::decode(page)?;
    if page_header.page_size as usize != page.len() {
        return Err(NodeDefect::Malformed("page size disagrees with store").into());
    }
    if page_header.page_no != page_id {
        return Err(NodeDefect::Malformed("page number mismatch").into());
    }
    if verify_checksum && page_crc32(page_id.0, page) != page_header.crc32 {
        return Err(NodeDefect::Checksum.into());
    }
    let payload = &page[PAGE_HDR_LEN..];
    let header = Header::parse(payload)?;
    if header.tag.page_kind() != page_header.kind {
        return Err(NodeDefect::Malformed("page kind disagrees with node tag").into());
    }
    let slots = header.slot_directory(payload);
    let extents = SlotExtents::build(&header, payload, &slots)?;
    match header.tag {
        NodeTag::Leaf => {
            let mut entries = Vec::with_capacity(extents.len());
            for idx in 0..extents.len() {
                let record = decode_leaf_record(extents.record_slice(payload, idx)?)?;
                entries.push((record.key.to_vec(), record.value.to_vec()));
            }
            Ok(Node::Leaf(LeafNode {
                entries,
                next: PageId::from_link(header.link),
            }))
        }
        NodeTag::Branch => {
            let leftmost = PageId::from_link(header.link)
                .ok_or(NodeDefect::Malformed("branch without leftmost child"))?;
            let mut entries = Vec::with_capacity(extents.len());
            for idx in 0..extents.len() {
                let record = decode_branch_record(extents.record_slice(payload, idx)?)?;
                entries.push((record.separator.to_vec(), record.child));
            }
            Ok(Node::Branch(BranchNode { leftmost, entries }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: usize = 256;

    #[test]
    fn leaf_record_defects_are_classified() {
        let mut record = Vec::new();
        encode_leaf_record(b"key", b"value", &mut record);
        let decoded = decode_leaf_record(&record).expect("well-formed record");
        assert_eq!((decoded.key, decoded.value), (&b"key"[..], &b"value"[..]));

        let short_varint = decode_leaf_record(&[0x81]).unwrap_err();
        assert!(matches!(
            short_varint,
            TreeError::CorruptNode(NodeDefect::Truncated("leaf record key length"))
        ));
        let overlong = decode_leaf_record(&[0xFF; 12]).unwrap_err();
        assert!(matches!(overlong, TreeError::CorruptNode(NodeDefect::Malformed(_))));
        let cut_body = decode_leaf_record(&record[..record.len() - 1]).unwrap_err();
        assert!(matches!(cut_body, TreeError::CorruptNode(NodeDefect::Truncated(_))));
        let mut padded = record.clone();
        padded.push(0);
        let trailing = decode_leaf_record(&padded).unwrap_err();
        assert!(matches!(trailing, TreeError::CorruptNode(NodeDefect::Malformed(_))));
    }

    fn sample_leaf() -> Node {
        Node::Leaf(LeafNode {
            entries: vec![
                (b"alpha".to_vec(), b"1".to_vec()),
                (b"beta".to_vec(), Vec::new()),
                (b"gamma".to_vec(), vec![7u8; 20]),
            ],
            next: Some(PageId(9)),
        })
    }

    fn sample_branch() -> Node {
        Node::Branch(BranchNode {
            leftmost: PageId(3),
            entries: vec![(b"m".to_vec(), PageId(4)), (b"t".to_vec(), PageId(5))],
        })
    }

    fn defect(err: TreeError) -> NodeDefect {
        match err {
            TreeError::CorruptNode(defect) => defect,
            other => panic!("expected corrupt node, got {other:?}"),
        }
    }

    #[test]
    fn leaf_and_branch_roundtrip() -> Result<()> {
        for node in [sample_leaf(), sample_branch(), Node::Leaf(LeafNode::new(None))] {
            let page = encode(&node, PageId(2), PAGE)?;
            assert_eq!(page.len(), PAGE);
            assert_eq!(decode(&page, PageId(2), true)?, node);
        }
        Ok(())
    }

    #[test]
    fn encoded_len_matches_free_space_accounting() -> Result<()> {
        let node = sample_leaf();
        let page = encode(&node, PageId(2), PAGE)?;
        let header = Header::parse(&page[PAGE_HDR_LEN..])?;
        let free = (header.free_end - header.free_start) as usize;
        assert_eq!(encoded_len(&node) + free, PAGE);
        Ok(())
    }

    #[test]
    fn oversized_node_is_rejected() {
        let node = Node::Leaf(LeafNode {
            entries: vec![(b"k".to_vec(), vec![0u8; PAGE])],
            next: None,
        });
        assert!(!fits(&node, PAGE));
        assert!(matches!(
            encode(&node, PageId(2), PAGE),
            Err(TreeError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn corruption_variants_are_distinct() -> Result<()> {
        let clean = encode(&sample_leaf(), PageId(2), PAGE)?;

        let mut bad_tag = clean.clone();
        bad_tag[PAGE_HDR_LEN + TAG_OFFSET] = 0x7F;
        stamp_checksum(PageId(2), &mut bad_tag)?;
        assert_eq!(
            defect(decode(&bad_tag, PageId(2), true).unwrap_err()),
            NodeDefect::UnknownTag(0x7F)
        );

        let mut truncated = clean.clone();
        ord::put_u16_be(&mut truncated[PAGE_HDR_LEN + NSLOTS_OFFSET..], 500);
        stamp_checksum(PageId(2), &mut truncated)?;
        assert!(matches!(
            defect(decode(&truncated, PageId(2), true).unwrap_err()),
            NodeDefect::Truncated(_)
        ));

        let mut flipped = clean.clone();
        flipped[PAGE_HDR_LEN + NODE_HDR_LEN + 3] ^= 0x01;
        assert_eq!(
            defect(decode(&flipped, PageId(2), true).unwrap_err()),
            NodeDefect::Checksum
        );
        assert!(decode(&flipped, PageId(2), false).is_ok());

        assert!(matches!(
            defect(decode(&clean, PageId(3), true).unwrap_err()),
            NodeDefect::Malformed(_)
        ));
        Ok(())
    }

    #[test]
    fn overlapping_slots_are_malformed() -> Result<()> {
        let mut page = encode(&sample_branch(), PageId(2), PAGE)?;
        let payload_len = PAGE - PAGE_HDR_LEN;
        let first = PAGE_HDR_LEN + payload_len - 2 * SLOT_ENTRY_LEN;
        let second = first + SLOT_ENTRY_LEN;
        let first_offset = page[first..first + 2].to_vec();
        page[second..second + 2].copy_from_slice(&first_offset);
        stamp_checksum(PageId(2), &mut page)?;
        assert!(matches!(
            defect(decode(&page, PageId(2), true).unwrap_err()),
            NodeDefect::Malformed(_)
        ));
        Ok(())
    }

    #[test]
    fn record_lengths_include_slot() {
        assert_eq!(leaf_record_len(&[0u8; 8], &[0u8; 8]), 22);
        assert_eq!(branch_record_len(&[0u8; 8]), 22);
        assert_eq!(max_entry_len(106), 33);
    }
}
