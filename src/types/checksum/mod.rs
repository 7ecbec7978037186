#![forbid(unsafe_code)]

use super::page::{header, PAGE_HDR_LEN};

/// CRC32 over a page image, binding it to `page_no`.
///
/// The checksum field itself is skipped so it can be stored in place.
pub fn page_crc32(page_no: u64, page: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&page_no.to_be_bytes());
    hasher.update(&page[..header::CRC32.start]);
    if page.len() > PAGE_HDR_LEN {
        hasher.update(&page[PAGE_HDR_LEN..]);
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_crc_binds_page_number() {
        let payload = vec![7u8; 128];
        assert_ne!(page_crc32(1, &payload), page_crc32(2, &payload));
    }

    #[test]
    fn page_crc_ignores_stored_checksum() {
        let mut page = vec![3u8; 128];
        let before = page_crc32(5, &page);
        page[header::CRC32].copy_from_slice(&0xFFFF_FFFFu32.to_be_bytes());
        assert_eq!(before, page_crc32(5, &page));
        page[PAGE_HDR_LEN + 1] ^= 1;
        assert_ne!(before, page_crc32(5, &page));
    }
}
