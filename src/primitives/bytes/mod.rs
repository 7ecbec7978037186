#![forbid(unsafe_code)]
//! Encoding and varint utilities shared by the codecs and the page layout.

pub mod ord {
    //! Fixed-width big-endian readers and order-preserving integer encoders.

    const SIGN_BIT: u64 = 1 << 63;

    /// Reads a big-endian `u16` from the first two bytes of `src`.
    pub fn get_u16_be(src: &[u8]) -> u16 {
        let mut arr = [0u8; 2];
        arr.copy_from_slice(&src[..2]);
        u16::from_be_bytes(arr)
    }

    /// Reads a big-endian `u32` from the first four bytes of `src`.
    pub fn get_u32_be(src: &[u8]) -> u32 {
        let mut arr = [0u8; 4];
        arr.copy_from_slice(&src[..4]);
        u32::from_be_bytes(arr)
    }

    /// Reads a big-endian `u64` from the first eight bytes of `src`.
    pub fn get_u64_be(src: &[u8]) -> u64 {
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&src[..8]);
        u64::from_be_bytes(arr)
    }

    /// Writes `v` big-endian into the first two bytes of `dst`.
    pub fn put_u16_be(dst: &mut [u8], v: u16) {
        dst[..2].copy_from_slice(&v.to_be_bytes());
    }

    /// Writes `v` big-endian into the first eight bytes of `dst`.
    pub fn put_u64_be(dst: &mut [u8], v: u64) {
        dst[..8].copy_from_slice(&v.to_be_bytes());
    }

    /// Encodes a signed i64 so that byte order matches numeric order.
    pub fn i64_to_ordered(v: i64) -> u64 {
        (v as u64) ^ SIGN_BIT
    }

    /// Inverse of [`i64_to_ordered`].
    pub fn ordered_to_i64(raw: u64) -> i64 {
        (raw ^ SIGN_BIT) as i64
    }
}

pub mod var {
    //! Unsigned LEB128-style varints.

    /// Encodes a u64 as an unsigned varint.
    pub fn encode_u64(mut v: u64, out: &mut Vec<u8>) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                out.push(byte);
                break;
            }
            out.push(byte | 0x80);
        }
    }

    /// Decodes a varint from the front of `src`, returning the value and bytes consumed.
    ///
    /// `None` if `src` ends mid-varint or the encoding runs past ten bytes.
    pub fn decode_u64(src: &[u8]) -> Option<(u64, usize)> {
        let mut value = 0u64;
        for (idx, &byte) in src.iter().take(10).enumerate() {
            value |= u64::from(byte & 0x7f) << (7 * idx as u32);
            if byte & 0x80 == 0 {
                return Some((value, idx + 1));
            }
        }
        None
    }

    /// Number of bytes [`encode_u64`] produces for `v`.
    pub fn encoded_len_u64(mut v: u64) -> usize {
        let mut len = 1;
        while v >= 0x80 {
            v >>= 7;
            len += 1;
        }
        len
    }
}

#[cfg(test)]
mod tests {
    use super::{ord, var};
    use proptest::prelude::*;

    #[test]
    fn fixed_width_roundtrip() {
        let mut buf = [0u8; 8];
        ord::put_u64_be(&mut buf, 0x0102_0304_0506_0708);
        assert_eq!(ord::get_u64_be(&buf), 0x0102_0304_0506_0708);
        ord::put_u16_be(&mut buf, 0xBEEF);
        assert_eq!(ord::get_u16_be(&buf), 0xBEEF);
        assert_eq!(ord::get_u32_be(&[0, 0, 1, 0]), 256);
    }

    #[test]
    fn varint_lengths_at_boundaries() {
        for (value, len) in [(0u64, 1usize), (0x7f, 1), (0x80, 2), (0x3fff, 2), (0x4000, 3)] {
            let mut buf = Vec::new();
            var::encode_u64(value, &mut buf);
            assert_eq!(buf.len(), len, "value {value:#x}");
            assert_eq!(var::encoded_len_u64(value), len);
        }
        assert_eq!(var::encoded_len_u64(u64::MAX), 10);
    }

    #[test]
    fn varint_decode_reports_consumed_bytes() {
        assert_eq!(var::decode_u64(&[0x81, 0x02, b'x']), Some((0x101, 2)));
        assert_eq!(var::decode_u64(&[0x81]), None);
        assert_eq!(var::decode_u64(&[0xFF; 11]), None);
        assert_eq!(var::decode_u64(&[]), None);
    }

    proptest! {
        #[test]
        fn order_preserving_i64_prop(xs in proptest::collection::vec(any::<i64>(), 1..64)) {
            let mut encoded: Vec<[u8; 8]> = xs
                .iter()
                .map(|&v| ord::i64_to_ordered(v).to_be_bytes())
                .collect();
            encoded.sort();
            let decoded: Vec<i64> = encoded
                .iter()
                .map(|buf| ord::ordered_to_i64(ord::get_u64_be(buf)))
                .collect();
            let mut expected = xs.clone();
            expected.sort();
            prop_assert_eq!(decoded, expected);
        }

        #[test]
        fn varint_len_matches_encoding(v in any::<u64>()) {
            let mut buf = Vec::new();
            var::encode_u64(v, &mut buf);
            prop_assert_eq!(buf.len(), var::encoded_len_u64(v));
            prop_assert_eq!(var::decode_u64(&buf), Some((v, buf.len())));
        }
    }
}
