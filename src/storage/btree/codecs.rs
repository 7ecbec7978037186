use crate::primitives::bytes::ord;
use crate::types::{NodeDefect, Result};

use super::tree::{KeyCodec, ValCodec};

impl KeyCodec for u64 {
    fn encode_key(key: &Self, out: &mut Vec<u8>) {
        out.extend_from_slice(&key.to_be_bytes());
    }

    fn compare_encoded(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
        a.cmp(b)
    }

    fn decode_key(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 8 {
            return Err(NodeDefect::Codec("u64 key length mismatch").into());
        }
        Ok(ord::get_u64_be(bytes))
    }
}

impl ValCodec for u64 {
    fn encode_val(value: &Self, out: &mut Vec<u8>) {
        out.extend_from_slice(&value.to_be_bytes());
    }

    fn decode_val(src: &[u8]) -> Result<Self> {
        if src.len() != 8 {
            return Err(NodeDefect::Codec("u64 value length mismatch").into());
        }
        Ok(ord::get_u64_be(src))
    }
}

impl KeyCodec for i64 {
    fn encode_key(key: &Self, out: &mut Vec<u8>) {
        out.extend_from_slice(&ord::i64_to_ordered(*key).to_be_bytes());
    }

    fn compare_encoded(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
        a.cmp(b)
    }

    fn decode_key(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 8 {
            return Err(NodeDefect::Codec("i64 key length mismatch").into());
        }
        Ok(ord::ordered_to_i64(ord::get_u64_be(bytes)))
    }
}

impl ValCodec for i64 {
    fn encode_val(value: &Self, out: &mut Vec<u8>) {
        out.extend_from_slice(&value.to_be_bytes());
    }

    fn decode_val(src: &[u8]) -> Result<Self> {
        if src.len() != 8 {
            return Err(NodeDefect::Codec("i64 value length mismatch").into());
        }
        Ok(ord::get_u64_be(src) as i64)
    }
}

impl KeyCodec for Vec<u8> {
    fn encode_key(key: &Self, out: &mut Vec<u8>) {
        out.extend_from_slice(key);
    }

    fn compare_encoded(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
        a.cmp(b)
    }

    fn decode_key(bytes: &[u8]) -> Result<Self> {
        Ok(bytes.to_vec())
    }
}

impl ValCodec for Vec<u8> {
    fn encode_val(value: &Self, out: &mut Vec<u8>) {
        out.extend_from_slice(value);
    }

    fn decode_val(src: &[u8]) -> Result<Self> {
        Ok(src.to_vec())
    }
}

impl KeyCodec for String {
    fn encode_key(key: &Self, out: &mut Vec<u8>) {
        out.extend_from_slice(key.as_bytes());
    }

    fn compare_encoded(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
        a.cmp(b)
    }

    fn decode_key(bytes: &[u8]) -> Result<Self> {
        String::from_utf8(bytes.to_vec())
            .map_err(|_| NodeDefect::Codec("string key is not utf-8").into())
    }
}

impl ValCodec for String {
    fn encode_val(value: &Self, out: &mut Vec<u8>) {
        out.extend_from_slice(value.as_bytes());
    }

    fn decode_val(src: &[u8]) -> Result<Self> {
        String::from_utf8(src.to_vec())
            .map_err(|_| NodeDefect::Codec("string value is not utf-8").into())
    }
}

/// Unit values back [`super::BTreeSet`]; they occupy no bytes on the page.
impl ValCodec for () {
    fn encode_val(_value: &Self, _out: &mut Vec<u8>) {}

    fn decode_val(src: &[u8]) -> Result<Self> {
        if !src.is_empty() {
            return Err(NodeDefect::Codec("unit value must be empty").into());
        }
        Ok(())
    }
}
