//! Attribute hashing for partition-key affinity.
//!
//! Serializes a typed attribute value into a canonical byte form and hashes
//! it with MurmurHash3 x64-128 (seed 0), keeping the low 64 bits. The byte
//! form is normative across client languages: a one-byte type prefix, then
//! a payload in which variable-length elements carry 4-byte big-endian
//! length frames, sets are sorted, and lists keep their order. Length
//! frames keep `["a","bc"]` and `["ab","c"]` apart; sorting makes set
//! hashes independent of iteration order.

pub mod murmur3;

pub use murmur3::murmur3_x64_128;

use crate::error::{ClientError, Result};
use crate::value::AttributeValue;

const TAG_STRING: u8 = 0x01;
const TAG_NUMBER: u8 = 0x02;
const TAG_BINARY: u8 = 0x03;
const TAG_BOOL: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_STRING_SET: u8 = 0x06;
const TAG_NUMBER_SET: u8 = 0x07;
const TAG_BINARY_SET: u8 = 0x08;
const TAG_LIST: u8 = 0x09;
const TAG_MAP: u8 = 0x0a;

/// Hashes an attribute value; the result is stable across processes and
/// client languages.
pub fn hash_attribute(value: &AttributeValue) -> Result<u64> {
    let bytes = canonical_bytes(value)?;
    Ok(murmur3_x64_128(&bytes, 0).0)
}

/// Hashes an optional attribute value; an absent value hashes to `0`.
pub fn hash_optional(value: Option<&AttributeValue>) -> Result<u64> {
    value.map_or(Ok(0), hash_attribute)
}

/// Produces the canonical byte form of a value.
pub fn canonical_bytes(value: &AttributeValue) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_into(value, &mut buf)?;
    Ok(buf)
}

fn encode_into(value: &AttributeValue, buf: &mut Vec<u8>) -> Result<()> {
    match value {
        AttributeValue::S(s) => {
            buf.push(TAG_STRING);
            buf.extend_from_slice(s.as_bytes());
        }
        AttributeValue::N(n) => {
            buf.push(TAG_NUMBER);
            buf.extend_from_slice(n.as_bytes());
        }
        AttributeValue::B(b) => {
            buf.push(TAG_BINARY);
            buf.extend_from_slice(b);
        }
        AttributeValue::Bool(v) => {
            buf.push(TAG_BOOL);
            buf.push(if *v { 0x01 } else { 0x00 });
        }
        AttributeValue::Null(true) => {
            buf.push(TAG_NULL);
            buf.push(0x01);
        }
        AttributeValue::Null(false) => {
            return Err(ClientError::InvalidArgument(
                "NULL attribute with false marker".to_string(),
            ));
        }
        AttributeValue::Ss(items) => {
            buf.push(TAG_STRING_SET);
            encode_sorted_elements(items.iter().map(|s| s.as_bytes()), buf)?;
        }
        AttributeValue::Ns(items) => {
            buf.push(TAG_NUMBER_SET);
            encode_sorted_elements(items.iter().map(|n| n.as_bytes()), buf)?;
        }
        AttributeValue::Bs(items) => {
            buf.push(TAG_BINARY_SET);
            encode_sorted_elements(items.iter().map(|b| b.as_slice()), buf)?;
        }
        AttributeValue::L(items) => {
            buf.push(TAG_LIST);
            for item in items {
                let child = canonical_bytes(item)?;
                put_len(child.len(), buf)?;
                buf.extend_from_slice(&child);
            }
        }
        AttributeValue::M(entries) => {
            buf.push(TAG_MAP);
            let mut keys: Vec<&String> = entries.keys().collect();
            keys.sort_unstable();
            for key in keys {
                put_len(key.len(), buf)?;
                buf.extend_from_slice(key.as_bytes());
                let child = canonical_bytes(&entries[key])?;
                put_len(child.len(), buf)?;
                buf.extend_from_slice(&child);
            }
        }
    }
    Ok(())
}

fn encode_sorted_elements<'a>(
    elements: impl Iterator<Item = &'a [u8]>,
    buf: &mut Vec<u8>,
) -> Result<()> {
    let mut sorted: Vec<&[u8]> = elements.collect();
    sorted.sort_unstable();
    for element in sorted {
        put_len(element.len(), buf)?;
        buf.extend_from_slice(element);
    }
    Ok(())
}

fn put_len(len: usize, buf: &mut Vec<u8>) -> Result<()> {
    let len = u32::try_from(len)
        .map_err(|_| ClientError::InvalidArgument("Element exceeds 4 GiB".to_string()))?;
    buf.extend_from_slice(&len.to_be_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_scalar_encodings() {
        assert_eq!(
            canonical_bytes(&AttributeValue::s("a")).unwrap(),
            vec![0x01, b'a']
        );
        assert_eq!(
            canonical_bytes(&AttributeValue::n("42")).unwrap(),
            vec![0x02, b'4', b'2']
        );
        assert_eq!(
            canonical_bytes(&AttributeValue::b(vec![0xde, 0xad])).unwrap(),
            vec![0x03, 0xde, 0xad]
        );
        assert_eq!(
            canonical_bytes(&AttributeValue::Bool(true)).unwrap(),
            vec![0x04, 0x01]
        );
        assert_eq!(
            canonical_bytes(&AttributeValue::Bool(false)).unwrap(),
            vec![0x04, 0x00]
        );
        assert_eq!(
            canonical_bytes(&AttributeValue::Null(true)).unwrap(),
            vec![0x05, 0x01]
        );
    }

    #[test]
    fn test_false_null_rejected() {
        assert!(matches!(
            canonical_bytes(&AttributeValue::Null(false)),
            Err(ClientError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_string_set_framing() {
        let bytes = canonical_bytes(&AttributeValue::Ss(vec!["x".to_string()])).unwrap();
        assert_eq!(bytes, vec![0x06, 0, 0, 0, 1, b'x']);
    }

    #[test]
    fn test_number_preserves_exact_form() {
        let plain = hash_attribute(&AttributeValue::n("42")).unwrap();
        let decimal = hash_attribute(&AttributeValue::n("42.0")).unwrap();
        assert_ne!(plain, decimal);
    }

    #[test]
    fn test_type_prefix_separates_same_payload() {
        let as_string = hash_attribute(&AttributeValue::s("1")).unwrap();
        let as_number = hash_attribute(&AttributeValue::n("1")).unwrap();
        let as_binary = hash_attribute(&AttributeValue::b(b"1".to_vec())).unwrap();
        assert_ne!(as_string, as_number);
        assert_ne!(as_string, as_binary);
        assert_ne!(as_number, as_binary);
    }

    #[test]
    fn test_string_set_order_independent() {
        let first = AttributeValue::Ss(vec!["z".into(), "x".into(), "y".into()]);
        let second = AttributeValue::Ss(vec!["y".into(), "z".into(), "x".into()]);
        assert_eq!(
            hash_attribute(&first).unwrap(),
            hash_attribute(&second).unwrap()
        );
    }

    #[test]
    fn test_binary_set_unsigned_ordering() {
        let first = AttributeValue::Bs(vec![vec![0xff], vec![0x01]]);
        let second = AttributeValue::Bs(vec![vec![0x01], vec![0xff]]);
        assert_eq!(
            hash_attribute(&first).unwrap(),
            hash_attribute(&second).unwrap()
        );
        assert_eq!(
            canonical_bytes(&first).unwrap(),
            vec![0x08, 0, 0, 0, 1, 0x01, 0, 0, 0, 1, 0xff]
        );
    }

    #[test]
    fn test_list_boundary_collision_avoided() {
        let first = AttributeValue::L(vec![AttributeValue::s("a"), AttributeValue::s("bc")]);
        let second = AttributeValue::L(vec![AttributeValue::s("ab"), AttributeValue::s("c")]);
        assert_ne!(
            hash_attribute(&first).unwrap(),
            hash_attribute(&second).unwrap()
        );
    }

    #[test]
    fn test_list_order_dependent() {
        let first = AttributeValue::L(vec![AttributeValue::s("a"), AttributeValue::s("b")]);
        let second = AttributeValue::L(vec![AttributeValue::s("b"), AttributeValue::s("a")]);
        assert_ne!(
            hash_attribute(&first).unwrap(),
            hash_attribute(&second).unwrap()
        );
    }

    #[test]
    fn test_map_keys_sorted() {
        let mut map = HashMap::new();
        map.insert("b".to_string(), AttributeValue::n("2"));
        map.insert("a".to_string(), AttributeValue::n("1"));
        let bytes = canonical_bytes(&AttributeValue::M(map)).unwrap();

        let mut expected = vec![0x0a];
        expected.extend_from_slice(&[0, 0, 0, 1, b'a', 0, 0, 0, 2, 0x02, b'1']);
        expected.extend_from_slice(&[0, 0, 0, 1, b'b', 0, 0, 0, 2, 0x02, b'2']);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_invalid_nested_value_propagates() {
        let value = AttributeValue::L(vec![AttributeValue::Null(false)]);
        assert!(hash_attribute(&value).is_err());
    }

    #[test]
    fn test_hash_purity() {
        let value = AttributeValue::s("user-42");
        assert_eq!(
            hash_attribute(&value).unwrap(),
            hash_attribute(&value).unwrap()
        );
    }

    #[test]
    fn test_absent_value_hashes_to_zero() {
        assert_eq!(hash_optional(None).unwrap(), 0);
        assert_ne!(
            hash_optional(Some(&AttributeValue::s("x"))).unwrap(),
            0,
            "A present value should not collide with the absent marker"
        );
    }
}
