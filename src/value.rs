//! Typed attribute values.
//!
//! Mirrors the wire-level attribute representation of DynamoDB-compatible
//! servers: exactly one variant is active per value, and the JSON form is
//! externally tagged (`{"S": "abc"}`, `{"N": "42"}`, ...). Binary payloads
//! travel base64-encoded as the protocol requires.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single typed attribute value.
///
/// Numbers are kept in their exact string form; the server compares numbers
/// as strings and `"42"` is a different value than `"42.0"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// String
    S(String),

    /// Number, exact string representation
    N(String),

    /// Binary
    B(#[serde(with = "b64_bytes")] Vec<u8>),

    /// Boolean
    #[serde(rename = "BOOL")]
    Bool(bool),

    /// Null marker; the wire form always carries `true`
    #[serde(rename = "NULL")]
    Null(bool),

    /// String set
    #[serde(rename = "SS")]
    Ss(Vec<String>),

    /// Number set
    #[serde(rename = "NS")]
    Ns(Vec<String>),

    /// Binary set
    #[serde(rename = "BS")]
    Bs(#[serde(with = "b64_list")] Vec<Vec<u8>>),

    /// List, order-preserving
    L(Vec<AttributeValue>),

    /// Map
    M(HashMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Convenience constructor for a string value.
    pub fn s(value: impl Into<String>) -> Self {
        AttributeValue::S(value.into())
    }

    /// Convenience constructor for a number value.
    pub fn n(value: impl Into<String>) -> Self {
        AttributeValue::N(value.into())
    }

    /// Convenience constructor for a binary value.
    pub fn b(value: impl Into<Vec<u8>>) -> Self {
        AttributeValue::B(value.into())
    }
}

mod b64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(&encoded).map_err(serde::de::Error::custom)
    }
}

mod b64_list {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde::ser::SerializeSeq;

    pub fn serialize<S: Serializer>(values: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&STANDARD.encode(value))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|e| STANDARD.decode(e).map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tagging() {
        let value: AttributeValue = serde_json::from_str(r#"{"S":"hello"}"#).unwrap();
        assert_eq!(value, AttributeValue::s("hello"));

        let value: AttributeValue = serde_json::from_str(r#"{"N":"42.5"}"#).unwrap();
        assert_eq!(value, AttributeValue::n("42.5"));

        let value: AttributeValue = serde_json::from_str(r#"{"BOOL":true}"#).unwrap();
        assert_eq!(value, AttributeValue::Bool(true));

        let value: AttributeValue = serde_json::from_str(r#"{"NULL":true}"#).unwrap();
        assert_eq!(value, AttributeValue::Null(true));
    }

    #[test]
    fn test_binary_base64_round_trip() {
        let value = AttributeValue::b(vec![0u8, 1, 2, 255]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"B":"AAEC/w=="}"#);

        let back: AttributeValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_binary_set_base64() {
        let value = AttributeValue::Bs(vec![vec![1u8], vec![2u8, 3u8]]);
        let json = serde_json::to_string(&value).unwrap();
        let back: AttributeValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_nested_containers() {
        let json = r#"{"M":{"inner":{"L":[{"S":"a"},{"N":"1"}]}}}"#;
        let value: AttributeValue = serde_json::from_str(json).unwrap();
        match value {
            AttributeValue::M(map) => match map.get("inner") {
                Some(AttributeValue::L(items)) => assert_eq!(items.len(), 2),
                other => panic!("Unexpected inner value: {:?}", other),
            },
            other => panic!("Unexpected value: {:?}", other),
        }
    }
}
