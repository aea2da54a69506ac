//! Body encoding
//!
//! The body of a document (every non-reserved field) is stored as one opaque
//! blob. Codecs must be symmetric: `decode(encode(m)) == m`.

use crate::document::Document;
use crate::error::{DocumentStoreError, Result};

/// Encodes and decodes document bodies
pub trait BodyCodec: Send + Sync {
    fn encode(&self, body: &Document) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<Document>;
}

/// Default codec: JSON, then zstd
#[derive(Debug, Clone)]
pub struct CompressedJsonCodec {
    level: i32,
}

impl CompressedJsonCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for CompressedJsonCodec {
    fn default() -> Self {
        Self::new(3)
    }
}

impl BodyCodec for CompressedJsonCodec {
    fn encode(&self, body: &Document) -> Result<Vec<u8>> {
        let raw = serde_json::to_vec(body)?;
        Ok(zstd::encode_all(raw.as_slice(), self.level)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Document> {
        let raw = zstd::decode_all(bytes)?;
        match serde_json::from_slice(&raw)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(DocumentStoreError::codec(format!(
                "Expected an encoded object, found {}",
                other
            ))),
        }
    }
}

/// Uncompressed JSON, handy when inspecting rows by hand
#[derive(Debug, Clone, Default)]
pub struct JsonCodec;

impl BodyCodec for JsonCodec {
    fn encode(&self, body: &Document) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(body)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Document> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{Value, json};

    fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            // quarters print and parse back exactly
            (-1_000_000i64..1_000_000).prop_map(|n| Value::from(n as f64 / 4.0)),
            "[a-zA-Z0-9 _-]{0,12}".prop_map(Value::String),
        ]
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            arb_scalar(),
            prop::collection::vec(arb_scalar(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", arb_scalar(), 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    }

    fn arb_document() -> impl Strategy<Value = Document> {
        prop::collection::btree_map("[a-z][a-z0-9_]{0,8}", arb_value(), 0..8)
            .prop_map(|m| m.into_iter().collect())
    }

    proptest! {
        #[test]
        fn compressed_json_round_trips(doc in arb_document()) {
            let codec = CompressedJsonCodec::default();
            let bytes = codec.encode(&doc).unwrap();
            prop_assert_eq!(codec.decode(&bytes).unwrap(), doc);
        }

        #[test]
        fn plain_json_round_trips(doc in arb_document()) {
            let codec = JsonCodec;
            let bytes = codec.encode(&doc).unwrap();
            prop_assert_eq!(codec.decode(&bytes).unwrap(), doc);
        }
    }

    #[test]
    fn test_decode_preserves_field_order() {
        let codec = CompressedJsonCodec::new(1);
        let doc = json!({"zeta": 1, "alpha": 2, "mid": [1, 2]})
            .as_object()
            .unwrap()
            .clone();
        let decoded = codec.decode(&codec.encode(&doc).unwrap()).unwrap();
        let keys: Vec<&str> = decoded.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let codec = CompressedJsonCodec::default();
        assert!(codec.decode(b"not zstd").is_err());

        let not_object = zstd::encode_all(&b"[1,2]"[..], 3).unwrap();
        assert!(matches!(
            codec.decode(&not_object),
            Err(DocumentStoreError::Codec(_))
        ));
    }
}
