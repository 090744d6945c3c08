//! Canonical JSON encoding and content hashing.
//!
//! Object keys are written in lexicographic byte order at every depth with no
//! insignificant whitespace, so logically equal documents always hash equal.

use crate::errors::Result;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Encode a value as canonical JSON bytes
pub fn to_canonical_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    let mut out = Vec::with_capacity(256);
    write_value(&value, &mut out)?;
    Ok(out)
}

fn write_value(value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push(b'{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_value(&map[key], out)?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
        }
        scalar => serde_json::to_writer(&mut *out, scalar)?,
    }
    Ok(())
}

/// `0x`-prefixed lowercase SHA-256 of the given bytes
pub fn content_hash(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(Sha256::digest(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_at_every_depth() {
        let value = json!({"b": 1, "a": {"z": true, "m": [ {"y": 1, "x": 2} ]}});
        let bytes = to_canonical_vec(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":{"m":[{"x":2,"y":1}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn test_insertion_order_does_not_change_hash() {
        let mut first = serde_json::Map::new();
        first.insert("title".into(), json!("A"));
        first.insert("doi".into(), json!("10.X/1"));

        let mut second = serde_json::Map::new();
        second.insert("doi".into(), json!("10.X/1"));
        second.insert("title".into(), json!("A"));

        let a = to_canonical_vec(&Value::Object(first)).unwrap();
        let b = to_canonical_vec(&Value::Object(second)).unwrap();
        assert_eq!(a, b);
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn test_strings_are_escaped() {
        let bytes = to_canonical_vec(&json!({"q": "say \"hi\"\n"})).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"q":"say \"hi\"\n"}"#);
    }

    #[test]
    fn test_hash_shape() {
        let hash = content_hash(b"abc");
        assert_eq!(hash.len(), 66);
        assert_eq!(
            hash,
            "0xba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
