//! Canonical serialization and digests used for block hashing.
//!
//! The canonical form is JSON with sorted keys at every nesting level,
//! `", "` between items, `": "` between key and value and every character
//! outside printable ASCII escaped as `\uXXXX`. It is byte-compatible with
//! the encoding the first deployment of the ledger hashed, so digests can be
//! reproduced by other implementations.

use crate::error::{ChainError, Result};
use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io;

/// Number of hex characters in a rendered SHA-256 digest.
pub const HASH_HEX_LEN: usize = 64;

/// Highest difficulty that can ever be satisfied.
pub const MAX_DIFFICULTY: u32 = HASH_HEX_LEN as u32;

struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    // Quotes, backslashes and control characters never reach this method;
    // serde_json escapes those itself.
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            if (ch as u32) < 0x7f {
                continue;
            }
            writer.write_all(fragment[start..i].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = i + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sort_keys(value)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Render any serializable value in canonical form.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)
        .map_err(|e| ChainError::HashComputation(format!("Failed to encode value: {}", e)))?;

    let mut buf = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buf, CanonicalFormatter);
    sort_keys(value)
        .serialize(&mut serializer)
        .map_err(|e| ChainError::HashComputation(format!("Failed to write canonical form: {}", e)))?;

    String::from_utf8(buf)
        .map_err(|e| ChainError::HashComputation(format!("Canonical form is not UTF-8: {}", e)))
}

/// SHA-256 of `bytes` as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Digest of the canonical form of `value`.
pub fn canonical_hash<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(sha256_hex(canonical_json(value)?.as_bytes()))
}

/// True when the first `difficulty` characters of `hash` are all `'0'`.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// Reject difficulties that no digest could ever satisfy.
pub fn check_difficulty(difficulty: u32) -> Result<u32> {
    if difficulty > MAX_DIFFICULTY {
        return Err(ChainError::InvalidDifficulty(difficulty));
    }
    Ok(difficulty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_at_every_level() {
        let value = json!({"b": {"z": 1, "a": [{"y": 2, "x": 3}]}, "a": "first"});
        let encoded = canonical_json(&value).unwrap();
        assert_eq!(encoded, r#"{"a": "first", "b": {"a": [{"x": 3, "y": 2}], "z": 1}}"#);
    }

    #[test]
    fn test_non_ascii_is_escaped() {
        let encoded = canonical_json(&json!({"notes": "café \"rest\" 😷\u{7f}"})).unwrap();
        assert_eq!(
            encoded,
            r#"{"notes": "caf\u00e9 \"rest\" \ud83d\ude37\u007f"}"#
        );
    }

    #[test]
    fn test_empty_collections_and_floats() {
        let encoded = canonical_json(&json!({"items": [], "map": {}, "ts": 1672531200.0})).unwrap();
        assert_eq!(encoded, r#"{"items": [], "map": {}, "ts": 1672531200.0}"#);
    }

    #[test]
    fn test_sha256_hex_is_fixed_width_lowercase() {
        let digest = sha256_hex(b"abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(digest.len(), HASH_HEX_LEN);
    }

    #[test]
    fn test_meets_difficulty() {
        assert!(meets_difficulty("00ab", 0));
        assert!(meets_difficulty("00ab", 2));
        assert!(!meets_difficulty("00ab", 3));
        assert!(!meets_difficulty("0", 2));
    }

    #[test]
    fn test_check_difficulty_bounds() {
        assert_eq!(check_difficulty(64), Ok(64));
        assert_eq!(check_difficulty(65), Err(ChainError::InvalidDifficulty(65)));
    }
}
