//! Deterministic serialization — the basis of every hash and signature.
//!
//! This module is the crate's single canonicalization routine, shared
//! byte-for-byte between the code that signs (`engine`) and the code that
//! verifies (`signer::verify`). A divergence here breaks every signature in
//! the system, so nothing outside this module is allowed to hand-roll its
//! own serialization of a value destined for a hash or signature.
//!
//! Contract:
//! - object keys are sorted ascending;
//! - strings are Unicode-NFC normalized;
//! - there is no insignificant whitespace;
//! - numbers never use floating point or scientific notation;
//! - `null` fields are omitted from objects;
//! - timestamps are strict `YYYY-MM-DDTHH:MM:SSZ`.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// Recursively drop `null` object fields and NFC-normalize every string leaf.
///
/// Object key order is not touched here: `serde_json::Map` is backed by a
/// `BTreeMap` in this crate (the `preserve_order` feature is never enabled),
/// so ascending key order falls out of serialization for free.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map.iter() {
                if v.is_null() {
                    continue;
                }
                out.insert(k.nfc().collect::<String>(), canonicalize(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        Value::String(s) => Value::String(s.nfc().collect::<String>()),
        other => other.clone(),
    }
}

/// Canonicalize `value` and serialize it to compact UTF-8 bytes with no
/// insignificant whitespace. This is the exact byte sequence that gets
/// hashed or signed.
pub fn to_canonical_bytes(value: &Value) -> Vec<u8> {
    let canon = canonicalize(value);
    serde_json::to_vec(&canon).expect("canonical Value always serializes")
}

/// SHA-256 of `bytes` — the deployment's fixed digest for cell seals,
/// proof-bundle signing input, and the persisted-chain digest.
pub fn sha256_bytes(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Lowercase hex encoding of a SHA-256 digest.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(sha256_bytes(bytes))
}

/// Length-prefix a field (big-endian `u64` length, then raw bytes) and
/// append it to `out`. This is the framing used by [`crate::cell::seal_bytes`]
/// to remove concatenation ambiguity.
pub fn append_length_prefixed(out: &mut Vec<u8>, field: &[u8]) {
    out.extend_from_slice(&(field.len() as u64).to_be_bytes());
    out.extend_from_slice(field);
}

/// Render a timestamp in strict `YYYY-MM-DDTHH:MM:SSZ` form (no fractional
/// seconds, no offset other than `Z`).
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a strict `YYYY-MM-DDTHH:MM:SSZ` timestamp.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let naive = chrono::NaiveDateTime::parse_from_str(s.strip_suffix('Z')?, "%Y-%m-%dT%H:%M:%S").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}
