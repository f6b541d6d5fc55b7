// src/core/cache/entry.rs

//! The binary codec for cached origin responses.

use crate::core::errors::RampartError;
use bincode::{Decode, Encode};

/// A complete origin response captured for replay: the absolute origin URL
/// that produced it, the scrubbed response headers in origin order (name to
/// ordered values), and the rewritten body bytes.
///
/// Entries are encoded with bincode on every backend; a blob written by any
/// other historical codec fails to decode and is treated as a cache miss,
/// with the offending entry evicted.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct CachedEntry {
    pub url: String,
    pub headers: Vec<(String, Vec<String>)>,
    pub body: Vec<u8>,
}

impl CachedEntry {
    pub fn encode(&self) -> Result<Vec<u8>, RampartError> {
        Ok(bincode::encode_to_vec(self, bincode::config::standard())?)
    }

    pub fn decode(raw: &[u8]) -> Result<Self, RampartError> {
        let (entry, _) = bincode::decode_from_slice(raw, bincode::config::standard())?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_codec_blobs_fail_to_decode() {
        // A legacy textual encoding must surface as a codec error, not a panic.
        let legacy = br#"{"url":"https://origin.test/a","headers":{},"data":"aGVsbG8="}"#;
        assert!(CachedEntry::decode(legacy).is_err());
    }

    #[test]
    fn header_order_and_multiplicity_survive_the_codec() {
        let entry = CachedEntry {
            url: "https://origin.test/a".into(),
            headers: vec![
                ("Set-Cookie".into(), vec!["a=1".into(), "b=2".into()]),
                ("Content-Type".into(), vec!["text/html".into()]),
            ],
            body: b"<html/>".to_vec(),
        };
        let decoded = CachedEntry::decode(&entry.encode().unwrap()).unwrap();
        assert_eq!(decoded, entry);
    }
}
