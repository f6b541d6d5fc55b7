// src/core/cache/key.rs

//! Derives the bounded, filesystem-safe cache key for an origin URL.
//!
//! The canonical form of a URL is the `url` crate's serialization of its
//! path and query: query parameters keep their insertion order and
//! percent-encoding is normalized, so two requests spell the same key only
//! when they spell the same query.

use tracing::warn;
use url::Url;

/// Every derived key starts with this literal prefix.
pub const KEY_PREFIX: &str = "gowaf-";

/// Keys longer than this are truncated and suffixed with a digest.
const MAX_RAW_KEY_LEN: usize = 100;
const HASH_MARKER: &str = "---md5hash---";

/// Characters unsafe in file names (and `&`), all mapped to `_`.
/// Whitespace is scrubbed separately.
const SCRUB_CHARS: &[char] = &['/', '\\', '?', '*', ':', '<', '>', '|', '"', '&'];

/// Derives the cache key for `url`, optionally scoped to a device tag.
///
/// The result is at most 145 characters (100 + the digest marker + a 32-char
/// hex MD5) and contains no filesystem-unsafe character, so file-backed
/// stores can use it verbatim as a file name.
pub fn derive_key(device_tag: Option<&str>, url: &str) -> String {
    let mut key = String::from(KEY_PREFIX);
    if let Some(tag) = device_tag.filter(|tag| !tag.is_empty()) {
        key.push_str(tag);
        key.push('-');
    }
    key.push_str(&canonical_target(url));
    bound_length(scrub(&key))
}

/// Reduces an absolute URL to its path plus `?query` (when a query is
/// present). A URL that fails to parse is used verbatim; scrubbing still
/// makes the result safe.
fn canonical_target(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(parsed) => {
            let mut target = parsed.path().to_string();
            if let Some(query) = parsed.query().filter(|query| !query.is_empty()) {
                target.push('?');
                target.push_str(query);
            }
            target
        }
        Err(e) => {
            warn!("Cache key input '{}' is not a valid URL ({}); using it verbatim.", raw, e);
            raw.to_string()
        }
    }
}

fn scrub(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_whitespace() || SCRUB_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

fn bound_length(key: String) -> String {
    if key.len() <= MAX_RAW_KEY_LEN {
        return key;
    }
    // Keys can carry multibyte characters from the URL; back the cut up to a
    // character boundary so the split cannot panic.
    let mut cut = MAX_RAW_KEY_LEN;
    while !key.is_char_boundary(cut) {
        cut -= 1;
    }
    let (head, tail) = key.split_at(cut);
    format!("{head}{HASH_MARKER}{:x}", md5::compute(tail.as_bytes()))
}
