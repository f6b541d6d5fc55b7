// tests/key_property_test.rs

//! Property-based coverage of cache key derivation: every input, however
//! hostile, must produce a bounded, filesystem-safe key.

use proptest::prelude::*;
use rampart::core::cache::key::derive_key;

const UNSAFE_CHARS: [char; 10] = ['/', '\\', '?', '*', ':', '<', '>', '|', '"', '&'];

proptest! {
    /// Any input string yields a key of bounded length with no unsafe
    /// character, so a file store can use it verbatim as a file name.
    #[test]
    fn derived_keys_are_safe_and_bounded(input in ".{0,300}") {
        let key = derive_key(None, &input);
        prop_assert!(key.len() <= 160, "key too long: {} chars", key.len());
        for c in key.chars() {
            prop_assert!(!UNSAFE_CHARS.contains(&c), "unsafe char '{c}' in key");
            prop_assert!(!c.is_whitespace(), "whitespace in key");
        }
        prop_assert!(key.starts_with("gowaf-"));
    }

    /// The same holds under a device tag, and tagged keys differ per tag.
    #[test]
    fn device_split_produces_distinct_safe_keys(path in "[a-z0-9/]{1,200}") {
        let url = format!("https://origin.test/{path}");
        let mobile = derive_key(Some("mobile"), &url);
        let desktop = derive_key(Some("desktop"), &url);
        prop_assert_ne!(&mobile, &desktop);
        prop_assert!(mobile.len() <= 160);
        prop_assert!(desktop.len() <= 160);
    }

    /// Derivation is deterministic.
    #[test]
    fn derivation_is_stable(input in ".{0,300}") {
        prop_assert_eq!(derive_key(None, &input), derive_key(None, &input));
    }
}
