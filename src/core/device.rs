// src/core/device.rs

//! User-Agent classification for the device-split cache key scheme.

use once_cell::sync::Lazy;
use regex::Regex;

/// Request header carrying the device tag set by the middleware.
pub const DEVICE_HEADER: &str = "x-device";

pub const MOBILE: &str = "mobile";
pub const DESKTOP: &str = "desktop";

static MOBILE_UA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(android|iphone|ipod|ipad|blackberry|iemobile|opera mini|windows phone|mobile)\b")
        .expect("mobile user-agent pattern is valid")
});

/// Classifies a User-Agent string. An empty User-Agent counts as desktop.
pub fn classify(user_agent: &str) -> &'static str {
    if !user_agent.is_empty() && MOBILE_UA.is_match(user_agent) {
        MOBILE
    } else {
        DESKTOP
    }
}
