// src/core/waf/mod.rs

//! The request-inspection engine behind the firewall middleware.
//!
//! Detection combines a multi-pattern scan over the configured keyword
//! lists with heuristic patterns for SQL injection and cross-site
//! scripting.

pub mod keywords;

pub use keywords::Keywords;

use crate::core::errors::RampartError;
use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// The body returned to a rejected client.
pub const THREAT_BODY: &str = "Threat Detected";

static SQLI_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bunion\b[\s(]+.*\bselect\b",
        r"(?i)\b(select|insert|update|delete|drop|truncate)\b\s.*\b(from|into|table|where)\b",
        r#"(?i)['"]\s*(or|and)\s+['"]?\d+['"]?\s*=\s*['"]?\d+"#,
        r"(?i)\b(or|and)\s+1\s*=\s*1\b",
        r"(?i);\s*(--|#|/\*)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("SQL injection pattern is valid"))
    .collect()
});

static XSS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)<\s*script\b",
        r"(?i)\bon(error|load|click|mouseover|focus)\s*=",
        r"(?i)javascript\s*:",
        r"(?i)<\s*(iframe|embed|object)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("XSS pattern is valid"))
    .collect()
});

/// Scans header values and body bytes for injection patterns.
pub struct WafService {
    keyword_matcher: Option<AhoCorasick>,
}

impl WafService {
    pub fn new(keywords: Keywords) -> Result<Self, RampartError> {
        let patterns: Vec<&String> = keywords
            .command_injection
            .iter()
            .chain(keywords.path_traversal.iter())
            .collect();
        let keyword_matcher = if patterns.is_empty() {
            None
        } else {
            Some(
                AhoCorasick::new(&patterns)
                    .map_err(|e| RampartError::Config(format!("invalid keyword list: {e}")))?,
            )
        };
        Ok(Self { keyword_matcher })
    }

    /// Returns true when any header value carries a threat.
    pub fn inspect_headers(&self, values: &[String]) -> bool {
        values.iter().any(|value| self.matches(value))
    }

    /// Returns true when the request body carries a threat.
    pub fn inspect_body(&self, body: &[u8]) -> bool {
        self.matches(&String::from_utf8_lossy(body))
    }

    fn matches(&self, value: &str) -> bool {
        if let Some(matcher) = &self.keyword_matcher
            && matcher.is_match(value)
        {
            warn!("Threat detected (keyword match)");
            return true;
        }
        if SQLI_PATTERNS.iter().any(|p| p.is_match(value)) {
            warn!("Threat detected (SQL injection)");
            return true;
        }
        if XSS_PATTERNS.iter().any(|p| p.is_match(value)) {
            warn!("Threat detected (XSS)");
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> WafService {
        WafService::new(Keywords {
            command_injection: vec!["; ls -la".into(), "| cat /etc/passwd".into()],
            path_traversal: vec!["../".into(), "..\\".into()],
        })
        .unwrap()
    }

    #[test]
    fn sql_injection_in_headers_is_flagged() {
        let engine = engine();
        assert!(engine.inspect_headers(&["' OR '1'='1".to_string()]));
        assert!(engine.inspect_headers(&["1 UNION SELECT password FROM users".to_string()]));
    }

    #[test]
    fn xss_in_body_is_flagged() {
        let engine = engine();
        assert!(engine.inspect_body(b"<script>alert(1)</script>"));
        assert!(engine.inspect_body(b"<img src=x onerror=alert(1)>"));
    }

    #[test]
    fn configured_keywords_are_flagged() {
        let engine = engine();
        assert!(engine.inspect_headers(&["/download?f=../../etc/shadow".to_string()]));
        assert!(engine.inspect_body(b"payload; ls -la"));
    }

    #[test]
    fn ordinary_traffic_passes() {
        let engine = engine();
        assert!(!engine.inspect_headers(&[
            "Mozilla/5.0 (X11; Linux x86_64)".to_string(),
            "text/html,application/xhtml+xml".to_string(),
            "/blogs/post-1?page=2".to_string(),
        ]));
        assert!(!engine.inspect_body(b"name=alice&city=select-town"));
    }

    #[test]
    fn empty_keyword_lists_still_run_the_heuristics() {
        let engine = WafService::new(Keywords::default()).unwrap();
        assert!(engine.inspect_body(b"<script>x</script>"));
        assert!(!engine.inspect_body(b"hello world"));
    }
}
