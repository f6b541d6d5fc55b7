// src/server/middleware/mod.rs

//! The filter chain applied in front of the dispatcher, in order:
//! WAF, rate limit, response compression, device tag.

pub mod compress;
pub mod device;
pub mod ratelimit;
pub mod waf;

use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Resolves the client address, honoring the usual proxy-client headers
/// before falling back to the peer address.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        && let Some(first) = forwarded
            .split(',')
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    {
        return first.to_string();
    }
    if let Some(real) = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return real.to_string();
    }
    peer.ip().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> SocketAddr {
        "192.0.2.7:4711".parse().unwrap()
    }

    #[test]
    fn forwarded_for_wins_over_the_peer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers, peer()), "203.0.113.9");
    }

    #[test]
    fn real_ip_is_the_second_choice() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.10"));
        assert_eq!(client_ip(&headers, peer()), "203.0.113.10");
    }

    #[test]
    fn peer_address_is_the_fallback() {
        assert_eq!(client_ip(&HeaderMap::new(), peer()), "192.0.2.7");
    }
}
