// src/server/proxy.rs

//! The proxy core: upstream fetch, response rewriting, cache population,
//! and cache-hit serving.

use super::state::SharedState;
use crate::core::cache::{CacheService, CachedEntry};
use crate::core::device;
use axum::body::{Body, to_bytes};
use axum::extract::Request;
use axum::http::header::{
    ACCEPT_ENCODING, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, HOST, TRANSFER_ENCODING, VARY,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Upstream round trips slower than this are logged.
const SLOW_ORIGIN_THRESHOLD: Duration = Duration::from_millis(500);

/// Response headers the proxy never forwards.
const SCRUBBED_HEADERS: [&str; 3] = ["via", "server", "x-varnish"];

/// Content types the origin-URL body rewrite applies to. The rewrite is a
/// byte-level substitution and would corrupt binary payloads that happen to
/// contain the origin host bytes.
const REWRITABLE_CONTENT_TYPES: [&str; 3] =
    ["application/json", "application/javascript", "application/xhtml+xml"];

pub const X_CACHE: &str = "x-cache";
pub const X_AGE: &str = "x-age";

/// Entry point from the dispatcher: serve from cache when possible,
/// otherwise fetch from the origin.
pub async fn handle(state: SharedState, request: Request) -> Response {
    if state.config.use_cache
        && matches!(*request.method(), Method::GET | Method::HEAD)
        && state.cache.is_some()
    {
        serve_with_cache(state, request).await
    } else {
        fetch_origin(state, request).await
    }
}

/// The device tag participating in the cache key, when device split is on.
pub fn device_tag(state: &SharedState, headers: &HeaderMap) -> Option<String> {
    if !(state.config.detect_device && state.config.split_cache_by_device) {
        return None;
    }
    headers
        .get(device::DEVICE_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
}

/// The incoming request target as sent by the client (`path?query`).
pub fn request_uri(request: &Request) -> String {
    request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string())
}

/// Attempts a cache read before dispatching upstream.
async fn serve_with_cache(state: SharedState, request: Request) -> Response {
    let Some(cache) = state.cache.clone() else {
        return fetch_origin(state, request).await;
    };
    let origin_url = format!("{}{}", state.config.host_destination, request_uri(&request));
    let tag = device_tag(&state, request.headers());

    let Some(raw) = cache.get(tag.as_deref(), &origin_url).await else {
        debug!("Cache not found for '{}'.", origin_url);
        return fetch_origin(state, request).await;
    };

    match CachedEntry::decode(&raw) {
        Ok(entry) => serve_cached(&state, &cache, tag, origin_url, entry).await,
        Err(e) => {
            warn!("Failed to decode cache entry for '{}': {}", origin_url, e);
            let stale_tag = tag.clone();
            let stale_url = origin_url.clone();
            tokio::spawn(async move {
                cache.remove(stale_tag.as_deref(), &stale_url).await;
            });
            fetch_origin(state, request).await
        }
    }
}

/// Replays a decoded cache entry to the client.
async fn serve_cached(
    state: &SharedState,
    cache: &CacheService,
    tag: Option<String>,
    origin_url: String,
    entry: CachedEntry,
) -> Response {
    let mut headers = HeaderMap::new();
    for (name, values) in &entry.headers {
        let Some(first) = values.first() else { continue };
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(first),
        ) {
            headers.insert(name, value);
        }
    }

    // The age is the configured TTL minus what the store still holds. A
    // negative age means the entry outlives the current configuration, so
    // it is dropped in the background while this response is still served.
    let remaining = cache
        .get_ttl(tag.as_deref(), &origin_url)
        .await
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default();
    let age = state.config.cache_ttl as i64 - remaining;
    if age < 0 {
        let cache = cache.clone();
        tokio::spawn(async move {
            cache.remove(tag.as_deref(), &origin_url).await;
        });
    }

    for name in SCRUBBED_HEADERS {
        headers.remove(name);
    }
    if state.config.enable_gzip {
        headers.remove(ACCEPT_ENCODING);
        headers.remove(VARY);
    }
    headers.insert(X_CACHE, HeaderValue::from_static("HIT"));
    headers.insert(X_AGE, HeaderValue::from(age.max(0)));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(entry.body.len()));

    build_response(StatusCode::OK, headers, entry.body)
}

/// Fetches from the origin, rewrites eligible responses, and schedules the
/// cache populate.
pub async fn fetch_origin(state: SharedState, request: Request) -> Response {
    let method = request.method().clone();
    let uri = request_uri(&request);
    let client_scheme = request
        .uri()
        .scheme_str()
        .unwrap_or("http")
        .to_string();
    let incoming_host = request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let tag = device_tag(&state, request.headers());

    let (parts, body) = request.into_parts();
    let request_body: Bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to read request body: {}", e);
            return (StatusCode::BAD_REQUEST, "Bad Request").into_response();
        }
    };

    // Upstream URL: the origin's scheme and authority, the client's target.
    let mut upstream = state.origin.clone();
    upstream.set_path(parts.uri.path());
    upstream.set_query(parts.uri.query());

    let virtual_host = if state.config.host.is_empty() {
        incoming_host.clone()
    } else {
        state.config.host.clone()
    };

    let mut upstream_headers = parts.headers.clone();
    upstream_headers.remove(ACCEPT_ENCODING);
    upstream_headers.remove(HOST);
    if let Ok(host_value) = HeaderValue::from_str(&virtual_host) {
        upstream_headers.insert(HOST, host_value);
    }

    let started = Instant::now();
    let upstream_response = state
        .http_client
        .request(method.clone(), upstream.as_str())
        .headers(upstream_headers)
        .body(request_body.to_vec())
        .send()
        .await;

    let upstream_response = match upstream_response {
        Ok(response) => response,
        Err(e) => {
            warn!("Upstream fetch failed for '{}': {}", upstream, e);
            return (StatusCode::BAD_GATEWAY, "502 Bad Gateway").into_response();
        }
    };

    let status = upstream_response.status();
    let mut headers = upstream_response.headers().clone();
    let body = match upstream_response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to read upstream body for '{}': {}", upstream, e);
            return (StatusCode::BAD_GATEWAY, "502 Bad Gateway").into_response();
        }
    };

    let elapsed = started.elapsed();
    if elapsed > SLOW_ORIGIN_THRESHOLD {
        warn!("Backend too slow: {:?} for '{}'.", elapsed, uri);
    }

    // The buffered body replaces whatever framing the origin used.
    headers.remove(TRANSFER_ENCODING);

    if status != StatusCode::OK {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        return build_response(status, headers, body.to_vec());
    }

    let body = if is_rewritable(&headers) {
        rewrite_body(&state, &body, &client_scheme, &incoming_host)
    } else {
        body.to_vec()
    };

    headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    for name in SCRUBBED_HEADERS {
        headers.remove(name);
    }
    if state.config.enable_gzip {
        headers.remove(ACCEPT_ENCODING);
        headers.remove(VARY);
    }

    if is_cacheable(&state, &method, &headers) {
        let origin_url = format!("{}{}", state.config.host_destination, uri);
        schedule_populate(&state, tag, origin_url, &headers, body.clone());
        headers.insert(X_CACHE, HeaderValue::from_static("MISS"));
    }

    build_response(status, headers, body)
}

/// Whether this response may be written to the cache.
fn is_cacheable(state: &SharedState, method: &Method, headers: &HeaderMap) -> bool {
    if !state.config.use_cache || state.cache.is_none() {
        return false;
    }
    if !matches!(*method, Method::GET | Method::HEAD) {
        return false;
    }
    let cache_control = headers
        .get(CACHE_CONTROL)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    !cache_control.contains("no-cache") && !cache_control.contains("max-age=0")
}

/// Launches the detached populate task. Its failures are logged, never
/// surfaced to the client.
fn schedule_populate(
    state: &SharedState,
    tag: Option<String>,
    origin_url: String,
    headers: &HeaderMap,
    body: Vec<u8>,
) {
    let Some(cache) = state.cache.clone() else { return };
    let ttl = state.config.cache_ttl_duration();
    let entry = CachedEntry {
        url: origin_url.clone(),
        headers: headers_to_pairs(headers),
        body,
    };
    tokio::spawn(async move {
        match entry.encode() {
            Ok(raw) => {
                debug!("Set new cache '{}'.", origin_url);
                cache.set(tag.as_deref(), &origin_url, raw, ttl).await;
            }
            Err(e) => warn!("Failed to encode cache entry for '{}': {}", origin_url, e),
        }
    });
}

/// Snapshots a header map into the entry codec's ordered multi-map form.
fn headers_to_pairs(headers: &HeaderMap) -> Vec<(String, Vec<String>)> {
    let mut pairs: Vec<(String, Vec<String>)> = Vec::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else { continue };
        match pairs.iter_mut().find(|(existing, _)| existing == name.as_str()) {
            Some((_, values)) => values.push(value.to_string()),
            None => pairs.push((name.as_str().to_string(), vec![value.to_string()])),
        }
    }
    pairs
}

fn is_rewritable(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.starts_with("text/") || REWRITABLE_CONTENT_TYPES.contains(&mime.as_str())
}

/// Rewrites every spelling of the origin in the body to the address the
/// client used to reach the proxy.
fn rewrite_body(
    state: &SharedState,
    body: &[u8],
    client_scheme: &str,
    client_host: &str,
) -> Vec<u8> {
    let client_base = format!("{client_scheme}://{client_host}");
    let replacements = [
        client_base.clone(),
        format!("\"{client_base}"),
        format!("'{client_base}"),
    ];
    state.rewriter.replace_all_bytes(body, &replacements)
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
