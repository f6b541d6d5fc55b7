// src/server/invalidate.rs

//! The privileged invalidation endpoint: removes one cached entry or a
//! prefix-family of entries, gated by a CIDR allow-list.

use super::middleware::client_ip;
use super::proxy::request_uri;
use super::state::SharedState;
use axum::Json;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::net::SocketAddr;
use tracing::warn;
use url::Url;

/// Query parameter selecting prefix removal. It is stripped from the target
/// URL before key derivation.
const PREFIX_PARAM: &str = "is_prefix";

/// Handles an invalidation request (method equality with the configured
/// removal method is checked by the dispatcher).
pub async fn clear(state: SharedState, peer: SocketAddr, request: Request) -> Response {
    let client = client_ip(request.headers(), peer);
    let target = format!("{}{}", state.config.host_destination, request_uri(&request));
    warn!("IP {} (remote {}) trying to clear '{}'.", client, peer, target);

    if !state.allow_ip.contains(&client) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "status": "Bad Request" })),
        )
            .into_response();
    }

    let (target, is_prefix) = strip_prefix_param(&target);
    if let Some(cache) = &state.cache {
        if is_prefix {
            cache.remove_by_prefix(None, &target).await;
        } else {
            cache.remove(None, &target).await;
        }
    }

    (StatusCode::OK, Json(json!({ "status": "OK" }))).into_response()
}

/// Removes `is_prefix` from the target's query string and reports whether it
/// selected prefix removal. An unparsable target is used as-is.
fn strip_prefix_param(raw: &str) -> (String, bool) {
    let Ok(mut url) = Url::parse(raw) else {
        return (raw.to_string(), false);
    };

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let is_prefix = pairs
        .iter()
        .any(|(k, v)| k == PREFIX_PARAM && v.eq_ignore_ascii_case("true"));
    let retained: Vec<&(String, String)> =
        pairs.iter().filter(|(k, _)| k != PREFIX_PARAM).collect();

    if retained.is_empty() {
        url.set_query(None);
    } else {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (k, v) in retained {
            query.append_pair(k, v);
        }
        drop(query);
    }

    (url.to_string(), is_prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_param_is_detected_and_stripped() {
        let (target, is_prefix) =
            strip_prefix_param("https://origin.test/blogs/?is_prefix=true");
        assert_eq!(target, "https://origin.test/blogs/");
        assert!(is_prefix);
    }

    #[test]
    fn other_query_params_survive_the_strip() {
        let (target, is_prefix) =
            strip_prefix_param("https://origin.test/blogs/?page=2&is_prefix=true");
        assert_eq!(target, "https://origin.test/blogs/?page=2");
        assert!(is_prefix);
    }

    #[test]
    fn absent_param_means_single_removal() {
        let (target, is_prefix) = strip_prefix_param("https://origin.test/blogs/post-1");
        assert_eq!(target, "https://origin.test/blogs/post-1");
        assert!(!is_prefix);
    }

    #[test]
    fn non_true_values_do_not_select_prefix_removal() {
        let (target, is_prefix) =
            strip_prefix_param("https://origin.test/blogs/?is_prefix=false");
        assert_eq!(target, "https://origin.test/blogs/");
        assert!(!is_prefix);
    }
}
