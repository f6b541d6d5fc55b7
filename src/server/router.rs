// src/server/router.rs

//! The single catch-all route and the dispatch order inside it.

use super::listener::ClientAddr;
use super::middleware::{compress, device, ratelimit, waf};
use super::state::SharedState;
use super::{invalidate, proxy};
use axum::Router;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use tracing::info;

/// Builds the router: one fallback handler for every method and path, with
/// the filter chain (WAF, rate limit, compression, device tag) in front.
pub fn build(state: SharedState) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(state.clone())
        // Layers run outermost-last: requests pass the firewall first, then
        // the rate limiter, then compression, then device tagging.
        .layer(from_fn_with_state(state.clone(), device::tag))
        .layer(from_fn_with_state(state.clone(), compress::compress))
        .layer(from_fn_with_state(state.clone(), ratelimit::enforce))
        .layer(from_fn_with_state(state, waf::inspect))
}

async fn dispatch(
    State(state): State<SharedState>,
    ConnectInfo(ClientAddr(peer)): ConnectInfo<ClientAddr>,
    request: Request,
) -> Response {
    let method = request.method().clone();
    if method == Method::GET && request.uri().path() == "/ping" {
        return (StatusCode::OK, "PONG").into_response();
    }

    if state.config.use_cache
        && method
            .as_str()
            .eq_ignore_ascii_case(&state.config.cache_remove_method)
    {
        info!("Clear cache: {}", request.uri());
        return invalidate::clear(state, peer, request).await;
    }

    if is_standard_method(&method) {
        proxy::handle(state, request).await
    } else {
        // Unrecognized verbs that are not the invalidation method.
        (StatusCode::NOT_FOUND, "404 page not found").into_response()
    }
}

fn is_standard_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET
            | Method::HEAD
            | Method::POST
            | Method::PUT
            | Method::PATCH
            | Method::DELETE
            | Method::OPTIONS
            | Method::TRACE
            | Method::CONNECT
    )
}
