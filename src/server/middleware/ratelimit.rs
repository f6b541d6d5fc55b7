// src/server/middleware/ratelimit.rs

//! Enforces the per-client request cap ahead of the dispatcher.

use super::client_ip;
use crate::server::listener::ClientAddr;
use crate::server::state::SharedState;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{StatusCode, header::CONTENT_TYPE};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

pub async fn enforce(
    State(state): State<SharedState>,
    ConnectInfo(ClientAddr(peer)): ConnectInfo<ClientAddr>,
    request: Request,
    next: Next,
) -> Response {
    let Some(limiter) = &state.limiter else {
        return next.run(request).await;
    };

    let client = client_ip(request.headers(), peer);
    if limiter.allow(&client).await {
        return next.run(request).await;
    }

    debug!("Rate limit exceeded for {}.", client);
    match tokio::fs::read(&state.config.ratelimit_error_page).await {
        Ok(page) => (
            StatusCode::TOO_MANY_REQUESTS,
            [(CONTENT_TYPE, "text/html")],
            page,
        )
            .into_response(),
        Err(_) => (StatusCode::TOO_MANY_REQUESTS, "429 | Too many request.").into_response(),
    }
}
