// src/server/middleware/waf.rs

//! Runs every request through the firewall engine before anything else
//! sees it.

use super::client_ip;
use crate::core::waf::THREAT_BODY;
use crate::server::listener::ClientAddr;
use crate::server::state::SharedState;
use axum::body::{Body, to_bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

pub async fn inspect(
    State(state): State<SharedState>,
    ConnectInfo(ClientAddr(peer)): ConnectInfo<ClientAddr>,
    request: Request,
    next: Next,
) -> Response {
    let Some(waf) = &state.waf else {
        return next.run(request).await;
    };

    let (parts, body) = request.into_parts();
    let client = client_ip(&parts.headers, peer);

    if state.config.waf_protect_header {
        let mut values: Vec<String> = parts
            .headers
            .iter()
            .filter_map(|(_, value)| value.to_str().ok().map(str::to_string))
            .collect();
        // The request target is inspected alongside the headers.
        values.push(parts.uri.to_string());
        if waf.inspect_headers(&values) {
            warn!("Firewall rejected request from {} to '{}'.", client, parts.uri);
            return (StatusCode::FORBIDDEN, THREAT_BODY).into_response();
        }
    }

    if state.config.waf_protect_body {
        let bytes = match to_bytes(body, usize::MAX).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to read request body from {}: {}", client, e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error: Internal Server Error",
                )
                    .into_response();
            }
        };
        if waf.inspect_body(&bytes) {
            warn!("Firewall rejected request body from {} to '{}'.", client, parts.uri);
            return (StatusCode::FORBIDDEN, THREAT_BODY).into_response();
        }
        return next.run(Request::from_parts(parts, Body::from(bytes))).await;
    }

    next.run(Request::from_parts(parts, body)).await
}
