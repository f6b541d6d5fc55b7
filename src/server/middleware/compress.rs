// src/server/middleware/compress.rs

//! Gzips responses for clients that accept it, once they clear the
//! configured size floor.

use crate::server::state::SharedState;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use tracing::warn;

/// gzip levels are 0-9; the configured value is clamped into range.
const MAX_GZIP_LEVEL: u32 = 9;

pub async fn compress(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let accepts_gzip = request
        .headers()
        .get(ACCEPT_ENCODING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("gzip"));

    let response = next.run(request).await;
    if !state.config.enable_gzip || !accepts_gzip {
        return response;
    }
    if response.headers().contains_key(CONTENT_ENCODING) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to buffer response for compression: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Error: Internal Server Error")
                .into_response();
        }
    };
    if bytes.len() < state.config.gzip_min_content_length {
        return Response::from_parts(parts, Body::from(bytes));
    }

    let level = state.config.gzip_compression_level.min(MAX_GZIP_LEVEL);
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level));
    if encoder.write_all(&bytes).is_err() {
        return Response::from_parts(parts, Body::from(bytes));
    }
    match encoder.finish() {
        Ok(compressed) => {
            parts
                .headers
                .insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            parts
                .headers
                .insert(CONTENT_LENGTH, HeaderValue::from(compressed.len()));
            Response::from_parts(parts, Body::from(compressed))
        }
        Err(e) => {
            warn!("Compression failed, serving identity response: {}", e);
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}
