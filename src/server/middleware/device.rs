// src/server/middleware/device.rs

//! Tags each request with the device class derived from its User-Agent.

use crate::core::device;
use crate::server::state::SharedState;
use axum::extract::{Request, State};
use axum::http::header::USER_AGENT;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

pub async fn tag(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Response {
    if state.config.detect_device {
        let user_agent = request
            .headers()
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let class = device::classify(user_agent);
        request.headers_mut().insert(
            HeaderName::from_static(device::DEVICE_HEADER),
            HeaderValue::from_static(class),
        );
    }
    next.run(request).await
}
