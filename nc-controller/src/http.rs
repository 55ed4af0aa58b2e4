//! Inbound HTTP server: a single route that accepts both `POST` (peer)
//! and the non-standard `PUSH` (DB-originated) methods and hands the raw
//! request straight to [`nc_core::Controller::act`].
//!
//! `PUSH` is not one of axum's built-in `MethodFilter` verbs, so the
//! route is registered as a catch-all fallback rather than via
//! `axum::routing::post`/`any` — the method itself is read out of the
//! request and passed through unchanged.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::Router;
use nc_core::Controller;
use std::sync::Arc;
use tracing::info;

pub fn router(controller: Arc<Controller>) -> Router {
    Router::new().fallback(handle).with_state(controller)
}

async fn handle(
    State(controller): State<Arc<Controller>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let body = String::from_utf8_lossy(&body).into_owned();
    let cookie = headers
        .get(axum::http::header::COOKIE)
        .and_then(|v| v.to_str().ok());
    let forwarded_for = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok());

    let (status, reply) = controller
        .act(method.as_str(), &body, cookie, forwarded_for)
        .await;
    info!("[NC] {} / -> {status}", method.as_str());

    let mut response_headers = HeaderMap::new();
    if method == Method::POST {
        if let Some(cookie) = cookie.and_then(|c| HeaderValue::from_str(c).ok()) {
            response_headers.insert(axum::http::header::SET_COOKIE, cookie);
        }
    }

    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, response_headers, reply)
}
