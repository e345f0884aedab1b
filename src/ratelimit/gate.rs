//! Rate-Limit Gate: the middleware every non-admin request passes
//! through before reaching the Proxy Forwarder.

use std::sync::Arc;

use axum::extract::State;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::constants::API_KEY_HEADER;
use crate::error::AppError;
use crate::http::AppState;

/// Extracts `X-API-KEY`, calls `Allow`, and either forwards the request
/// or short-circuits with 401/429/500.
pub async fn rate_limit_gate(
    State(state): State<Arc<AppState>>,
    req: axum::extract::Request,
    next: Next,
) -> Response {
    match check(&state, &req).await {
        Ok(()) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

async fn check(state: &AppState, req: &axum::extract::Request) -> Result<(), AppError> {
    let client_id = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(AppError::MissingApiKey(API_KEY_HEADER))?;

    match state.engine.allow(client_id).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(AppError::RateLimited),
        Err(e) => Err(AppError::Engine(e)),
    }
}
