//! Error types for the proxy's subsystems and their HTTP rendering.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Errors raised by the [`crate::ratelimit::store::ClientStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("client {0:?} not found")]
    NotFound(String),

    #[error("client {0:?} already exists")]
    AlreadyExists(String),

    #[error("update matched no rows for client {0:?}")]
    NoRowsAffected(String),

    #[error("store transport error: {0}")]
    Transport(#[from] rusqlite::Error),
}

/// The JSON envelope every user-visible error response (except the
/// plain-text 502/503 responses inherited from the forwarder) is shaped as.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub code: u16,
    pub message: String,
}

/// Error type returned by Axum handlers; renders as the standard envelope.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("missing {0} header")]
    MissingApiKey(&'static str),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// A rate-limit engine error, including a store-backed cache miss,
    /// surfaced as 500 with the error text embedded — distinct from the
    /// 404 the admin CRUD routes give a genuinely missing client record.
    #[error("{0}")]
    Engine(StoreError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::MissingApiKey(_) => StatusCode::UNAUTHORIZED,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            AppError::Store(StoreError::AlreadyExists(_)) => StatusCode::CONFLICT,
            AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorEnvelope {
            code: status.as_u16(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
