//! Admin CRUD handlers for `RateLimitClient` records. These routes
//! bypass the Rate-Limit Gate entirely.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::http::AppState;
use crate::ratelimit::store::RateLimitClient;

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
    pub client_id: String,
    pub capacity: i64,
    pub rate_per_second: i64,
}

#[derive(Debug, Serialize)]
pub struct ClientStatusResponse {
    pub status: &'static str,
    pub client_id: String,
}

/// POST /clients — seeds `tokens = capacity` and `last_refill_at = now`.
pub async fn create_client(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<ClientStatusResponse>), AppError> {
    if req.client_id.is_empty() || req.capacity <= 0 || req.rate_per_second <= 0 {
        return Err(AppError::BadRequest("invalid client data".to_string()));
    }

    let client = RateLimitClient {
        client_id: req.client_id.clone(),
        capacity: req.capacity,
        rate_per_second: req.rate_per_second,
        tokens: req.capacity,
        last_refill_at: now_unix(),
    };
    state.store.create(&client).await?;

    Ok((
        StatusCode::CREATED,
        Json(ClientStatusResponse {
            status: "created",
            client_id: req.client_id,
        }),
    ))
}

/// GET /clients/{id}
pub async fn get_client(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> Result<Json<RateLimitClientResponse>, AppError> {
    let client = state.store.get_by_id(&client_id).await?;
    Ok(Json(RateLimitClientResponse::from(client)))
}

#[derive(Debug, Serialize)]
pub struct RateLimitClientResponse {
    pub client_id: String,
    pub capacity: i64,
    pub rate_per_second: i64,
    pub tokens: i64,
    pub last_refill_at: i64,
}

impl From<RateLimitClient> for RateLimitClientResponse {
    fn from(c: RateLimitClient) -> Self {
        Self {
            client_id: c.client_id,
            capacity: c.capacity,
            rate_per_second: c.rate_per_second,
            tokens: c.tokens,
            last_refill_at: c.last_refill_at,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdateClientRequest {
    pub capacity: Option<i64>,
    pub rate_per_second: Option<i64>,
    pub tokens: Option<i64>,
}

/// PATCH /clients/{id} — partial update; a `tokens` update also refreshes
/// `last_refill_at`. Any mutation evicts the cached entry so the engine
/// reloads it from the store on the next `Allow`.
pub async fn update_client(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
    Json(req): Json<UpdateClientRequest>,
) -> Result<Json<ClientStatusResponse>, AppError> {
    if req.capacity.is_none() && req.rate_per_second.is_none() && req.tokens.is_none() {
        return Err(AppError::BadRequest("no fields to update".to_string()));
    }

    let mut client = state.store.get_by_id(&client_id).await?;

    if let Some(capacity) = req.capacity {
        client.capacity = capacity;
    }
    if let Some(rate) = req.rate_per_second {
        client.rate_per_second = rate;
    }
    if let Some(tokens) = req.tokens {
        client.tokens = tokens;
        client.last_refill_at = now_unix();
    }

    state.store.update(&client).await?;
    state.engine.evict(&client_id).await;

    Ok(Json(ClientStatusResponse {
        status: "updated",
        client_id,
    }))
}

/// DELETE /clients/{id}
pub async fn delete_client(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> Result<Json<ClientStatusResponse>, AppError> {
    state.store.delete(&client_id).await?;
    state.engine.evict(&client_id).await;

    Ok(Json(ClientStatusResponse {
        status: "deleted",
        client_id,
    }))
}
