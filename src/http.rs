//! HTTP entry point: application state and the router wiring admin
//! routes, the Rate-Limit Gate, and the Proxy Forwarder together.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::balancer::backend::BackendRegistry;
use crate::balancer::Strategy;
use crate::config::ValidatedConfig;
use crate::ratelimit::store::ClientStore;
use crate::ratelimit::Engine;
use crate::{admin, proxy};

/// Shared application state, cloned behind an `Arc` into every handler.
pub struct AppState {
    pub registry: Arc<BackendRegistry>,
    pub strategy: Box<dyn Strategy>,
    pub engine: Arc<Engine>,
    pub store: Arc<dyn ClientStore>,
    pub http_client: reqwest::Client,
    pub forward_timeout: Duration,
}

/// Build the full router: admin CRUD bypasses the gate entirely; every
/// other route passes through the Rate-Limit Gate before reaching the
/// Proxy Forwarder.
pub fn build_router(state: Arc<AppState>) -> Router {
    let admin_routes = Router::new()
        .route("/clients", post(admin::create_client))
        .route("/clients/{id}", get(admin::get_client))
        .route("/clients/{id}", patch(admin::update_client))
        .route("/clients/{id}", delete(admin::delete_client));

    let proxied = Router::new()
        .fallback(proxy::forward)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::ratelimit::gate::rate_limit_gate,
        ));

    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &axum::extract::Request| {
        tracing::info_span!(
            "request",
            request_id = %Uuid::new_v4(),
            method = %request.method(),
            path = %request.uri().path(),
        )
    });

    admin_routes
        .merge(proxied)
        .layer(trace_layer)
        .with_state(state)
}

/// Assemble [`AppState`] from validated configuration.
pub fn build_state(
    config: &ValidatedConfig,
    store: Arc<dyn ClientStore>,
    engine: Arc<Engine>,
) -> Arc<AppState> {
    let registry = Arc::new(BackendRegistry::new(config.backends.clone()));
    let strategy = crate::balancer::build_strategy(&config.strategy);
    let http_client = reqwest::Client::builder()
        .build()
        .expect("failed to build forwarding client");

    Arc::new(AppState {
        registry,
        strategy,
        engine,
        store,
        http_client,
        forward_timeout: crate::constants::DEFAULT_FORWARD_TIMEOUT,
    })
}
