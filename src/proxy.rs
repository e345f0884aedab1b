//! Proxy forwarder: selects a backend via the configured strategy and
//! forwards the request to it, streaming the response back unchanged
//! apart from hop-by-hop headers.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{debug, error, warn};

use crate::balancer::backend::Backend;
use crate::http::AppState;

/// Forward an incoming request to a backend chosen by the configured
/// strategy. There is no retry against a different backend on failure;
/// a transport error marks the chosen backend unavailable and returns 502.
pub async fn forward(
    State(state): State<Arc<AppState>>,
    req: axum::extract::Request,
) -> Response {
    let Some(backend) = state.strategy.next(&state.registry) else {
        warn!("no backend available to forward to");
        return (StatusCode::SERVICE_UNAVAILABLE, "All backends are unavailable").into_response();
    };

    match forward_to(&state.http_client, &backend, req, state.forward_timeout).await {
        Ok(response) => response,
        Err(e) => {
            backend.set_available(false);
            error!(backend = %backend.url(), error = %e, "backend request failed, marking unavailable");
            (StatusCode::BAD_GATEWAY, format!("Backend error: {e}")).into_response()
        }
    }
}

async fn forward_to(
    client: &reqwest::Client,
    backend: &Backend,
    req: axum::extract::Request,
    timeout: Duration,
) -> Result<Response, reqwest::Error> {
    let method = req.method().clone();
    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let base = backend.url().as_str().trim_end_matches('/');
    let target = format!("{base}{path_and_query}");

    let request_headers = strip_hop_by_hop(req.headers());
    let body_bytes = axum::body::to_bytes(req.into_body(), usize::MAX)
        .await
        .unwrap_or_else(|_| Bytes::new());

    debug!(method = %method, url = %target, "forwarding request");

    let reqwest_method = reqwest::Method::from_bytes(method.as_str().as_bytes())
        .unwrap_or(reqwest::Method::GET);

    let mut builder = client
        .request(reqwest_method, target)
        .timeout(timeout)
        .headers(request_headers);

    if !body_bytes.is_empty() {
        builder = builder.body(body_bytes.to_vec());
    }

    let upstream_response = builder.send().await?;

    let status = upstream_response.status();
    let response_headers = strip_hop_by_hop(upstream_response.headers());
    let body = upstream_response.bytes().await?;

    let mut response = Response::builder().status(status.as_u16());
    for (name, value) in response_headers.iter() {
        response = response.header(name, value);
    }
    Ok(response.body(axum::body::Body::from(body)).unwrap())
}

/// Strip headers that are connection-scoped and must not be forwarded.
fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if !is_hop_by_hop_header(name.as_str()) {
            out.insert(name.clone(), value.clone());
        }
    }
    out
}

fn is_hop_by_hop_header(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_by_hop_headers_are_recognized() {
        assert!(is_hop_by_hop_header("Connection"));
        assert!(is_hop_by_hop_header("keep-alive"));
        assert!(is_hop_by_hop_header("Transfer-Encoding"));
        assert!(!is_hop_by_hop_header("content-type"));
        assert!(!is_hop_by_hop_header("x-api-key"));
    }
}
