//! Health check endpoints.

use crate::oauth2::OAuth2State;
use crate::storage::OAuthStorage;
use axum::{extract::State, http::StatusCode};

/// Tag for OpenAPI documentation.
pub const MISC_TAG: &str = "Miscellaneous";

/// Health check endpoint.
#[tracing::instrument()]
#[utoipa::path(
    method(get, head),
    path = "/healthz",
    tag = MISC_TAG,
    operation_id = "Health Check",
    summary = "Service liveness check",
    description = "Returns a simple status indicating the process is running and accepting requests. \
                   Supports both GET and HEAD.",
    responses(
        (status = 200, description = "Service is alive", body = str, content_type = "text/plain", example = "ok")
    )
)]
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness endpoint; fails while the storage backend is unreachable.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/readyz",
    tag = MISC_TAG,
    operation_id = "Readiness Check",
    summary = "Storage backend readiness",
    responses(
        (status = 200, description = "Storage backend reachable", body = str, content_type = "text/plain", example = "ok"),
        (status = 503, description = "Storage backend unreachable", body = str, content_type = "text/plain")
    )
)]
pub async fn ready(State(state): State<OAuth2State>) -> (StatusCode, &'static str) {
    match state.storage().health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::warn!(error = %e, "storage backend not ready");
            (StatusCode::SERVICE_UNAVAILABLE, "storage unavailable")
        }
    }
}
