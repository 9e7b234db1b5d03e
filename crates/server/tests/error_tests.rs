use axum::http::StatusCode;
use axum::response::IntoResponse;
use coastline::error::{AppError, ProvisionError, StorageError, UpstreamError};
use coastline::oauth2::EngineError;
use coastline::oauth2::engine::ErrorResponse;
use http_body_util::BodyExt;
use serde_json::Value;
use std::time::Duration;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

#[test]
fn test_upstream_error_display() {
    let timeout = UpstreamError::Timeout {
        service: "identity",
        timeout: Duration::from_secs(5),
    };
    assert_eq!(timeout.to_string(), "identity did not answer within 5s");

    let status = UpstreamError::Status {
        service: "provisioning",
        status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
    };
    assert!(status.to_string().contains("HTTP 503"));
}

#[test]
fn test_app_error_status_codes() {
    assert_eq!(
        AppError::Validation("x".into()).status(),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(AppError::NotFound.status(), StatusCode::NOT_FOUND);
    assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
    assert_eq!(
        AppError::Upstream("x".into()).status(),
        StatusCode::BAD_GATEWAY
    );
    assert_eq!(
        AppError::Storage("x".into()).status(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[test]
fn test_storage_error_conversion() {
    assert!(matches!(
        AppError::from(StorageError::NotFound),
        AppError::NotFound
    ));
    assert!(matches!(
        AppError::from(StorageError::InvariantViolation("dup".into())),
        AppError::InvariantViolation(_)
    ));
}

#[test]
fn test_provision_error_conversion() {
    let conflict = AppError::from(ProvisionError::Conflict);
    assert_eq!(conflict.status(), StatusCode::CONFLICT);
    assert!(conflict.public_message().contains("already exists"));

    let outage = AppError::from(ProvisionError::Upstream(UpstreamError::Timeout {
        service: "provisioning",
        timeout: Duration::from_secs(10),
    }));
    assert_eq!(outage.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_internal_details_are_not_exposed() {
    let err = AppError::Storage("connection to 10.1.2.3:5432 refused".into());
    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "server_error");
    assert!(!body.to_string().contains("10.1.2.3"));
}

#[tokio::test]
async fn test_engine_error_responses() {
    let cases = [
        (
            EngineError::InvalidRequest("code is required"),
            StatusCode::BAD_REQUEST,
            "invalid_request",
        ),
        (
            EngineError::InvalidClient,
            StatusCode::UNAUTHORIZED,
            "invalid_client",
        ),
        (
            EngineError::InvalidGrant("authorization code is invalid or expired"),
            StatusCode::BAD_REQUEST,
            "invalid_grant",
        ),
        (
            EngineError::InvalidScope,
            StatusCode::BAD_REQUEST,
            "invalid_scope",
        ),
        (
            EngineError::UnsupportedGrantType,
            StatusCode::BAD_REQUEST,
            "unsupported_grant_type",
        ),
        (
            EngineError::Server("sqlite: disk I/O error".into()),
            StatusCode::INTERNAL_SERVER_ERROR,
            "server_error",
        ),
    ];

    for (err, status, code) in cases {
        let response = err.into_response();
        assert_eq!(response.status(), status);
        let body = body_json(response).await;
        assert_eq!(body["error"], code);
        assert!(!body.to_string().contains("sqlite"));
    }
}

#[test]
fn test_error_response_omits_missing_description() {
    let body = serde_json::to_value(ErrorResponse::from(&EngineError::InvalidClient)).unwrap();
    assert_eq!(body["error"], "invalid_client");
    assert!(body.get("error_description").is_none());
}
