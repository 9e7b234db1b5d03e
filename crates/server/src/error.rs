use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by either storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Absent, expired or already consumed; callers cannot tell which.
    #[error("record not found")]
    NotFound,
    #[error("storage invariant violated: {0}")]
    InvariantViolation(String),
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound)
    }
}

/// Failures talking to an external collaborator.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{service} did not answer within {timeout:?}")]
    Timeout {
        service: &'static str,
        timeout: Duration,
    },
    #[error("{service} returned HTTP {status}")]
    Status {
        service: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("{service} transport error: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} sent an unusable response: {reason}")]
    InvalidResponse {
        service: &'static str,
        reason: String,
    },
}

impl UpstreamError {
    pub fn from_reqwest(service: &'static str, timeout: Duration, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            UpstreamError::Timeout { service, timeout }
        } else {
            UpstreamError::Transport { service, source }
        }
    }
}

/// Identity verifier outcome other than success.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Account provisioning outcome other than success.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("an account with this identity already exists")]
    Conflict,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Errors surfaced at the HTTP boundary of the signup and consent flows.
///
/// The `Display` text is for logs; the response body only carries the
/// fixed, user-safe message from [`AppError::public_message`].
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::InvariantViolation(_) => StatusCode::CONFLICT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "invalid_request",
            AppError::NotFound => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Upstream(_) => "upstream_unavailable",
            AppError::InvariantViolation(_) => "conflict",
            AppError::Storage(_) => "server_error",
        }
    }

    /// Message safe to show to the end user.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::NotFound => "The requested record does not exist.".to_string(),
            AppError::Conflict(msg) => msg.clone(),
            AppError::Upstream(_) | AppError::Storage(_) | AppError::InvariantViolation(_) => {
                "Something went wrong on our side. Please try again later.".to_string()
            }
        }
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => AppError::NotFound,
            StorageError::InvariantViolation(msg) => AppError::InvariantViolation(msg),
            StorageError::Database(e) => AppError::Storage(e.to_string()),
        }
    }
}

impl From<ProvisionError> for AppError {
    fn from(e: ProvisionError) -> Self {
        match e {
            ProvisionError::Conflict => AppError::Conflict(
                "An account with this email already exists. Please sign in instead.".to_string(),
            ),
            ProvisionError::Upstream(e) => AppError::Upstream(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Upstream(_) | AppError::Storage(_) | AppError::InvariantViolation(_) => {
                tracing::error!(error = %self, "request failed")
            }
            _ => tracing::debug!(error = %self, "request rejected"),
        }
        let body = ErrorBody {
            error: self.code(),
            error_description: Some(self.public_message()),
        };
        (self.status(), Json(body)).into_response()
    }
}
