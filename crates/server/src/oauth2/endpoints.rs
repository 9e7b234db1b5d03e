//! OAuth2 HTTP endpoints.
//!
//! - `GET/POST /signup` - application registration
//! - `GET/POST /authorize` - consent and login
//! - `GET/POST /token` - authorization-code and refresh-token exchange
//! - `GET /info` - access token introspection

use crate::oauth2::authorize::{
    __path_authorize_page, __path_authorize_submit, authorize_page, authorize_submit,
};
use crate::oauth2::engine::{
    ClientCredentials, ErrorResponse, InfoResponse, TokenParams, TokenResponse,
};
use crate::oauth2::signup::{__path_signup_page, __path_signup_submit, signup_page, signup_submit};
use crate::oauth2::{OAUTH2_TAG, state::OAuth2State};
use axum::{
    Form, Json,
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use utoipa::IntoParams;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Creates the OAuth2 router.
pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(signup_page, signup_submit))
        .routes(routes!(authorize_page, authorize_submit))
        .routes(routes!(token, token_form))
        .routes(routes!(info))
        .with_state(state)
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct InfoParams {
    /// Access token; a Bearer `Authorization` header is used when absent
    pub code: Option<String>,
}

/// Token endpoint, parameters in the query string.
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    get,
    path = "/token",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token",
    summary = "Exchange an authorization code or refresh token for an access token",
    description = "**Supported grant types:**\n\
                   - `authorization_code`: exchange a code for access and refresh tokens\n\
                   - `refresh_token`: obtain a new access token; `scope` may narrow the original\n\n\
                   **Client authentication:** HTTP Basic, or `client_id` and `client_secret` parameters.",
    params(TokenParams),
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "Invalid request, grant or scope", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse),
    )
)]
pub async fn token(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    Query(params): Query<TokenParams>,
) -> Response {
    exchange(&state, &headers, &params).await
}

/// Token endpoint, form-encoded body.
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    post,
    path = "/token",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token Form",
    summary = "Exchange an authorization code or refresh token for an access token",
    request_body(
        content = TokenParams,
        content_type = "application/x-www-form-urlencoded",
        description = "Token request parameters"
    ),
    responses(
        (status = 200, description = "Tokens issued", body = TokenResponse),
        (status = 400, description = "Invalid request, grant or scope", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse),
    )
)]
pub async fn token_form(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    Form(params): Form<TokenParams>,
) -> Response {
    exchange(&state, &headers, &params).await
}

async fn exchange(state: &OAuth2State, headers: &HeaderMap, params: &TokenParams) -> Response {
    let credentials = extract_client_credentials(headers, params);
    match state.engine.handle_access(params, &credentials).await {
        Ok(token) => Json(token).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Token introspection.
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    get,
    path = "/info",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Info",
    summary = "Describe an access token",
    description = "Returns the client, scope and remaining lifetime of a live access token. The token \
                   is read from the `code` query parameter or a Bearer `Authorization` header.",
    params(InfoParams),
    responses(
        (status = 200, description = "Token is live", body = InfoResponse),
        (status = 400, description = "Missing, unknown or expired token", body = ErrorResponse),
    )
)]
pub async fn info(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    Query(params): Query<InfoParams>,
) -> Response {
    let token = params
        .code
        .filter(|c| !c.is_empty())
        .or_else(|| bearer_token(&headers));
    match state.engine.handle_info(token.as_deref()).await {
        Ok(info) => Json(info).into_response(),
        Err(e) => e.into_response(),
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn extract_client_credentials(headers: &HeaderMap, params: &TokenParams) -> ClientCredentials {
    // Try Basic auth first
    if let Some(auth) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        && let Ok(decoded) =
            base64::Engine::decode(&base64::engine::general_purpose::STANDARD, auth)
        && let Ok(creds) = String::from_utf8(decoded)
        && let Some((id, secret)) = creds.split_once(':')
    {
        return ClientCredentials {
            client_id: Some(id.to_string()),
            client_secret: Some(secret.to_string()),
        };
    }

    // Fall back to parameters
    ClientCredentials {
        client_id: params.client_id.clone(),
        client_secret: params.client_secret.clone(),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
}
