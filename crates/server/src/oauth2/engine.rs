//! Authorization-code and refresh-token protocol handling on top of [`Storage`].
//!
//! The engine parses authorize requests, mints codes once consent is finalized,
//! and serves the token and info exchanges. Internal failures never leave this
//! module with detail attached: they become a bare `server_error`.

use crate::config::OAuth2Config;
use crate::entity::{oauth_access, oauth_authorize, oauth_client};
use crate::error::StorageError;
use crate::oauth2::scope::Scope;
use crate::oauth2::secret::generate_token;
use crate::storage::{OAuthStorage, Storage};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use utoipa::{IntoParams, ToSchema};

/// Protocol errors, rendered as RFC 6749 error bodies.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("client authentication failed")]
    InvalidClient,
    #[error("invalid grant: {0}")]
    InvalidGrant(&'static str),
    #[error("invalid scope")]
    InvalidScope,
    #[error("unsupported grant type")]
    UnsupportedGrantType,
    #[error("unsupported response type")]
    UnsupportedResponseType,
    #[error("access denied")]
    AccessDenied,
    #[error("internal error: {0}")]
    Server(String),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidRequest(_) => "invalid_request",
            EngineError::InvalidClient => "invalid_client",
            EngineError::InvalidGrant(_) => "invalid_grant",
            EngineError::InvalidScope => "invalid_scope",
            EngineError::UnsupportedGrantType => "unsupported_grant_type",
            EngineError::UnsupportedResponseType => "unsupported_response_type",
            EngineError::AccessDenied => "access_denied",
            EngineError::Server(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            EngineError::InvalidClient => StatusCode::UNAUTHORIZED,
            EngineError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    pub fn description(&self) -> Option<String> {
        match self {
            EngineError::InvalidRequest(msg) | EngineError::InvalidGrant(msg) => {
                Some((*msg).to_string())
            }
            EngineError::InvalidScope => {
                Some("The requested scope is invalid, unknown, or empty".to_string())
            }
            EngineError::UnsupportedResponseType => {
                Some("Only 'code' response type is supported".to_string())
            }
            EngineError::AccessDenied => {
                Some("The resource owner denied the request".to_string())
            }
            EngineError::InvalidClient
            | EngineError::UnsupportedGrantType
            | EngineError::Server(_) => None,
        }
    }

    fn storage(e: StorageError, missing: EngineError) -> Self {
        match e {
            StorageError::NotFound => missing,
            other => EngineError::Server(other.to_string()),
        }
    }
}

impl From<getrandom::Error> for EngineError {
    fn from(e: getrandom::Error) -> Self {
        EngineError::Server(format!("random source failed: {e}"))
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl From<&EngineError> for ErrorResponse {
    fn from(e: &EngineError) -> Self {
        ErrorResponse {
            error: e.code().to_string(),
            error_description: e.description(),
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        if let EngineError::Server(detail) = &self {
            tracing::error!(error = %detail, "protocol engine internal error");
        }
        (self.status(), Json(ErrorResponse::from(&self))).into_response()
    }
}

/// Why an authorize request was refused. Errors found before the redirect target is
/// trusted are answered directly; the rest go back to the client.
#[derive(Debug)]
pub enum AuthorizeRejection {
    Direct(EngineError),
    Redirect {
        redirect_uri: String,
        state: Option<String>,
        error: EngineError,
    },
}

impl IntoResponse for AuthorizeRejection {
    fn into_response(self) -> Response {
        match self {
            // Shown to the resource owner, not a client, so no 401 challenge.
            AuthorizeRejection::Direct(error @ EngineError::Server(_)) => error.into_response(),
            AuthorizeRejection::Direct(error) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse::from(&error))).into_response()
            }
            AuthorizeRejection::Redirect {
                redirect_uri,
                state,
                error,
            } => match error_redirect_url(&redirect_uri, state.as_deref(), &error) {
                Ok(location) => Redirect::to(&location).into_response(),
                Err(e) => e.into_response(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeParams {
    /// Must be `code`
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    /// Must equal the registered value when present
    pub redirect_uri: Option<String>,
    /// Comma-separated scope names
    pub scope: Option<String>,
    /// Opaque value echoed back on redirect
    pub state: Option<String>,
}

/// A validated authorize request awaiting the resource owner's decision.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub client: oauth_client::Model,
    pub redirect_uri: String,
    pub scope: Scope,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct TokenParams {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InfoResponse {
    pub client_id: String,
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
}

/// Client credentials presented at the token endpoint.
#[derive(Clone, Default)]
pub struct ClientCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Clone)]
pub struct Engine {
    storage: Storage,
    config: OAuth2Config,
}

impl Engine {
    pub fn new(storage: Storage, config: OAuth2Config) -> Self {
        Self { storage, config }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[tracing::instrument(skip(self))]
    pub async fn parse_authorize(
        &self,
        params: &AuthorizeParams,
    ) -> Result<AuthorizeRequest, AuthorizeRejection> {
        let client_id = params
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(AuthorizeRejection::Direct(EngineError::InvalidRequest(
                "client_id is required",
            )))?;

        let client = self
            .storage
            .get_client(client_id)
            .await
            .map_err(|e| {
                AuthorizeRejection::Direct(EngineError::storage(e, EngineError::InvalidClient))
            })?;

        let redirect_uri = match params.redirect_uri.as_deref() {
            None | Some("") => client.redirect_uri.clone(),
            Some(uri) if client.is_redirect_uri_allowed(uri) => uri.to_string(),
            Some(_) => {
                return Err(AuthorizeRejection::Direct(EngineError::InvalidRequest(
                    "redirect_uri does not match the registered value",
                )));
            }
        };

        let reject = |error| AuthorizeRejection::Redirect {
            redirect_uri: redirect_uri.clone(),
            state: params.state.clone(),
            error,
        };

        if params.response_type.as_deref() != Some("code") {
            return Err(reject(EngineError::UnsupportedResponseType));
        }

        let scope = Scope::parse(params.scope.as_deref().unwrap_or_default());
        if scope.is_empty() {
            return Err(reject(EngineError::InvalidScope));
        }

        Ok(AuthorizeRequest {
            client,
            redirect_uri: redirect_uri.clone(),
            scope,
            state: params.state.clone().filter(|s| !s.is_empty()),
        })
    }

    /// Mint and persist a code for an authorized request; returns the redirect location.
    #[tracing::instrument(skip(self, request), fields(client_id = %request.client.id))]
    pub async fn finish_authorize(
        &self,
        request: &AuthorizeRequest,
        user_id: &str,
    ) -> Result<String, EngineError> {
        let now = OffsetDateTime::now_utc();
        let grant = oauth_authorize::Model {
            code: generate_token()?,
            client_id: request.client.id.clone(),
            user_id: user_id.to_string(),
            scope: request.scope.to_string(),
            redirect_uri: request.redirect_uri.clone(),
            state: request.state.clone(),
            expires_at: now + Duration::seconds(self.config.authorization_lifetime),
            created_at: now,
        };
        self.storage
            .save_authorization_grant(&grant)
            .await
            .map_err(|e| EngineError::Server(e.to_string()))?;
        tracing::info!("authorization code issued");

        let mut location = url::Url::parse(&request.redirect_uri)
            .map_err(|e| EngineError::Server(format!("stored redirect_uri unusable: {e}")))?;
        location.query_pairs_mut().append_pair("code", &grant.code);
        if let Some(state) = &request.state {
            location.query_pairs_mut().append_pair("state", state);
        }
        Ok(location.to_string())
    }

    /// Redirect location for a declined request. Never touches storage.
    pub fn deny_authorize(&self, request: &AuthorizeRequest) -> Result<String, EngineError> {
        error_redirect_url(
            &request.redirect_uri,
            request.state.as_deref(),
            &EngineError::AccessDenied,
        )
    }

    #[tracing::instrument(skip_all, fields(grant_type = ?params.grant_type))]
    pub async fn handle_access(
        &self,
        params: &TokenParams,
        credentials: &ClientCredentials,
    ) -> Result<TokenResponse, EngineError> {
        let client = self.authenticate_client(credentials).await?;
        match params.grant_type.as_deref() {
            Some("authorization_code") => self.exchange_code(&client, params).await,
            Some("refresh_token") => self.exchange_refresh(&client, params).await,
            None | Some("") => Err(EngineError::InvalidRequest("grant_type is required")),
            Some(_) => Err(EngineError::UnsupportedGrantType),
        }
    }

    #[tracing::instrument(skip_all)]
    pub async fn handle_info(&self, token: Option<&str>) -> Result<InfoResponse, EngineError> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(EngineError::InvalidRequest("access token is required"))?;
        let access = self
            .storage
            .load_access_token(token)
            .await
            .map_err(|e| {
                EngineError::storage(e, EngineError::InvalidGrant("unknown or expired token"))
            })?;
        Ok(InfoResponse {
            client_id: access.client_id.clone(),
            access_token: access.access_token.clone(),
            token_type: "Bearer".to_string(),
            expires_in: access.expires_in(),
            scope: access.scope().to_string(),
        })
    }

    async fn authenticate_client(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<oauth_client::Model, EngineError> {
        let client_id = credentials
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(EngineError::InvalidClient)?;
        let client = self
            .storage
            .get_client(client_id)
            .await
            .map_err(|e| EngineError::storage(e, EngineError::InvalidClient))?;
        let secret = credentials.client_secret.as_deref().unwrap_or_default();
        if !client.secret_matches(secret) {
            tracing::warn!(client_id, "client secret mismatch");
            return Err(EngineError::InvalidClient);
        }
        Ok(client)
    }

    async fn exchange_code(
        &self,
        client: &oauth_client::Model,
        params: &TokenParams,
    ) -> Result<TokenResponse, EngineError> {
        const BAD_CODE: EngineError =
            EngineError::InvalidGrant("authorization code is invalid or expired");

        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(EngineError::InvalidRequest("code is required"))?;

        let grant = self
            .storage
            .load_authorization_grant(code)
            .await
            .map_err(|e| EngineError::storage(e, BAD_CODE))?;
        if grant.client_id != client.id {
            return Err(EngineError::InvalidGrant(
                "authorization code was issued to another client",
            ));
        }

        // An absent redirect_uri stands for the client's registered one; either way it
        // must still be the client's and the one the code was issued for.
        let redirect_uri = params
            .redirect_uri
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(&client.redirect_uri);
        if !client.is_redirect_uri_allowed(redirect_uri) || redirect_uri != grant.redirect_uri {
            return Err(EngineError::InvalidGrant("redirect_uri mismatch"));
        }

        // Losing a concurrent redemption shows up as NotFound here.
        let grant = self
            .storage
            .take_authorization_grant(code)
            .await
            .map_err(|e| EngineError::storage(e, BAD_CODE))?;

        self.issue(client, &grant.user_id, grant.scope()).await
    }

    async fn exchange_refresh(
        &self,
        client: &oauth_client::Model,
        params: &TokenParams,
    ) -> Result<TokenResponse, EngineError> {
        const BAD_REFRESH: EngineError =
            EngineError::InvalidGrant("refresh token is invalid or expired");

        let refresh = params
            .refresh_token
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or(EngineError::InvalidRequest("refresh_token is required"))?;

        let previous = self
            .storage
            .load_by_refresh_token(refresh)
            .await
            .map_err(|e| EngineError::storage(e, BAD_REFRESH))?;
        if previous.client_id != client.id {
            return Err(EngineError::InvalidGrant(
                "refresh token was issued to another client",
            ));
        }

        let original = previous.scope();
        let scope = match params.scope.as_deref().filter(|s| !s.is_empty()) {
            Some(raw) => {
                let requested = Scope::parse(raw);
                if requested.is_empty() || !requested.is_subset_of(&original) {
                    return Err(EngineError::InvalidScope);
                }
                requested
            }
            None => original,
        };

        // Clearing first claims the refresh value; a concurrent exchange gets NotFound.
        self.storage
            .clear_refresh_association(refresh)
            .await
            .map_err(|e| EngineError::storage(e, BAD_REFRESH))?;

        match self.issue(client, &previous.user_id, scope).await {
            Ok(token) => Ok(token),
            Err(e) => {
                // Hand the refresh token back so the client can retry.
                if let Err(restore) = self.storage.save_access_token(&previous).await {
                    tracing::error!(
                        client_id = %client.id,
                        error = %restore,
                        "refresh token spent without a replacement"
                    );
                }
                Err(e)
            }
        }
    }

    async fn issue(
        &self,
        client: &oauth_client::Model,
        user_id: &str,
        scope: Scope,
    ) -> Result<TokenResponse, EngineError> {
        let now = OffsetDateTime::now_utc();
        let token = oauth_access::Model {
            access_token: generate_token()?,
            refresh_token: Some(generate_token()?),
            client_id: client.id.clone(),
            user_id: user_id.to_string(),
            scope: scope.to_string(),
            expires_at: now + Duration::seconds(self.config.access_token_lifetime),
            refresh_expires_at: Some(now + Duration::seconds(self.config.refresh_token_lifetime)),
            created_at: now,
        };
        self.storage
            .save_access_token(&token)
            .await
            .map_err(|e| EngineError::Server(e.to_string()))?;
        tracing::info!(client_id = %client.id, "access token issued");

        Ok(TokenResponse {
            expires_in: self.config.access_token_lifetime,
            access_token: token.access_token,
            token_type: "Bearer".to_string(),
            refresh_token: token.refresh_token,
            scope: token.scope,
        })
    }
}

/// `redirect_uri?error=..[&error_description=..][&state=..]`
pub fn error_redirect_url(
    redirect_uri: &str,
    state: Option<&str>,
    error: &EngineError,
) -> Result<String, EngineError> {
    let mut location = url::Url::parse(redirect_uri)
        .map_err(|e| EngineError::Server(format!("redirect_uri unusable: {e}")))?;
    location.query_pairs_mut().append_pair("error", error.code());
    if let Some(description) = error.description() {
        location
            .query_pairs_mut()
            .append_pair("error_description", &description);
    }
    if let Some(state) = state {
        location.query_pairs_mut().append_pair("state", state);
    }
    Ok(location.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CacheStorage;

    const REDIRECT: &str = "http://localhost/cb";

    async fn engine_with_client() -> Engine {
        let storage = Storage::Ephemeral(CacheStorage::default());
        let client = oauth_client::Model {
            id: "dev-1".into(),
            secret: "s3cret".into(),
            redirect_uri: REDIRECT.into(),
            name: "app".into(),
            created_at: OffsetDateTime::now_utc(),
        };
        storage.set_client("dev-1", &client).await.unwrap();
        Engine::new(storage, OAuth2Config::default())
    }

    fn authorize_params(scope: &str) -> AuthorizeParams {
        AuthorizeParams {
            response_type: Some("code".into()),
            client_id: Some("dev-1".into()),
            redirect_uri: Some(REDIRECT.into()),
            scope: Some(scope.into()),
            state: Some("xyz".into()),
        }
    }

    fn creds() -> ClientCredentials {
        ClientCredentials {
            client_id: Some("dev-1".into()),
            client_secret: Some("s3cret".into()),
        }
    }

    fn code_from(location: &str) -> String {
        url::Url::parse(location)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[tokio::test]
    async fn test_parse_authorize_defaults_redirect_and_canonicalizes_scope() {
        let engine = engine_with_client().await;
        let mut params = authorize_params("upload,,view,upload");
        params.redirect_uri = None;
        let request = engine.parse_authorize(&params).await.unwrap();
        assert_eq!(request.redirect_uri, REDIRECT);
        assert_eq!(request.scope.to_string(), "upload,view");
    }

    #[tokio::test]
    async fn test_parse_authorize_rejects_foreign_redirect_directly() {
        let engine = engine_with_client().await;
        let mut params = authorize_params("view");
        params.redirect_uri = Some("http://evil.example/cb".into());
        let rejection = engine.parse_authorize(&params).await.unwrap_err();
        assert!(matches!(
            rejection,
            AuthorizeRejection::Direct(EngineError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_parse_authorize_unknown_client() {
        let engine = engine_with_client().await;
        let mut params = authorize_params("view");
        params.client_id = Some("nobody".into());
        let rejection = engine.parse_authorize(&params).await.unwrap_err();
        assert!(matches!(
            rejection,
            AuthorizeRejection::Direct(EngineError::InvalidClient)
        ));
    }

    #[tokio::test]
    async fn test_parse_authorize_empty_scope_redirects_with_error() {
        let engine = engine_with_client().await;
        let rejection = engine
            .parse_authorize(&authorize_params("admin,,"))
            .await
            .unwrap_err();
        match rejection {
            AuthorizeRejection::Redirect { error, state, .. } => {
                assert!(matches!(error, EngineError::InvalidScope));
                assert_eq!(state.as_deref(), Some("xyz"));
            }
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_code_exchange_is_single_use() {
        let engine = engine_with_client().await;
        let request = engine
            .parse_authorize(&authorize_params("view,upload"))
            .await
            .unwrap();
        let location = engine.finish_authorize(&request, "owner-1").await.unwrap();
        assert!(location.contains("state=xyz"));

        let params = TokenParams {
            grant_type: Some("authorization_code".into()),
            code: Some(code_from(&location)),
            redirect_uri: Some(REDIRECT.into()),
            ..Default::default()
        };
        let token = engine.handle_access(&params, &creds()).await.unwrap();
        assert_eq!(token.scope, "view,upload");
        assert_eq!(token.token_type, "Bearer");

        let again = engine.handle_access(&params, &creds()).await.unwrap_err();
        assert!(matches!(again, EngineError::InvalidGrant(_)));
    }

    #[tokio::test]
    async fn test_wrong_secret_is_invalid_client() {
        let engine = engine_with_client().await;
        let params = TokenParams {
            grant_type: Some("authorization_code".into()),
            code: Some("whatever".into()),
            ..Default::default()
        };
        let bad = ClientCredentials {
            client_id: Some("dev-1".into()),
            client_secret: Some("nope".into()),
        };
        let err = engine.handle_access(&params, &bad).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidClient));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_narrows_scope_and_severs_old_refresh() {
        let engine = engine_with_client().await;
        let request = engine
            .parse_authorize(&authorize_params("view,upload"))
            .await
            .unwrap();
        let location = engine.finish_authorize(&request, "owner-1").await.unwrap();
        let first = engine
            .handle_access(
                &TokenParams {
                    grant_type: Some("authorization_code".into()),
                    code: Some(code_from(&location)),
                    ..Default::default()
                },
                &creds(),
            )
            .await
            .unwrap();
        let old_refresh = first.refresh_token.clone().unwrap();

        let widen = TokenParams {
            grant_type: Some("refresh_token".into()),
            refresh_token: Some(old_refresh.clone()),
            scope: Some("view,note".into()),
            ..Default::default()
        };
        assert!(matches!(
            engine.handle_access(&widen, &creds()).await.unwrap_err(),
            EngineError::InvalidScope
        ));

        let narrow = TokenParams {
            scope: Some("view".into()),
            ..widen
        };
        let second = engine.handle_access(&narrow, &creds()).await.unwrap();
        assert_eq!(second.scope, "view");
        assert_ne!(second.access_token, first.access_token);

        // Old access token survives, old refresh is spent.
        assert!(engine.handle_info(Some(&first.access_token)).await.is_ok());
        assert!(matches!(
            engine.handle_access(&narrow, &creds()).await.unwrap_err(),
            EngineError::InvalidGrant(_)
        ));
    }

    #[tokio::test]
    async fn test_code_bound_to_other_redirect_is_rejected_without_param() {
        let engine = engine_with_client().await;
        let now = OffsetDateTime::now_utc();
        let grant = oauth_authorize::Model {
            code: "c1".into(),
            client_id: "dev-1".into(),
            user_id: "owner-1".into(),
            scope: "view".into(),
            redirect_uri: "http://evil.example/cb".into(),
            state: None,
            expires_at: now + Duration::minutes(5),
            created_at: now,
        };
        engine
            .storage()
            .save_authorization_grant(&grant)
            .await
            .unwrap();

        let params = TokenParams {
            grant_type: Some("authorization_code".into()),
            code: Some("c1".into()),
            ..Default::default()
        };
        assert!(matches!(
            engine.handle_access(&params, &creds()).await.unwrap_err(),
            EngineError::InvalidGrant(_)
        ));

        // Naming the grant's redirect does not help either: it is not the client's.
        let named = TokenParams {
            redirect_uri: Some("http://evil.example/cb".into()),
            ..params
        };
        assert!(engine.handle_access(&named, &creds()).await.is_err());
        // A rejected exchange leaves the code in place.
        assert!(engine.storage().load_authorization_grant("c1").await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_refresh_issue_keeps_refresh_token() {
        use crate::storage::DbStorage;
        use migration::MigratorTrait;
        use sea_orm::{ConnectionTrait, Database};
        use std::sync::Arc;

        let db = Arc::new(Database::connect("sqlite::memory:").await.unwrap());
        migration::Migrator::up(db.as_ref(), None).await.unwrap();
        let storage = Storage::Durable(DbStorage::new(db.clone()));
        let now = OffsetDateTime::now_utc();
        storage
            .set_client(
                "dev-1",
                &oauth_client::Model {
                    id: "dev-1".into(),
                    secret: "s3cret".into(),
                    redirect_uri: REDIRECT.into(),
                    name: "app".into(),
                    created_at: now,
                },
            )
            .await
            .unwrap();
        storage
            .save_access_token(&oauth_access::Model {
                access_token: "at-1".into(),
                refresh_token: Some("rt-1".into()),
                client_id: "dev-1".into(),
                user_id: "owner-1".into(),
                scope: "view".into(),
                expires_at: now + Duration::hours(1),
                refresh_expires_at: Some(now + Duration::days(1)),
                created_at: now,
            })
            .await
            .unwrap();
        // Any new token row fails to insert.
        db.execute_unprepared(
            "CREATE TRIGGER reject_new_tokens BEFORE INSERT ON oauth_access \
             WHEN NEW.access_token <> 'at-1' \
             BEGIN SELECT RAISE(ABORT, 'disk full'); END",
        )
        .await
        .unwrap();

        let engine = Engine::new(storage.clone(), OAuth2Config::default());
        let params = TokenParams {
            grant_type: Some("refresh_token".into()),
            refresh_token: Some("rt-1".into()),
            ..Default::default()
        };
        let err = engine.handle_access(&params, &creds()).await.unwrap_err();
        assert!(matches!(err, EngineError::Server(_)));

        let kept = storage.load_by_refresh_token("rt-1").await.unwrap();
        assert_eq!(kept.access_token, "at-1");
    }

    #[tokio::test]
    async fn test_unsupported_grant_type() {
        let engine = engine_with_client().await;
        let params = TokenParams {
            grant_type: Some("password".into()),
            ..Default::default()
        };
        assert!(matches!(
            engine.handle_access(&params, &creds()).await.unwrap_err(),
            EngineError::UnsupportedGrantType
        ));
    }

    #[test]
    fn test_server_error_has_no_description() {
        let err = EngineError::Server("db exploded at row 7".into());
        let body = ErrorResponse::from(&err);
        assert_eq!(body.error, "server_error");
        assert!(body.error_description.is_none());
    }

    #[test]
    fn test_error_redirect_url_carries_state() {
        let location =
            error_redirect_url(REDIRECT, Some("xyz"), &EngineError::AccessDenied).unwrap();
        assert!(location.starts_with("http://localhost/cb?error=access_denied"));
        assert!(location.ends_with("state=xyz"));
    }
}
