//! Application registration.
//!
//! A signup provisions the developer's platform account, stores a client keyed by the
//! new account id and seeds an authorization grant over the full scope catalog so the
//! developer can exchange a code for a token on their own account right away.

use crate::client::NewAccount;
use crate::entity::{oauth_authorize, oauth_client};
use crate::error::{AppError, ProvisionError, UpstreamError};
use crate::oauth2::authorize::ScopeView;
use crate::oauth2::engine::ErrorResponse;
use crate::oauth2::scope::{Scope, ScopeName};
use crate::oauth2::secret::{derive_client_secret, generate_token};
use crate::oauth2::{OAUTH2_TAG, state::OAuth2State};
use crate::storage::OAuthStorage;
use askama::Template;
use axum::{
    Form, Json,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use utoipa::ToSchema;

#[derive(Template)]
#[template(path = "signup.html")]
struct SignupTemplate {
    scopes: Vec<ScopeView>,
}

#[derive(Clone, Default, Deserialize, ToSchema)]
pub struct SignupForm {
    /// Application name
    #[serde(default, alias = "usr_name")]
    pub name: String,
    #[serde(default, alias = "uri")]
    pub redirect_uri: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    /// Checked against `password` when submitted
    #[serde(default)]
    pub password_confirm: Option<String>,
}

impl std::fmt::Debug for SignupForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupForm")
            .field("name", &self.name)
            .field("redirect_uri", &self.redirect_uri)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SignupResponse {
    pub client_id: String,
    pub client_secret: String,
    /// Seed authorization code, exchangeable at the token endpoint
    pub code: String,
    pub scope: String,
    pub redirect_uri: String,
    /// Seconds until the seed code expires
    pub expires_in: i64,
}

impl SignupForm {
    /// Trimmed copy, or the first problem found. Nothing is written before this passes.
    pub fn validate(&self) -> Result<SignupForm, AppError> {
        let name = self.name.trim();
        let redirect_uri = self.redirect_uri.trim();
        let email = self.email.trim().to_lowercase();

        if name.is_empty() {
            return Err(AppError::Validation("Application name is required".into()));
        }
        if redirect_uri.is_empty() {
            return Err(AppError::Validation("Redirect URI is required".into()));
        }
        match url::Url::parse(redirect_uri) {
            Ok(uri) if uri.fragment().is_none() && !uri.cannot_be_a_base() => {}
            _ => {
                return Err(AppError::Validation(
                    "Redirect URI must be an absolute URI without a fragment".into(),
                ));
            }
        }
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::Validation(
                "Please enter a valid email address".into(),
            ));
        }
        if self.password.is_empty() {
            return Err(AppError::Validation("Password is required".into()));
        }
        if let Some(confirm) = &self.password_confirm
            && confirm != &self.password
        {
            return Err(AppError::Validation("Passwords do not match".into()));
        }

        Ok(SignupForm {
            name: name.to_string(),
            redirect_uri: redirect_uri.to_string(),
            email,
            password: self.password.clone(),
            password_confirm: None,
        })
    }
}

/// Provision, then persist the client and its seed grant.
#[tracing::instrument(skip(state, form), fields(email = %form.email))]
pub async fn register_application(
    state: &OAuth2State,
    form: &SignupForm,
) -> Result<SignupResponse, AppError> {
    let form = form.validate()?;

    let account = NewAccount {
        username: form.email.clone(),
        password: form.password.clone(),
        emails: vec![form.email.clone()],
    };
    let timeout = state.upstream_timeout;
    let developer_id = match tokio::time::timeout(timeout, state.provisioner.provision(&account))
        .await
    {
        Ok(result) => result?,
        Err(_) => {
            return Err(ProvisionError::Upstream(UpstreamError::Timeout {
                service: "provisioning",
                timeout,
            })
            .into());
        }
    };

    let now = OffsetDateTime::now_utc();
    let client = oauth_client::Model {
        id: developer_id.clone(),
        secret: derive_client_secret(&developer_id, &form.redirect_uri, now),
        redirect_uri: form.redirect_uri.clone(),
        name: form.name.clone(),
        created_at: now,
    };
    let lifetime = Duration::days(state.config.expire_days);
    let grant = oauth_authorize::Model {
        code: generate_token()
            .map_err(|e| AppError::Storage(format!("random source failed: {e}")))?,
        client_id: client.id.clone(),
        user_id: developer_id.clone(),
        scope: Scope::full().to_string(),
        redirect_uri: client.redirect_uri.clone(),
        state: None,
        expires_at: now + lifetime,
        created_at: now,
    };

    // The grant goes first: without its client it can never be redeemed, whereas a
    // client whose secret never reached the developer would be unusable.
    state.storage().save_authorization_grant(&grant).await?;
    if let Err(e) = state.storage().set_client(&client.id, &client).await {
        if let Err(cleanup) = state.storage().remove_authorization_grant(&grant.code).await {
            tracing::warn!(error = %cleanup, "could not remove orphaned seed grant");
        }
        return Err(e.into());
    }

    tracing::info!(client_id = %client.id, "application registered");

    Ok(SignupResponse {
        client_id: client.id,
        client_secret: client.secret,
        code: grant.code,
        scope: grant.scope,
        redirect_uri: grant.redirect_uri,
        expires_in: lifetime.whole_seconds(),
    })
}

/// Render the registration form.
#[utoipa::path(
    get,
    path = "/signup",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Signup Page",
    summary = "Show the application registration form",
    responses(
        (status = 200, description = "Registration form", content_type = "text/html"),
    )
)]
pub async fn signup_page() -> Response {
    let template = SignupTemplate {
        scopes: ScopeName::CATALOG
            .iter()
            .map(|s| ScopeView {
                name: s.as_str(),
                description: s.description(),
            })
            .collect(),
    };
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("Failed to render signup template: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

/// Register an application.
#[tracing::instrument(skip(state, form))]
#[utoipa::path(
    post,
    path = "/signup",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Signup",
    summary = "Register an application and its developer account",
    description = "Creates the developer account with the provisioning service, then registers a \
                   client whose id is the new account id. The response carries the client secret \
                   (shown only once) and a seed authorization code covering every scope.",
    request_body(
        content = SignupForm,
        content_type = "application/x-www-form-urlencoded",
        description = "Application and developer account details"
    ),
    responses(
        (status = 201, description = "Application registered", body = SignupResponse),
        (status = 400, description = "Missing or malformed fields", body = ErrorResponse),
        (status = 409, description = "An account with this email already exists", body = ErrorResponse),
        (status = 502, description = "A platform service is unavailable", body = ErrorResponse),
    )
)]
pub async fn signup_submit(
    State(state): State<OAuth2State>,
    Form(form): Form<SignupForm>,
) -> Result<(StatusCode, Json<SignupResponse>), AppError> {
    let registered = register_application(&state, &form).await?;
    Ok((StatusCode::CREATED, Json(registered)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> SignupForm {
        SignupForm {
            name: "dev1".into(),
            redirect_uri: "http://localhost/cb".into(),
            email: "Dev1@X.com ".into(),
            password: "pw1".into(),
            password_confirm: Some("pw1".into()),
        }
    }

    mod persistence {
        use super::*;
        use crate::client::{AccessControl, AccountProvisioner, IdentityVerifier};
        use crate::config::OAuth2Config;
        use crate::error::{IdentityError, UpstreamError};
        use crate::storage::{DbStorage, Storage};
        use migration::MigratorTrait;
        use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait};
        use std::collections::BTreeSet;
        use std::sync::Arc;

        struct Platform;

        #[async_trait::async_trait]
        impl AccountProvisioner for Platform {
            async fn provision(&self, _: &NewAccount) -> Result<String, ProvisionError> {
                Ok("dev-1".into())
            }
        }

        #[async_trait::async_trait]
        impl IdentityVerifier for Platform {
            async fn authenticate(&self, _: &str, _: &str) -> Result<String, IdentityError> {
                Ok("dev-1".into())
            }
        }

        #[async_trait::async_trait]
        impl AccessControl for Platform {
            async fn set_permissions(
                &self,
                _: &str,
                _: &str,
                permissions: &BTreeSet<ScopeName>,
            ) -> Result<BTreeSet<ScopeName>, UpstreamError> {
                Ok(permissions.clone())
            }
        }

        /// A migrated in-memory database on which inserts into `table` fail.
        async fn failing_inserts(table: &str) -> (OAuth2State, Arc<DatabaseConnection>) {
            let db = Arc::new(Database::connect("sqlite::memory:").await.unwrap());
            migration::Migrator::up(db.as_ref(), None).await.unwrap();
            db.execute_unprepared(&format!(
                "CREATE TRIGGER reject_inserts BEFORE INSERT ON {table} \
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END"
            ))
            .await
            .unwrap();
            let platform = Arc::new(Platform);
            let state = OAuth2State::new(
                Storage::Durable(DbStorage::new(db.clone())),
                OAuth2Config::default(),
                platform.clone(),
                platform.clone(),
                platform,
                std::time::Duration::from_secs(5),
            );
            (state, db)
        }

        #[tokio::test]
        async fn test_client_write_failure_leaves_no_grant() {
            let (state, db) = failing_inserts("oauth_client").await;
            let err = register_application(&state, &form()).await.unwrap_err();
            assert!(matches!(err, AppError::Storage(_)));
            assert!(
                oauth_authorize::Entity::find()
                    .all(db.as_ref())
                    .await
                    .unwrap()
                    .is_empty()
            );
        }

        #[tokio::test]
        async fn test_grant_write_failure_leaves_no_client() {
            let (state, db) = failing_inserts("oauth_authorize").await;
            let err = register_application(&state, &form()).await.unwrap_err();
            assert!(matches!(err, AppError::Storage(_)));
            assert!(
                oauth_client::Entity::find()
                    .all(db.as_ref())
                    .await
                    .unwrap()
                    .is_empty()
            );
        }
    }

    #[test]
    fn test_valid_form_is_normalized() {
        let valid = form().validate().unwrap();
        assert_eq!(valid.email, "dev1@x.com");
        assert_eq!(valid.redirect_uri, "http://localhost/cb");
    }

    #[test]
    fn test_mismatched_confirmation() {
        let mut f = form();
        f.password_confirm = Some("pw2".into());
        let err = f.validate().unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "Passwords do not match"));
    }

    #[test]
    fn test_confirmation_is_optional() {
        let mut f = form();
        f.password_confirm = None;
        assert!(f.validate().is_ok());
    }

    #[test]
    fn test_rejects_missing_fields() {
        for mutate in [
            (|f: &mut SignupForm| f.name = "  ".into()) as fn(&mut SignupForm),
            |f| f.redirect_uri = String::new(),
            |f| f.redirect_uri = "/relative".into(),
            |f| f.redirect_uri = "http://localhost/cb#frag".into(),
            |f| f.email = "not-an-email".into(),
            |f| f.password = String::new(),
        ] {
            let mut f = form();
            mutate(&mut f);
            assert!(matches!(f.validate(), Err(AppError::Validation(_))));
        }
    }
}
