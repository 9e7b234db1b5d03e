//! Consent flow: login, permission application, then hand-off for code issuance.
//!
//! ```text
//! AwaitingConsent --credentials--> Authenticating --confirmed--> ApplyingPermissions
//!        |                               |                               |
//!        +--decline--> Denied            +--rejected--> Failed           +--applied--> Finalized
//!                                                                        |
//!                                                                        +--rejected--> Failed
//! ```
//!
//! Only `Finalized` leads to a code. No lock is held while waiting on the identity
//! or access-control services, and both calls are bounded by a timeout.

use crate::client::IdentityVerifier;
use crate::error::IdentityError;
use crate::oauth2::engine::AuthorizeRequest;
use crate::oauth2::permissions::PermissionApplier;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

pub const LOGIN_FAILED: &str = "Login failed. Check your email and password and try again.";
pub const PERMISSIONS_FAILED: &str =
    "We could not apply the requested permissions. Please try again later.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowState {
    AwaitingConsent,
    Authenticating,
    ApplyingPermissions,
    Finalized,
    Failed,
    Denied,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowEvent {
    NoCredentials,
    CredentialsSubmitted,
    Declined,
    IdentityRejected,
    IdentityConfirmed,
    PermissionsRejected,
    PermissionsApplied,
}

#[derive(Debug, thiserror::Error)]
#[error("no transition from {from:?} on {event:?}")]
pub struct InvalidTransition {
    pub from: FlowState,
    pub event: FlowEvent,
}

impl FlowState {
    pub fn on(self, event: FlowEvent) -> Result<FlowState, InvalidTransition> {
        use FlowEvent::*;
        use FlowState::*;
        match (self, event) {
            (AwaitingConsent, NoCredentials) => Ok(AwaitingConsent),
            (AwaitingConsent, CredentialsSubmitted) => Ok(Authenticating),
            (AwaitingConsent, Declined) => Ok(Denied),
            (Authenticating, IdentityRejected) => Ok(Failed),
            (Authenticating, IdentityConfirmed) => Ok(ApplyingPermissions),
            (ApplyingPermissions, PermissionsRejected) => Ok(Failed),
            (ApplyingPermissions, PermissionsApplied) => Ok(Finalized),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }
}

/// Fields posted by the consent/login form.
#[derive(Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct ConsentForm {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub password: String,
    /// `deny` declines; anything else is treated as approval.
    #[serde(default)]
    pub action: Option<String>,
}

impl std::fmt::Debug for ConsentForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentForm")
            .field("login", &self.login)
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum ConsentSubmission {
    None,
    Credentials { login: String, password: String },
    Decline,
}

impl From<ConsentForm> for ConsentSubmission {
    fn from(form: ConsentForm) -> Self {
        if form.action.as_deref() == Some("deny") {
            ConsentSubmission::Decline
        } else if form.login.trim().is_empty() || form.password.is_empty() {
            ConsentSubmission::None
        } else {
            ConsentSubmission::Credentials {
                login: form.login.trim().to_string(),
                password: form.password,
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowOutcome {
    /// Show the consent/login page, optionally with a generic error.
    Prompt { error: Option<&'static str> },
    /// The engine may now mint a code for this owner.
    Authorized { user_id: String },
    Denied,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub state: FlowState,
    pub outcome: FlowOutcome,
}

#[derive(Clone)]
pub struct FlowController {
    identity: Arc<dyn IdentityVerifier>,
    permissions: PermissionApplier,
    timeout: Duration,
}

impl FlowController {
    pub fn new(
        identity: Arc<dyn IdentityVerifier>,
        permissions: PermissionApplier,
        timeout: Duration,
    ) -> Self {
        Self {
            identity,
            permissions,
            timeout,
        }
    }

    #[tracing::instrument(skip_all, fields(client_id = %request.client.id))]
    pub async fn run(&self, request: &AuthorizeRequest, submission: ConsentSubmission) -> Decision {
        match self.drive(request, submission).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::error!(error = %e, "consent flow reached an impossible state");
                Decision {
                    state: FlowState::Failed,
                    outcome: FlowOutcome::Prompt {
                        error: Some(LOGIN_FAILED),
                    },
                }
            }
        }
    }

    async fn drive(
        &self,
        request: &AuthorizeRequest,
        submission: ConsentSubmission,
    ) -> Result<Decision, InvalidTransition> {
        let state = FlowState::AwaitingConsent;

        let (login, password) = match submission {
            ConsentSubmission::None => {
                return Ok(Decision {
                    state: state.on(FlowEvent::NoCredentials)?,
                    outcome: FlowOutcome::Prompt { error: None },
                });
            }
            ConsentSubmission::Decline => {
                tracing::info!("resource owner declined");
                return Ok(Decision {
                    state: state.on(FlowEvent::Declined)?,
                    outcome: FlowOutcome::Denied,
                });
            }
            ConsentSubmission::Credentials { login, password } => (login, password),
        };

        let state = state.on(FlowEvent::CredentialsSubmitted)?;
        let user_id = match self.authenticate(&login, &password).await {
            Some(user_id) => user_id,
            None => {
                return Ok(Decision {
                    state: state.on(FlowEvent::IdentityRejected)?,
                    outcome: FlowOutcome::Prompt {
                        error: Some(LOGIN_FAILED),
                    },
                });
            }
        };

        let state = state.on(FlowEvent::IdentityConfirmed)?;
        let scope = request.scope.to_string();
        if !self
            .permissions
            .apply(&user_id, &request.client.id, &scope)
            .await
        {
            return Ok(Decision {
                state: state.on(FlowEvent::PermissionsRejected)?,
                outcome: FlowOutcome::Prompt {
                    error: Some(PERMISSIONS_FAILED),
                },
            });
        }

        Ok(Decision {
            state: state.on(FlowEvent::PermissionsApplied)?,
            outcome: FlowOutcome::Authorized { user_id },
        })
    }

    /// `None` on every kind of failure; the cause is only logged.
    async fn authenticate(&self, login: &str, password: &str) -> Option<String> {
        let call = self.identity.authenticate(login, password);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(user_id)) if !user_id.is_empty() => Some(user_id),
            Ok(Ok(_)) => {
                tracing::warn!("identity service returned an empty user id");
                None
            }
            Ok(Err(IdentityError::InvalidCredentials)) => {
                tracing::info!("login rejected");
                None
            }
            Ok(Err(IdentityError::Upstream(e))) => {
                tracing::error!(error = %e, "identity service failed");
                None
            }
            Err(_) => {
                tracing::error!(timeout = ?self.timeout, "identity service timed out");
                None
            }
        }
    }
}
