//! HTTP clients for the platform services this server depends on.
//!
//! Each collaborator sits behind a trait so the consent and signup flows can be
//! driven by in-process fakes in tests.

use crate::error::{IdentityError, ProvisionError, UpstreamError};
use crate::oauth2::scope::ScopeName;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;

pub mod gatekeeper;
pub mod identity;
pub mod provisioning;

pub use gatekeeper::HttpAccessControl;
pub use identity::HttpIdentityVerifier;
pub use provisioning::HttpAccountProvisioner;

const USER_AGENT: &str = concat!("coastline/", env!("CARGO_PKG_VERSION"));

/// Authenticates resource-owner credentials.
#[async_trait::async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Returns the stable, non-empty user id on success.
    async fn authenticate(&self, login: &str, password: &str) -> Result<String, IdentityError>;
}

/// Grants a client permissions on a resource owner's data.
#[async_trait::async_trait]
pub trait AccessControl: Send + Sync {
    /// Submit the whole set in one request; returns the set the service reports applied.
    async fn set_permissions(
        &self,
        owner_id: &str,
        client_id: &str,
        permissions: &BTreeSet<ScopeName>,
    ) -> Result<BTreeSet<ScopeName>, UpstreamError>;
}

/// Creates the developer account behind a new client registration.
#[async_trait::async_trait]
pub trait AccountProvisioner: Send + Sync {
    async fn provision(&self, account: &NewAccount) -> Result<String, ProvisionError>;
}

#[derive(Clone, Serialize)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    pub emails: Vec<String>,
}

impl std::fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewAccount")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("emails", &self.emails)
            .finish()
    }
}

/// Shared reqwest client for all upstream calls.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
}

fn endpoint(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
