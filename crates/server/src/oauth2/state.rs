//! Shared state for the OAuth2 handlers.

use crate::client::{
    AccessControl, AccountProvisioner, HttpAccessControl, HttpAccountProvisioner,
    HttpIdentityVerifier, IdentityVerifier, build_http_client,
};
use crate::config::{OAuth2Config, UpstreamConfig};
use crate::oauth2::engine::Engine;
use crate::oauth2::flow::FlowController;
use crate::oauth2::permissions::PermissionApplier;
use crate::storage::Storage;
use std::sync::Arc;
use std::time::Duration;

/// Everything a request needs; cloned per request, so every field is cheap to clone.
#[derive(Clone)]
pub struct OAuth2State {
    pub engine: Engine,
    pub flow: FlowController,
    pub provisioner: Arc<dyn AccountProvisioner>,
    pub config: OAuth2Config,
    /// Upper bound on any single call to an external service
    pub upstream_timeout: Duration,
}

impl OAuth2State {
    pub fn new(
        storage: Storage,
        config: OAuth2Config,
        identity: Arc<dyn IdentityVerifier>,
        access: Arc<dyn AccessControl>,
        provisioner: Arc<dyn AccountProvisioner>,
        upstream_timeout: Duration,
    ) -> Self {
        let permissions = PermissionApplier::new(access, upstream_timeout);
        Self {
            engine: Engine::new(storage, config.clone()),
            flow: FlowController::new(identity, permissions, upstream_timeout),
            provisioner,
            config,
            upstream_timeout,
        }
    }

    /// Wire the HTTP clients for the configured upstream services.
    pub fn from_config(
        storage: Storage,
        config: OAuth2Config,
        upstream: &UpstreamConfig,
    ) -> Result<Self, reqwest::Error> {
        let timeout = upstream.timeout();
        let http = build_http_client(timeout)?;
        Ok(Self::new(
            storage,
            config,
            Arc::new(HttpIdentityVerifier::new(
                http.clone(),
                upstream.identity_url.clone(),
                timeout,
            )),
            Arc::new(HttpAccessControl::new(
                http.clone(),
                upstream.permissions_url.clone(),
                upstream.service_token.clone(),
                timeout,
            )),
            Arc::new(HttpAccountProvisioner::new(
                http,
                upstream.provisioning_url.clone(),
                timeout,
            )),
            timeout,
        ))
    }

    pub fn storage(&self) -> &Storage {
        self.engine.storage()
    }
}
