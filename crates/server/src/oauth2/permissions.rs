//! Translates a granted scope into one permission request against the access-control
//! service. The outcome is all or nothing.

use crate::client::AccessControl;
use crate::oauth2::scope::{Scope, ScopeName};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// The permission flags a raw, possibly malformed scope string asks for.
pub fn permission_set(raw_scope: &str) -> BTreeSet<ScopeName> {
    Scope::parse(raw_scope).names()
}

#[derive(Clone)]
pub struct PermissionApplier {
    access: Arc<dyn AccessControl>,
    timeout: Duration,
}

impl PermissionApplier {
    pub fn new(access: Arc<dyn AccessControl>, timeout: Duration) -> Self {
        Self { access, timeout }
    }

    /// `true` only when the service reports every requested permission applied.
    /// Errors, timeouts and partial application all count as nothing granted.
    #[tracing::instrument(skip(self))]
    pub async fn apply(&self, owner_id: &str, client_id: &str, raw_scope: &str) -> bool {
        let requested = permission_set(raw_scope);
        if requested.is_empty() {
            tracing::warn!("no catalog permissions in requested scope");
            return false;
        }

        let call = self.access.set_permissions(owner_id, client_id, &requested);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(applied)) if requested.is_subset(&applied) => true,
            Ok(Ok(applied)) => {
                tracing::warn!(
                    requested = ?requested,
                    applied = ?applied,
                    "access-control applied only part of the requested permissions"
                );
                false
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "failed to apply permissions");
                false
            }
            Err(_) => {
                tracing::error!(timeout = ?self.timeout, "access-control call timed out");
                false
            }
        }
    }
}
