//! Storage contract for clients, authorization grants and access tokens.
//!
//! Two interchangeable backends implement [`OAuthStorage`]:
//! - [`DbStorage`] keeps records in a SQL database through SeaORM and survives restarts.
//! - [`CacheStorage`] keeps each record category in process memory under a fixed TTL;
//!   intended for local runs and integration tests.
//!
//! The backend is picked once at startup by [`create_storage`] and wrapped in the
//! [`Storage`] enum so callers never know which one they hold.
//!
//! Every read of an expired record reports [`StorageError::NotFound`], the same as a
//! record that never existed.

use crate::config::{StorageConfig, StorageKind};
use crate::entity::{oauth_access, oauth_authorize, oauth_client};
use crate::error::StorageError;

pub mod durable;
pub mod ephemeral;

pub use durable::DbStorage;
pub use ephemeral::CacheStorage;

#[async_trait::async_trait]
pub trait OAuthStorage: Send + Sync {
    async fn get_client(&self, id: &str) -> Result<oauth_client::Model, StorageError>;

    /// Upsert by natural id, replacing any previous record with that id.
    async fn set_client(&self, id: &str, client: &oauth_client::Model)
    -> Result<(), StorageError>;

    /// Upsert by code.
    async fn save_authorization_grant(
        &self,
        grant: &oauth_authorize::Model,
    ) -> Result<(), StorageError>;

    async fn load_authorization_grant(
        &self,
        code: &str,
    ) -> Result<oauth_authorize::Model, StorageError>;

    /// Idempotent delete.
    async fn remove_authorization_grant(&self, code: &str) -> Result<(), StorageError>;

    /// Load and consume in one step. Exactly one caller can take a given code;
    /// every later take reports `NotFound`.
    async fn take_authorization_grant(
        &self,
        code: &str,
    ) -> Result<oauth_authorize::Model, StorageError>;

    /// Upsert by token value. Fails with `InvariantViolation` when the refresh
    /// value is already carried by a different token.
    async fn save_access_token(&self, token: &oauth_access::Model) -> Result<(), StorageError>;

    async fn load_access_token(&self, token: &str) -> Result<oauth_access::Model, StorageError>;

    /// Idempotent delete.
    async fn remove_access_token(&self, token: &str) -> Result<(), StorageError>;

    async fn load_by_refresh_token(
        &self,
        refresh: &str,
    ) -> Result<oauth_access::Model, StorageError>;

    /// Unset the refresh value on the token carrying it, keeping the token record.
    /// `NotFound` when no token carries the value.
    async fn clear_refresh_association(&self, refresh: &str) -> Result<(), StorageError>;

    async fn health_check(&self) -> Result<(), String>;
}

/// The backend selected at startup.
#[derive(Clone)]
pub enum Storage {
    Durable(DbStorage),
    Ephemeral(CacheStorage),
}

impl Storage {
    pub fn kind(&self) -> StorageKind {
        match self {
            Self::Durable(_) => StorageKind::Durable,
            Self::Ephemeral(_) => StorageKind::Ephemeral,
        }
    }
}

#[async_trait::async_trait]
impl OAuthStorage for Storage {
    async fn get_client(&self, id: &str) -> Result<oauth_client::Model, StorageError> {
        match self {
            Self::Durable(s) => s.get_client(id).await,
            Self::Ephemeral(s) => s.get_client(id).await,
        }
    }

    async fn set_client(
        &self,
        id: &str,
        client: &oauth_client::Model,
    ) -> Result<(), StorageError> {
        match self {
            Self::Durable(s) => s.set_client(id, client).await,
            Self::Ephemeral(s) => s.set_client(id, client).await,
        }
    }

    async fn save_authorization_grant(
        &self,
        grant: &oauth_authorize::Model,
    ) -> Result<(), StorageError> {
        match self {
            Self::Durable(s) => s.save_authorization_grant(grant).await,
            Self::Ephemeral(s) => s.save_authorization_grant(grant).await,
        }
    }

    async fn load_authorization_grant(
        &self,
        code: &str,
    ) -> Result<oauth_authorize::Model, StorageError> {
        match self {
            Self::Durable(s) => s.load_authorization_grant(code).await,
            Self::Ephemeral(s) => s.load_authorization_grant(code).await,
        }
    }

    async fn remove_authorization_grant(&self, code: &str) -> Result<(), StorageError> {
        match self {
            Self::Durable(s) => s.remove_authorization_grant(code).await,
            Self::Ephemeral(s) => s.remove_authorization_grant(code).await,
        }
    }

    async fn take_authorization_grant(
        &self,
        code: &str,
    ) -> Result<oauth_authorize::Model, StorageError> {
        match self {
            Self::Durable(s) => s.take_authorization_grant(code).await,
            Self::Ephemeral(s) => s.take_authorization_grant(code).await,
        }
    }

    async fn save_access_token(&self, token: &oauth_access::Model) -> Result<(), StorageError> {
        match self {
            Self::Durable(s) => s.save_access_token(token).await,
            Self::Ephemeral(s) => s.save_access_token(token).await,
        }
    }

    async fn load_access_token(&self, token: &str) -> Result<oauth_access::Model, StorageError> {
        match self {
            Self::Durable(s) => s.load_access_token(token).await,
            Self::Ephemeral(s) => s.load_access_token(token).await,
        }
    }

    async fn remove_access_token(&self, token: &str) -> Result<(), StorageError> {
        match self {
            Self::Durable(s) => s.remove_access_token(token).await,
            Self::Ephemeral(s) => s.remove_access_token(token).await,
        }
    }

    async fn load_by_refresh_token(
        &self,
        refresh: &str,
    ) -> Result<oauth_access::Model, StorageError> {
        match self {
            Self::Durable(s) => s.load_by_refresh_token(refresh).await,
            Self::Ephemeral(s) => s.load_by_refresh_token(refresh).await,
        }
    }

    async fn clear_refresh_association(&self, refresh: &str) -> Result<(), StorageError> {
        match self {
            Self::Durable(s) => s.clear_refresh_association(refresh).await,
            Self::Ephemeral(s) => s.clear_refresh_association(refresh).await,
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        match self {
            Self::Durable(s) => s.health_check().await,
            Self::Ephemeral(s) => s.health_check().await,
        }
    }
}

/// Build the configured backend. The durable one connects and migrates its schema.
pub async fn create_storage(config: &StorageConfig) -> Result<Storage, StorageError> {
    match config.backend {
        StorageKind::Durable => {
            let storage = DbStorage::connect(&config.database_url).await?;
            tracing::info!("using durable storage backend");
            Ok(Storage::Durable(storage))
        }
        StorageKind::Ephemeral => {
            tracing::warn!("using ephemeral storage backend; records are lost on restart");
            Ok(Storage::Ephemeral(CacheStorage::new(&config.ephemeral)))
        }
    }
}
