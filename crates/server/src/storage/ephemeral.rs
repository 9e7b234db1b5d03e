//! In-process backend. Each category (clients, grants, tokens) is one aggregate map
//! cached under a fixed TTL that restarts on every write to that category. All
//! read-modify-write cycles on a category happen under that category's mutex.

use crate::config::EphemeralConfig;
use crate::entity::{oauth_access, oauth_authorize, oauth_client};
use crate::error::StorageError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::OAuthStorage;

#[derive(Clone)]
struct CacheEntry<T> {
    data: T,
    expires_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(data: T, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// One category: an optional map that lives until its TTL runs out.
struct Category<V> {
    entry: Mutex<Option<CacheEntry<HashMap<String, V>>>>,
    ttl: Duration,
}

impl<V: Clone> Category<V> {
    fn new(ttl: Duration) -> Self {
        Self {
            entry: Mutex::new(None),
            ttl,
        }
    }

    async fn get(&self, key: &str) -> Option<V> {
        let guard = self.entry.lock().await;
        match guard.as_ref() {
            Some(entry) if !entry.is_expired() => entry.data.get(key).cloned(),
            _ => None,
        }
    }

    /// Read-modify-write of the whole map. An expired map is replaced by an empty one,
    /// and the TTL restarts once the updated map is written back.
    async fn update<R>(&self, f: impl FnOnce(&mut HashMap<String, V>) -> R) -> R {
        let mut guard = self.entry.lock().await;
        let mut map = match guard.take() {
            Some(entry) if !entry.is_expired() => entry.data,
            _ => HashMap::new(),
        };
        let out = f(&mut map);
        *guard = Some(CacheEntry::new(map, self.ttl));
        out
    }

    /// Inspect the live map without refreshing its TTL.
    async fn with<R>(&self, f: impl FnOnce(&HashMap<String, V>) -> R) -> Option<R> {
        let guard = self.entry.lock().await;
        match guard.as_ref() {
            Some(entry) if !entry.is_expired() => Some(f(&entry.data)),
            _ => None,
        }
    }
}

struct Inner {
    clients: Category<oauth_client::Model>,
    grants: Category<oauth_authorize::Model>,
    tokens: Category<oauth_access::Model>,
}

#[derive(Clone)]
pub struct CacheStorage {
    inner: Arc<Inner>,
}

impl CacheStorage {
    pub fn new(config: &EphemeralConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                clients: Category::new(Duration::from_secs(config.clients_ttl_secs)),
                grants: Category::new(Duration::from_secs(config.grants_ttl_secs)),
                tokens: Category::new(Duration::from_secs(config.tokens_ttl_secs)),
            }),
        }
    }
}

impl Default for CacheStorage {
    fn default() -> Self {
        Self::new(&EphemeralConfig::default())
    }
}

#[async_trait::async_trait]
impl OAuthStorage for CacheStorage {
    async fn get_client(&self, id: &str) -> Result<oauth_client::Model, StorageError> {
        self.inner
            .clients
            .get(id)
            .await
            .ok_or(StorageError::NotFound)
    }

    #[tracing::instrument(skip(self, client))]
    async fn set_client(
        &self,
        id: &str,
        client: &oauth_client::Model,
    ) -> Result<(), StorageError> {
        self.inner
            .clients
            .update(|map| {
                map.insert(id.to_string(), client.clone());
            })
            .await;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(client_id = %grant.client_id))]
    async fn save_authorization_grant(
        &self,
        grant: &oauth_authorize::Model,
    ) -> Result<(), StorageError> {
        self.inner
            .grants
            .update(|map| {
                map.insert(grant.code.clone(), grant.clone());
            })
            .await;
        Ok(())
    }

    async fn load_authorization_grant(
        &self,
        code: &str,
    ) -> Result<oauth_authorize::Model, StorageError> {
        self.inner
            .grants
            .get(code)
            .await
            .filter(|grant| !grant.is_expired())
            .ok_or(StorageError::NotFound)
    }

    async fn remove_authorization_grant(&self, code: &str) -> Result<(), StorageError> {
        self.inner
            .grants
            .update(|map| {
                map.remove(code);
            })
            .await;
        Ok(())
    }

    async fn take_authorization_grant(
        &self,
        code: &str,
    ) -> Result<oauth_authorize::Model, StorageError> {
        self.inner
            .grants
            .update(|map| map.remove(code))
            .await
            .filter(|grant| !grant.is_expired())
            .ok_or(StorageError::NotFound)
    }

    #[tracing::instrument(skip_all, fields(client_id = %token.client_id))]
    async fn save_access_token(&self, token: &oauth_access::Model) -> Result<(), StorageError> {
        self.inner
            .tokens
            .update(|map| {
                if let Some(refresh) = token.refresh() {
                    let taken = map.values().any(|other| {
                        other.access_token != token.access_token
                            && other.refresh() == Some(refresh)
                    });
                    if taken {
                        return Err(StorageError::InvariantViolation(
                            "refresh token already issued to another access token".into(),
                        ));
                    }
                }
                let mut stored = token.clone();
                stored.refresh_token = token.refresh().map(String::from);
                map.insert(token.access_token.clone(), stored);
                Ok(())
            })
            .await
    }

    async fn load_access_token(&self, token: &str) -> Result<oauth_access::Model, StorageError> {
        self.inner
            .tokens
            .get(token)
            .await
            .filter(|t| !t.is_expired())
            .ok_or(StorageError::NotFound)
    }

    async fn remove_access_token(&self, token: &str) -> Result<(), StorageError> {
        self.inner
            .tokens
            .update(|map| {
                map.remove(token);
            })
            .await;
        Ok(())
    }

    async fn load_by_refresh_token(
        &self,
        refresh: &str,
    ) -> Result<oauth_access::Model, StorageError> {
        if refresh.is_empty() {
            return Err(StorageError::NotFound);
        }
        self.inner
            .tokens
            .with(|map| {
                map.values()
                    .find(|t| t.refresh() == Some(refresh))
                    .cloned()
            })
            .await
            .flatten()
            .filter(|t| !t.is_refresh_expired())
            .ok_or(StorageError::NotFound)
    }

    async fn clear_refresh_association(&self, refresh: &str) -> Result<(), StorageError> {
        if refresh.is_empty() {
            return Err(StorageError::NotFound);
        }
        let cleared = self
            .inner
            .tokens
            .update(|map| {
                let mut cleared = false;
                for token in map.values_mut() {
                    if token.refresh() == Some(refresh) {
                        token.refresh_token = None;
                        token.refresh_expires_at = None;
                        cleared = true;
                    }
                }
                cleared
            })
            .await;
        if cleared {
            Ok(())
        } else {
            Err(StorageError::NotFound)
        }
    }

    async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }
}
