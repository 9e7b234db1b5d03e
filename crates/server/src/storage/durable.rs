//! SeaORM backend. Records are keyed by their natural id and outlive the process.
//! Nothing expires on its own: reads compare `expires_at` against the clock and
//! report `NotFound` for stale rows, which stay until a flow removes them.

use crate::entity::{oauth_access, oauth_authorize, oauth_client};
use crate::error::StorageError;
use migration::MigratorTrait;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, Database, DatabaseConnection, DbBackend, EntityTrait,
    IsolationLevel, QueryFilter, TransactionTrait,
};
use std::sync::Arc;
use time::OffsetDateTime;

use super::OAuthStorage;

#[derive(Clone)]
pub struct DbStorage {
    db: Arc<DatabaseConnection>,
}

impl DbStorage {
    /// Connect and bring the schema (including the refresh-token index) up to date.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let db = Database::connect(database_url).await?;
        migration::Migrator::up(&db, None).await?;
        Ok(Self::new(Arc::new(db)))
    }

    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl OAuthStorage for DbStorage {
    #[tracing::instrument(skip(self))]
    async fn get_client(&self, id: &str) -> Result<oauth_client::Model, StorageError> {
        oauth_client::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or(StorageError::NotFound)
    }

    #[tracing::instrument(skip(self, client))]
    async fn set_client(
        &self,
        id: &str,
        client: &oauth_client::Model,
    ) -> Result<(), StorageError> {
        let mut active = client.to_active_model();
        active.id = sea_orm::ActiveValue::Set(id.to_string());
        oauth_client::Entity::insert(active)
            .on_conflict(
                OnConflict::column(oauth_client::Column::Id)
                    .update_columns([
                        oauth_client::Column::Secret,
                        oauth_client::Column::RedirectUri,
                        oauth_client::Column::Name,
                        oauth_client::Column::CreatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(client_id = %grant.client_id))]
    async fn save_authorization_grant(
        &self,
        grant: &oauth_authorize::Model,
    ) -> Result<(), StorageError> {
        oauth_authorize::Entity::insert(grant.to_active_model())
            .on_conflict(
                OnConflict::column(oauth_authorize::Column::Code)
                    .update_columns([
                        oauth_authorize::Column::ClientId,
                        oauth_authorize::Column::UserId,
                        oauth_authorize::Column::Scope,
                        oauth_authorize::Column::RedirectUri,
                        oauth_authorize::Column::State,
                        oauth_authorize::Column::ExpiresAt,
                        oauth_authorize::Column::CreatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn load_authorization_grant(
        &self,
        code: &str,
    ) -> Result<oauth_authorize::Model, StorageError> {
        oauth_authorize::Entity::find_by_id(code)
            .one(self.db.as_ref())
            .await?
            .filter(|grant| !grant.is_expired())
            .ok_or(StorageError::NotFound)
    }

    #[tracing::instrument(skip_all)]
    async fn remove_authorization_grant(&self, code: &str) -> Result<(), StorageError> {
        oauth_authorize::Entity::delete_by_id(code)
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn take_authorization_grant(
        &self,
        code: &str,
    ) -> Result<oauth_authorize::Model, StorageError> {
        let grant = oauth_authorize::Entity::find_by_id(code)
            .one(self.db.as_ref())
            .await?
            .ok_or(StorageError::NotFound)?;

        // Only the caller whose delete hits the row owns the grant.
        let result = oauth_authorize::Entity::delete_by_id(code)
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 || grant.is_expired() {
            return Err(StorageError::NotFound);
        }
        Ok(grant)
    }

    #[tracing::instrument(skip_all, fields(client_id = %token.client_id))]
    async fn save_access_token(&self, token: &oauth_access::Model) -> Result<(), StorageError> {
        // The collision check and the upsert commit together. Postgres needs serializable
        // isolation for that; SQLite already serializes writers.
        let isolation = match self.db.get_database_backend() {
            DbBackend::Sqlite => None,
            _ => Some(IsolationLevel::Serializable),
        };
        let txn = self.db.begin_with_config(isolation, None).await?;

        if let Some(refresh) = token.refresh() {
            let holder = oauth_access::Entity::find()
                .filter(oauth_access::Column::RefreshToken.eq(refresh))
                .filter(oauth_access::Column::AccessToken.ne(token.access_token.as_str()))
                .one(&txn)
                .await?;
            if holder.is_some() {
                txn.rollback().await?;
                return Err(StorageError::InvariantViolation(
                    "refresh token already issued to another access token".into(),
                ));
            }
        }

        oauth_access::Entity::insert(token.to_active_model())
            .on_conflict(
                OnConflict::column(oauth_access::Column::AccessToken)
                    .update_columns([
                        oauth_access::Column::RefreshToken,
                        oauth_access::Column::ClientId,
                        oauth_access::Column::UserId,
                        oauth_access::Column::Scope,
                        oauth_access::Column::ExpiresAt,
                        oauth_access::Column::RefreshExpiresAt,
                        oauth_access::Column::CreatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;
        txn.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn load_access_token(&self, token: &str) -> Result<oauth_access::Model, StorageError> {
        oauth_access::Entity::find_by_id(token)
            .one(self.db.as_ref())
            .await?
            .filter(|t| !t.is_expired())
            .ok_or(StorageError::NotFound)
    }

    #[tracing::instrument(skip_all)]
    async fn remove_access_token(&self, token: &str) -> Result<(), StorageError> {
        oauth_access::Entity::delete_by_id(token)
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn load_by_refresh_token(
        &self,
        refresh: &str,
    ) -> Result<oauth_access::Model, StorageError> {
        if refresh.is_empty() {
            return Err(StorageError::NotFound);
        }
        oauth_access::Entity::find()
            .filter(oauth_access::Column::RefreshToken.eq(refresh))
            .one(self.db.as_ref())
            .await?
            .filter(|t| !t.is_refresh_expired())
            .ok_or(StorageError::NotFound)
    }

    #[tracing::instrument(skip_all)]
    async fn clear_refresh_association(&self, refresh: &str) -> Result<(), StorageError> {
        if refresh.is_empty() {
            return Err(StorageError::NotFound);
        }
        let result = oauth_access::Entity::update_many()
            .col_expr(
                oauth_access::Column::RefreshToken,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                oauth_access::Column::RefreshExpiresAt,
                Expr::value(Option::<OffsetDateTime>::None),
            )
            .filter(oauth_access::Column::RefreshToken.eq(refresh))
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), String> {
        self.db.ping().await.map_err(|e| e.to_string())
    }
}
