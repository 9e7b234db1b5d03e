//! Access token with its optional refresh association.

use crate::oauth2::scope::Scope;
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth_access")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub access_token: String,
    /// `None` once the association is cleared or when never issued.
    pub refresh_token: Option<String>,
    pub client_id: String,
    pub user_id: String,
    pub scope: String,
    pub expires_at: OffsetDateTime,
    pub refresh_expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_expired(&self) -> bool {
        self.expires_at < OffsetDateTime::now_utc()
    }

    pub fn is_refresh_expired(&self) -> bool {
        match self.refresh_expires_at {
            Some(expires_at) => expires_at < OffsetDateTime::now_utc(),
            None => true,
        }
    }

    /// The refresh value if one is set and non-empty.
    pub fn refresh(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|r| !r.is_empty())
    }

    /// Seconds until the access token expires, floored at zero.
    pub fn expires_in(&self) -> i64 {
        (self.expires_at - OffsetDateTime::now_utc())
            .whole_seconds()
            .max(0)
    }

    pub fn scope(&self) -> Scope {
        Scope::parse(&self.scope)
    }

    pub fn to_active_model(&self) -> ActiveModel {
        ActiveModel {
            access_token: Set(self.access_token.clone()),
            refresh_token: Set(self.refresh().map(String::from)),
            client_id: Set(self.client_id.clone()),
            user_id: Set(self.user_id.clone()),
            scope: Set(self.scope.clone()),
            expires_at: Set(self.expires_at),
            refresh_expires_at: Set(self.refresh_expires_at),
            created_at: Set(self.created_at),
        }
    }
}
