//! Authorization grant - single-use code exchanged for an access token.

use crate::oauth2::scope::Scope;
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth_authorize")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub code: String,
    pub client_id: String,
    /// Resource owner who granted consent
    pub user_id: String,
    /// Canonical comma-joined scope
    pub scope: String,
    pub redirect_uri: String,
    pub state: Option<String>,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_expired(&self) -> bool {
        self.expires_at < OffsetDateTime::now_utc()
    }

    pub fn scope(&self) -> Scope {
        Scope::parse(&self.scope)
    }

    pub fn to_active_model(&self) -> ActiveModel {
        ActiveModel {
            code: Set(self.code.clone()),
            client_id: Set(self.client_id.clone()),
            user_id: Set(self.user_id.clone()),
            scope: Set(self.scope.clone()),
            redirect_uri: Set(self.redirect_uri.clone()),
            state: Set(self.state.clone()),
            expires_at: Set(self.expires_at),
            created_at: Set(self.created_at),
        }
    }
}
