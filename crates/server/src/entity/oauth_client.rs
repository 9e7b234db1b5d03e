//! Registered application. The id is the developer's provisioned account id.

use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth_client")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Stored verbatim at signup; only ever compared, never re-derived.
    pub secret: String,
    pub redirect_uri: String,
    /// Application name shown on the consent page
    pub name: String,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Exact-match redirect check; no prefix or pattern matching.
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uri == uri
    }

    pub fn secret_matches(&self, provided: &str) -> bool {
        !provided.is_empty() && self.secret == provided
    }

    pub fn to_active_model(&self) -> ActiveModel {
        ActiveModel {
            id: Set(self.id.clone()),
            secret: Set(self.secret.clone()),
            redirect_uri: Set(self.redirect_uri.clone()),
            name: Set(self.name.clone()),
            created_at: Set(self.created_at),
        }
    }
}
