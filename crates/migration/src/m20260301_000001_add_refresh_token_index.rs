//! Secondary lookup index on `oauth_access.refresh_token`.
//!
//! Not unique: a token without a refresh association stores NULL, and several
//! such rows must coexist. NULLs are skipped by equality lookups, so the index
//! behaves as a sparse one. Uniqueness of non-empty values is enforced by the
//! storage layer on save.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth_access_refresh_token")
                    .table(OauthAccess::Table)
                    .col(OauthAccess::RefreshToken)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_oauth_access_refresh_token")
                    .table(OauthAccess::Table)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum OauthAccess {
    Table,
    RefreshToken,
}
