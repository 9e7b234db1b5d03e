//! Creates the OAuth2 storage tables:
//! - oauth_client: registered applications
//! - oauth_authorize: single-use authorization grants
//! - oauth_access: access tokens and their refresh association

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OauthClient::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OauthClient::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OauthClient::Secret).string().not_null())
                    .col(ColumnDef::new(OauthClient::RedirectUri).text().not_null())
                    .col(ColumnDef::new(OauthClient::Name).string().not_null())
                    .col(
                        ColumnDef::new(OauthClient::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OauthAuthorize::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OauthAuthorize::Code)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OauthAuthorize::ClientId).string().not_null())
                    .col(ColumnDef::new(OauthAuthorize::UserId).string().not_null())
                    .col(ColumnDef::new(OauthAuthorize::Scope).text().not_null())
                    .col(
                        ColumnDef::new(OauthAuthorize::RedirectUri)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OauthAuthorize::State).string().null())
                    .col(
                        ColumnDef::new(OauthAuthorize::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OauthAuthorize::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OauthAccess::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OauthAccess::AccessToken)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OauthAccess::RefreshToken).string().null())
                    .col(ColumnDef::new(OauthAccess::ClientId).string().not_null())
                    .col(ColumnDef::new(OauthAccess::UserId).string().not_null())
                    .col(ColumnDef::new(OauthAccess::Scope).text().not_null())
                    .col(
                        ColumnDef::new(OauthAccess::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OauthAccess::RefreshExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OauthAccess::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth_authorize_client_id")
                    .table(OauthAuthorize::Table)
                    .col(OauthAuthorize::ClientId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_oauth_authorize_client_id")
                    .table(OauthAuthorize::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(OauthAccess::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OauthAuthorize::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OauthClient::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum OauthClient {
    Table,
    Id,
    Secret,
    RedirectUri,
    Name,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OauthAuthorize {
    Table,
    Code,
    ClientId,
    UserId,
    Scope,
    RedirectUri,
    State,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OauthAccess {
    Table,
    AccessToken,
    RefreshToken,
    ClientId,
    UserId,
    Scope,
    ExpiresAt,
    RefreshExpiresAt,
    CreatedAt,
}
