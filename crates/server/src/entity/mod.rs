//! SeaORM entities for the OAuth2 records.
//!
//! The models double as the storage-agnostic records passed through the
//! [`OAuthStorage`](crate::storage::OAuthStorage) contract; the ephemeral
//! backend keeps them in memory, the durable one maps them onto these tables.

pub mod oauth_access;
pub mod oauth_authorize;
pub mod oauth_client;
