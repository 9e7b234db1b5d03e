//! OAuth2 authorization server fronting a platform's identity service.
//!
//! Third-party applications register at `/signup`, resource owners log in and grant
//! scoped consent at `/authorize`, and clients redeem codes and refresh tokens at
//! `/token`. Clients, grants and tokens live in one of two interchangeable storage
//! backends selected at startup.

pub mod api;
pub mod client;
pub mod config;
pub mod entity;
pub mod error;
pub mod oauth2;
pub mod storage;
