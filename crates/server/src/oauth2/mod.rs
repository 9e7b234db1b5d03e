//! OAuth2 authorization server.
//!
//! ## Flow
//!
//! 1. A developer registers an application at `/signup`; the response carries the
//!    client credentials and a seed authorization code.
//! 2. A resource owner is sent to `/authorize`, logs in and grants the requested scopes.
//!    The scopes are applied as permissions with the access-control service before a
//!    code is issued.
//! 3. The client exchanges the code (or later a refresh token) at `/token` and can
//!    inspect its token at `/info`.

pub mod authorize;
pub mod endpoints;
pub mod engine;
pub mod flow;
pub mod permissions;
pub mod scope;
pub mod secret;
pub mod signup;
mod state;

pub use endpoints::router;
pub use engine::{Engine, EngineError};
pub use flow::{FlowController, FlowOutcome, FlowState};
pub use permissions::PermissionApplier;
pub use scope::{Scope, ScopeName};
pub use state::OAuth2State;

/// OpenAPI tag for OAuth2 endpoints
pub const OAUTH2_TAG: &str = "OAuth2";
