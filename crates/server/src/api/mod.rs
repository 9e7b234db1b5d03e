//! HTTP surface of the server.
//!
//! - `oauth2` routes (`/signup`, `/authorize`, `/token`, `/info`)
//! - `health` - liveness and readiness checks (`/healthz`, `/readyz`)
//! - `openapi` - OpenAPI/Utoipa configuration, served at `/api-docs`

pub mod health;
pub mod openapi;

pub use health::MISC_TAG;

use crate::oauth2::{self, OAuth2State};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Builds the application router with all routes, middleware and API docs.
pub fn build_router(state: OAuth2State) -> axum::Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .merge(oauth2::router(state.clone()))
        .routes(routes!(health::health))
        .merge(
            OpenApiRouter::new()
                .routes(routes!(health::ready))
                .with_state(state),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip(state))]
pub async fn start_webserver(state: OAuth2State, listen_addr: &str) -> color_eyre::Result<()> {
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = %listen_addr, "Server running");
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
