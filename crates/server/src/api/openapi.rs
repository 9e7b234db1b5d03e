//! OpenAPI/Utoipa configuration.

use crate::api::health::MISC_TAG;
use crate::oauth2::{OAUTH2_TAG, ScopeName};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{
        AuthorizationCode, Flow, HttpAuthScheme, HttpBuilder, OAuth2, Scopes, SecurityScheme,
    },
};

/// Security schemes for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    #[tracing::instrument(skip(self, openapi))]
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let basic = HttpBuilder::new()
                .scheme(HttpAuthScheme::Basic)
                .description(Some(
                    "Client id and secret returned by `/signup`, accepted at `/token`.",
                ))
                .build();
            components.add_security_scheme("ClientCredentials", SecurityScheme::Http(basic));

            let bearer = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .description(Some("Access token issued by `/token`, accepted at `/info`."))
                .build();
            components.add_security_scheme("Authorization", SecurityScheme::Http(bearer));

            let oauth2 = OAuth2::new([Flow::AuthorizationCode(AuthorizationCode::new(
                "/authorize",
                "/token",
                Scopes::from_iter(
                    ScopeName::CATALOG
                        .iter()
                        .map(|s| (s.as_str(), s.description())),
                ),
            ))]);
            components.add_security_scheme("OAuth2", SecurityScheme::OAuth2(oauth2));
        }
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Coastline",
        version = "1.0.0",
        description = "OAuth2 authorization server: application registration, consent and token exchange."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = OAUTH2_TAG, description = "OAuth2 endpoints")
    )
)]
pub struct ApiDoc;
