//! Consent and login page for the authorization endpoint.

use crate::oauth2::engine::{AuthorizeParams, AuthorizeRequest, ErrorResponse};
use crate::oauth2::flow::{ConsentForm, FlowOutcome};
use crate::oauth2::{OAUTH2_TAG, state::OAuth2State};
use askama::Template;
use axum::{
    Form,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};

pub struct ScopeView {
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Template)]
#[template(path = "authorize.html")]
struct AuthorizeTemplate {
    client_name: String,
    scopes: Vec<ScopeView>,
    action: String,
    error: Option<&'static str>,
}

fn render_prompt(request: &AuthorizeRequest, error: Option<&'static str>) -> Response {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("response_type", "code")
        .append_pair("client_id", &request.client.id)
        .append_pair("redirect_uri", &request.redirect_uri)
        .append_pair("scope", &request.scope.to_string());
    if let Some(state) = &request.state {
        query.append_pair("state", state);
    }

    let template = AuthorizeTemplate {
        client_name: request.client.name.clone(),
        scopes: request
            .scope
            .iter()
            .map(|s| ScopeView {
                name: s.as_str(),
                description: s.description(),
            })
            .collect(),
        action: format!("/authorize?{}", query.finish()),
        error,
    };

    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::error!("Failed to render authorize template: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

/// Render the consent and login page.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize",
    summary = "Show the consent and login page",
    description = "Validates the authorization request and renders a page listing the requested \
                   scopes with a login form. Invalid clients or redirect URIs are answered directly; \
                   other request errors are redirected back to the client.\n\n\
                   **Supported scopes:** `view`, `upload`, `note` (comma-separated)",
    params(AuthorizeParams),
    responses(
        (status = 200, description = "Consent and login page", content_type = "text/html"),
        (status = 303, description = "Redirect back to the client with an error"),
        (status = 400, description = "Unknown client or mismatched redirect_uri", body = ErrorResponse),
    )
)]
pub async fn authorize_page(
    State(state): State<OAuth2State>,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    match state.engine.parse_authorize(&params).await {
        Ok(request) => render_prompt(&request, None),
        Err(rejection) => rejection.into_response(),
    }
}

/// Process the consent and login form.
#[tracing::instrument(skip(state, form))]
#[utoipa::path(
    post,
    path = "/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize Submit",
    summary = "Log in and grant consent",
    description = "Authenticates the resource owner, applies the requested scopes as permissions \
                   and redirects back to the client with an authorization code. Submitting \
                   `action=deny` redirects with `error=access_denied`. Failed logins re-render the \
                   page with a generic error.",
    params(AuthorizeParams),
    request_body(
        content = ConsentForm,
        content_type = "application/x-www-form-urlencoded",
        description = "Credentials and the consent decision"
    ),
    responses(
        (status = 200, description = "Page re-rendered, possibly with an error", content_type = "text/html"),
        (status = 303, description = "Redirect back to the client with a code or an error"),
        (status = 400, description = "Invalid authorization request", body = ErrorResponse),
    )
)]
pub async fn authorize_submit(
    State(state): State<OAuth2State>,
    Query(params): Query<AuthorizeParams>,
    Form(form): Form<ConsentForm>,
) -> Response {
    let request = match state.engine.parse_authorize(&params).await {
        Ok(request) => request,
        Err(rejection) => return rejection.into_response(),
    };

    let decision = state.flow.run(&request, form.into()).await;
    tracing::debug!(state = ?decision.state, "consent flow finished");

    match decision.outcome {
        FlowOutcome::Prompt { error } => render_prompt(&request, error),
        FlowOutcome::Authorized { user_id } => {
            match state.engine.finish_authorize(&request, &user_id).await {
                Ok(location) => Redirect::to(&location).into_response(),
                Err(e) => e.into_response(),
            }
        }
        FlowOutcome::Denied => match state.engine.deny_authorize(&request) {
            Ok(location) => Redirect::to(&location).into_response(),
            Err(e) => e.into_response(),
        },
    }
}
