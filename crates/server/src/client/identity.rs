use super::{IdentityVerifier, endpoint};
use crate::error::{IdentityError, UpstreamError};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

const SERVICE: &str = "identity";

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    userid: String,
}

/// Verifies credentials with `POST {base}/login` over HTTP Basic auth.
#[derive(Clone)]
pub struct HttpIdentityVerifier {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpIdentityVerifier {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl IdentityVerifier for HttpIdentityVerifier {
    #[tracing::instrument(skip(self, password))]
    async fn authenticate(&self, login: &str, password: &str) -> Result<String, IdentityError> {
        let response = self
            .http
            .post(endpoint(&self.base_url, "login"))
            .basic_auth(login, Some(password))
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, self.timeout, e))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                return Err(IdentityError::InvalidCredentials);
            }
            status => {
                return Err(UpstreamError::Status {
                    service: SERVICE,
                    status,
                }
                .into());
            }
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidResponse {
                service: SERVICE,
                reason: e.to_string(),
            })?;
        if body.userid.is_empty() {
            // A success without a user id is treated as "nothing was found".
            return Err(IdentityError::InvalidCredentials);
        }
        Ok(body.userid)
    }
}
