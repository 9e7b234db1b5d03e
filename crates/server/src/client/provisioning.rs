use super::{AccountProvisioner, NewAccount, endpoint};
use crate::error::{ProvisionError, UpstreamError};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

const SERVICE: &str = "provisioning";

#[derive(Deserialize)]
struct CreatedUser {
    #[serde(default)]
    userid: String,
}

/// Creates accounts with `POST {base}/user`; expects `201 Created` and a `userid`.
#[derive(Clone)]
pub struct HttpAccountProvisioner {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpAccountProvisioner {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl AccountProvisioner for HttpAccountProvisioner {
    #[tracing::instrument(skip(self))]
    async fn provision(&self, account: &NewAccount) -> Result<String, ProvisionError> {
        let response = self
            .http
            .post(endpoint(&self.base_url, "user"))
            .json(account)
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, self.timeout, e))?;

        match response.status() {
            StatusCode::CREATED => {}
            StatusCode::CONFLICT => return Err(ProvisionError::Conflict),
            status => {
                return Err(UpstreamError::Status {
                    service: SERVICE,
                    status,
                }
                .into());
            }
        }

        let created: CreatedUser =
            response
                .json()
                .await
                .map_err(|e| UpstreamError::InvalidResponse {
                    service: SERVICE,
                    reason: e.to_string(),
                })?;
        if created.userid.is_empty() {
            return Err(UpstreamError::InvalidResponse {
                service: SERVICE,
                reason: "missing userid".into(),
            }
            .into());
        }
        Ok(created.userid)
    }
}
