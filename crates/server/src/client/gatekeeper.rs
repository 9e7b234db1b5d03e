use super::{AccessControl, endpoint};
use crate::error::UpstreamError;
use crate::oauth2::scope::ScopeName;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

const SERVICE: &str = "access-control";

/// Sets permissions with `POST {base}/access/{owner}/{client}`.
///
/// The body is a permission map such as `{"view": {}, "upload": {}}`; the
/// service answers with the map it actually applied.
#[derive(Clone)]
pub struct HttpAccessControl {
    http: reqwest::Client,
    base_url: String,
    service_token: Option<String>,
    timeout: Duration,
}

impl HttpAccessControl {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        service_token: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            service_token,
            timeout,
        }
    }
}

#[async_trait::async_trait]
impl AccessControl for HttpAccessControl {
    #[tracing::instrument(skip(self))]
    async fn set_permissions(
        &self,
        owner_id: &str,
        client_id: &str,
        permissions: &BTreeSet<ScopeName>,
    ) -> Result<BTreeSet<ScopeName>, UpstreamError> {
        let path = format!(
            "access/{}/{}",
            urlencoding::encode(owner_id),
            urlencoding::encode(client_id)
        );
        let body: BTreeMap<&str, serde_json::Value> = permissions
            .iter()
            .map(|name| (name.as_str(), serde_json::json!({})))
            .collect();

        let mut request = self.http.post(endpoint(&self.base_url, &path)).json(&body);
        if let Some(token) = &self.service_token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(SERVICE, self.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                service: SERVICE,
                status,
            });
        }

        let applied: BTreeMap<String, serde_json::Value> =
            response
                .json()
                .await
                .map_err(|e| UpstreamError::InvalidResponse {
                    service: SERVICE,
                    reason: e.to_string(),
                })?;
        Ok(applied
            .keys()
            .filter_map(|name| name.parse::<ScopeName>().ok())
            .collect())
    }
}
