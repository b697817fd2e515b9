use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use sitescope_core::domain::approval::SiteRef;
use sitescope_core::workflow::{LifecycleError, SiteLifecycle};

#[derive(Debug, Serialize)]
struct StatusUpdate<'a> {
    status: &'a str,
    approved_by: &'a str,
}

/// Site lifecycle service reached over HTTP: `POST {base_url}/sites/{site_ref}/status`.
pub struct HttpSiteLifecycle {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<SecretString>,
    timeout: Duration,
}

impl HttpSiteLifecycle {
    pub fn new(
        base_url: &str,
        api_token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_owned(), api_token, timeout })
    }

    fn status_url(&self, site_ref: &SiteRef) -> String {
        format!("{}/sites/{}/status", self.base_url, site_ref.0)
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[async_trait]
impl SiteLifecycle for HttpSiteLifecycle {
    async fn advance_site_status(
        &self,
        site_ref: &SiteRef,
        to_status: &str,
        approved_by: &str,
    ) -> Result<(), LifecycleError> {
        let mut request = self
            .client
            .post(self.status_url(site_ref))
            .json(&StatusUpdate { status: to_status, approved_by });
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                LifecycleError::Timeout { timeout_ms: self.timeout_ms() }
            } else {
                LifecycleError::Transport(error.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(LifecycleError::Rejected { status: status.as_u16(), message })
    }
}
