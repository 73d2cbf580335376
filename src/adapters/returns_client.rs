use crate::core::ReturnsCalculator;
use crate::domain::model::{BaselineRequest, ReturnsRequest, ReturnsResult};
use crate::utils::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

/// Client for a deployed returns service (`tracker serve`).
#[derive(Debug, Clone)]
pub struct RemoteReturns {
    client: Client,
    base_url: String,
}

impl RemoteReturns {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<ReturnsResult> {
        let url = format!("{}/{}", self.base_url, path);
        tracing::debug!("POST {}", url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ReturnsCalculator for RemoteReturns {
    async fn security_returns(&self, request: &ReturnsRequest) -> Result<ReturnsResult> {
        self.post("returns/", request).await
    }

    async fn baseline_returns(&self, request: &BaselineRequest) -> Result<ReturnsResult> {
        self.post("returns-baseline/", request).await
    }
}
