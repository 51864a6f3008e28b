use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::{
    constants::COLLABORATOR_TIMEOUT_SECS,
    error::{AppError, Result},
};

/// Outbound inventory collaborator. Calls are best-effort; the chain remains
/// the source of truth for consumption.
#[async_trait]
pub trait InventoryNotifier: Send + Sync {
    async fn mark_consumed(&self, stake_id: u64, settlement_tx_hash: Option<&str>) -> Result<()>;
}

/// Fire-and-forget "refresh" trigger for profile/quest collaborators.
#[async_trait]
pub trait RefreshHook: Send + Sync {
    fn name(&self) -> &str;

    async fn refresh(&self) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct MarkConsumedRequest<'a> {
    consumed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    settlement_tx_hash: Option<&'a str>,
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(COLLABORATOR_TIMEOUT_SECS))
        .build()
        .map_err(|e| AppError::Config(format!("HTTP client: {}", e)))
}

/// `POST {base}/inventory/{stakeId}/consume`
pub struct HttpInventoryClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpInventoryClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: http_client()?,
        })
    }
}

#[async_trait]
impl InventoryNotifier for HttpInventoryClient {
    async fn mark_consumed(&self, stake_id: u64, settlement_tx_hash: Option<&str>) -> Result<()> {
        let url = format!("{}/inventory/{}/consume", self.base_url, stake_id);
        self.client
            .post(&url)
            .json(&MarkConsumedRequest {
                consumed: true,
                settlement_tx_hash,
            })
            .send()
            .await
            .map_err(|e| AppError::NetworkError(format!("inventory: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::NetworkError(format!("inventory: {}", e)))?;
        Ok(())
    }
}

/// Posts an empty body to a refresh endpoint.
pub struct HttpRefreshHook {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl HttpRefreshHook {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            url: url.into(),
            client: http_client()?,
        })
    }
}

#[async_trait]
impl RefreshHook for HttpRefreshHook {
    fn name(&self) -> &str {
        &self.name
    }

    async fn refresh(&self) -> Result<()> {
        self.client
            .post(&self.url)
            .send()
            .await
            .map_err(|e| AppError::NetworkError(format!("{} refresh: {}", self.name, e)))?
            .error_for_status()
            .map_err(|e| AppError::NetworkError(format!("{} refresh: {}", self.name, e)))?;
        Ok(())
    }
}
