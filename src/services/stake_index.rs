use async_trait::async_trait;
use ethers::types::H256;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use crate::{
    constants::COLLABORATOR_TIMEOUT_SECS,
    error::{AppError, Result},
    models::StakeStats,
};

/// Stats and eligibility proof for one stake, as published by the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedStake {
    pub stats: StakeStats,
    pub proof: Vec<H256>,
}

/// Trusted off-chain source of stake statistics and proofs.
#[async_trait]
pub trait StakeIndex: Send + Sync {
    async fn resolve(&self, stake_id: u64) -> Result<IndexedStake>;
}

#[derive(Debug, Deserialize)]
struct StakeIndexResponse {
    hp: u64,
    attack: u64,
    proof: Vec<String>,
}

// Internal helper that parses or transforms values for `parse_proof`.
fn parse_proof(raw: &[String]) -> Result<Vec<H256>> {
    raw.iter()
        .map(|item| {
            let trimmed = item.trim();
            let normalized = if trimmed.starts_with("0x") {
                trimmed.to_string()
            } else {
                format!("0x{trimmed}")
            };
            if normalized.len() != 66 {
                return Err(AppError::PreparationFailed(format!(
                    "proof element has wrong length: {}",
                    item
                )));
            }
            H256::from_str(&normalized).map_err(|e| {
                AppError::PreparationFailed(format!("invalid proof element {}: {}", item, e))
            })
        })
        .collect()
}

/// HTTP client for the stake index: `GET {base}/stakes/{id}`.
pub struct HttpStakeIndex {
    base_url: String,
    client: reqwest::Client,
}

impl HttpStakeIndex {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(COLLABORATOR_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn stake_url(&self, stake_id: u64) -> String {
        format!("{}/stakes/{}", self.base_url, stake_id)
    }
}

#[async_trait]
impl StakeIndex for HttpStakeIndex {
    async fn resolve(&self, stake_id: u64) -> Result<IndexedStake> {
        let response = self
            .client
            .get(self.stake_url(stake_id))
            .send()
            .await
            .map_err(|e| AppError::PreparationFailed(format!("stake index unreachable: {}", e)))?
            .error_for_status()
            .map_err(|e| AppError::PreparationFailed(format!("stake index rejected: {}", e)))?;

        let body: StakeIndexResponse = response
            .json()
            .await
            .map_err(|e| AppError::PreparationFailed(format!("stake index payload: {}", e)))?;

        Ok(IndexedStake {
            stats: StakeStats {
                hp: body.hp,
                attack: body.attack,
            },
            proof: parse_proof(&body.proof)?,
        })
    }
}

#[cfg(test)]
pub(crate) struct StaticStakeIndex(pub std::collections::HashMap<u64, IndexedStake>);

#[cfg(test)]
#[async_trait]
impl StakeIndex for StaticStakeIndex {
    async fn resolve(&self, stake_id: u64) -> Result<IndexedStake> {
        self.0
            .get(&stake_id)
            .cloned()
            .ok_or_else(|| AppError::PreparationFailed(format!("stake {} not indexed", stake_id)))
    }
}
