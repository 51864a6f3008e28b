use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumedMark {
    pub consumed: bool,
    pub settlement_tx_hash: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Local display cache of which stakes are consumed.
///
/// The chain is authoritative: every on-chain read passes through
/// [`ConsumedLedger::reconcile`], which overwrites whatever the cache held.
#[derive(Debug, Clone, Default)]
pub struct ConsumedLedger {
    marks: Arc<RwLock<HashMap<u64, ConsumedMark>>>,
}

impl ConsumedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, stake_id: u64) -> Option<ConsumedMark> {
        self.marks.read().await.get(&stake_id).cloned()
    }

    pub async fn is_consumed(&self, stake_id: u64) -> bool {
        self.get(stake_id)
            .await
            .map(|mark| mark.consumed)
            .unwrap_or(false)
    }

    pub async fn mark_consumed(&self, stake_id: u64, settlement_tx_hash: Option<String>) {
        let mut marks = self.marks.write().await;
        marks.insert(
            stake_id,
            ConsumedMark {
                consumed: true,
                settlement_tx_hash,
                updated_at: Utc::now(),
            },
        );
    }

    /// Applies a fresh on-chain reading and returns it.
    pub async fn reconcile(&self, stake_id: u64, on_chain: bool) -> bool {
        let mut marks = self.marks.write().await;
        let cached = marks.get(&stake_id).map(|mark| mark.consumed);
        if let Some(cached) = cached {
            if cached != on_chain {
                tracing::warn!(
                    "Consumed flag for stake {} diverged (cache={}, chain={}); trusting chain",
                    stake_id,
                    cached,
                    on_chain
                );
            }
        }
        if cached != Some(on_chain) {
            let settlement_tx_hash = marks
                .get(&stake_id)
                .filter(|_| on_chain)
                .and_then(|mark| mark.settlement_tx_hash.clone());
            marks.insert(
                stake_id,
                ConsumedMark {
                    consumed: on_chain,
                    settlement_tx_hash,
                    updated_at: Utc::now(),
                },
            );
        }
        on_chain
    }
}
