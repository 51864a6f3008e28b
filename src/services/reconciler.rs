use ethers::types::{Address, TransactionReceipt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::{
    consumed_ledger::ConsumedLedger,
    inventory::{InventoryNotifier, RefreshHook},
};
use crate::{
    chain::{decode_settlement_outcome, tx_hash_hex},
    models::{BattleResult, DecodedOutcome},
};

/// Turns a confirmed settlement receipt into the authoritative [`BattleResult`]
/// and tells the outside world the stake is gone.
///
/// Clones share the queue of pending collaborator calls, so any clone can
/// [`flush`](ResultReconciler::flush) them before shutdown.
#[derive(Clone)]
pub struct ResultReconciler {
    settlement_contract: Address,
    ledger: ConsumedLedger,
    inventory: Option<Arc<dyn InventoryNotifier>>,
    refresh_hooks: Vec<Arc<dyn RefreshHook>>,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ResultReconciler {
    pub fn new(settlement_contract: Address, ledger: ConsumedLedger) -> Self {
        Self {
            settlement_contract,
            ledger,
            inventory: None,
            refresh_hooks: Vec::new(),
            pending: Arc::default(),
        }
    }

    pub fn with_inventory(mut self, inventory: Arc<dyn InventoryNotifier>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    pub fn with_refresh_hook(mut self, hook: Arc<dyn RefreshHook>) -> Self {
        self.refresh_hooks.push(hook);
        self
    }

    pub fn decode(&self, receipt: &TransactionReceipt, stake_id: u64) -> DecodedOutcome {
        decode_settlement_outcome(receipt, self.settlement_contract, stake_id)
    }

    /// Decodes the outcome and schedules the best-effort collaborator calls.
    ///
    /// An undecodable receipt yields an unverified loss, never an error.
    pub async fn reconcile(&self, receipt: &TransactionReceipt, stake_id: u64) -> BattleResult {
        let tx_hash = tx_hash_hex(receipt.transaction_hash);
        let outcome = self.decode(receipt, stake_id);

        match outcome {
            DecodedOutcome::Won | DecodedOutcome::Lost => tracing::info!(
                "Settlement {} for stake {} decoded as {:?}",
                tx_hash,
                stake_id,
                outcome
            ),
            DecodedOutcome::Unknown => tracing::warn!(
                "Settlement {} for stake {} confirmed without a decodable SettlementCompleted event; \
                 recording unverified loss",
                tx_hash,
                stake_id
            ),
        }

        self.ledger.mark_consumed(stake_id, Some(tx_hash.clone())).await;
        let handles = self.spawn_notifications(stake_id, tx_hash.clone());
        let mut pending = self.pending.lock().await;
        pending.retain(|handle| !handle.is_finished());
        pending.extend(handles);
        drop(pending);

        BattleResult::from_outcome(outcome, tx_hash)
    }

    /// Waits up to `limit` for every queued collaborator call. Returns
    /// `false` if some were still running when the limit expired.
    pub async fn flush(&self, limit: Duration) -> bool {
        let handles = std::mem::take(&mut *self.pending.lock().await);
        if handles.is_empty() {
            return true;
        }

        let count = handles.len();
        let joined = timeout(limit, async move {
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::warn!("Collaborator notification task failed: {}", e);
                }
            }
        })
        .await;

        match joined {
            Ok(()) => {
                tracing::debug!("Flushed {} collaborator notification(s)", count);
                true
            }
            Err(_) => {
                tracing::warn!(
                    "Collaborator notifications still running after {:?}; giving up",
                    limit
                );
                false
            }
        }
    }

    fn spawn_notifications(&self, stake_id: u64, tx_hash: String) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.refresh_hooks.len() + 1);

        if let Some(inventory) = self.inventory.clone() {
            handles.push(tokio::spawn(async move {
                if let Err(e) = inventory.mark_consumed(stake_id, Some(&tx_hash)).await {
                    tracing::warn!(
                        "Inventory mark_consumed failed for stake {} (tx {}): {}",
                        stake_id,
                        tx_hash,
                        e
                    );
                }
            }));
        }

        for hook in self.refresh_hooks.iter().cloned() {
            handles.push(tokio::spawn(async move {
                if let Err(e) = hook.refresh().await {
                    tracing::warn!("{} refresh failed: {}", hook.name(), e);
                }
            }));
        }

        handles
    }
}
