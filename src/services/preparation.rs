use ethers::types::{H256, U256};
use std::sync::Arc;

use super::{consumed_ledger::ConsumedLedger, stake_index::StakeIndex};
use crate::{
    chain::ChainGateway,
    config::Config,
    crypto::verify_stake_proof,
    error::{AppError, Result},
    models::PreparationRecord,
};

/// Resolves everything a settlement attempt needs into one immutable record.
pub struct PreparationService {
    gateway: Arc<dyn ChainGateway>,
    index: Arc<dyn StakeIndex>,
    ledger: ConsumedLedger,
    battle_fee: U256,
    eligibility_root: Option<H256>,
}

impl PreparationService {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        index: Arc<dyn StakeIndex>,
        ledger: ConsumedLedger,
        battle_fee: U256,
    ) -> Self {
        Self {
            gateway,
            index,
            ledger,
            battle_fee,
            eligibility_root: None,
        }
    }

    pub fn from_config(
        config: &Config,
        gateway: Arc<dyn ChainGateway>,
        index: Arc<dyn StakeIndex>,
        ledger: ConsumedLedger,
    ) -> Self {
        Self::new(gateway, index, ledger, config.battle_fee)
            .with_eligibility_root(config.eligibility_root)
    }

    pub fn with_eligibility_root(mut self, root: Option<H256>) -> Self {
        self.eligibility_root = root;
        self
    }

    pub fn battle_fee(&self) -> U256 {
        self.battle_fee
    }

    /// Builds a fresh [`PreparationRecord`] for `stake_id`.
    ///
    /// A short fee balance is reported in the record, not as an error. A
    /// consumed stake is also only reported; callers must refuse to settle it.
    pub async fn prepare(&self, stake_id: u64) -> Result<PreparationRecord> {
        let owner = self.gateway.account().ok_or(AppError::WalletNotConnected)?;

        let indexed = self.index.resolve(stake_id).await?;
        if let Some(root) = self.eligibility_root {
            if !verify_stake_proof(root, stake_id, indexed.stats, &indexed.proof) {
                tracing::warn!(
                    "Eligibility proof for stake {} does not match configured root {:#x}",
                    stake_id,
                    root
                );
                return Err(AppError::PreparationFailed(format!(
                    "eligibility proof for stake {} does not verify",
                    stake_id
                )));
            }
        }

        let (fee_token_balance, current_allowance, auxiliary_minted, consumed) = tokio::try_join!(
            self.gateway.fee_token_balance(owner),
            self.gateway.fee_allowance(owner),
            self.gateway.auxiliary_minted(owner),
            self.gateway.is_consumed(stake_id),
        )?;
        let consumed_on_chain = self.ledger.reconcile(stake_id, consumed).await;

        let record = PreparationRecord {
            stake_id,
            stats: indexed.stats,
            eligibility_proof: indexed.proof,
            fee_token_balance,
            has_enough_fee: fee_token_balance >= self.battle_fee,
            needs_approval: current_allowance < self.battle_fee,
            current_allowance,
            auxiliary_minted,
            consumed_on_chain,
        };

        tracing::info!(
            "Prepared stake {} (hp={}, attack={}, enough_fee={}, needs_approval={}, consumed={})",
            stake_id,
            record.stats.hp,
            record.stats.attack,
            record.has_enough_fee,
            record.needs_approval,
            record.consumed_on_chain
        );
        Ok(record)
    }
}
