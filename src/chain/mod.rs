//! Boundary between the orchestrator and the chain.
//!
//! Everything on the other side of [`ChainGateway`] speaks in provider
//! types; everything on this side only sees a tagged [`ChainError`].

pub mod contracts;
pub mod events;
pub mod evm;
#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use ethers::types::{Address, TransactionReceipt, TxHash, H256, U256};
use thiserror::Error;

use crate::models::StakeStats;

pub use events::{decode_settlement_outcome, tx_hash_hex};
pub use evm::EvmGateway;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("No wallet account available")]
    WalletNotConnected,

    #[error("User rejected the request")]
    UserRejected,

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: U256, available: U256 },

    #[error("Execution reverted: {reason}")]
    Reverted { reason: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,
}

#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Signing account, if a wallet is connected.
    fn account(&self) -> Option<Address>;

    fn settlement_contract(&self) -> Address;

    async fn fee_token_balance(&self, owner: Address) -> Result<U256, ChainError>;

    /// Allowance `owner` has granted to the settlement contract.
    async fn fee_allowance(&self, owner: Address) -> Result<U256, ChainError>;

    async fn auxiliary_minted(&self, owner: Address) -> Result<bool, ChainError>;

    async fn is_consumed(&self, stake_id: u64) -> Result<bool, ChainError>;

    async fn send_approval(&self, amount: U256) -> Result<TxHash, ChainError>;

    async fn send_auxiliary_mint(&self) -> Result<TxHash, ChainError>;

    async fn send_settlement(
        &self,
        stake_id: u64,
        stats: StakeStats,
        proof: &[H256],
    ) -> Result<TxHash, ChainError>;

    /// Waits for the transaction to be mined. `Ok(None)` means the provider
    /// gave up without finding it.
    async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, ChainError>;

    /// Single non-blocking receipt lookup.
    async fn transaction_receipt(
        &self,
        tx_hash: TxHash,
    ) -> Result<Option<TransactionReceipt>, ChainError>;
}
