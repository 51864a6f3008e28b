use serde::Serialize;
use thiserror::Error;

use crate::chain::ChainError;
use crate::models::TxStep;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("Wallet not connected")]
    WalletNotConnected,

    #[error("Preparation failed: {0}")]
    PreparationFailed(String),

    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("Allowance insufficient: approval required before settlement")]
    AllowanceInsufficient,

    #[error("Request cancelled in wallet")]
    UserCancelled,

    #[error("Contract reverted: {0}")]
    ContractReverted(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Unable to verify transaction {tx_hash}; check its status manually")]
    ConfirmationUnverified { tx_hash: String },

    #[error("Settlement {tx_hash} confirmed but its outcome event could not be decoded")]
    UnknownOutcome { tx_hash: String },

    #[error("Stake {0} is already consumed on-chain")]
    StakeConsumed(u64),

    #[error("No active preparation record")]
    NotPrepared,

    #[error("{0} transaction is still awaiting confirmation")]
    StepInFlight(TxStep),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Combat did not finish within {0} turns")]
    CombatStalled(u32),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// What the presentation layer should offer the user after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recovery {
    RetryNow,
    RedirectAfterCountdown,
    CheckStatus,
    Blocked,
    None,
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::WalletNotConnected => "WALLET_NOT_CONNECTED",
            AppError::PreparationFailed(_) => "PREPARATION_FAILED",
            AppError::InsufficientBalance(_) => "INSUFFICIENT_BALANCE",
            AppError::AllowanceInsufficient => "ALLOWANCE_INSUFFICIENT",
            AppError::UserCancelled => "USER_CANCELLED",
            AppError::ContractReverted(_) => "CONTRACT_REVERTED",
            AppError::NetworkError(_) => "NETWORK_ERROR",
            AppError::ConfirmationUnverified { .. } => "CONFIRMATION_UNVERIFIED",
            AppError::UnknownOutcome { .. } => "UNKNOWN_OUTCOME",
            AppError::StakeConsumed(_) => "STAKE_CONSUMED",
            AppError::NotPrepared => "NOT_PREPARED",
            AppError::StepInFlight(_) => "STEP_IN_FLIGHT",
            AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AppError::CombatStalled(_) => "COMBAT_STALLED",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn recovery(&self) -> Recovery {
        match self {
            AppError::UserCancelled | AppError::WalletNotConnected => Recovery::RetryNow,
            AppError::InsufficientBalance(_) => Recovery::RedirectAfterCountdown,
            AppError::ContractReverted(_)
            | AppError::NetworkError(_)
            | AppError::ConfirmationUnverified { .. }
            | AppError::UnknownOutcome { .. }
            | AppError::StepInFlight(_) => Recovery::CheckStatus,
            AppError::StakeConsumed(_) | AppError::PreparationFailed(_) => Recovery::Blocked,
            AppError::AllowanceInsufficient
            | AppError::NotPrepared
            | AppError::InvalidTransition { .. }
            | AppError::CombatStalled(_)
            | AppError::Config(_)
            | AppError::Internal(_) => Recovery::None,
        }
    }

    /// Whether a step that failed with this error before anything was
    /// broadcast may be submitted again without resetting the session.
    ///
    /// `ConfirmationUnverified` is not: its transaction exists, so a retry
    /// re-checks that hash instead of signing a new one.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::UserCancelled | AppError::WalletNotConnected | AppError::NetworkError(_)
        )
    }
}

impl From<ChainError> for AppError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::WalletNotConnected => AppError::WalletNotConnected,
            ChainError::UserRejected => AppError::UserCancelled,
            ChainError::InsufficientFunds { required, available } => {
                AppError::InsufficientBalance(format!(
                    "gas requires {} wei, wallet holds {}",
                    required, available
                ))
            }
            ChainError::Reverted { reason } => AppError::ContractReverted(reason),
            ChainError::Rpc { code, message } => {
                AppError::NetworkError(format!("rpc error {}: {}", code, message))
            }
            ChainError::Network(message) => AppError::NetworkError(message),
            ChainError::Timeout => AppError::NetworkError("request timed out".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    pub recovery: Recovery,
}

impl From<&AppError> for ErrorDetail {
    fn from(err: &AppError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            recovery: err.recovery(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
