use chrono::{DateTime, Utc};
use ethers::types::{TxHash, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AppError, Result};

// ==================== PREPARATION ====================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeStats {
    pub hp: u64,
    pub attack: u64,
}

/// Snapshot of everything settlement needs for one battle attempt.
///
/// Never mutated in place: when conditions change a new record is fetched,
/// or derived with [`PreparationRecord::with_approval_granted`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparationRecord {
    pub stake_id: u64,
    pub stats: StakeStats,
    pub eligibility_proof: Vec<H256>,
    pub fee_token_balance: U256,
    pub has_enough_fee: bool,
    pub needs_approval: bool,
    pub current_allowance: U256,
    pub auxiliary_minted: bool,
    pub consumed_on_chain: bool,
}

impl PreparationRecord {
    pub fn with_approval_granted(&self, allowance: U256) -> Self {
        Self {
            needs_approval: false,
            current_allowance: allowance,
            ..self.clone()
        }
    }

    pub fn with_auxiliary_minted(&self) -> Self {
        Self {
            auxiliary_minted: true,
            ..self.clone()
        }
    }
}

// ==================== TRANSACTION STEPS ====================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStep {
    Approval,
    AuxiliaryMint,
    Settlement,
}

impl TxStep {
    pub const ALL: [TxStep; 3] = [TxStep::Approval, TxStep::AuxiliaryMint, TxStep::Settlement];

    pub fn as_str(self) -> &'static str {
        match self {
            TxStep::Approval => "approval",
            TxStep::AuxiliaryMint => "auxiliary_mint",
            TxStep::Settlement => "settlement",
        }
    }
}

impl fmt::Display for TxStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepState {
    Idle,
    Submitting,
    Pending {
        tx_hash: TxHash,
        submitted_at: DateTime<Utc>,
    },
    Confirmed {
        tx_hash: TxHash,
    },
    Reverted {
        tx_hash: Option<TxHash>,
        reason: String,
    },
    /// `tx_hash` is set when the failure came after broadcast, e.g. receipt
    /// polling gave up. Such a step can only be re-checked, never re-sent.
    Failed {
        error: AppError,
        tx_hash: Option<TxHash>,
    },
}

#[derive(Debug, Clone)]
pub enum StepEvent {
    Begin,
    Submitted(TxHash),
    Confirmed(TxHash),
    Reverted(String),
    Failed(AppError),
    /// Resume waiting on the hash of an unverified failure.
    Recheck,
    Reset,
}

impl StepState {
    pub fn label(&self) -> &'static str {
        match self {
            StepState::Idle => "idle",
            StepState::Submitting => "submitting",
            StepState::Pending { .. } => "pending",
            StepState::Confirmed { .. } => "confirmed",
            StepState::Reverted { .. } => "reverted",
            StepState::Failed { .. } => "failed",
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, StepState::Submitting | StepState::Pending { .. })
    }

    /// In flight, or failed after broadcast with the outcome still unknown.
    pub fn is_unresolved(&self) -> bool {
        self.is_in_flight()
            || matches!(
                self,
                StepState::Failed {
                    tx_hash: Some(_),
                    ..
                }
            )
    }

    pub fn tx_hash(&self) -> Option<TxHash> {
        match self {
            StepState::Pending { tx_hash, .. } | StepState::Confirmed { tx_hash } => Some(*tx_hash),
            StepState::Reverted { tx_hash, .. } | StepState::Failed { tx_hash, .. } => *tx_hash,
            _ => None,
        }
    }

    /// The single transition function for a transaction step.
    ///
    /// Returns `None` when `event` is not allowed from the current state; the
    /// caller keeps the old state in that case.
    pub fn apply(&self, event: StepEvent) -> Option<StepState> {
        match (self, event) {
            (_, StepEvent::Reset) => Some(StepState::Idle),
            (StepState::Idle, StepEvent::Begin) => Some(StepState::Submitting),
            (
                StepState::Failed {
                    error,
                    tx_hash: None,
                },
                StepEvent::Begin,
            ) if error.is_retryable() => Some(StepState::Submitting),
            (
                StepState::Failed {
                    tx_hash: Some(tx_hash),
                    ..
                },
                StepEvent::Recheck,
            ) => Some(StepState::Pending {
                tx_hash: *tx_hash,
                submitted_at: Utc::now(),
            }),
            (StepState::Submitting, StepEvent::Submitted(tx_hash)) => Some(StepState::Pending {
                tx_hash,
                submitted_at: Utc::now(),
            }),
            (StepState::Pending { tx_hash, .. }, StepEvent::Confirmed(confirmed))
                if *tx_hash == confirmed =>
            {
                Some(StepState::Confirmed { tx_hash: confirmed })
            }
            (StepState::Submitting, StepEvent::Reverted(reason)) => Some(StepState::Reverted {
                tx_hash: None,
                reason,
            }),
            (StepState::Pending { tx_hash, .. }, StepEvent::Reverted(reason)) => {
                Some(StepState::Reverted {
                    tx_hash: Some(*tx_hash),
                    reason,
                })
            }
            (StepState::Submitting, StepEvent::Failed(error)) => Some(StepState::Failed {
                error,
                tx_hash: None,
            }),
            (StepState::Pending { tx_hash, .. }, StepEvent::Failed(error)) => {
                Some(StepState::Failed {
                    error,
                    tx_hash: Some(*tx_hash),
                })
            }
            _ => None,
        }
    }
}

/// A wallet-signed transaction whose local tracking was dropped by a reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbandonedTransaction {
    pub step: TxStep,
    pub tx_hash: Option<TxHash>,
}

// ==================== RESULT ====================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodedOutcome {
    Won,
    Lost,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleResult {
    pub won: bool,
    pub settlement_tx_hash: String,
    /// `false` when no outcome event was decodable and `won` is the
    /// conservative loss default.
    pub verified: bool,
}

impl BattleResult {
    pub fn from_outcome(outcome: DecodedOutcome, settlement_tx_hash: String) -> Self {
        Self {
            won: outcome == DecodedOutcome::Won,
            settlement_tx_hash,
            verified: outcome != DecodedOutcome::Unknown,
        }
    }

    /// Strict view of the result for callers that must not treat the
    /// conservative loss default as a real outcome.
    pub fn require_verified(self) -> Result<Self> {
        if self.verified {
            Ok(self)
        } else {
            Err(AppError::UnknownOutcome {
                tx_hash: self.settlement_tx_hash,
            })
        }
    }
}
