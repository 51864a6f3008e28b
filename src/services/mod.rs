// Settlement pipeline services
pub mod consumed_ledger;
pub mod inventory;
pub mod orchestrator;
pub mod preparation;
pub mod reconciler;
pub mod session;
pub mod stake_index;

// Re-export for convenience
pub use consumed_ledger::ConsumedLedger;
pub use inventory::{HttpInventoryClient, HttpRefreshHook, InventoryNotifier, RefreshHook};
pub use orchestrator::{StepOutcome, StepTransition, TransactionOrchestrator};
pub use preparation::PreparationService;
pub use reconciler::ResultReconciler;
pub use session::{BattleSession, SessionEvent};
pub use stake_index::{HttpStakeIndex, StakeIndex};
