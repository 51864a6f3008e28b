// src/models/mod.rs
pub mod battle;
pub mod settlement;

// Re-export commonly used types so other modules can use `crate::models::X`
pub use battle::{
    BattleSetup, BattleStatus, CharacterStats, CombatState, DamageEvent, Side,
};
pub use settlement::{
    AbandonedTransaction, BattleResult, DecodedOutcome, PreparationRecord, StakeStats, StepEvent,
    StepState, TxStep,
};
