pub mod hash;
pub mod merkle;

pub use merkle::{stake_leaf, verify_stake_proof};
