pub mod driver;
pub mod engine;

pub use driver::{run_battle, CombatEvent};
pub use engine::{valid_transitions, CombatEngine};
