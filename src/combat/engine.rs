use crate::{
    error::{AppError, Result},
    models::{BattleSetup, BattleStatus, CharacterStats, CombatState, DamageEvent, Side},
};

/// Status changes the engine accepts. Everything else is rejected so setup and
/// teardown steps cannot be skipped.
pub fn valid_transitions(from: BattleStatus) -> &'static [BattleStatus] {
    match from {
        BattleStatus::Loading => &[BattleStatus::Ready],
        BattleStatus::Ready => &[BattleStatus::InProgress],
        BattleStatus::InProgress => &[BattleStatus::Victory, BattleStatus::Defeat],
        BattleStatus::Victory => &[BattleStatus::Loading],
        BattleStatus::Defeat => &[BattleStatus::Loading],
    }
}

/// Deterministic turn-based duel. Damage is symmetric and has no randomness,
/// so a battle replays identically from the same setup.
#[derive(Debug, Clone, Default)]
pub struct CombatEngine {
    state: CombatState,
}

impl CombatEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &CombatState {
        &self.state
    }

    pub fn status(&self) -> BattleStatus {
        self.state.status
    }

    pub fn init_battle(&mut self, setup: BattleSetup) {
        self.state = CombatState {
            status: BattleStatus::Ready,
            attacker: setup
                .attacker
                .map(clamp_hp)
                .unwrap_or_else(CharacterStats::default_attacker),
            defender: setup
                .defender
                .map(clamp_hp)
                .unwrap_or_else(CharacterStats::default_defender),
            ..CombatState::default()
        };
        tracing::debug!(
            "Battle initialized: {} ({} hp) vs {} ({} hp)",
            self.state.attacker.name,
            self.state.attacker.max_hp,
            self.state.defender.name,
            self.state.defender.max_hp
        );
    }

    /// Resolves one hit from the side whose turn it is. Returns the damage
    /// dealt, or `None` when the battle is not in progress.
    pub fn execute_attack(&mut self) -> Option<DamageEvent> {
        if self.state.status != BattleStatus::InProgress {
            return None;
        }

        let striker = self.state.current_turn;
        let target = striker.opponent();
        let atk = self.state.character(striker).atk;

        let defender = self.state.character_mut(target);
        let new_hp = defender.current_hp.saturating_sub(atk);
        let amount = defender.current_hp - new_hp;
        defender.current_hp = new_hp;
        let defeated = defender.is_defeated();

        let event = DamageEvent { target, amount };
        self.state.last_damage = Some(event);
        self.state.hit_effect = true;
        self.state.hit_target = Some(target);

        if defeated {
            let outcome = match striker {
                Side::Attacker => BattleStatus::Victory,
                Side::Defender => BattleStatus::Defeat,
            };
            self.state.status = outcome;
            tracing::info!(
                "Battle finished after {} turns: {}",
                self.state.turn_count,
                outcome
            );
        }

        Some(event)
    }

    pub fn next_turn(&mut self) {
        if self.state.status != BattleStatus::InProgress {
            return;
        }
        self.state.current_turn = self.state.current_turn.opponent();
        self.state.turn_count += 1;
        self.state.hit_effect = false;
        self.state.hit_target = None;
    }

    /// Clears the hit flash without advancing the turn.
    pub fn clear_hit_effect(&mut self) {
        self.state.hit_effect = false;
        self.state.hit_target = None;
    }

    pub fn set_status(&mut self, to: BattleStatus) -> Result<()> {
        let from = self.state.status;
        if !valid_transitions(from).contains(&to) {
            tracing::warn!("Rejected battle status transition {} -> {}", from, to);
            return Err(AppError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        self.state.status = to;
        Ok(())
    }

    pub fn reset_battle(&mut self) {
        self.state = CombatState::default();
    }
}

// Internal helper that keeps supplied stats inside [0, max_hp].
fn clamp_hp(mut stats: CharacterStats) -> CharacterStats {
    stats.current_hp = stats.current_hp.min(stats.max_hp);
    stats
}
