use serde::Serialize;
use tokio::time::sleep;

use super::engine::CombatEngine;
use crate::{
    config::CombatTiming,
    error::{AppError, Result},
    models::{BattleSetup, BattleStatus, DamageEvent, Side},
};

/// Presentation-facing notifications from the animated battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CombatEvent {
    StatusChanged {
        status: BattleStatus,
    },
    Hit {
        turn: u32,
        attacker: Side,
        damage: DamageEvent,
        remaining_hp: u32,
    },
    HitEffectCleared,
    TurnAdvanced {
        turn: u32,
        current: Side,
    },
}

/// Plays a full battle on a timer: attack, hit-effect window, turn delay,
/// repeat until a terminal status. The delays are purely cosmetic.
pub async fn run_battle<F>(
    engine: &mut CombatEngine,
    setup: BattleSetup,
    timing: &CombatTiming,
    mut observe: F,
) -> Result<BattleStatus>
where
    F: FnMut(CombatEvent),
{
    if engine.status().is_terminal() {
        engine.set_status(BattleStatus::Loading)?;
    } else if engine.status() != BattleStatus::Loading {
        engine.reset_battle();
    }
    engine.set_status(BattleStatus::Ready)?;
    engine.init_battle(setup);
    observe(CombatEvent::StatusChanged {
        status: BattleStatus::Ready,
    });

    engine.set_status(BattleStatus::InProgress)?;
    observe(CombatEvent::StatusChanged {
        status: BattleStatus::InProgress,
    });

    loop {
        let attacker = engine.state().current_turn;
        if let Some(damage) = engine.execute_attack() {
            observe(CombatEvent::Hit {
                turn: engine.state().turn_count,
                attacker,
                damage,
                remaining_hp: engine.state().character(damage.target).current_hp,
            });
        }

        sleep(timing.hit_effect).await;

        let status = engine.status();
        if status.is_terminal() {
            observe(CombatEvent::StatusChanged { status });
            return Ok(status);
        }

        engine.clear_hit_effect();
        observe(CombatEvent::HitEffectCleared);

        if engine.state().turn_count + 1 >= timing.max_turns {
            tracing::warn!("Battle stalled after {} turns", timing.max_turns);
            return Err(AppError::CombatStalled(timing.max_turns));
        }

        sleep(timing.turn_delay.saturating_sub(timing.hit_effect)).await;
        engine.next_turn();
        observe(CombatEvent::TurnAdvanced {
            turn: engine.state().turn_count,
            current: engine.state().current_turn,
        });
    }
}
