use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{
    DEFAULT_ATTACKER_ATK, DEFAULT_ATTACKER_HP, DEFAULT_ATTACKER_NAME, DEFAULT_DEFENDER_ATK,
    DEFAULT_DEFENDER_HP, DEFAULT_DEFENDER_NAME,
};

// ==================== STATUS ====================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleStatus {
    Loading,
    Ready,
    InProgress,
    Victory,
    Defeat,
}

impl BattleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BattleStatus::Loading => "loading",
            BattleStatus::Ready => "ready",
            BattleStatus::InProgress => "in_progress",
            BattleStatus::Victory => "victory",
            BattleStatus::Defeat => "defeat",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BattleStatus::Victory | BattleStatus::Defeat)
    }
}

impl fmt::Display for BattleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The attacker is always the player's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Attacker,
    Defender,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::Attacker => Side::Defender,
            Side::Defender => Side::Attacker,
        }
    }
}

// ==================== COMBATANTS ====================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterStats {
    pub name: String,
    pub current_hp: u32,
    pub max_hp: u32,
    pub atk: u32,
}

impl CharacterStats {
    pub fn new(name: impl Into<String>, max_hp: u32, atk: u32) -> Self {
        Self {
            name: name.into(),
            current_hp: max_hp,
            max_hp,
            atk,
        }
    }

    pub fn default_attacker() -> Self {
        Self::new(DEFAULT_ATTACKER_NAME, DEFAULT_ATTACKER_HP, DEFAULT_ATTACKER_ATK)
    }

    pub fn default_defender() -> Self {
        Self::new(DEFAULT_DEFENDER_NAME, DEFAULT_DEFENDER_HP, DEFAULT_DEFENDER_ATK)
    }

    pub fn is_defeated(&self) -> bool {
        self.current_hp == 0
    }
}

/// Optional overrides handed to `init_battle`; missing sides fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleSetup {
    pub attacker: Option<CharacterStats>,
    pub defender: Option<CharacterStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageEvent {
    pub target: Side,
    pub amount: u32,
}

// ==================== STATE ====================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatState {
    pub status: BattleStatus,
    pub current_turn: Side,
    pub turn_count: u32,
    pub attacker: CharacterStats,
    pub defender: CharacterStats,
    pub last_damage: Option<DamageEvent>,
    pub hit_effect: bool,
    pub hit_target: Option<Side>,
}

impl Default for CombatState {
    fn default() -> Self {
        Self {
            status: BattleStatus::Loading,
            current_turn: Side::Attacker,
            turn_count: 0,
            attacker: CharacterStats::default_attacker(),
            defender: CharacterStats::default_defender(),
            last_damage: None,
            hit_effect: false,
            hit_target: None,
        }
    }
}

impl CombatState {
    pub fn character(&self, side: Side) -> &CharacterStats {
        match side {
            Side::Attacker => &self.attacker,
            Side::Defender => &self.defender,
        }
    }

    pub fn character_mut(&mut self, side: Side) -> &mut CharacterStats {
        match side {
            Side::Attacker => &mut self.attacker,
            Side::Defender => &mut self.defender,
        }
    }
}
