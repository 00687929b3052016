//! Types shared by the tower-and-troop server and its terminal client:
//! protocol constants, the line protocol itself, the combat model and the
//! JSON snapshot pushed to Enhanced-mode players.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub mod protocol;

pub use protocol::{Command, Event, ProtocolError};

pub const DEFAULT_PORT: u16 = 9000;
pub const FIELD_DELIMITER: char = '|';

pub const GUARD1: &str = "Guard1";
pub const GUARD2: &str = "Guard2";
pub const KING: &str = "King";
pub const TOWER_NAMES: [&str; 3] = [GUARD1, GUARD2, KING];

pub const QUEEN: &str = "Queen";
pub const QUEEN_HEAL_AMOUNT: i32 = 300;

/// Game mode chosen when a room is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum GameMode {
    #[default]
    Simple,
    Enhanced,
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameMode::Simple => write!(f, "SIMPLE"),
            GameMode::Enhanced => write!(f, "ENHANCED"),
        }
    }
}

impl FromStr for GameMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "SIMPLE" => Ok(GameMode::Simple),
            "ENHANCED" => Ok(GameMode::Enhanced),
            _ => Err(ProtocolError::UnknownMode(s.to_string())),
        }
    }
}

/// Static stats for one tower kind, as loaded from the spec file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TowerSpec {
    pub name: String,
    pub hp: i32,
    pub atk: i32,
    pub def: i32,
    #[serde(default)]
    pub crit: f64,
    #[serde(default)]
    pub exp: i32,
}

/// Static stats for one troop kind, as loaded from the spec file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TroopSpec {
    pub name: String,
    pub hp: i32,
    pub atk: i32,
    pub def: i32,
    #[serde(default)]
    pub mana: u32,
    #[serde(default)]
    pub exp: i32,
    #[serde(default)]
    pub special: String,
}

/// A live tower owned by one player in one match.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Tower {
    pub name: String,
    pub hp: i32,
    pub atk: i32,
    pub def: i32,
}

impl Tower {
    pub fn from_spec(spec: &TowerSpec, multiplier: f64) -> Self {
        Self {
            name: spec.name.clone(),
            hp: scale(spec.hp, multiplier),
            atk: scale(spec.atk, multiplier),
            def: scale(spec.def, multiplier),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    /// Applies damage and returns the HP actually removed. HP never drops below 0.
    pub fn take_damage(&mut self, damage: i32) -> i32 {
        let before = self.hp;
        self.hp = (self.hp - damage.max(0)).max(0);
        before - self.hp
    }
}

/// A troop on a player's roster.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Troop {
    pub name: String,
    pub hp: i32,
    pub atk: i32,
    pub def: i32,
    pub owner: String,
}

impl Troop {
    pub fn from_spec(spec: &TroopSpec, owner: &str, multiplier: f64) -> Self {
        Self {
            name: spec.name.clone(),
            hp: scale(spec.hp, multiplier),
            atk: scale(spec.atk, multiplier),
            def: scale(spec.def, multiplier),
            owner: owner.to_string(),
        }
    }

    pub fn is_queen(&self) -> bool {
        self.name == QUEEN
    }

    /// The Queen can always be deployed; everyone else needs HP left.
    pub fn is_usable(&self) -> bool {
        self.is_queen() || self.hp > 0
    }

    pub fn take_damage(&mut self, damage: i32) {
        self.hp = (self.hp - damage.max(0)).max(0);
    }
}

fn scale(value: i32, multiplier: f64) -> i32 {
    (value as f64 * multiplier) as i32
}

/// One player's side of an Enhanced match as sent in `STATE|{...}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub username: String,
    pub towers: BTreeMap<String, Tower>,
    pub troops: Vec<Troop>,
    pub mana: u32,
    pub exp: u32,
    pub level: u32,
}

/// Full Enhanced match state as sent in `STATE|{...}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MatchSnapshot {
    pub room_id: String,
    pub players: BTreeMap<String, PlayerSnapshot>,
    pub winner: String,
    pub over: bool,
    pub start_time: u64,
    pub end_time: u64,
    pub remaining_secs: u64,
    pub attack_patterns: BTreeMap<String, String>,
}

impl MatchSnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
