//! Combat rules common to both match modes: damage, target legality, the
//! Queen's heal and dealing rosters.

use crate::error::{GameError, Result};
use crate::specs::SpecStore;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use tcr_shared::{Tower, Troop, GUARD1, GUARD2, KING, QUEEN_HEAL_AMOUNT};

/// A player's towers keyed by name.
pub type Towers = BTreeMap<String, Tower>;

/// Which guard each player has committed to, keyed by attacker.
pub type AttackPatterns = HashMap<String, String>;

pub const CRIT_MULTIPLIER: f64 = 1.2;
pub const HAND_SIZE: usize = 3;

pub fn damage(atk: i32, def: i32) -> i32 {
    (atk - def).max(0)
}

/// Troop hits tower. Returns the damage dealt.
pub fn strike_tower(troop: &Troop, tower: &mut Tower) -> i32 {
    let dealt = damage(troop.atk, tower.def);
    tower.take_damage(dealt);
    dealt
}

/// Tower hits back. A critical counter multiplies the tower's ATK.
pub fn counter_attack(tower: &Tower, troop: &mut Troop, crit: bool) -> i32 {
    let atk = if crit {
        (tower.atk as f64 * CRIT_MULTIPLIER) as i32
    } else {
        tower.atk
    };
    let dealt = damage(atk, troop.def);
    troop.take_damage(dealt);
    dealt
}

/// Checks whether `attacker` may hit `target` among `enemy` towers.
///
/// The King is off limits while both guards stand, and once an attacker has
/// committed to one guard the other is locked until the first falls.
pub fn validate_target(
    patterns: &AttackPatterns,
    attacker: &str,
    enemy: &Towers,
    target: &str,
) -> Result<()> {
    let alive = |name: &str| enemy.get(name).map(Tower::is_alive).unwrap_or(false);

    if target == KING {
        if alive(GUARD1) && alive(GUARD2) {
            return Err(GameError::KingProtected);
        }
    } else if target == GUARD1 || target == GUARD2 {
        if let Some(locked) = patterns.get(attacker) {
            if locked != target && alive(locked) {
                return Err(GameError::GuardLocked {
                    locked: locked.clone(),
                    requested: target.to_string(),
                });
            }
        }
    }

    if !alive(target) {
        return Err(GameError::InvalidTower);
    }
    Ok(())
}

/// Records the attacker's first guard choice.
pub fn commit_target(patterns: &mut AttackPatterns, attacker: &str, target: &str) {
    if target == GUARD1 || target == GUARD2 {
        patterns
            .entry(attacker.to_string())
            .or_insert_with(|| target.to_string());
    }
}

/// Heals the owner's weakest standing guard. Returns the healed tower's
/// name and new HP. Healing is not capped by the tower's starting HP.
pub fn queen_heal(towers: &mut Towers) -> Option<(String, i32)> {
    let target = [GUARD1, GUARD2]
        .into_iter()
        .filter_map(|name| towers.get(name))
        .filter(|t| t.is_alive())
        .min_by_key(|t| t.hp)
        .map(|t| t.name.clone())?;

    let tower = towers.get_mut(&target)?;
    tower.hp += QUEEN_HEAL_AMOUNT;
    Some((target, tower.hp))
}

/// Index of the first deployable troop with the given name.
pub fn find_usable(troops: &[Troop], name: &str) -> Option<usize> {
    troops.iter().position(|t| t.name == name && t.is_usable())
}

pub fn alive_towers(towers: &Towers) -> usize {
    towers.values().filter(|t| t.is_alive()).count()
}

pub fn total_tower_hp(towers: &Towers) -> i32 {
    towers.values().map(|t| t.hp).sum()
}

/// Builds a full tower set, scaling each tower by `multiplier(name)`.
pub fn build_towers(specs: &SpecStore, multiplier: impl Fn(&str) -> f64) -> Towers {
    specs
        .towers()
        .iter()
        .map(|spec| (spec.name.clone(), Tower::from_spec(spec, multiplier(&spec.name))))
        .collect()
}

/// Deals a hand of distinct troops drawn uniformly without replacement.
pub fn deal_troops<R: Rng + ?Sized>(
    specs: &SpecStore,
    owner: &str,
    multiplier: f64,
    rng: &mut R,
) -> Vec<Troop> {
    specs
        .troops()
        .choose_multiple(rng, HAND_SIZE)
        .map(|spec| Troop::from_spec(spec, owner, multiplier))
        .collect()
}
