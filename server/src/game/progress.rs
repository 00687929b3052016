//! Persistent player progression: EXP awards and the leveling curve.

use std::collections::HashMap;

/// EXP and level carried between Enhanced matches.
///
/// Per-tower and per-troop upgrade levels are reserved; nothing grants
/// them yet, so scaling falls back to level 1 for every entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub username: String,
    pub exp: u32,
    pub level: u32,
    pub tower_levels: HashMap<String, u32>,
    pub troop_levels: HashMap<String, u32>,
}

impl Progress {
    pub fn new(username: &str) -> Self {
        Self::with_exp(username, 0, 1)
    }

    pub fn with_exp(username: &str, exp: u32, level: u32) -> Self {
        Self {
            username: username.to_string(),
            exp,
            level: level.max(1),
            tower_levels: HashMap::new(),
            troop_levels: HashMap::new(),
        }
    }

    pub fn tower_level(&self, tower: &str) -> u32 {
        self.tower_levels.get(tower).copied().unwrap_or(1).max(1)
    }

    /// Adds EXP and levels up while the requirement is met.
    /// Returns the number of levels gained.
    pub fn award(&mut self, exp: u32) -> u32 {
        self.exp += exp;
        let mut gained = 0;
        while self.exp >= exp_required(self.level) {
            self.exp -= exp_required(self.level);
            self.level += 1;
            gained += 1;
        }
        gained
    }
}

/// EXP needed to advance from `level` to the next one.
pub fn exp_required(level: u32) -> u32 {
    100 + 10 * level.saturating_sub(1)
}

/// Stat multiplier applied to base stats for a given level.
pub fn level_multiplier(level: u32) -> f64 {
    1.0 + 0.1 * level.saturating_sub(1) as f64
}

/// How an Enhanced match ended for one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    Win,
    Draw,
    Loss,
}

impl MatchResult {
    /// EXP earned for this result against an opponent of the given level.
    pub fn exp_award(self, opponent_level: u32) -> u32 {
        let bonus = 5 * opponent_level.saturating_sub(1);
        match self {
            MatchResult::Win => 30 + bonus,
            MatchResult::Draw => 15 + bonus,
            MatchResult::Loss => 10,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            MatchResult::Win => "You win!",
            MatchResult::Draw => "Draw!",
            MatchResult::Loss => "You lose!",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_curve() {
        assert_eq!(exp_required(1), 100);
        assert_eq!(exp_required(2), 110);
        assert_eq!(exp_required(5), 140);
    }

    #[test]
    fn test_multiplier() {
        assert_approx_eq!(level_multiplier(1), 1.0);
        assert_approx_eq!(level_multiplier(3), 1.2);
        assert_approx_eq!(level_multiplier(0), 1.0);
    }

    #[test]
    fn test_award_below_threshold() {
        let mut progress = Progress::with_exp("alice", 60, 1);
        assert_eq!(progress.award(30), 0);
        assert_eq!(progress.exp, 90);
        assert_eq!(progress.level, 1);
    }

    #[test]
    fn test_award_carries_over_multiple_levels() {
        let mut progress = Progress::with_exp("alice", 95, 1);
        // 95 + 130 = 225 -> level 2 with 125 -> level 3 with 15
        assert_eq!(progress.award(130), 2);
        assert_eq!(progress.level, 3);
        assert_eq!(progress.exp, 15);
    }

    #[test]
    fn test_exp_awards_scale_with_opponent() {
        assert_eq!(MatchResult::Win.exp_award(1), 30);
        assert_eq!(MatchResult::Win.exp_award(3), 40);
        assert_eq!(MatchResult::Draw.exp_award(2), 20);
        assert_eq!(MatchResult::Loss.exp_award(9), 10);
    }

    #[test]
    fn test_tower_level_defaults_to_one() {
        let mut progress = Progress::new("bob");
        assert_eq!(progress.tower_level("King"), 1);
        progress.tower_levels.insert("King".to_string(), 4);
        assert_eq!(progress.tower_level("King"), 4);
    }
}
