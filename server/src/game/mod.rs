//! Match engine: shared combat rules, player progression and the two match
//! modes.

pub mod combat;
pub mod enhanced;
pub mod progress;
pub mod simple;

use progress::MatchResult;
use std::fmt;
use tcr_shared::Event;

/// Everything one match operation produced: pushes in delivery order, plus
/// the reply for the caller's own connection.
#[derive(Debug)]
pub struct Outcome {
    pub deliveries: Vec<(String, Event)>,
    pub reply: Event,
    pub finished: bool,
}

/// How a finished match was decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Winner(String),
    Draw,
}

impl Verdict {
    pub fn result_for(&self, username: &str) -> MatchResult {
        match self {
            Verdict::Winner(winner) if winner == username => MatchResult::Win,
            Verdict::Winner(_) => MatchResult::Loss,
            Verdict::Draw => MatchResult::Draw,
        }
    }

    /// Winner's name, or an empty string for a draw.
    pub fn winner(&self) -> &str {
        match self {
            Verdict::Winner(winner) => winner,
            Verdict::Draw => "",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Winner(winner) => write!(f, "{} wins", winner),
            Verdict::Draw => write!(f, "draw"),
        }
    }
}
