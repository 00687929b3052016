//! Request-level failures of the lobby and match engine.
//!
//! Every variant is terminal to the single request that caused it: the
//! connection stays open and no shared state has been mutated. The `Display`
//! text is the reason sent after `ERR|`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GameError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("Login first")]
    LoginRequired,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Username taken")]
    UsernameTaken,

    #[error("Already logged in")]
    AlreadyLoggedIn,

    #[error("Already in a game")]
    AlreadyInGame,

    #[error("Cannot join game")]
    CannotJoin,

    #[error("Cannot start game")]
    CannotStart,

    #[error("No active game")]
    NoActiveGame,

    #[error("Not in game")]
    NotInGame,

    #[error("Not in an enhanced game")]
    NotInEnhancedGame,

    #[error("Game is over")]
    GameOver,

    #[error("Not your turn")]
    NotYourTurn,

    #[error("Invalid or dead troop")]
    InvalidTroop,

    #[error("No such troop or dead")]
    NoSuchTroop,

    #[error("Unknown troop")]
    UnknownTroop,

    #[error("Not enough mana")]
    NotEnoughMana { required: u32, available: u32 },

    #[error("Must destroy either Guard1 or Guard2 tower before attacking King")]
    KingProtected,

    #[error("You must destroy {locked} Tower first before attacking {requested} Tower")]
    GuardLocked { locked: String, requested: String },

    #[error("Invalid or destroyed tower")]
    InvalidTower,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_reasons() {
        assert_eq!(GameError::NotYourTurn.to_string(), "Not your turn");
        assert_eq!(
            GameError::GuardLocked {
                locked: "Guard1".to_string(),
                requested: "Guard2".to_string()
            }
            .to_string(),
            "You must destroy Guard1 Tower first before attacking Guard2 Tower"
        );
        assert_eq!(
            GameError::NotEnoughMana {
                required: 6,
                available: 2
            }
            .to_string(),
            "Not enough mana"
        );
    }
}
