//! What the client knows about its own session, rebuilt from the events the
//! server pushes.

use log::debug;
use tcr_shared::{Command, Event, GameMode, MatchSnapshot};

/// Whether the relay should keep going after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

#[derive(Debug, Default, Clone)]
pub struct ClientGameState {
    pub username: Option<String>,
    pub room: Option<String>,
    pub mode: Option<GameMode>,
    pub my_turn: bool,
    pub snapshot: Option<MatchSnapshot>,
    pending_login: Option<String>,
    awaiting_auth: bool,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notes a command that is about to be sent.
    pub fn on_command(&mut self, command: &Command) {
        match command {
            Command::Login { username, .. } => {
                self.pending_login = Some(username.clone());
                self.awaiting_auth = true;
            }
            Command::Register { .. } => self.awaiting_auth = true,
            _ => {}
        }
    }

    /// Folds one server event into the session. A rejected LOGIN or
    /// REGISTER ends the client.
    pub fn apply(&mut self, event: &Event) -> Flow {
        match event {
            Event::Ack(message) => {
                if std::mem::take(&mut self.awaiting_auth) && message == "Login successful" {
                    self.username = self.pending_login.take();
                }
                let (kind, rest) = message.split_once('|').unwrap_or((message.as_str(), ""));
                match kind {
                    "GAME_CREATED" | "JOINED" => self.room = Some(rest.to_string()),
                    "GAME_STARTED" => {
                        self.mode = rest.parse().ok();
                        self.my_turn = false;
                        debug!("Match started in {:?} mode", self.mode);
                    }
                    _ => {}
                }
            }
            Event::Err(_) => {
                if self.awaiting_auth {
                    return Flow::Quit;
                }
            }
            Event::Turn { yours } => self.my_turn = *yours,
            Event::State(body) => {
                if self.mode == Some(GameMode::Enhanced) {
                    match MatchSnapshot::from_json(body) {
                        Ok(snapshot) => self.snapshot = Some(snapshot),
                        Err(e) => debug!("Ignoring malformed snapshot: {}", e),
                    }
                }
            }
            Event::GameEnd(_) => {
                self.room = None;
                self.mode = None;
                self.my_turn = false;
            }
            _ => {}
        }
        Flow::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_sets_username() {
        let mut state = ClientGameState::new();
        state.on_command(&Command::parse("LOGIN|alice|pw").unwrap());
        assert_eq!(state.apply(&Event::ack("Login successful")), Flow::Continue);
        assert_eq!(state.username.as_deref(), Some("alice"));

        // Later errors are ordinary game errors.
        assert_eq!(state.apply(&Event::Err("Not your turn".into())), Flow::Continue);
    }

    #[test]
    fn test_failed_auth_quits() {
        let mut state = ClientGameState::new();
        state.on_command(&Command::parse("REGISTER|alice|pw").unwrap());
        assert_eq!(state.apply(&Event::Err("Username taken".into())), Flow::Quit);
    }

    #[test]
    fn test_mode_comes_from_handshake() {
        let mut state = ClientGameState::new();
        state.apply(&Event::ack("JOINED|room3"));
        state.apply(&Event::ack("GAME_STARTED|ENHANCED"));
        assert_eq!(state.mode, Some(GameMode::Enhanced));
        assert_eq!(state.room.as_deref(), Some("room3"));

        state.apply(&Event::GameEnd("You win!".into()));
        assert!(state.mode.is_none());
        assert!(state.room.is_none());
    }

    #[test]
    fn test_turn_tracking() {
        let mut state = ClientGameState::new();
        state.apply(&Event::ack("GAME_STARTED|SIMPLE"));
        state.apply(&Event::Turn { yours: true });
        assert!(state.my_turn);
        state.apply(&Event::Turn { yours: false });
        assert!(!state.my_turn);
    }
}
