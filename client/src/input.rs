//! Turns typed lines into commands, with a couple of local-only verbs.

use tcr_shared::{Command, ProtocolError};

pub const HELP: &str = "\
Commands:
  REGISTER|user|pass      LOGIN|user|pass
  CREATE_GAME|SIMPLE      CREATE_GAME|ENHANCED
  LIST_GAMES              JOIN_GAME|room_id
  DEPLOY|troop|tower      BUY|troop
  STATE                   EXIT_GAME
  help                    quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Send(Command),
    Help,
    Quit,
    Empty,
}

/// Parses one line typed by the user. Malformed commands are caught here
/// and never reach the server.
pub fn parse_input(line: &str) -> Result<Input, ProtocolError> {
    let line = line.trim();
    match line.to_ascii_lowercase().as_str() {
        "" => Ok(Input::Empty),
        "help" | "?" => Ok(Input::Help),
        "quit" | "exit" => Ok(Input::Quit),
        _ => Command::parse(line).map(Input::Send),
    }
}
