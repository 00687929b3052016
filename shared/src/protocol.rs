//! Line protocol spoken between client and server.
//!
//! Every message is one newline-terminated UTF-8 line whose fields are
//! separated by [`FIELD_DELIMITER`]. The first field is the keyword.
//! Commands flow client → server, events flow server → client and may be
//! pushed at any time.

use crate::{GameMode, FIELD_DELIMITER};
use std::fmt;
use thiserror::Error;

/// Why a command line could not be turned into a [`Command`].
///
/// The `Display` text is exactly what follows `ERR|` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Unknown command")]
    UnknownCommand,
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Unknown game mode {0}")]
    UnknownMode(String),
}

/// A client request, parsed from one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { username: String, password: String },
    Register { username: String, password: String },
    CreateGame { mode: GameMode },
    ListGames,
    JoinGame { room_id: String },
    StartGame { room_id: String },
    Deploy { troop: String, tower: String },
    State,
    Buy { troop: String },
    ExitGame,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let parts: Vec<&str> = line.splitn(3, FIELD_DELIMITER).collect();
        let keyword = parts[0].trim().to_ascii_uppercase();
        let arg = |i: usize| parts.get(i).map(|s| s.trim()).filter(|s| !s.is_empty());

        match keyword.as_str() {
            "LOGIN" => match (arg(1), arg(2)) {
                (Some(username), Some(password)) => Ok(Command::Login {
                    username: username.to_string(),
                    password: password.to_string(),
                }),
                _ => Err(ProtocolError::Usage("LOGIN|username|password")),
            },
            "REGISTER" => match (arg(1), arg(2)) {
                (Some(username), Some(password)) => Ok(Command::Register {
                    username: username.to_string(),
                    password: password.to_string(),
                }),
                _ => Err(ProtocolError::Usage("REGISTER|username|password")),
            },
            "CREATE_GAME" => {
                let mode = arg(1)
                    .unwrap_or("SIMPLE")
                    .parse::<GameMode>()
                    .map_err(|_| ProtocolError::Usage("CREATE_GAME|SIMPLE or CREATE_GAME|ENHANCED"))?;
                Ok(Command::CreateGame { mode })
            }
            "LIST_GAMES" => Ok(Command::ListGames),
            "JOIN_GAME" => arg(1)
                .map(|room_id| Command::JoinGame {
                    room_id: room_id.to_string(),
                })
                .ok_or(ProtocolError::Usage("JOIN_GAME|room_id")),
            "START_GAME" => arg(1)
                .map(|room_id| Command::StartGame {
                    room_id: room_id.to_string(),
                })
                .ok_or(ProtocolError::Usage("START_GAME|room_id")),
            "DEPLOY" => match (arg(1), arg(2)) {
                (Some(troop), Some(tower)) => Ok(Command::Deploy {
                    troop: troop.to_string(),
                    tower: tower.to_string(),
                }),
                _ => Err(ProtocolError::Usage("DEPLOY|troop_name|target_tower")),
            },
            "STATE" => Ok(Command::State),
            "BUY" => arg(1)
                .map(|troop| Command::Buy {
                    troop: troop.to_string(),
                })
                .ok_or(ProtocolError::Usage("BUY|troop_name")),
            "EXIT_GAME" => Ok(Command::ExitGame),
            _ => Err(ProtocolError::UnknownCommand),
        }
    }

    /// Wire keyword, safe to log (no credentials).
    pub fn keyword(&self) -> &'static str {
        match self {
            Command::Login { .. } => "LOGIN",
            Command::Register { .. } => "REGISTER",
            Command::CreateGame { .. } => "CREATE_GAME",
            Command::ListGames => "LIST_GAMES",
            Command::JoinGame { .. } => "JOIN_GAME",
            Command::StartGame { .. } => "START_GAME",
            Command::Deploy { .. } => "DEPLOY",
            Command::State => "STATE",
            Command::Buy { .. } => "BUY",
            Command::ExitGame => "EXIT_GAME",
        }
    }

    /// Everything except LOGIN and REGISTER needs an authenticated session.
    pub fn requires_login(&self) -> bool {
        !matches!(self, Command::Login { .. } | Command::Register { .. })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Login { username, password } => write!(f, "LOGIN|{username}|{password}"),
            Command::Register { username, password } => {
                write!(f, "REGISTER|{username}|{password}")
            }
            Command::CreateGame { mode } => write!(f, "CREATE_GAME|{mode}"),
            Command::ListGames => write!(f, "LIST_GAMES"),
            Command::JoinGame { room_id } => write!(f, "JOIN_GAME|{room_id}"),
            Command::StartGame { room_id } => write!(f, "START_GAME|{room_id}"),
            Command::Deploy { troop, tower } => write!(f, "DEPLOY|{troop}|{tower}"),
            Command::State => write!(f, "STATE"),
            Command::Buy { troop } => write!(f, "BUY|{troop}"),
            Command::ExitGame => write!(f, "EXIT_GAME"),
        }
    }
}

/// A server message, either a synchronous reply or an asynchronous push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Ack(String),
    Err(String),
    Games(Vec<(String, String)>),
    State(String),
    AttackResult {
        troop: String,
        tower: String,
        damage: i32,
        remaining_hp: i32,
        extra: Vec<String>,
    },
    QueenHeal {
        healer: String,
        tower: String,
        amount: i32,
        new_hp: i32,
    },
    Turn { yours: bool },
    GameEnd(String),
    /// A line without a known keyword, e.g. the body of a text STATE block.
    Text(String),
}

pub const YOUR_TURN: &str = "Your turn!";
pub const WAIT_TURN: &str = "Wait for your turn...";

impl Event {
    pub fn ack(message: impl Into<String>) -> Self {
        Event::Ack(message.into())
    }

    pub fn err(reason: impl fmt::Display) -> Self {
        Event::Err(reason.to_string())
    }

    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        let (keyword, rest) = match line.split_once(FIELD_DELIMITER) {
            Some((keyword, rest)) => (keyword, rest),
            None => (line, ""),
        };
        let fields: Vec<&str> = rest.split(FIELD_DELIMITER).collect();

        match keyword {
            "ACK" => Event::Ack(rest.to_string()),
            "ERR" => Event::Err(rest.to_string()),
            "STATE" => Event::State(rest.to_string()),
            "GAME_END" => Event::GameEnd(rest.to_string()),
            "TURN" => Event::Turn {
                yours: rest == YOUR_TURN,
            },
            "GAMES" => Event::Games(
                rest.split(',')
                    .filter(|entry| !entry.is_empty())
                    .map(|entry| match entry.split_once(':') {
                        Some((id, host)) => (id.to_string(), host.to_string()),
                        None => (entry.to_string(), String::new()),
                    })
                    .collect(),
            ),
            "ATTACK_RESULT" if fields.len() >= 4 => {
                match (fields[2].parse(), fields[3].parse()) {
                    (Ok(damage), Ok(remaining_hp)) => Event::AttackResult {
                        troop: fields[0].to_string(),
                        tower: fields[1].to_string(),
                        damage,
                        remaining_hp,
                        extra: fields[4..].iter().map(|s| s.to_string()).collect(),
                    },
                    _ => Event::Text(line.to_string()),
                }
            }
            "QUEEN_HEAL" if fields.len() == 4 => match (fields[2].parse(), fields[3].parse()) {
                (Ok(amount), Ok(new_hp)) => Event::QueenHeal {
                    healer: fields[0].to_string(),
                    tower: fields[1].to_string(),
                    amount,
                    new_hp,
                },
                _ => Event::Text(line.to_string()),
            },
            _ => Event::Text(line.to_string()),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Ack(message) => write!(f, "ACK|{message}"),
            Event::Err(reason) => write!(f, "ERR|{reason}"),
            Event::Games(rooms) => {
                let list: Vec<String> = rooms
                    .iter()
                    .map(|(id, host)| format!("{id}:{host}"))
                    .collect();
                write!(f, "GAMES|{}", list.join(","))
            }
            Event::State(body) => write!(f, "STATE|{body}"),
            Event::AttackResult {
                troop,
                tower,
                damage,
                remaining_hp,
                extra,
            } => {
                write!(f, "ATTACK_RESULT|{troop}|{tower}|{damage}|{remaining_hp}")?;
                for field in extra {
                    write!(f, "|{field}")?;
                }
                Ok(())
            }
            Event::QueenHeal {
                healer,
                tower,
                amount,
                new_hp,
            } => write!(f, "QUEEN_HEAL|{healer}|{tower}|{amount}|{new_hp}"),
            Event::Turn { yours: true } => write!(f, "TURN|{YOUR_TURN}"),
            Event::Turn { yours: false } => write!(f, "TURN|{WAIT_TURN}"),
            Event::GameEnd(message) => write!(f, "GAME_END|{message}"),
            Event::Text(line) => write!(f, "{line}"),
        }
    }
}
