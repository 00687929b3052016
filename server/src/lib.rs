//! # Tower-and-Troop Server Library
//!
//! Authoritative server for a two-player tower-and-troop game played over a
//! line-based TCP protocol. It owns every account, lobby room and running
//! match; clients only send commands and render what they are pushed.
//!
//! ## Core Responsibilities
//!
//! ### Lobby
//! Players register and log in, open rooms in one of two modes and join
//! rooms opened by others. Filling a room starts its match immediately.
//!
//! ### Match Engine
//! Two state machines share one combat model:
//! - **Simple** matches alternate single deployments from a fixed hand.
//! - **Enhanced** matches run in real time against a clock, with mana,
//!   troop purchases, critical counter-attacks and persisted EXP.
//!
//! ### Event Delivery
//! Each connection has one ordered outbound queue. Replies and pushes share
//! it, so a deploy's ATTACK_RESULT, STATE, QUEEN_HEAL and TURN events reach
//! both players in the order the engine produced them.
//!
//! ## Architecture Design
//!
//! ### Task Per Connection
//! The accept loop spawns a reader task and a writer task per socket. The
//! reader parses one command per line and dispatches it through a
//! [`handler::Session`].
//!
//! ### Lock Per Registry
//! Connections, rooms, Simple matches, Enhanced matches and accounts each
//! sit behind their own lock. A match operation holds its registry's lock
//! for its whole duration, broadcasts included. When a match lock and the
//! room lock are both needed, the match lock is taken first.
//!
//! ### Ticker Per Enhanced Match
//! Every Enhanced match runs a background interval that regenerates mana
//! and finishes the match when its clock runs out.
//!
//! ## Module Organization
//!
//! - `accounts`: flat-file users with persisted EXP and level
//! - `config`: command-line configuration
//! - `connections`: logged-in players and their outbound queues
//! - `context`: the registries shared by every connection
//! - `error`: request-level failures and their wire text
//! - `game`: combat rules, progression and both match modes
//! - `handler`: per-connection command dispatch
//! - `network`: TCP accept loop and socket tasks
//! - `rooms`: the pre-match lobby
//! - `specs`: static tower and troop tables
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use tcr_server::accounts::AccountStore;
//! use tcr_server::context::ServerContext;
//! use tcr_server::game::enhanced::EnhancedSettings;
//! use tcr_server::network::Server;
//! use tcr_server::specs::SpecStore;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let specs = SpecStore::load(Path::new("data/specs.json"))?;
//!     let accounts = AccountStore::new("data/users.json");
//!     let ctx = ServerContext::new(specs, accounts, EnhancedSettings::default());
//!
//!     let server = Server::bind("127.0.0.1:9000", ctx).await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```

pub mod accounts;
pub mod config;
pub mod connections;
pub mod context;
pub mod error;
pub mod game;
pub mod handler;
pub mod network;
pub mod rooms;
pub mod specs;
