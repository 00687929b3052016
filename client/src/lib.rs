//! # Tower-and-Troop Terminal Client
//!
//! A thin relay for the line protocol. Whatever the player types is checked
//! locally, then forwarded as one command line; whatever the server pushes
//! is parsed and printed as soon as it arrives.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! Tracks what the server has told us: who we are logged in as, which room
//! and mode we are in, whose turn it is and the latest Enhanced snapshot.
//! The mode comes from the `ACK|GAME_STARTED|<mode>` handshake.
//!
//! ### Input Module (`input`)
//! Turns typed lines into protocol commands and handles `help`/`quit`.
//!
//! ### Network Module (`network`)
//! Owns the socket and relays both directions concurrently.
//!
//! ### Rendering Module (`rendering`)
//! Formats events for the terminal.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use tcr_client::network::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new();
//!     client.run("127.0.0.1:9000").await
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod rendering;
