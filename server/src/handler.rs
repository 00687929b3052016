//! Per-connection command dispatch.
//!
//! A [`Session`] belongs to exactly one socket. It turns each line into a
//! [`Command`], enforces login, routes the command to the right registry and
//! produces the synchronous reply. Pushes caused by the command (match
//! broadcasts, start announcements) are queued before the reply.

use crate::connections::{Connection, Outbound};
use crate::context::ServerContext;
use crate::error::{GameError, Result};
use crate::rooms::Room;
use log::{debug, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tcr_shared::{Command, Event, GameMode};

pub struct Session {
    ctx: Arc<ServerContext>,
    addr: SocketAddr,
    outbound: Outbound,
    username: Option<String>,
}

impl Session {
    pub fn new(ctx: Arc<ServerContext>, addr: SocketAddr, outbound: Outbound) -> Self {
        Self {
            ctx,
            addr,
            outbound,
            username: None,
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Handles one command line. Returns the reply, if the command has one
    /// beyond what it already pushed.
    pub async fn handle_line(&mut self, line: &str) -> Option<Event> {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => return Some(Event::err(e)),
        };
        debug!(
            "{} sent {}",
            self.username.as_deref().unwrap_or("anonymous"),
            command.keyword()
        );

        if command.requires_login() && self.username.is_none() {
            return Some(Event::err(GameError::LoginRequired));
        }

        match self.dispatch(command).await {
            Ok(reply) => reply,
            Err(e) => Some(Event::err(e)),
        }
    }

    async fn dispatch(&mut self, command: Command) -> Result<Option<Event>> {
        let user = self.username.clone().unwrap_or_default();
        match command {
            Command::Login { username, password } => self.login(username, password).await.map(Some),
            Command::Register { username, password } => {
                if self.ctx.accounts.register(&username, &password).await {
                    Ok(Some(Event::ack("Registration successful")))
                } else {
                    Err(GameError::UsernameTaken)
                }
            }
            Command::CreateGame { mode } => {
                let id = self.ctx.rooms.create(&user, mode).await?;
                Ok(Some(Event::ack(format!("GAME_CREATED|{id}"))))
            }
            Command::ListGames => Ok(Some(Event::Games(self.ctx.rooms.list().await))),
            Command::JoinGame { room_id } => {
                let room = self.ctx.rooms.join(&room_id, &user).await?;
                self.push(&Event::ack(format!("JOINED|{room_id}")));
                if let Err(e) = self.start_match(&room).await {
                    warn!("Room {} filled but its match did not start: {}", room.id, e);
                    return Err(e);
                }
                Ok(None)
            }
            Command::StartGame { room_id } => {
                let room = self
                    .ctx
                    .rooms
                    .get(&room_id)
                    .await
                    .filter(|r| r.has_player(&user))
                    .ok_or(GameError::CannotStart)?;
                self.start_match(&room).await?;
                Ok(None)
            }
            Command::Deploy { troop, tower } => {
                let reply = if self.ctx.enhanced.is_playing(&user).await {
                    self.ctx.enhanced.deploy(&user, &troop, &tower).await?
                } else {
                    self.ctx.simple.deploy(&user, &troop, &tower).await?
                };
                Ok(Some(reply))
            }
            Command::State => {
                let reply = if self.ctx.enhanced.is_playing(&user).await {
                    self.ctx.enhanced.state(&user).await?
                } else {
                    self.ctx.simple.state(&user).await?
                };
                Ok(Some(reply))
            }
            Command::Buy { troop } => Ok(Some(self.ctx.enhanced.buy(&user, &troop).await?)),
            Command::ExitGame => {
                self.leave(&user).await;
                Ok(Some(Event::GameEnd("You have exited the game".to_string())))
            }
        }
    }

    async fn login(&mut self, username: String, password: String) -> Result<Event> {
        if self.username.is_some() {
            return Err(GameError::AlreadyLoggedIn);
        }
        let user = self
            .ctx
            .accounts
            .authenticate(&username, &password)
            .await
            .ok_or(GameError::InvalidCredentials)?;

        let connection = Connection::new(&user.username, self.addr, self.outbound.clone());
        if !self.ctx.connections.register(connection).await {
            return Err(GameError::AlreadyLoggedIn);
        }
        info!("{} logged in from {} (level {})", user.username, self.addr, user.level);
        self.username = Some(user.username);
        Ok(Event::ack("Login successful"))
    }

    /// Starts the match for a filled room and announces it to both players.
    /// A room whose other player is already gone is dropped instead.
    async fn start_match(&self, room: &Room) -> Result<()> {
        if self.ctx.simple.contains(&room.id).await || self.ctx.enhanced.contains(&room.id).await {
            return Err(GameError::CannotStart);
        }
        let (host, guest) = room.players().ok_or(GameError::CannotStart)?;
        for player in [host, guest] {
            if !self.ctx.connections.is_connected(player).await {
                info!("{} left room {} before its match started", player, room.id);
                self.ctx.rooms.remove(&room.id).await;
                return Err(GameError::CannotStart);
            }
        }
        match room.mode {
            GameMode::Simple => {
                self.ctx.simple.start(room).await?;
                self.ctx.simple.announce_start(&room.id).await;
            }
            GameMode::Enhanced => {
                self.ctx.enhanced.start(room).await?;
                self.ctx.enhanced.announce_start(&room.id).await;
            }
        }
        Ok(())
    }

    /// Leaves whatever match the user is in and drops any room they sit in
    /// that has no match yet.
    async fn leave(&self, user: &str) {
        if self.ctx.simple.exit(user).await || self.ctx.enhanced.exit(user).await {
            return;
        }
        if self.ctx.rooms.cancel_hosted(user).await.is_some() {
            return;
        }
        // Filled, but the match has not been built yet.
        if let Some(room) = self.ctx.rooms.room_of(user).await {
            if !self.ctx.simple.contains(&room.id).await
                && !self.ctx.enhanced.contains(&room.id).await
            {
                info!("{} left room {} before its match started", user, room.id);
                self.ctx.rooms.remove(&room.id).await;
            }
        }
    }

    /// Runs when the socket closes: a dropped connection counts as leaving.
    pub async fn close(&mut self) {
        if let Some(user) = self.username.take() {
            self.leave(&user).await;
            self.ctx.connections.unregister(&user, &self.outbound).await;
        }
        debug!("Connection from {} closed", self.addr);
    }

    fn push(&self, event: &Event) {
        if self.outbound.send(event.to_string()).is_err() {
            debug!("Outbound queue for {} already closed", self.addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::AccountStore;
    use crate::game::enhanced::EnhancedSettings;
    use crate::specs::fixtures::spec_store;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct Client {
        session: Session,
        rx: mpsc::UnboundedReceiver<String>,
    }

    impl Client {
        async fn send(&mut self, line: &str) -> Vec<String> {
            if let Some(reply) = self.session.handle_line(line).await {
                self.session.push(&reply);
            }
            self.drain()
        }

        fn drain(&mut self) -> Vec<String> {
            let mut lines = Vec::new();
            while let Ok(line) = self.rx.try_recv() {
                lines.push(line);
            }
            lines
        }
    }

    fn context() -> (TempDir, Arc<ServerContext>) {
        let dir = tempfile::tempdir().unwrap();
        let accounts = AccountStore::new(dir.path().join("users.json"));
        let ctx = ServerContext::new(spec_store(), accounts, EnhancedSettings::default());
        (dir, ctx)
    }

    fn client(ctx: &Arc<ServerContext>, port: u16) -> Client {
        let (tx, rx) = mpsc::unbounded_channel();
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        Client {
            session: Session::new(Arc::clone(ctx), addr, tx),
            rx,
        }
    }

    async fn logged_in(ctx: &Arc<ServerContext>, name: &str, port: u16) -> Client {
        let mut c = client(ctx, port);
        c.send(&format!("REGISTER|{name}|pw")).await;
        assert_eq!(c.send(&format!("LOGIN|{name}|pw")).await, vec!["ACK|Login successful"]);
        c
    }

    #[tokio::test]
    async fn test_protocol_and_login_errors() {
        let (_dir, ctx) = context();
        let mut c = client(&ctx, 1);

        assert_eq!(c.send("DANCE").await, vec!["ERR|Unknown command"]);
        assert_eq!(c.send("LOGIN|only").await, vec!["ERR|Usage: LOGIN|username|password"]);
        assert_eq!(c.send("LIST_GAMES").await, vec!["ERR|Login first"]);
        assert_eq!(c.send("LOGIN|ghost|pw").await, vec!["ERR|Invalid credentials"]);
        assert_eq!(c.send("REGISTER|alice|pw").await, vec!["ACK|Registration successful"]);
        assert_eq!(c.send("REGISTER|alice|pw").await, vec!["ERR|Username taken"]);
        assert_eq!(c.send("LOGIN|alice|pw").await, vec!["ACK|Login successful"]);
        assert_eq!(c.send("LOGIN|alice|pw").await, vec!["ERR|Already logged in"]);
        assert_eq!(c.session.username(), Some("alice"));
    }

    #[tokio::test]
    async fn test_second_session_for_same_user_rejected() {
        let (_dir, ctx) = context();
        let _first = logged_in(&ctx, "alice", 1).await;
        let mut second = client(&ctx, 2);
        assert_eq!(second.send("LOGIN|alice|pw").await, vec!["ERR|Already logged in"]);
    }

    #[tokio::test]
    async fn test_simple_lobby_to_match() {
        let (_dir, ctx) = context();
        let mut alice = logged_in(&ctx, "alice", 1).await;
        let mut bob = logged_in(&ctx, "bob", 2).await;

        assert_eq!(alice.send("CREATE_GAME").await, vec!["ACK|GAME_CREATED|room1"]);
        assert_eq!(alice.send("CREATE_GAME|ENHANCED").await, vec!["ERR|Already in a game"]);
        assert_eq!(bob.send("LIST_GAMES").await, vec!["GAMES|room1:alice"]);

        let bob_lines = bob.send("JOIN_GAME|room1").await;
        assert_eq!(bob_lines[0], "ACK|JOINED|room1");
        assert_eq!(bob_lines[1], "ACK|GAME_STARTED|SIMPLE");
        assert!(bob_lines[2].starts_with("STATE|Room: room1"));

        let alice_lines = alice.drain();
        assert_eq!(alice_lines[0], "ACK|GAME_STARTED|SIMPLE");
        let turns = [alice_lines.last().unwrap(), bob_lines.last().unwrap()];
        assert!(turns.contains(&&"TURN|Your turn!".to_string()));
        assert!(turns.contains(&&"TURN|Wait for your turn...".to_string()));

        assert_eq!(bob.send("LIST_GAMES").await, vec!["GAMES|"]);
        assert_eq!(alice.send("START_GAME|room1").await, vec!["ERR|Cannot start game"]);
        assert_eq!(alice.send("BUY|Pawn").await, vec!["ERR|Not in an enhanced game"]);
        assert!(alice.send("STATE").await[0].starts_with("STATE|Room: room1"));

        let waiting = if alice_lines.last().unwrap() == "TURN|Your turn!" {
            &mut bob
        } else {
            &mut alice
        };
        assert_eq!(waiting.send("DEPLOY|Pawn|Guard1").await, vec!["ERR|Not your turn"]);
    }

    #[tokio::test]
    async fn test_exit_and_disconnect_clean_up() {
        let (_dir, ctx) = context();
        let mut alice = logged_in(&ctx, "alice", 1).await;
        let mut bob = logged_in(&ctx, "bob", 2).await;

        alice.send("CREATE_GAME").await;
        bob.send("JOIN_GAME|room1").await;
        alice.drain();

        assert_eq!(bob.send("EXIT_GAME").await, vec!["GAME_END|You have exited the game"]);
        assert_eq!(alice.drain(), vec!["GAME_END|Your opponent has left the game"]);
        assert!(ctx.rooms.get("room1").await.is_none());
        assert_eq!(alice.send("STATE").await, vec!["ERR|Not in game"]);
        assert_eq!(alice.send("DEPLOY|Pawn|Guard1").await, vec!["ERR|No active game"]);

        // An unjoined room disappears with its host's connection.
        alice.send("CREATE_GAME|ENHANCED").await;
        alice.session.close().await;
        assert!(ctx.rooms.list().await.is_empty());
        assert!(!ctx.connections.is_connected("alice").await);

        let mut again = client(&ctx, 3);
        assert_eq!(again.send("LOGIN|alice|pw").await, vec!["ACK|Login successful"]);
    }

    #[tokio::test]
    async fn test_host_leaving_before_start_drops_room() {
        let (_dir, ctx) = context();
        let mut alice = logged_in(&ctx, "alice", 1).await;
        let mut bob = logged_in(&ctx, "bob", 2).await;

        alice.send("CREATE_GAME").await;
        let room = ctx.rooms.join("room1", "bob").await.unwrap();
        alice.session.close().await;
        assert!(ctx.rooms.get("room1").await.is_none());

        assert_eq!(bob.session.start_match(&room).await, Err(GameError::CannotStart));
        assert!(!ctx.simple.is_playing("bob").await);
        assert!(ctx.rooms.room_of("bob").await.is_none());
        assert_eq!(bob.send("CREATE_GAME").await, vec!["ACK|GAME_CREATED|room2"]);
    }

    #[tokio::test]
    async fn test_start_refused_when_opponent_is_offline() {
        let (_dir, ctx) = context();
        let mut alice = logged_in(&ctx, "alice", 1).await;
        let bob = logged_in(&ctx, "bob", 2).await;

        alice.send("CREATE_GAME|ENHANCED").await;
        let room = ctx.rooms.join("room1", "bob").await.unwrap();
        // The socket is gone but its session has not been cleaned up yet.
        ctx.connections.unregister("alice", &alice.session.outbound).await;

        assert_eq!(bob.session.start_match(&room).await, Err(GameError::CannotStart));
        assert!(!ctx.enhanced.contains("room1").await);
        assert!(ctx.rooms.get("room1").await.is_none());
    }

    #[tokio::test]
    async fn test_enhanced_join_and_buy() {
        let (_dir, ctx) = context();
        let mut alice = logged_in(&ctx, "alice", 1).await;
        let mut bob = logged_in(&ctx, "bob", 2).await;

        alice.send("CREATE_GAME|ENHANCED").await;
        let bob_lines = bob.send("JOIN_GAME|room1").await;
        assert_eq!(bob_lines[0], "ACK|JOINED|room1");
        assert_eq!(bob_lines[1], "ACK|GAME_STARTED|ENHANCED");
        assert!(bob_lines[2].starts_with("STATE|{"));
        assert_eq!(alice.drain()[0], "ACK|GAME_STARTED|ENHANCED");

        let lines = alice.send("BUY|Pawn").await;
        assert!(lines[0].starts_with("STATE|{"));
        assert!(lines[1].starts_with("ACK|BOUGHT|Pawn|"));
        assert_eq!(alice.send("BUY|Dragon").await, vec!["ERR|Unknown troop"]);
        assert_eq!(
            alice.send("DEPLOY|Pawn|King").await,
            vec!["ERR|Must destroy either Guard1 or Guard2 tower before attacking King"]
        );
        assert!(alice.send("STATE").await[0].starts_with("STATE|{"));

        alice.send("EXIT_GAME").await;
        assert!(!ctx.enhanced.contains("room1").await);
    }
}
