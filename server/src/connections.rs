//! Directory of logged-in players and their outbound queues.
//!
//! Each connection owns one unbounded, ordered queue drained by a dedicated
//! writer task. Anything that wants to reach a player (a synchronous reply,
//! a match broadcast, a ticker event) pushes into that queue, so the order
//! in which the engine enqueues events is the order the socket sees them.
//!
//! Delivery is best-effort: pushing to a player who is not connected is
//! logged and dropped, never reported back to the sender.

use log::{debug, info};
use std::collections::HashMap;
use std::net::SocketAddr;
use tcr_shared::Event;
use tokio::sync::{mpsc, RwLock};

/// Sending half of a connection's outbound queue.
pub type Outbound = mpsc::UnboundedSender<String>;

/// A logged-in player's live socket.
#[derive(Debug, Clone)]
pub struct Connection {
    pub username: String,
    pub addr: SocketAddr,
    pub sender: Outbound,
}

impl Connection {
    pub fn new(username: &str, addr: SocketAddr, sender: Outbound) -> Self {
        Self {
            username: username.to_string(),
            addr,
            sender,
        }
    }

    pub fn push(&self, event: &Event) -> bool {
        self.sender.send(event.to_string()).is_ok()
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a logged-in connection. Fails if the username already has
    /// a live one.
    pub async fn register(&self, connection: Connection) -> bool {
        let mut connections = self.connections.write().await;
        if let Some(existing) = connections.get(&connection.username) {
            if !existing.sender.is_closed() {
                return false;
            }
        }
        info!(
            "Player {} connected from {}",
            connection.username, connection.addr
        );
        connections.insert(connection.username.clone(), connection);
        true
    }

    /// Removes the username, but only if it still maps to `sender`'s queue.
    pub async fn unregister(&self, username: &str, sender: &Outbound) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get(username) {
            Some(existing) if existing.sender.same_channel(sender) => {
                connections.remove(username);
                info!("Player {} disconnected", username);
                true
            }
            _ => false,
        }
    }

    /// Pushes an event to one player. Returns whether it was queued.
    pub async fn send(&self, username: &str, event: &Event) -> bool {
        let connections = self.connections.read().await;
        match connections.get(username) {
            Some(connection) => connection.push(event),
            None => {
                debug!("Dropping {} for offline player {}", event, username);
                false
            }
        }
    }

    /// Pushes the same event to several players, in order.
    #[cfg(test)]
    pub async fn broadcast(&self, usernames: &[&str], event: &Event) {
        let connections = self.connections.read().await;
        for username in usernames {
            if let Some(connection) = connections.get(*username) {
                connection.push(event);
            }
        }
    }

    /// Pushes a batch of addressed events under one read lock, preserving
    /// their relative order.
    pub async fn deliver(&self, deliveries: &[(String, Event)]) {
        let connections = self.connections.read().await;
        for (username, event) in deliveries {
            match connections.get(username) {
                Some(connection) => {
                    connection.push(event);
                }
                None => debug!("Dropping {} for offline player {}", event, username),
            }
        }
    }

    pub async fn is_connected(&self, username: &str) -> bool {
        self.connections.read().await.contains_key(username)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    fn connection(name: &str) -> (Connection, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Connection::new(name, test_addr(), tx), rx)
    }

    #[tokio::test]
    async fn test_register_and_send() {
        let registry = ConnectionRegistry::new();
        let (alice, mut rx) = connection("alice");

        assert!(registry.register(alice).await);
        assert_eq!(registry.len().await, 1);
        assert!(registry.send("alice", &Event::ack("hello")).await);
        assert_eq!(rx.recv().await.unwrap(), "ACK|hello");
    }

    #[tokio::test]
    async fn test_send_to_offline_player_is_silent() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.send("ghost", &Event::ack("hello")).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_duplicate_login_rejected_while_alive() {
        let registry = ConnectionRegistry::new();
        let (first, first_rx) = connection("alice");
        let (second, _second_rx) = connection("alice");

        assert!(registry.register(first).await);
        assert!(!registry.register(second.clone()).await);

        // Once the first socket's queue is gone the name can be reclaimed.
        drop(first_rx);
        assert!(registry.register(second).await);
    }

    #[tokio::test]
    async fn test_unregister_only_own_channel() {
        let registry = ConnectionRegistry::new();
        let (alice, _rx) = connection("alice");
        let (stale_tx, _stale_rx) = mpsc::unbounded_channel();
        let sender = alice.sender.clone();

        registry.register(alice).await;
        assert!(!registry.unregister("alice", &stale_tx).await);
        assert!(registry.is_connected("alice").await);
        assert!(registry.unregister("alice", &sender).await);
        assert!(!registry.is_connected("alice").await);
    }

    #[tokio::test]
    async fn test_deliver_preserves_order() {
        let registry = ConnectionRegistry::new();
        let (alice, mut alice_rx) = connection("alice");
        let (bob, mut bob_rx) = connection("bob");
        registry.register(alice).await;
        registry.register(bob).await;

        registry
            .deliver(&[
                ("alice".to_string(), Event::ack("1")),
                ("bob".to_string(), Event::ack("1")),
                ("alice".to_string(), Event::Turn { yours: true }),
                ("bob".to_string(), Event::Turn { yours: false }),
                ("carol".to_string(), Event::ack("lost")),
            ])
            .await;
        registry.broadcast(&["alice", "bob"], &Event::GameEnd("x".into())).await;

        assert_eq!(alice_rx.recv().await.unwrap(), "ACK|1");
        assert_eq!(alice_rx.recv().await.unwrap(), "TURN|Your turn!");
        assert_eq!(alice_rx.recv().await.unwrap(), "GAME_END|x");
        assert_eq!(bob_rx.recv().await.unwrap(), "ACK|1");
        assert_eq!(bob_rx.recv().await.unwrap(), "TURN|Wait for your turn...");
        assert_eq!(bob_rx.recv().await.unwrap(), "GAME_END|x");
    }
}
