//! Pre-match lobby.
//!
//! A room is created by its host, listed while its guest slot is empty, and
//! filled by exactly one joiner. The check-and-fill runs under the registry
//! lock, so concurrent joins race safely: one wins, the rest get
//! [`GameError::CannotJoin`].

use crate::error::{GameError, Result};
use log::info;
use std::collections::HashMap;
use tcr_shared::GameMode;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: String,
    pub host: String,
    pub guest: Option<String>,
    pub started: bool,
    pub mode: GameMode,
}

impl Room {
    pub fn has_player(&self, username: &str) -> bool {
        self.host == username || self.guest.as_deref() == Some(username)
    }

    /// Host and guest, once the room is full.
    pub fn players(&self) -> Option<(&str, &str)> {
        self.guest.as_deref().map(|guest| (self.host.as_str(), guest))
    }

    fn is_open(&self) -> bool {
        !self.started && self.guest.is_none()
    }

    fn sequence(&self) -> u64 {
        self.id
            .trim_start_matches("room")
            .parse()
            .unwrap_or(u64::MAX)
    }
}

#[derive(Default)]
struct Rooms {
    rooms: HashMap<String, Room>,
    next_id: u64,
}

impl Rooms {
    fn room_of(&self, username: &str) -> Option<&Room> {
        self.rooms.values().find(|r| r.has_player(username))
    }
}

#[derive(Default)]
pub struct RoomRegistry {
    inner: Mutex<Rooms>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new room and returns its id. A player may only sit in one
    /// room at a time.
    pub async fn create(&self, host: &str, mode: GameMode) -> Result<String> {
        let mut inner = self.inner.lock().await;
        if inner.room_of(host).is_some() {
            return Err(GameError::AlreadyInGame);
        }

        inner.next_id += 1;
        let id = format!("room{}", inner.next_id);
        inner.rooms.insert(
            id.clone(),
            Room {
                id: id.clone(),
                host: host.to_string(),
                guest: None,
                started: false,
                mode,
            },
        );
        info!("{} created {} room {}", host, mode, id);
        Ok(id)
    }

    /// Rooms waiting for a guest, as `(id, host)` in creation order.
    pub async fn list(&self) -> Vec<(String, String)> {
        let inner = self.inner.lock().await;
        let mut open: Vec<&Room> = inner.rooms.values().filter(|r| r.is_open()).collect();
        open.sort_by_key(|r| r.sequence());
        open.iter()
            .map(|r| (r.id.clone(), r.host.clone()))
            .collect()
    }

    /// Fills the guest slot and marks the room started, returning the
    /// filled room.
    pub async fn join(&self, id: &str, guest: &str) -> Result<Room> {
        let mut inner = self.inner.lock().await;
        if inner.room_of(guest).is_some() {
            return Err(GameError::AlreadyInGame);
        }

        let room = inner.rooms.get_mut(id).ok_or(GameError::CannotJoin)?;
        if !room.is_open() {
            return Err(GameError::CannotJoin);
        }

        room.guest = Some(guest.to_string());
        room.started = true;
        info!("{} joined room {} hosted by {}", guest, id, room.host);
        Ok(room.clone())
    }

    pub async fn get(&self, id: &str) -> Option<Room> {
        self.inner.lock().await.rooms.get(id).cloned()
    }

    pub async fn room_of(&self, username: &str) -> Option<Room> {
        self.inner.lock().await.room_of(username).cloned()
    }

    pub async fn remove(&self, id: &str) -> Option<Room> {
        self.inner.lock().await.rooms.remove(id)
    }

    /// Drops a room the user hosts that nobody has joined yet.
    pub async fn cancel_hosted(&self, host: &str) -> Option<Room> {
        let mut inner = self.inner.lock().await;
        let id = inner
            .rooms
            .values()
            .find(|r| r.host == host && r.is_open())
            .map(|r| r.id.clone())?;
        info!("{} cancelled room {}", host, id);
        inner.rooms.remove(&id)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.lock().await.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_create_and_list() {
        let rooms = RoomRegistry::new();
        let first = rooms.create("alice", GameMode::Simple).await.unwrap();
        let second = rooms.create("bob", GameMode::Enhanced).await.unwrap();

        assert_eq!(first, "room1");
        assert_eq!(second, "room2");
        assert_eq!(
            rooms.list().await,
            vec![
                ("room1".to_string(), "alice".to_string()),
                ("room2".to_string(), "bob".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_ids_are_never_reused() {
        let rooms = RoomRegistry::new();
        let first = rooms.create("alice", GameMode::Simple).await.unwrap();
        rooms.remove(&first).await;
        let second = rooms.create("bob", GameMode::Simple).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_join_fills_and_hides_room() {
        let rooms = RoomRegistry::new();
        let id = rooms.create("alice", GameMode::Simple).await.unwrap();

        let room = assert_ok!(rooms.join(&id, "bob").await);
        assert!(room.started);
        assert_eq!(room.players(), Some(("alice", "bob")));
        assert!(rooms.list().await.is_empty());

        assert_eq!(rooms.join(&id, "carol").await, Err(GameError::CannotJoin));
        assert_eq!(rooms.join("room99", "carol").await, Err(GameError::CannotJoin));
    }

    #[tokio::test]
    async fn test_one_room_per_player() {
        let rooms = RoomRegistry::new();
        let id = rooms.create("alice", GameMode::Simple).await.unwrap();

        assert_eq!(
            rooms.create("alice", GameMode::Enhanced).await,
            Err(GameError::AlreadyInGame)
        );
        assert_eq!(rooms.join(&id, "alice").await, Err(GameError::AlreadyInGame));

        rooms.join(&id, "bob").await.unwrap();
        assert_eq!(
            rooms.create("bob", GameMode::Simple).await,
            Err(GameError::AlreadyInGame)
        );
        assert_eq!(rooms.room_of("bob").await.unwrap().id, id);
    }

    #[tokio::test]
    async fn test_concurrent_joins_have_one_winner() {
        let rooms = Arc::new(RoomRegistry::new());
        let id = rooms.create("host", GameMode::Simple).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let rooms = Arc::clone(&rooms);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                rooms.join(&id, &format!("guest{i}")).await.is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_cancel_only_open_rooms() {
        let rooms = RoomRegistry::new();
        let id = rooms.create("alice", GameMode::Simple).await.unwrap();
        rooms.join(&id, "bob").await.unwrap();
        assert!(rooms.cancel_hosted("alice").await.is_none());

        assert_ok!(rooms.create("carol", GameMode::Simple).await);
        assert!(rooms.cancel_hosted("carol").await.is_some());
        assert_err!(rooms.join("room2", "dave").await);
        assert_eq!(rooms.len().await, 1);
    }
}
