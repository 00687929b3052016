//! Flat-file account store.
//!
//! Holds usernames, plain-text passwords and persisted EXP/level in one JSON
//! document. Every operation is a read-modify-write of the whole file behind
//! a single lock; logins, registrations and match results are rare enough
//! that nothing finer is needed.

use crate::game::progress::Progress;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("account file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("account file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

fn default_level() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub exp: u32,
    #[serde(default = "default_level")]
    pub level: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UsersFile {
    #[serde(default)]
    users: Vec<User>,
}

pub struct AccountStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AccountStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the user if the credentials match. An unreadable or corrupt
    /// file behaves as if the user does not exist.
    pub async fn authenticate(&self, username: &str, password: &str) -> Option<User> {
        let _guard = self.lock.lock().await;
        match self.read_users().await {
            Ok(file) => file
                .users
                .into_iter()
                .find(|u| u.username == username && u.password == password),
            Err(e) => {
                warn!("Cannot authenticate {}: {}", username, e);
                None
            }
        }
    }

    /// Adds a new account at level 1. Returns false if the name is taken or
    /// the file cannot be read back safely.
    pub async fn register(&self, username: &str, password: &str) -> bool {
        let _guard = self.lock.lock().await;
        let mut file = match self.read_users().await {
            Ok(file) => file,
            Err(e) => {
                warn!("Cannot register {}: {}", username, e);
                return false;
            }
        };

        if file.users.iter().any(|u| u.username == username) {
            return false;
        }

        file.users.push(User {
            username: username.to_string(),
            password: password.to_string(),
            exp: 0,
            level: 1,
        });

        if let Err(e) = self.write_users(&file).await {
            warn!("Failed to persist registration of {}: {}", username, e);
        } else {
            info!("Registered user {}", username);
        }
        true
    }

    /// Loads persisted EXP/level, defaulting to level 1 with no EXP.
    pub async fn load_progress(&self, username: &str) -> Progress {
        let _guard = self.lock.lock().await;
        match self.read_users().await {
            Ok(file) => file
                .users
                .iter()
                .find(|u| u.username == username)
                .map(|u| Progress::with_exp(username, u.exp, u.level))
                .unwrap_or_else(|| Progress::new(username)),
            Err(e) => {
                warn!("Cannot load progress of {}: {}", username, e);
                Progress::new(username)
            }
        }
    }

    /// Writes EXP/level back for an existing account. I/O failures are
    /// logged and otherwise ignored.
    pub async fn save_progress(&self, progress: &Progress) {
        let _guard = self.lock.lock().await;
        let mut file = match self.read_users().await {
            Ok(file) => file,
            Err(e) => {
                warn!("Cannot save progress of {}: {}", progress.username, e);
                return;
            }
        };

        let Some(user) = file
            .users
            .iter_mut()
            .find(|u| u.username == progress.username)
        else {
            return;
        };
        user.exp = progress.exp;
        user.level = progress.level;

        if let Err(e) = self.write_users(&file).await {
            warn!("Failed to save progress of {}: {}", progress.username, e);
        }
    }

    async fn read_users(&self) -> Result<UsersFile, AccountError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) if data.trim().is_empty() => Ok(UsersFile::default()),
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(UsersFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_users(&self, file: &UsersFile) -> Result<(), AccountError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let out = serde_json::to_string_pretty(file)?;
        tokio::fs::write(&self.path, out).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, AccountStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::new(dir.path().join("data").join("users.json"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_register_then_authenticate() {
        let (_dir, store) = store();

        assert!(store.register("alice", "pw").await);
        assert!(!store.register("alice", "other").await);

        let user = store.authenticate("alice", "pw").await.unwrap();
        assert_eq!(user.level, 1);
        assert_eq!(user.exp, 0);
        assert!(store.authenticate("alice", "wrong").await.is_none());
        assert!(store.authenticate("nobody", "pw").await.is_none());
    }

    #[tokio::test]
    async fn test_progress_defaults_and_persists() {
        let (_dir, store) = store();
        store.register("bob", "pw").await;

        let mut progress = store.load_progress("bob").await;
        assert_eq!((progress.exp, progress.level), (0, 1));

        progress.award(130);
        store.save_progress(&progress).await;

        let reloaded = store.load_progress("bob").await;
        assert_eq!((reloaded.exp, reloaded.level), (30, 2));

        let stranger = store.load_progress("ghost").await;
        assert_eq!((stranger.exp, stranger.level), (0, 1));
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_as_no_user() {
        let (dir, store) = store();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(store.path(), "{ this is not json").unwrap();

        assert!(store.authenticate("alice", "pw").await.is_none());
        assert!(!store.register("alice", "pw").await);
        assert_eq!(store.load_progress("alice").await.level, 1);
    }

    #[tokio::test]
    async fn test_reads_legacy_file_without_progress_fields() {
        let (dir, store) = store();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(
            store.path(),
            r#"{"users": [{"username": "carol", "password": "pw"}]}"#,
        )
        .unwrap();

        let user = store.authenticate("carol", "pw").await.unwrap();
        assert_eq!(user.level, 1);
    }
}
