//! User registry: identity, presence status, and activity tracking.
//!
//! Maps a username to its connection IP, status, and last-activity time.
//! Guarded independently of the connection registry; no caller holds both
//! registry locks at once.

use parley_core::Status;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// State tracked for one registered user.
struct UserEntry {
    ip: String,
    status: Status,
    last_activity: Instant,
}

/// Presence snapshot returned by [`UserRegistry::get_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub ip: String,
    pub status: Status,
}

/// Registry of all currently registered users.
pub struct UserRegistry {
    users: RwLock<HashMap<String, UserEntry>>,
    idle_timeout: Duration,
}

impl UserRegistry {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Atomic check-and-insert. Returns false (no mutation) if the username
    /// is already taken.
    pub async fn register(&self, username: &str, ip: &str) -> bool {
        let mut users = self.users.write().await;
        if users.contains_key(username) {
            return false;
        }
        users.insert(
            username.to_string(),
            UserEntry {
                ip: ip.to_string(),
                status: Status::Active,
                last_activity: Instant::now(),
            },
        );
        true
    }

    /// Set a user's status. Returns false if the username is unknown.
    pub async fn change_status(&self, username: &str, status: Status) -> bool {
        let mut users = self.users.write().await;
        match users.get_mut(username) {
            Some(entry) => {
                entry.status = status;
                true
            }
            None => false,
        }
    }

    /// Record activity: refresh last_activity and reactivate an INACTIVE user.
    pub async fn touch(&self, username: &str) {
        let mut users = self.users.write().await;
        if let Some(entry) = users.get_mut(username) {
            entry.last_activity = Instant::now();
            if entry.status == Status::Inactive {
                entry.status = Status::Active;
                info!(username, "user reactivated");
            }
        }
    }

    /// Mark every user idle for at least the timeout as INACTIVE.
    ///
    /// Idempotent on already-INACTIVE users. Returns the names that flipped.
    pub async fn check_inactive(&self, now: Instant) -> Vec<String> {
        let mut users = self.users.write().await;
        let mut flipped = Vec::new();
        for (name, entry) in users.iter_mut() {
            if entry.status != Status::Inactive
                && now.saturating_duration_since(entry.last_activity) >= self.idle_timeout
            {
                entry.status = Status::Inactive;
                flipped.push(name.clone());
            }
        }
        flipped
    }

    /// Remove a user. Returns false if the username was unknown.
    pub async fn remove(&self, username: &str) -> bool {
        let mut users = self.users.write().await;
        if users.remove(username).is_some() {
            debug!(username, "user removed");
            true
        } else {
            false
        }
    }

    /// The user's `{ip, status}`, if registered.
    pub async fn get_info(&self, username: &str) -> Option<UserInfo> {
        let users = self.users.read().await;
        users.get(username).map(|entry| UserInfo {
            ip: entry.ip.clone(),
            status: entry.status,
        })
    }

    /// All registered usernames, sorted.
    pub async fn list_usernames(&self) -> Vec<String> {
        let users = self.users.read().await;
        let mut names: Vec<String> = users.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn count(&self) -> usize {
        self.users.read().await.len()
    }
}
