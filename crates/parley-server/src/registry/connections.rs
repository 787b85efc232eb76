//! Connection registry: live connections, username bindings, and
//! per-connection outbound queues.
//!
//! Workers deliver messages by appending encoded frames to a connection's
//! queue and signalling its writer; only the connection's own session loop
//! ever drains the queue and touches the socket. One lock covers the whole
//! table, so all mutating operations are atomic with respect to each other.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info, warn};

/// Opaque handle for one live connection.
pub type ConnectionId = u64;

/// Per-connection state: binding, outbound queue, writer wakeup.
struct ClientEntry {
    ip: String,
    username: Option<String>,
    queue: VecDeque<String>,
    wake: Arc<Notify>,
    close_requested: bool,
}

#[derive(Default)]
struct Table {
    clients: HashMap<ConnectionId, ClientEntry>,
    by_name: HashMap<String, ConnectionId>,
}

/// Registry of all live connections.
pub struct ConnectionRegistry {
    table: RwLock<Table>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Table::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh connection ID.
    pub fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Track a newly accepted connection. `wake` is signalled whenever the
    /// connection's outbound queue gains frames or a close is requested.
    pub async fn insert(&self, conn_id: ConnectionId, ip: String, wake: Arc<Notify>) {
        let mut table = self.table.write().await;
        table.clients.insert(
            conn_id,
            ClientEntry {
                ip,
                username: None,
                queue: VecDeque::new(),
                wake,
                close_requested: false,
            },
        );
    }

    /// Bind a connection to a username. Returns false (logged, no mutation)
    /// if the connection is unknown, already bound, or the name is taken.
    pub async fn bind(&self, conn_id: ConnectionId, username: &str) -> bool {
        let mut guard = self.table.write().await;
        let table = &mut *guard;
        if table.by_name.contains_key(username) {
            warn!(conn_id, username, "bind refused: username already bound");
            return false;
        }
        match table.clients.get_mut(&conn_id) {
            Some(entry) if entry.username.is_none() => {
                entry.username = Some(username.to_string());
                table.by_name.insert(username.to_string(), conn_id);
                info!(conn_id, username, "connection bound");
                true
            }
            Some(entry) => {
                warn!(
                    conn_id,
                    username,
                    bound = %entry.username.as_deref().unwrap_or_default(),
                    "bind refused: connection already bound"
                );
                false
            }
            None => {
                warn!(conn_id, username, "bind refused: connection unknown");
                false
            }
        }
    }

    /// Drop a connection, discarding any queued frames. Returns the username
    /// it was bound to, if any.
    pub async fn remove(&self, conn_id: ConnectionId) -> Option<String> {
        let mut table = self.table.write().await;
        let entry = table.clients.remove(&conn_id)?;
        if let Some(ref username) = entry.username {
            table.by_name.remove(username);
        }
        if !entry.queue.is_empty() {
            debug!(conn_id, dropped = entry.queue.len(), "discarding undelivered frames");
        }
        entry.username
    }

    /// Append a frame to a connection's outbound queue and wake its writer.
    /// Returns false if the connection is unknown.
    pub async fn enqueue(&self, conn_id: ConnectionId, frame: String) -> bool {
        let mut table = self.table.write().await;
        match table.clients.get_mut(&conn_id) {
            Some(entry) => {
                entry.queue.push_back(frame);
                entry.wake.notify_one();
                true
            }
            None => false,
        }
    }

    /// Like [`enqueue`](Self::enqueue), addressed by bound username.
    pub async fn enqueue_to_user(&self, username: &str, frame: String) -> bool {
        let mut table = self.table.write().await;
        let Some(&conn_id) = table.by_name.get(username) else {
            return false;
        };
        match table.clients.get_mut(&conn_id) {
            Some(entry) => {
                entry.queue.push_back(frame);
                entry.wake.notify_one();
                true
            }
            None => false,
        }
    }

    /// Enqueue a frame to every bound connection. Returns the recipient count.
    pub async fn broadcast(&self, frame: String) -> usize {
        let mut table = self.table.write().await;
        let mut delivered = 0;
        for entry in table.clients.values_mut() {
            if entry.username.is_some() {
                entry.queue.push_back(frame.clone());
                entry.wake.notify_one();
                delivered += 1;
            }
        }
        delivered
    }

    /// Pop all queued frames for a connection, in FIFO order.
    ///
    /// Called only from the connection's own session loop.
    pub async fn drain(&self, conn_id: ConnectionId) -> Vec<String> {
        let mut table = self.table.write().await;
        match table.clients.get_mut(&conn_id) {
            Some(entry) => entry.queue.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// Ask the connection's session loop to close the socket after it has
    /// drained the queue.
    pub async fn request_close(&self, conn_id: ConnectionId) {
        let mut table = self.table.write().await;
        if let Some(entry) = table.clients.get_mut(&conn_id) {
            entry.close_requested = true;
            entry.wake.notify_one();
        }
    }

    pub async fn close_requested(&self, conn_id: ConnectionId) -> bool {
        let table = self.table.read().await;
        table
            .clients
            .get(&conn_id)
            .map(|entry| entry.close_requested)
            .unwrap_or(false)
    }

    /// Peer IP captured when the connection was accepted.
    pub async fn peer_ip(&self, conn_id: ConnectionId) -> Option<String> {
        let table = self.table.read().await;
        table.clients.get(&conn_id).map(|entry| entry.ip.clone())
    }

    /// Usernames of all bound connections, sorted.
    pub async fn list_usernames(&self) -> Vec<String> {
        let table = self.table.read().await;
        let mut names: Vec<String> = table.by_name.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn count(&self) -> usize {
        self.table.read().await.clients.len()
    }
}
