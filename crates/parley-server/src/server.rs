//! Core server: accepts connections and runs one session loop per client.
//!
//! The session loop is the only place a socket is ever written: workers hand
//! it frames through the connection's outbound queue and a wake signal, so
//! no two tasks can race on one socket. Inbound frames go straight to the
//! worker pool; the loop itself does no protocol work.

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::monitor;
use crate::pool::WorkerPool;
use crate::registry::{ConnectionRegistry, UserRegistry};
use crate::transport::websocket::{self, WebSocketConnection};
use parley_core::{ParleyError, ParleyResult};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

/// The parley relay server instance.
pub struct RelayServer {
    config: ServerConfig,
    users: Arc<UserRegistry>,
    connections: Arc<ConnectionRegistry>,
    pool: WorkerPool,
    /// Broadcast observed by session loops, the monitor, and the accept loop.
    shutdown_tx: watch::Sender<bool>,
}

impl RelayServer {
    /// Wire up registries, dispatcher, and worker pool.
    pub fn new(config: ServerConfig) -> Self {
        let users = Arc::new(UserRegistry::new(Duration::from_secs(config.idle_timeout)));
        let connections = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(users.clone(), connections.clone()));

        let pool = WorkerPool::start(config.workers, move |task| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.handle(task).await }
        });

        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            users,
            connections,
            pool,
            shutdown_tx,
        }
    }

    /// Accept connections until shutdown.
    pub async fn run(self: Arc<Self>) -> ParleyResult<()> {
        let addr: SocketAddr = format!("0.0.0.0:{}", self.config.port)
            .parse()
            .map_err(|e| ParleyError::Other(format!("invalid address: {e}")))?;

        let mut accept_rx = websocket::start_listener(addr).await?;

        let monitor_handle = monitor::spawn(
            self.users.clone(),
            Duration::from_secs(self.config.sweep_interval),
            self.shutdown_tx.subscribe(),
        );

        info!(
            port = self.config.port,
            workers = self.config.workers,
            idle_timeout = self.config.idle_timeout,
            "parley-server ready"
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                conn = accept_rx.recv() => match conn {
                    Some(conn) => {
                        let srv = self.clone();
                        tokio::spawn(async move {
                            srv.handle_connection(conn).await;
                        });
                    }
                    None => {
                        info!("listener closed, shutting down");
                        break;
                    }
                }
            }
        }

        let _ = monitor_handle.await;
        Ok(())
    }

    /// Stop accepting, wake every session loop and the monitor, then join
    /// the worker pool. In-flight tasks finish; queued ones are discarded.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        self.pool.stop().await;
    }

    /// Session loop for one client connection.
    ///
    /// Selects over the shutdown broadcast, the connection's writer wakeup
    /// (drain the outbound queue, then honor a pending close request), and
    /// inbound frames (queued for the worker pool untouched).
    async fn handle_connection(&self, conn: WebSocketConnection) {
        let conn_id = self.connections.next_id();
        let wake = Arc::new(Notify::new());
        let ip = conn.remote_addr.ip().to_string();
        self.connections.insert(conn_id, ip, wake.clone()).await;
        info!(conn_id, remote = %conn.remote_addr, "client connected");

        let mut ws = conn.ws_stream;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    debug!(conn_id, "shutdown signal received, closing connection");
                    break;
                }

                _ = wake.notified() => {
                    let mut write_failed = false;
                    for frame in self.connections.drain(conn_id).await {
                        if let Err(e) = websocket::ws_send_text(&mut ws, &frame).await {
                            warn!(conn_id, error = %e, "write failed, closing connection");
                            write_failed = true;
                            break;
                        }
                    }
                    if write_failed || self.connections.close_requested(conn_id).await {
                        break;
                    }
                }

                inbound = websocket::ws_recv_text(&mut ws) => match inbound {
                    Ok(Some(text)) => {
                        if !self.pool.dispatch(conn_id, text.into_bytes()) {
                            debug!(conn_id, "pool stopping, inbound frame dropped");
                        }
                    }
                    Ok(None) => {
                        debug!(conn_id, "session ended (peer closed)");
                        break;
                    }
                    Err(e) => {
                        debug!(conn_id, error = %e, "session ended");
                        break;
                    }
                }
            }
        }

        let _ = ws.close(None).await;

        // Close event: tear down both registries together so the name is
        // immediately free for re-registration.
        match self.connections.remove(conn_id).await {
            Some(username) => {
                self.users.remove(&username).await;
                info!(conn_id, username = %username, "connection closed, user removed");
            }
            None => debug!(conn_id, "connection closed"),
        }
    }
}
