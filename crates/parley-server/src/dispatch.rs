//! Protocol dispatcher: turns one inbound envelope into registry mutations
//! and outbound deliveries.
//!
//! Runs on worker tasks. Side effects are confined to the two registries,
//! outbound queue appends, and (for `disconnect`) a close request to the
//! connection's session loop — never a direct socket write. Malformed
//! frames and envelopes missing required fields are dropped and logged;
//! domain failures produce an `error` reply to the originating connection
//! only.

use crate::pool::Task;
use crate::registry::{ConnectionId, ConnectionRegistry, UserRegistry};
use parley_core::{decode_frame, encode_frame, Envelope, MsgType, Status};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Dispatcher {
    users: Arc<UserRegistry>,
    connections: Arc<ConnectionRegistry>,
}

impl Dispatcher {
    pub fn new(users: Arc<UserRegistry>, connections: Arc<ConnectionRegistry>) -> Self {
        Self { users, connections }
    }

    /// Process one inbound frame to completion.
    pub async fn handle(&self, task: Task) {
        let envelope = match decode_frame(&task.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(conn_id = task.conn_id, error = %e, "dropping undecodable frame");
                return;
            }
        };

        // Any inbound traffic counts as activity, except the farewell.
        if envelope.kind != MsgType::Disconnect {
            if let Some(sender) = envelope.sender.as_deref() {
                self.users.touch(sender).await;
            }
        }

        match envelope.kind {
            MsgType::Register => self.on_register(task.conn_id, &envelope).await,
            MsgType::Broadcast => self.on_broadcast(task.conn_id, &envelope).await,
            MsgType::Private => self.on_private(task.conn_id, &envelope).await,
            MsgType::ListUsers => self.on_list_users(task.conn_id).await,
            MsgType::UserInfo => self.on_user_info(task.conn_id, &envelope).await,
            MsgType::ChangeStatus => self.on_change_status(task.conn_id, &envelope).await,
            MsgType::Disconnect => self.on_disconnect(task.conn_id, &envelope).await,
            kind => {
                debug!(conn_id = task.conn_id, ?kind, "dropping server-only message type");
            }
        }
    }

    /// Encode and queue a reply for the originating connection.
    async fn reply(&self, conn_id: ConnectionId, envelope: &Envelope) {
        match encode_frame(envelope) {
            Ok(frame) => {
                if !self.connections.enqueue(conn_id, frame).await {
                    debug!(conn_id, "reply dropped: connection gone");
                }
            }
            Err(e) => warn!(conn_id, error = %e, "failed to encode reply"),
        }
    }

    async fn on_register(&self, conn_id: ConnectionId, envelope: &Envelope) {
        let Some(sender) = envelope.sender.as_deref() else {
            warn!(conn_id, "register without sender, dropping");
            return;
        };
        let Some(ip) = self.connections.peer_ip(conn_id).await else {
            debug!(conn_id, "register from vanished connection");
            return;
        };

        if !self.users.register(sender, &ip).await {
            self.reply(conn_id, &Envelope::error("user already exists")).await;
            return;
        }
        if !self.connections.bind(conn_id, sender).await {
            // Keep the registries in lockstep: a user row must have a
            // bound connection behind it.
            self.users.remove(sender).await;
            return;
        }
        info!(username = %sender, %ip, "user registered");
        let user_list = self.users.list_usernames().await;
        self.reply(conn_id, &Envelope::register_success(user_list)).await;
    }

    async fn on_broadcast(&self, conn_id: ConnectionId, envelope: &Envelope) {
        let (Some(sender), Some(content)) = (envelope.sender.as_deref(), envelope.content_str())
        else {
            warn!(conn_id, "broadcast missing sender or content, dropping");
            return;
        };
        match encode_frame(&Envelope::broadcast(sender, content)) {
            Ok(frame) => {
                let recipients = self.connections.broadcast(frame).await;
                debug!(sender, recipients, "broadcast relayed");
            }
            Err(e) => warn!(conn_id, error = %e, "failed to encode broadcast"),
        }
    }

    async fn on_private(&self, conn_id: ConnectionId, envelope: &Envelope) {
        let (Some(sender), Some(target), Some(content)) = (
            envelope.sender.as_deref(),
            envelope.target.as_deref(),
            envelope.content_str(),
        ) else {
            warn!(conn_id, "private missing sender, target, or content, dropping");
            return;
        };
        match encode_frame(&Envelope::private(sender, content)) {
            Ok(frame) => {
                if self.connections.enqueue_to_user(target, frame).await {
                    debug!(sender, target, "private message relayed");
                } else {
                    self.reply(conn_id, &Envelope::error("user not found")).await;
                }
            }
            Err(e) => warn!(conn_id, error = %e, "failed to encode private message"),
        }
    }

    async fn on_list_users(&self, conn_id: ConnectionId) {
        let users = self.users.list_usernames().await;
        self.reply(conn_id, &Envelope::list_users_response(users)).await;
    }

    async fn on_user_info(&self, conn_id: ConnectionId, envelope: &Envelope) {
        let Some(target) = envelope.target.as_deref() else {
            warn!(conn_id, "user_info without target, dropping");
            return;
        };
        match self.users.get_info(target).await {
            Some(info) => {
                self.reply(conn_id, &Envelope::user_info_response(target, &info.ip, info.status))
                    .await;
            }
            None => self.reply(conn_id, &Envelope::error("user not found")).await,
        }
    }

    async fn on_change_status(&self, conn_id: ConnectionId, envelope: &Envelope) {
        let (Some(sender), Some(requested)) = (envelope.sender.as_deref(), envelope.content_str())
        else {
            warn!(conn_id, "change_status missing sender or content, dropping");
            return;
        };
        let Some(status) = Status::parse(requested) else {
            self.reply(conn_id, &Envelope::error("invalid status")).await;
            return;
        };
        if self.users.change_status(sender, status).await {
            info!(username = %sender, %status, "status changed");
            self.reply(conn_id, &Envelope::status_update(sender, status)).await;
        } else {
            self.reply(conn_id, &Envelope::error("user not found")).await;
        }
    }

    async fn on_disconnect(&self, conn_id: ConnectionId, envelope: &Envelope) {
        let Some(sender) = envelope.sender.as_deref() else {
            warn!(conn_id, "disconnect without sender, dropping");
            return;
        };
        match encode_frame(&Envelope::user_disconnected(sender)) {
            Ok(frame) => {
                self.connections.broadcast(frame).await;
            }
            Err(e) => warn!(conn_id, error = %e, "failed to encode disconnect notice"),
        }
        info!(username = %sender, conn_id, "disconnect requested");
        // Registry cleanup happens on the close event this triggers.
        self.connections.request_close(conn_id).await;
    }
}
