//! Wire envelope types for the parley chat protocol.
//!
//! One self-contained JSON envelope per transport frame. Server-produced
//! envelopes carry a wall-clock timestamp and `sender: "server"`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Sender name used on all server-produced envelopes.
pub const SERVER_SENDER: &str = "server";

/// Message type tag — serialized as the snake_case `type` field on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MsgType {
    // Client → server
    Register,
    Broadcast,
    Private,
    ListUsers,
    UserInfo,
    ChangeStatus,
    Disconnect,

    // Server → client
    RegisterSuccess,
    ListUsersResponse,
    UserInfoResponse,
    StatusUpdate,
    UserDisconnected,
    Error,
}

/// Presence status of a registered user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Active,
    Busy,
    Inactive,
}

impl Status {
    /// Parse a wire status name. Returns `None` for anything outside the enum.
    pub fn parse(s: &str) -> Option<Status> {
        match s {
            "ACTIVE" => Some(Status::Active),
            "BUSY" => Some(Status::Busy),
            "INACTIVE" => Some(Status::Inactive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "ACTIVE",
            Status::Busy => "BUSY",
            Status::Inactive => "INACTIVE",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chat protocol message.
///
/// Optional fields are omitted from the wire when absent; `content` is a
/// string for chat text and status names, an object for structured info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MsgType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    /// All currently registered usernames; `register_success` only.
    #[serde(rename = "userList", default, skip_serializing_if = "Option::is_none")]
    pub user_list: Option<Vec<String>>,
}

/// Server wall-clock stamp for outbound envelopes.
fn timestamp_now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

impl Envelope {
    /// Base for server-produced envelopes: `sender: "server"` + timestamp.
    fn server(kind: MsgType) -> Envelope {
        Envelope {
            kind,
            sender: Some(SERVER_SENDER.to_string()),
            target: None,
            content: None,
            timestamp: Some(timestamp_now()),
            user_list: None,
        }
    }

    /// `register_success` reply carrying the full current username list.
    pub fn register_success(user_list: Vec<String>) -> Envelope {
        let mut env = Envelope::server(MsgType::RegisterSuccess);
        env.content = Some(Value::String("Registration successful".to_string()));
        env.user_list = Some(user_list);
        env
    }

    /// Relayed `broadcast` message, stamped by the server.
    pub fn broadcast(sender: &str, content: &str) -> Envelope {
        Envelope {
            kind: MsgType::Broadcast,
            sender: Some(sender.to_string()),
            target: None,
            content: Some(Value::String(content.to_string())),
            timestamp: Some(timestamp_now()),
            user_list: None,
        }
    }

    /// Relayed `private` message, stamped by the server.
    pub fn private(sender: &str, content: &str) -> Envelope {
        Envelope {
            kind: MsgType::Private,
            sender: Some(sender.to_string()),
            target: None,
            content: Some(Value::String(content.to_string())),
            timestamp: Some(timestamp_now()),
            user_list: None,
        }
    }

    /// `list_users_response` reply; the list rides in `content`.
    pub fn list_users_response(users: Vec<String>) -> Envelope {
        let mut env = Envelope::server(MsgType::ListUsersResponse);
        env.content = Some(json!(users));
        env
    }

    /// `user_info_response` reply with the queried user's `{ip, status}`.
    pub fn user_info_response(target: &str, ip: &str, status: Status) -> Envelope {
        let mut env = Envelope::server(MsgType::UserInfoResponse);
        env.target = Some(target.to_string());
        env.content = Some(json!({ "ip": ip, "status": status.as_str() }));
        env
    }

    /// `status_update` confirmation after a successful status change.
    pub fn status_update(user: &str, status: Status) -> Envelope {
        let mut env = Envelope::server(MsgType::StatusUpdate);
        env.content = Some(json!({ "user": user, "status": status.as_str() }));
        env
    }

    /// `user_disconnected` notice broadcast when a user leaves.
    pub fn user_disconnected(username: &str) -> Envelope {
        let mut env = Envelope::server(MsgType::UserDisconnected);
        env.content = Some(Value::String(format!("{username} has left")));
        env
    }

    /// `error` reply delivered to the originating connection only.
    pub fn error(message: &str) -> Envelope {
        let mut env = Envelope::server(MsgType::Error);
        env.content = Some(Value::String(message.to_string()));
        env
    }

    /// The `content` field as a string, if it is one.
    pub fn content_str(&self) -> Option<&str> {
        self.content.as_ref().and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_field_uses_snake_case_names() {
        let env = Envelope::register_success(vec!["alice".into()]);
        let json: Value = serde_json::from_str(&serde_json::to_string(&env).unwrap()).unwrap();
        assert_eq!(json["type"], "register_success");
        assert_eq!(json["userList"], json!(["alice"]));
        assert_eq!(json["sender"], "server");
        assert!(json.get("target").is_none());
    }

    #[test]
    fn inbound_register_parses() {
        let env: Envelope =
            serde_json::from_str(r#"{"type":"register","sender":"alice"}"#).unwrap();
        assert_eq!(env.kind, MsgType::Register);
        assert_eq!(env.sender.as_deref(), Some("alice"));
        assert!(env.content.is_none());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let result: Result<Envelope, _> =
            serde_json::from_str(r#"{"type":"shutdown_now","sender":"alice"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn missing_type_is_rejected() {
        let result: Result<Envelope, _> = serde_json::from_str(r#"{"sender":"alice"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn status_wire_casing() {
        assert_eq!(Status::parse("BUSY"), Some(Status::Busy));
        assert_eq!(Status::parse("busy"), None);
        assert_eq!(Status::parse("AWAY"), None);
        assert_eq!(serde_json::to_string(&Status::Inactive).unwrap(), "\"INACTIVE\"");
    }

    #[test]
    fn user_info_content_is_structured() {
        let env = Envelope::user_info_response("bob", "10.0.0.7", Status::Busy);
        let content = env.content.unwrap();
        assert_eq!(content["ip"], "10.0.0.7");
        assert_eq!(content["status"], "BUSY");
        assert_eq!(env.target.as_deref(), Some("bob"));
    }

    #[test]
    fn server_envelopes_are_timestamped() {
        let env = Envelope::error("user not found");
        assert!(env.timestamp.is_some());
        assert_eq!(env.content_str(), Some("user not found"));
    }
}
