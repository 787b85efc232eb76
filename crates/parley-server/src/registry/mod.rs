//! In-memory authoritative tables: connections and users.

pub mod connections;
pub mod users;

pub use connections::{ConnectionId, ConnectionRegistry};
pub use users::{UserInfo, UserRegistry};
