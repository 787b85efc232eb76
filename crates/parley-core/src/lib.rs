//! parley-core: Shared protocol library for the parley chat relay.
//!
//! Provides the JSON wire envelope types, the frame codec, and the error
//! taxonomy shared by the server and any client tooling.

pub mod codec;
pub mod envelope;
pub mod error;

// Re-export commonly used items at crate root.
pub use codec::{decode_frame, encode_frame};
pub use envelope::{Envelope, MsgType, Status, SERVER_SENDER};
pub use error::{ParleyError, ParleyResult};
