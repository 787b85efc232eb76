//! JSON framing for the chat protocol.
//!
//! The transport delivers one complete frame per message, so the codec is a
//! thin typed layer over serde_json: encode one envelope to a text frame,
//! decode one frame into an envelope.

use crate::envelope::Envelope;
use crate::error::ParleyResult;

/// Encode an envelope into a single text frame.
pub fn encode_frame(envelope: &Envelope) -> ParleyResult<String> {
    Ok(serde_json::to_string(envelope)?)
}

/// Decode one frame into an envelope.
///
/// Fails on malformed JSON, an unknown `type`, or a mistyped field; the
/// caller decides whether that drops the message or kills the connection.
pub fn decode_frame(data: &[u8]) -> ParleyResult<Envelope> {
    Ok(serde_json::from_slice(data)?)
}
