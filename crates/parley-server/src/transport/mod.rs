//! Transport layer: accepts connections and moves frames.

pub mod websocket;
