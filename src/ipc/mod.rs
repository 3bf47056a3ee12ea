//! Inter-process channel to the peer that produces samples.
//!
//! This module contains:
//! - Length-delimited framing over a byte stream
//! - The JSON message protocol (handshake, keep-alive, samples)
//! - The TCP channel adapter used by the ingestion loop

pub mod channel;
pub mod framing;
pub mod protocol;

// Re-export commonly used types
pub use channel::{IpcChannel, IpcError, MessageChannel};
pub use protocol::{decode, Inbound, ProtocolError, StatusMessage};
