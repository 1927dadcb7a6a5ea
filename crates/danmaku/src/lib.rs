//! Codec for the live chat stream protocol.
//!
//! The chat stream speaks a simple binary framing: every frame starts with a
//! 16-byte big-endian header (packet length, header length, protocol version,
//! operation, sequence), and a version-2 body is a zlib-compressed
//! concatenation of further frames. A client only ever sends two packets, a
//! join for the room it watches and a periodic heartbeat, and receives
//! notification frames whose bodies are JSON commands.
//!
//! ## Core pieces
//!
//! - [`encode_join`] / [`encode_heartbeat`] - the two outbound packets
//! - [`decode_frames`] - walk a received buffer into notification bodies
//! - [`LiveEvent`] - closed classification of the commands the system consumes

pub mod error;
pub mod event;
pub mod packet;

pub use error::{DanmakuError, Result};
pub use event::LiveEvent;
pub use packet::{HEARTBEAT, decode_frames, encode_heartbeat, encode_join};

/// Default subscribe endpoint for the chat stream.
pub const DEFAULT_WS_URL: &str = "ws://broadcastlv.chat.bilibili.com:2244/sub";
