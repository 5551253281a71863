//! Protocol module - Defines the wire protocol for GuessNet games
//!
//! The protocol uses a simple binary frame format:
//! - 1 byte message type
//! - 2 bytes payload length (big-endian)
//! - Variable length UTF-8 payload
//!
//! A frame is at least 3 bytes; a zero-length payload is valid.

mod message;
mod codec;

pub use message::*;
pub use codec::*;

/// Default port for game connections
pub const DEFAULT_PORT: u16 = 8080;

/// Default port for the observer WebSocket feed
pub const DEFAULT_OBSERVER_PORT: u16 = 8081;

/// Frame header size: type(1) + length(2)
pub const HEADER_SIZE: usize = 3;
