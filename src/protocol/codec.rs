//! Frame codec for encoding/decoding messages
//!
//! Handles serialization and framing of protocol messages. Decoding is
//! total: any input produces a well-formed [`Message`], with malformed or
//! truncated frames mapped to the [`MessageType::Unknown`] sentinel so the
//! caller decides how to react.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Message, MessageType, HEADER_SIZE};

/// Encode a message into its wire frame.
///
/// Payloads longer than a u16 length field can express are truncated at
/// 65535 bytes.
pub fn encode(message: &Message) -> Bytes {
    let payload = message.payload.as_deref().unwrap_or("").as_bytes();
    let length = payload.len().min(u16::MAX as usize);

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + length);
    buf.put_u8(message.message_type as u8);
    buf.put_u16(length as u16);
    buf.put_slice(&payload[..length]);
    buf.freeze()
}

/// Decode a single frame from a byte slice.
///
/// Rules, in order:
/// - fewer than 3 bytes: the unknown-message sentinel, no payload
/// - exactly 3 bytes: the type alone, no payload
/// - otherwise: payload length is the big-endian u16 at offset 1 and the
///   payload is the following bytes, clamped to what is available; trailing
///   bytes beyond the frame are ignored
///
/// Reassembly across stream chunk boundaries is [`FrameDecoder`]'s job, not
/// this function's.
pub fn decode(bytes: &[u8]) -> Message {
    if bytes.len() < HEADER_SIZE {
        return Message::new(MessageType::Unknown);
    }

    let message_type = MessageType::from_u8(bytes[0]);
    if bytes.len() == HEADER_SIZE {
        return Message::new(message_type);
    }

    let length = u16::from_be_bytes([bytes[1], bytes[2]]) as usize;
    let end = (HEADER_SIZE + length).min(bytes.len());
    let payload = String::from_utf8_lossy(&bytes[HEADER_SIZE..end]).into_owned();

    Message {
        message_type,
        payload: if payload.is_empty() { None } else { Some(payload) },
    }
}

/// Splits a byte stream into frames.
///
/// TCP gives no message boundaries; a read may carry half a frame or
/// several. The decoder buffers until a full header and payload are
/// available and then yields one message at a time. It cannot fail: the
/// header is fixed-size and every type byte is representable.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    state: DecodeState,
}

#[derive(Debug, Default)]
enum DecodeState {
    #[default]
    Header,
    Payload {
        message_type: MessageType,
        length: usize,
    },
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Header,
        }
    }

    /// Attempt to decode one frame from the buffer.
    /// Returns `None` if more data is needed.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Option<Message> {
        loop {
            match self.state {
                DecodeState::Header => {
                    if buf.len() < HEADER_SIZE {
                        return None;
                    }

                    let message_type = MessageType::from_u8(buf[0]);
                    let length = u16::from_be_bytes([buf[1], buf[2]]) as usize;
                    buf.advance(HEADER_SIZE);

                    self.state = DecodeState::Payload {
                        message_type,
                        length,
                    };
                }
                DecodeState::Payload {
                    message_type,
                    length,
                } => {
                    if buf.len() < length {
                        return None;
                    }

                    let payload = buf.split_to(length);
                    self.state = DecodeState::Header;

                    let payload = if payload.is_empty() {
                        None
                    } else {
                        Some(String::from_utf8_lossy(&payload).into_owned())
                    };

                    return Some(Message {
                        message_type,
                        payload,
                    });
                }
            }
        }
    }
}
