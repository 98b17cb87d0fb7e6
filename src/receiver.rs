//! # Incremental Frame Receiver
//!
//! Reassembles MQTT frames from transport deliveries that may be chunked at
//! any byte boundary: inside the type byte, inside the 1-2 byte
//! remaining-length field, or anywhere in the body. Packets also arrive
//! back-to-back within a single delivery, so one chunk can complete several
//! frames.
//!
//! The parser keeps its resumable position as an explicit state value rather
//! than on a call stack: each call to [`FrameReceiver::advance`] picks up
//! exactly where the previous one stopped. A validation failure at any point
//! is fatal for the connection; the receiver never tries to resynchronize a
//! corrupted stream.

use heapless::Vec;

use crate::error::{MqttError, ProtocolError};
use crate::packet::{self, MAX_REMAINING_LEN};

/// One complete inbound frame: the raw fixed-header byte (type nibble plus
/// flag bits) and the reassembled body.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame {
    pub type_byte: u8,
    pub payload: Vec<u8, MAX_REMAINING_LEN>,
}

impl Frame {
    /// The packet type, i.e. the high nibble of the header byte.
    pub fn packet_type(&self) -> u8 {
        self.type_byte & 0xF0
    }
}

/// Parse position, advanced byte by byte across chunk boundaries.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for the fixed-header type byte.
    Type,
    /// Waiting for the first remaining-length byte.
    Length { type_byte: u8 },
    /// The first length byte had its continuation bit set; waiting for the
    /// second. The second byte contributes all eight of its bits, which can
    /// only produce values the oversize check below rejects anyway.
    LengthExt { type_byte: u8, low: u8 },
    /// Filling the body buffer until `len` bytes have arrived.
    Payload { type_byte: u8, len: usize },
}

/// The resumable frame parser.
pub struct FrameReceiver {
    state: State,
    payload: Vec<u8, MAX_REMAINING_LEN>,
}

impl FrameReceiver {
    pub fn new() -> Self {
        Self {
            state: State::Type,
            payload: Vec::new(),
        }
    }

    /// Discards any partially received frame and restarts at the type byte.
    pub fn reset(&mut self) {
        self.state = State::Type;
        self.payload.clear();
    }

    /// Consumes bytes from the front of `input` until a frame completes or
    /// the chunk runs out. Returns `Ok(Some(frame))` with `input` advanced
    /// past the consumed bytes; call again with the remainder to pick up any
    /// frames that follow in the same chunk.
    pub fn advance(&mut self, input: &mut &[u8]) -> Result<Option<Frame>, MqttError> {
        while let Some((&byte, rest)) = input.split_first() {
            match self.state {
                State::Type => {
                    *input = rest;
                    if !is_inbound_type(byte & 0xF0) {
                        debug!("recv: bad packet type 0x{:02x}", byte);
                        return Err(ProtocolError::InvalidPacketType(byte).into());
                    }
                    self.state = State::Length { type_byte: byte };
                }
                State::Length { type_byte } => {
                    *input = rest;
                    if byte & 0x80 == 0 {
                        if let Some(frame) = self.start_payload(type_byte, byte as usize)? {
                            return Ok(Some(frame));
                        }
                    } else {
                        self.state = State::LengthExt {
                            type_byte,
                            low: byte & 0x7F,
                        };
                    }
                }
                State::LengthExt { type_byte, low } => {
                    *input = rest;
                    let len = low as usize | (byte as usize) << 7;
                    if let Some(frame) = self.start_payload(type_byte, len)? {
                        return Ok(Some(frame));
                    }
                }
                State::Payload { type_byte, len } => {
                    let want = len - self.payload.len();
                    let take = want.min(input.len());
                    // Capacity is guaranteed: len was checked against the cap.
                    let _ = self.payload.extend_from_slice(&input[..take]);
                    *input = &input[take..];
                    if self.payload.len() == len {
                        return Ok(Some(self.complete(type_byte)));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Applies the oversize check and either emits a zero-length frame
    /// immediately or switches to body filling.
    fn start_payload(&mut self, type_byte: u8, len: usize) -> Result<Option<Frame>, MqttError> {
        if len > MAX_REMAINING_LEN {
            debug!("recv: packet too big ({} bytes)", len);
            return Err(ProtocolError::PayloadTooLarge.into());
        }
        if len == 0 {
            return Ok(Some(self.complete(type_byte)));
        }
        self.payload.clear();
        self.state = State::Payload { type_byte, len };
        Ok(None)
    }

    fn complete(&mut self, type_byte: u8) -> Frame {
        self.state = State::Type;
        Frame {
            type_byte,
            payload: core::mem::take(&mut self.payload),
        }
    }
}

impl Default for FrameReceiver {
    fn default() -> Self {
        Self::new()
    }
}

/// The nine packet types a client may legitimately receive.
fn is_inbound_type(packet_type: u8) -> bool {
    matches!(
        packet_type,
        packet::CONNACK
            | packet::PUBLISH
            | packet::PUBACK
            | packet::PUBREC
            | packet::PUBREL
            | packet::PUBCOMP
            | packet::SUBACK
            | packet::UNSUBACK
            | packet::PINGRESP
    )
}
