//! # MQTT Serialization Utilities
//!
//! This module provides helper functions for reading and writing MQTT wire
//! primitives: the fixed header with its variable-length remaining-length
//! field, big-endian `u16` values, and length-prefixed UTF-8 strings.

use heapless::Vec;

use crate::error::{MqttError, ProtocolError};

/// Largest remaining length representable with the two length bytes this
/// engine emits (7 + 7 bits).
pub const MAX_ENCODABLE_LEN: usize = 0x3FFF;

/// Writes a fixed header: the packet type byte followed by the remaining
/// length in the continuation-bit scheme. Lengths up to 127 take one byte,
/// larger ones two; anything beyond [`MAX_ENCODABLE_LEN`] is rejected.
pub fn put_header<const N: usize>(
    buf: &mut Vec<u8, N>,
    type_byte: u8,
    len: usize,
) -> Result<(), MqttError> {
    if len > MAX_ENCODABLE_LEN {
        return Err(ProtocolError::PayloadTooLarge.into());
    }

    buf.push(type_byte).map_err(|_| MqttError::BufferTooSmall)?;
    if len > 127 {
        buf.push(0x80 | (len & 0x7F) as u8)
            .map_err(|_| MqttError::BufferTooSmall)?;
        buf.push((len >> 7) as u8)
            .map_err(|_| MqttError::BufferTooSmall)?;
    } else {
        buf.push(len as u8).map_err(|_| MqttError::BufferTooSmall)?;
    }
    Ok(())
}

/// Writes a big-endian `u16`.
pub fn put_u16<const N: usize>(buf: &mut Vec<u8, N>, value: u16) -> Result<(), MqttError> {
    buf.extend_from_slice(&value.to_be_bytes())
        .map_err(|_| MqttError::BufferTooSmall)
}

/// Writes a UTF-8 string prefixed with its 2-byte big-endian length. No
/// terminator goes on the wire.
pub fn put_str<const N: usize>(buf: &mut Vec<u8, N>, s: &str) -> Result<(), MqttError> {
    if s.len() > u16::MAX as usize {
        return Err(ProtocolError::PayloadTooLarge.into());
    }
    put_u16(buf, s.len() as u16)?;
    buf.extend_from_slice(s.as_bytes())
        .map_err(|_| MqttError::BufferTooSmall)
}

/// Reads a big-endian `u16` from the buffer, advancing the cursor.
pub fn read_u16(cursor: &mut usize, buf: &[u8]) -> Result<u16, MqttError> {
    let bytes = buf
        .get(*cursor..*cursor + 2)
        .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
    *cursor += 2;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Reads a UTF-8 string (prefixed with a 2-byte length) from the buffer,
/// advancing the cursor.
pub fn read_utf8_string<'a>(cursor: &mut usize, buf: &'a [u8]) -> Result<&'a str, MqttError> {
    let len = read_u16(cursor, buf)? as usize;
    let bytes = buf
        .get(*cursor..*cursor + len)
        .ok_or(MqttError::Protocol(ProtocolError::MalformedPacket))?;
    let s = core::str::from_utf8(bytes)
        .map_err(|_| MqttError::Protocol(ProtocolError::InvalidUtf8String))?;
    *cursor += len;
    Ok(s)
}
