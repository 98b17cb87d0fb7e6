//! # MQTT Packet Structures and Serialization
//!
//! This module defines the control packets the engine exchanges and their
//! encoding into wire frames. Encoders are stateless: each produces one
//! complete frame (fixed header plus body) in an owned buffer that the send
//! queue can hold until the transport takes it.
//!
//! Only MQTT 3.1.1 is spoken, protocol level 4, and the remaining-length
//! field is limited to the two-byte continuation form: inbound bodies of 256
//! bytes or more are rejected outright rather than parsed with the full
//! four-byte scheme.

use heapless::Vec;

use crate::client::MqttOptions;
use crate::error::{MqttError, ProtocolError};
use crate::util::{put_header, put_str, put_u16, read_u16, read_utf8_string};

// Packet type values, high nibble of the fixed-header byte.
pub const CONNECT: u8 = 0x10;
pub const CONNACK: u8 = 0x20;
pub const PUBLISH: u8 = 0x30;
pub const PUBACK: u8 = 0x40;
pub const PUBREC: u8 = 0x50;
pub const PUBREL: u8 = 0x60;
pub const PUBCOMP: u8 = 0x70;
pub const SUBSCRIBE: u8 = 0x80;
pub const SUBACK: u8 = 0x90;
pub const UNSUBSCRIBE: u8 = 0xA0;
pub const UNSUBACK: u8 = 0xB0;
pub const PINGREQ: u8 = 0xC0;
pub const PINGRESP: u8 = 0xD0;

/// MQTT 3.1.1 protocol level.
const PROTOCOL_LEVEL: u8 = 4;

/// Largest inbound packet body the engine accepts.
pub const MAX_REMAINING_LEN: usize = 255;

/// One fully encoded outbound frame. Owned by the send queue until it is
/// moved into the transport's send call.
pub type RawPacket<const N: usize> = Vec<u8, N>;

/// Represents the Quality of Service (QoS) levels for MQTT messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl TryFrom<u8> for QoS {
    type Error = MqttError;

    fn try_from(val: u8) -> Result<Self, MqttError> {
        match val {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            _ => Err(ProtocolError::MalformedPacket.into()),
        }
    }
}

/// CONNECT, built from the client configuration.
///
/// Field order on the wire is fixed: protocol name, level, connect flags,
/// keepalive, client id, optional will topic/message, optional
/// username/password. The clean-session flag is always set.
pub struct Connect<'a> {
    pub options: &'a MqttOptions<'a>,
}

impl Connect<'_> {
    pub fn encode<const N: usize>(&self) -> Result<RawPacket<N>, MqttError> {
        let o = self.options;

        let mut len = 6   // "MQTT"
            + 1           // protocol level
            + 1           // connect flags
            + 2           // keepalive
            + 2 + o.client_id.len();
        if let Some(will) = &o.will {
            len += 2 + will.topic.len() + 2 + will.message.len();
        }
        if let Some(user) = o.username {
            len += 2 + user.len();
        }
        if let Some(pass) = o.password {
            len += 2 + pass.len();
        }

        let mut buf = Vec::new();
        put_header(&mut buf, CONNECT, len)?;
        put_str(&mut buf, "MQTT")?;
        buf.push(PROTOCOL_LEVEL)
            .map_err(|_| MqttError::BufferTooSmall)?;

        let mut flags = 0x02; // clean session
        if o.username.is_some() {
            flags |= 0x80;
        }
        if o.password.is_some() {
            flags |= 0x40;
        }
        if let Some(will) = &o.will {
            flags |= 0x04 | (will.qos as u8) << 3;
            if will.retain {
                flags |= 0x20;
            }
        }
        buf.push(flags).map_err(|_| MqttError::BufferTooSmall)?;

        put_u16(&mut buf, o.keepalive)?;
        put_str(&mut buf, o.client_id)?;
        if let Some(will) = &o.will {
            put_str(&mut buf, will.topic)?;
            put_str(&mut buf, will.message)?;
        }
        if let Some(user) = o.username {
            put_str(&mut buf, user)?;
        }
        if let Some(pass) = o.password {
            put_str(&mut buf, pass)?;
        }
        Ok(buf)
    }
}

/// PUBLISH, in both directions.
///
/// The message occupies the rest of the frame with no length prefix of its
/// own; the packet id is present only for QoS above 0.
#[derive(Debug, PartialEq, Eq)]
pub struct Publish<'a> {
    pub topic: &'a str,
    pub message: &'a str,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
    pub packet_id: Option<u16>,
}

impl<'a> Publish<'a> {
    pub fn encode<const N: usize>(&self) -> Result<RawPacket<N>, MqttError> {
        let len = 2
            + self.topic.len()
            + if self.packet_id.is_some() { 2 } else { 0 }
            + self.message.len();

        let mut buf = Vec::new();
        let type_byte = PUBLISH | (self.qos as u8) << 1 | if self.retain { 0x01 } else { 0 };
        put_header(&mut buf, type_byte, len)?;
        put_str(&mut buf, self.topic)?;
        if let Some(id) = self.packet_id {
            put_u16(&mut buf, id)?;
        }
        buf.extend_from_slice(self.message.as_bytes())
            .map_err(|_| MqttError::BufferTooSmall)?;
        Ok(buf)
    }

    /// Decodes an inbound publish from the fixed-header type byte and the
    /// reassembled body. The body must carry at least the topic length
    /// prefix plus a non-empty topic; a topic length pointing past the end
    /// of the body is malformed.
    pub fn decode(type_byte: u8, payload: &'a [u8]) -> Result<Self, MqttError> {
        if payload.len() < 4 {
            return Err(ProtocolError::MalformedPacket.into());
        }

        let qos = QoS::try_from((type_byte >> 1) & 0x03)?;
        let retain = (type_byte & 0x01) != 0;
        let dup = (type_byte & 0x08) != 0;

        let mut cursor = 0;
        let topic = read_utf8_string(&mut cursor, payload)?;

        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            Some(read_u16(&mut cursor, payload)?)
        };

        let message = core::str::from_utf8(&payload[cursor..])
            .map_err(|_| MqttError::Protocol(ProtocolError::InvalidUtf8String))?;

        Ok(Publish {
            topic,
            message,
            qos,
            retain,
            dup,
            packet_id,
        })
    }
}

/// SUBSCRIBE with a single topic filter and requested QoS.
pub struct Subscribe<'a> {
    pub packet_id: u16,
    pub topic: &'a str,
    pub qos: QoS,
}

impl Subscribe<'_> {
    pub fn encode<const N: usize>(&self) -> Result<RawPacket<N>, MqttError> {
        let len = 2 + 2 + self.topic.len() + 1;

        let mut buf = Vec::new();
        put_header(&mut buf, SUBSCRIBE | 0x02, len)?;
        put_u16(&mut buf, self.packet_id)?;
        put_str(&mut buf, self.topic)?;
        buf.push(self.qos as u8)
            .map_err(|_| MqttError::BufferTooSmall)?;
        Ok(buf)
    }
}

/// UNSUBSCRIBE with a single topic filter.
pub struct Unsubscribe<'a> {
    pub packet_id: u16,
    pub topic: &'a str,
}

impl Unsubscribe<'_> {
    pub fn encode<const N: usize>(&self) -> Result<RawPacket<N>, MqttError> {
        let len = 2 + 2 + self.topic.len();

        let mut buf = Vec::new();
        put_header(&mut buf, UNSUBSCRIBE | 0x02, len)?;
        put_u16(&mut buf, self.packet_id)?;
        put_str(&mut buf, self.topic)?;
        Ok(buf)
    }
}

/// The id-echoing acknowledgements: PUBACK, PUBREC, PUBREL and PUBCOMP all
/// share the same two-byte body.
pub struct Ack {
    pub packet_type: u8,
    pub packet_id: u16,
}

impl Ack {
    pub fn encode<const N: usize>(&self) -> Result<RawPacket<N>, MqttError> {
        let mut buf = Vec::new();
        put_header(&mut buf, self.packet_type, 2)?;
        put_u16(&mut buf, self.packet_id)?;
        Ok(buf)
    }
}

/// PINGREQ, zero-length body.
pub struct PingReq;

impl PingReq {
    pub fn encode<const N: usize>(&self) -> Result<RawPacket<N>, MqttError> {
        let mut buf = Vec::new();
        put_header(&mut buf, PINGREQ, 0)?;
        Ok(buf)
    }
}
