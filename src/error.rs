//! # Error Types
//!
//! This module defines the error types used throughout the MQTT engine,
//! providing detailed information about potential failures, from precondition
//! violations to malformed protocol frames.
//!
//! Transport failures never appear here: the transport reports them to the
//! host through its own notification path, and the engine only observes the
//! resulting `on_disconnected`/`on_connect_failed` events.

/// The primary error enum for the MQTT engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttError {
    /// A protocol-level error occurred, indicating a violation of the MQTT
    /// specification or of this engine's framing limits.
    Protocol(ProtocolError),
    /// The connection was refused by the broker. The enclosed code provides
    /// the reason.
    ConnectionRefused(ConnectReasonCode),
    /// An operation was attempted in a connection state that does not
    /// permit it. Local failure only; the connection is unaffected.
    WrongState,
    /// The outbound queue is at its configured depth limit and the frame was
    /// not enqueued with forced priority.
    QueueFull,
    /// An encoded frame does not fit the outbound frame buffer.
    BufferTooSmall,
}

impl From<ProtocolError> for MqttError {
    fn from(err: ProtocolError) -> Self {
        MqttError::Protocol(err)
    }
}

/// Enumerates specific MQTT protocol errors. All of these are fatal: the
/// engine responds by tearing the connection down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// An invalid or unsupported packet type was received.
    InvalidPacketType(u8),
    /// A packet was received that was not correctly formed.
    MalformedPacket,
    /// The body of an inbound packet exceeds the engine's 255-byte cap.
    PayloadTooLarge,
    /// A topic or message was not valid UTF-8.
    InvalidUtf8String,
    /// A well-formed packet arrived in a state that does not allow it.
    UnexpectedPacket,
}

/// Represents the reason codes carried by a `CONNACK` refusal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectReasonCode {
    /// The broker does not support the requested MQTT protocol version.
    UnacceptableProtocolVersion,
    /// The client identifier is not valid.
    IdentifierRejected,
    /// The broker is unavailable.
    ServerUnavailable,
    /// The username or password is not valid.
    BadUserNameOrPassword,
    /// The client is not authorized to connect.
    NotAuthorized,
    /// An unknown or unspecified refusal code.
    Other(u8),
}

impl From<u8> for ConnectReasonCode {
    fn from(val: u8) -> Self {
        match val {
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            _ => Self::Other(val),
        }
    }
}
