//! # Transport and Timer Abstractions
//!
//! This module defines the narrow contracts through which the engine reaches
//! its external collaborators: the byte-stream transport (TCP, TLS, UART,
//! anything reliable and ordered) and the host's timer service. Both are
//! request-only interfaces; completions and expirations flow back into the
//! engine through [`MqttClient`](crate::client::MqttClient) event methods.
//!
//! DNS resolution, socket establishment and teardown all live behind
//! [`MqttTransport`]; the engine never blocks on them.

use crate::packet::RawPacket;

/// A transport for encoded MQTT frames.
///
/// All methods are non-blocking requests. The host reflects their outcomes
/// back into the engine: a completed connection attempt becomes
/// `on_transport_connected`, a finished send becomes `on_send_complete`,
/// received bytes become `on_received`, and teardown confirmations become
/// `on_disconnected`/`on_connect_failed`.
pub trait MqttTransport<const N: usize> {
    /// Begins resolving `host` and connecting to it. Returns `false` only
    /// for failures detectable immediately (e.g. a hostname the resolver
    /// rejects outright); asynchronous failures arrive as
    /// `on_connect_failed`.
    fn connect(&mut self, host: &str, port: u16) -> bool;

    /// Hands one encoded frame to the transport, transferring ownership of
    /// the buffer. At most one send is outstanding at a time from the queue
    /// dispatch path; completion must be reported via `on_send_complete`.
    fn send(&mut self, frame: RawPacket<N>);

    /// Requests an orderly teardown of the connection. Implementations must
    /// defer the actual close out of any interrupt-like context;
    /// confirmation arrives as `on_disconnected`.
    fn disconnect(&mut self);

    /// Releases all transport resources. Requested once the connection has
    /// reached `Closed`; deferred like [`MqttTransport::disconnect`].
    fn release(&mut self);
}

/// The two timers the engine arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerKind {
    /// Idle-receive deadline: a fixed 10 s budget while connecting, then
    /// 1.5 x keepalive, re-armed on every parsed inbound frame. Expiry means
    /// the peer is dead and is reported via `on_receive_timeout`.
    Timeout,
    /// Ping-send interval: keepalive seconds, re-armed on every dispatch.
    /// Expiry is reported via `on_keepalive`.
    KeepAlive,
}

/// One-shot timer service provided by the host.
pub trait MqttTimers {
    /// Arms `kind` to fire once after `after_ms` milliseconds. Arming a
    /// timer that is already armed restarts it.
    fn arm(&mut self, kind: TimerKind, after_ms: u32);

    /// Disarms `kind`; a disarmed timer must not fire.
    fn disarm(&mut self, kind: TimerKind);
}
