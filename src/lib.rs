//! # picomqtt
//!
//! An event-driven MQTT 3.1.1 client engine for embedded systems.
//!
//! The engine is a pure state machine: it owns no sockets and no clocks.
//! Bytes, send completions and timer expirations are pushed into
//! [`MqttClient`] event methods, and the engine pushes encoded frames and
//! timer requests out through the [`MqttTransport`] and [`MqttTimers`]
//! traits. This keeps the protocol logic testable on any host and portable
//! across transports.
//!
//! For async hosts, [`MqttRuntime`] wires the engine to an
//! [`embedded_io_async`] byte stream and drives it to completion.
//!
//! ## Usage
//!
//! ```ignore
//! let options = MqttOptions {
//!     host: "broker.local",
//!     port: 1883,
//!     keepalive: 30,
//!     q_max: 4,
//!     client_id: "sensor-1",
//!     username: None,
//!     password: None,
//!     will: None,
//! };
//! let mut runtime: MqttRuntime<_, _, 256, 8> =
//!     MqttRuntime::new(options, socket, handler);
//! runtime.client().subscribe("cmd/#", QoS::AtMostOnce);
//! runtime.run().await?;
//! ```
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod client;
pub mod error;
pub mod packet;
pub mod queue;
pub mod receiver;
pub mod runtime;
pub mod transport;
pub mod util;

pub use client::{ConnectionState, MqttClient, MqttEventHandler, MqttOptions, Will};
pub use error::{ConnectReasonCode, MqttError, ProtocolError};
pub use packet::QoS;
pub use receiver::{Frame, FrameReceiver};
pub use runtime::MqttRuntime;
pub use transport::{MqttTimers, MqttTransport, TimerKind};
