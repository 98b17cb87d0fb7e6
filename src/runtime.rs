//! # Async Runtime Glue
//!
//! Drives the engine from an async executor over an established
//! [`embedded_io_async`] byte stream. The engine itself never awaits; this
//! module translates between its request/completion interfaces and the
//! async world:
//!
//! - [`QueuedTransport`] and [`TimerMailbox`] are passive mailboxes the
//!   engine writes its requests into.
//! - [`MqttRuntime::run`] applies those requests between engine calls:
//!   pending frames are written to the socket, timer changes become
//!   deadlines, and the socket read races the nearest deadline.

use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Instant, Timer};
use embedded_io_async::{Read, Write};
use heapless::Deque;

use crate::client::{MqttClient, MqttEventHandler};
use crate::error::MqttError;
use crate::packet::RawPacket;
use crate::transport::{MqttTimers, MqttTransport, TimerKind};

/// Frames the engine may hand over between two drain points: one queued
/// dispatch plus the direct-send frames that bypass the queue.
const PENDING_SENDS: usize = 4;

/// Transport mailbox. Records the engine's requests; the runtime loop acts
/// on them and feeds completions back.
pub struct QueuedTransport<const N: usize> {
    pending: Deque<RawPacket<N>, PENDING_SENDS>,
    disconnect_requested: bool,
}

impl<const N: usize> QueuedTransport<N> {
    pub fn new() -> Self {
        Self {
            pending: Deque::new(),
            disconnect_requested: false,
        }
    }
}

impl<const N: usize> Default for QueuedTransport<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> MqttTransport<N> for QueuedTransport<N> {
    // The socket is already established by the host, so there is nothing
    // to resolve or open here.
    fn connect(&mut self, _host: &str, _port: u16) -> bool {
        true
    }

    fn send(&mut self, frame: RawPacket<N>) {
        if self.pending.push_back(frame).is_err() {
            debug!("runtime: send mailbox full, frame dropped");
        }
    }

    fn disconnect(&mut self) {
        self.disconnect_requested = true;
    }

    fn release(&mut self) {
        self.pending.clear();
        self.disconnect_requested = false;
    }
}

/// Timer mailbox. Stores the latest arm/disarm request per timer until the
/// runtime loop turns it into a deadline.
#[derive(Default)]
pub struct TimerMailbox {
    changes: [Option<Option<u32>>; 2],
}

fn slot(kind: TimerKind) -> usize {
    match kind {
        TimerKind::Timeout => 0,
        TimerKind::KeepAlive => 1,
    }
}

impl MqttTimers for TimerMailbox {
    fn arm(&mut self, kind: TimerKind, after_ms: u32) {
        self.changes[slot(kind)] = Some(Some(after_ms));
    }

    fn disarm(&mut self, kind: TimerKind) {
        self.changes[slot(kind)] = Some(None);
    }
}

/// Owns an engine wired to the mailboxes plus the socket, and runs the
/// connection to completion.
pub struct MqttRuntime<'a, S, H, const N: usize, const Q: usize>
where
    S: Read + Write,
    H: MqttEventHandler,
{
    client: MqttClient<'a, QueuedTransport<N>, TimerMailbox, H, N, Q>,
    socket: S,
    deadlines: [Option<Instant>; 2],
}

impl<'a, S, H, const N: usize, const Q: usize> MqttRuntime<'a, S, H, N, Q>
where
    S: Read + Write,
    H: MqttEventHandler,
{
    /// Wraps an established socket. The options' host and port are carried
    /// for the record only; connecting the socket is the host's job.
    pub fn new(options: crate::client::MqttOptions<'a>, socket: S, handler: H) -> Self {
        Self {
            client: MqttClient::new(
                options,
                QueuedTransport::new(),
                TimerMailbox::default(),
                handler,
            ),
            socket,
            deadlines: [None; 2],
        }
    }

    pub fn client(
        &mut self,
    ) -> &mut MqttClient<'a, QueuedTransport<N>, TimerMailbox, H, N, Q> {
        &mut self.client
    }

    /// Runs one connection from CONNECT to teardown. Returns once the
    /// connection is closed, after the handler's terminal `on_error`; the
    /// host decides whether to reconnect.
    pub async fn run(&mut self) -> Result<(), MqttError> {
        if !self.client.connect() {
            return Err(MqttError::WrongState);
        }
        self.client.on_transport_connected();

        let mut rx = [0u8; N];
        loop {
            self.apply_timer_changes();
            if self.flush_sends().await.is_err() {
                self.client.on_disconnected();
                return Ok(());
            }
            if self.client.transport.disconnect_requested {
                self.client.on_disconnected();
                return Ok(());
            }

            match self.nearest_deadline() {
                Some((kind, at)) => {
                    match select(self.socket.read(&mut rx), Timer::at(at)).await {
                        Either::First(Ok(0)) | Either::First(Err(_)) => {
                            self.client.on_disconnected();
                            return Ok(());
                        }
                        Either::First(Ok(n)) => self.client.on_received(&rx[..n]),
                        Either::Second(()) => {
                            self.deadlines[slot(kind)] = None;
                            match kind {
                                TimerKind::Timeout => self.client.on_receive_timeout(),
                                TimerKind::KeepAlive => self.client.on_keepalive(),
                            }
                        }
                    }
                }
                None => match self.socket.read(&mut rx).await {
                    Ok(0) | Err(_) => {
                        self.client.on_disconnected();
                        return Ok(());
                    }
                    Ok(n) => self.client.on_received(&rx[..n]),
                },
            }
        }
    }

    fn apply_timer_changes(&mut self) {
        for kind in [TimerKind::Timeout, TimerKind::KeepAlive] {
            let index = slot(kind);
            if let Some(change) = self.client.timers.changes[index].take() {
                self.deadlines[index] =
                    change.map(|ms| Instant::now() + Duration::from_millis(u64::from(ms)));
            }
        }
    }

    fn nearest_deadline(&self) -> Option<(TimerKind, Instant)> {
        let mut nearest: Option<(TimerKind, Instant)> = None;
        for kind in [TimerKind::Timeout, TimerKind::KeepAlive] {
            if let Some(at) = self.deadlines[slot(kind)] {
                if nearest.is_none_or(|(_, best)| at < best) {
                    nearest = Some((kind, at));
                }
            }
        }
        nearest
    }

    /// Writes out every frame the engine has handed over, reporting each
    /// completion so the engine can dispatch the next one.
    async fn flush_sends(&mut self) -> Result<(), S::Error> {
        while let Some(frame) = self.client.transport.pending.pop_front() {
            self.socket.write_all(&frame).await?;
            self.socket.flush().await?;
            self.client.on_send_complete();
            self.apply_timer_changes();
        }
        Ok(())
    }
}
