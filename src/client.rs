//! # Connection State Machine
//!
//! The client owns the single logical MQTT connection and orchestrates every
//! other component: it feeds transport chunks to the frame receiver,
//! validates decoded frames against the current state, encodes replies,
//! drives the send queue, and supervises the two keepalive timers.
//!
//! All state lives in one owned client value; every entry point is a plain
//! method call. The host guarantees the callbacks that reach those methods
//! are non-reentrant with respect to each other, so no locking exists here.
//! A port to a multi-threaded host must serialize all access to the client
//! behind one mutual-exclusion boundary.
//!
//! Host notifications go through [`MqttEventHandler`]. Handler methods must
//! not call back into the client (the message data borrows the receive
//! buffer); set a flag and reply from the host loop instead.

use crate::error::{ConnectReasonCode, MqttError, ProtocolError};
use crate::packet::{
    self, Ack, Connect, PingReq, Publish, QoS, RawPacket, Subscribe, Unsubscribe,
};
use crate::queue::SendQueue;
use crate::receiver::{Frame, FrameReceiver};
use crate::transport::{MqttTimers, MqttTransport, TimerKind};

/// Budget for the whole connect sequence, from the transport reporting the
/// socket open to CONNACK arriving.
const CONNECT_TIMEOUT_MS: u32 = 10_000;

/// Immutable per-connection configuration, supplied once before `connect()`.
#[derive(Debug, Clone)]
pub struct MqttOptions<'a> {
    /// Broker hostname, resolved by the transport.
    pub host: &'a str,
    pub port: u16,
    /// Keepalive interval in seconds. Pings go out at this interval; the
    /// peer is declared dead after 1.5 times it without inbound traffic.
    pub keepalive: u16,
    /// Outbound queue depth at which non-forced enqueues are rejected.
    pub q_max: usize,
    /// Client identifier, must be unique per broker.
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub will: Option<Will<'a>>,
}

/// Last-will testament announced in the CONNECT frame.
#[derive(Debug, Clone)]
pub struct Will<'a> {
    pub topic: &'a str,
    pub message: &'a str,
    pub qos: QoS,
    pub retain: bool,
}

/// Lifecycle of the single connection. The sole mutable control point:
/// every other component's behavior is gated by the current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
    /// A frame has been dispatched to the transport and its send completion
    /// is still pending.
    Sending,
    Closing,
}

/// Host callbacks for the terminal events the engine reports.
pub trait MqttEventHandler {
    /// The connect sequence completed: CONNACK accepted, connection usable.
    fn on_open(&mut self);

    /// The connection is fully closed and released. Fires for every
    /// teardown, including host-requested ones; reconnecting is the host's
    /// decision.
    fn on_error(&mut self);

    /// An application message arrived on a subscribed topic.
    fn on_publish(&mut self, topic: &str, message: &str, qos: QoS, retain: bool);
}

/// 16-bit packet id allocator for QoS>0 publishes and (un)subscriptions.
/// Monotonically increasing; zero is reserved as invalid and skipped on
/// wraparound.
#[derive(Debug, Default)]
struct PacketIdCounter {
    last: u16,
}

impl PacketIdCounter {
    fn next(&mut self) -> u16 {
        self.last = self.last.wrapping_add(1);
        if self.last == 0 {
            self.last = 1;
        }
        self.last
    }
}

/// The MQTT client engine.
///
/// Generic over the transport `T`, the timer service `S`, the host event
/// handler `H`, the outbound frame buffer size `N` and the physical queue
/// capacity `Q` (which must exceed the configured `q_max` to leave room for
/// forced acknowledgements).
pub struct MqttClient<'a, T, S, H, const N: usize, const Q: usize>
where
    T: MqttTransport<N>,
    S: MqttTimers,
    H: MqttEventHandler,
{
    options: MqttOptions<'a>,
    state: ConnectionState,
    receiver: FrameReceiver,
    queue: SendQueue<N, Q>,
    ids: PacketIdCounter,
    pub(crate) transport: T,
    pub(crate) timers: S,
    pub(crate) handler: H,
}

impl<'a, T, S, H, const N: usize, const Q: usize> MqttClient<'a, T, S, H, N, Q>
where
    T: MqttTransport<N>,
    S: MqttTimers,
    H: MqttEventHandler,
{
    pub fn new(options: MqttOptions<'a>, transport: T, timers: S, handler: H) -> Self {
        // Forced acknowledgements bypass the depth limit but still need
        // physical room, so the capacity must leave headroom above it.
        debug_assert!(
            Q > options.q_max,
            "queue capacity must exceed the configured depth limit"
        );
        let q_max = options.q_max;
        Self {
            options,
            state: ConnectionState::Closed,
            receiver: FrameReceiver::new(),
            queue: SendQueue::new(q_max),
            ids: PacketIdCounter::default(),
            transport,
            timers,
            handler,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn options(&self) -> &MqttOptions<'a> {
        &self.options
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    // --- Client API -------------------------------------------------------

    /// Starts a connection attempt. Fails if the connection is not `Closed`
    /// or the transport rejects the request outright. The CONNECT frame is
    /// sent once the transport reports the socket open.
    pub fn connect(&mut self) -> bool {
        if self.state != ConnectionState::Closed {
            debug!("connect: not closed");
            return false;
        }
        self.receiver.reset();
        self.transport.connect(self.options.host, self.options.port)
    }

    /// Queues an application message. Fails with no side effect unless the
    /// connection is `Open` or `Sending`, or when the queue is at its depth
    /// limit. A fresh packet id is allocated for QoS above 0.
    pub fn publish(&mut self, topic: &str, message: &str, qos: QoS, retain: bool) -> bool {
        if !self.is_usable() {
            return false;
        }
        let packet_id = (qos != QoS::AtMostOnce).then(|| self.ids.next());
        let publish = Publish {
            topic,
            message,
            qos,
            retain,
            dup: false,
            packet_id,
        };
        match publish.encode::<N>() {
            Ok(frame) => self.enqueue(frame, false),
            Err(_) => false,
        }
    }

    /// Queues a subscription request for one topic filter.
    pub fn subscribe(&mut self, topic: &str, qos: QoS) -> bool {
        if !self.is_usable() {
            return false;
        }
        let subscribe = Subscribe {
            packet_id: self.ids.next(),
            topic,
            qos,
        };
        match subscribe.encode::<N>() {
            Ok(frame) => self.enqueue(frame, false),
            Err(_) => false,
        }
    }

    /// Queues an unsubscription request for one topic filter.
    pub fn unsubscribe(&mut self, topic: &str) -> bool {
        if !self.is_usable() {
            return false;
        }
        let unsubscribe = Unsubscribe {
            packet_id: self.ids.next(),
            topic,
        };
        match unsubscribe.encode::<N>() {
            Ok(frame) => self.enqueue(frame, false),
            Err(_) => false,
        }
    }

    /// Requests an orderly close. The terminal `on_error` fires once the
    /// transport confirms the teardown.
    pub fn disconnect(&mut self) -> bool {
        if !self.is_usable() {
            return false;
        }
        debug!("close by request");
        self.close();
        true
    }

    // --- Transport events -------------------------------------------------

    /// The transport finished connecting: send CONNECT and start the
    /// connect-timeout budget.
    pub fn on_transport_connected(&mut self) {
        debug!("connected, sending CONNECT");
        self.state = ConnectionState::Connecting;
        match (Connect {
            options: &self.options,
        })
        .encode::<N>()
        {
            Ok(frame) => {
                // Sent directly: the queue only operates on open
                // connections.
                self.transport.send(frame);
                self.timers.arm(TimerKind::Timeout, CONNECT_TIMEOUT_MS);
            }
            Err(_) => self.close(),
        }
    }

    /// The transport finished the outstanding send; dispatch the next
    /// queued frame, if any.
    pub fn on_send_complete(&mut self) {
        if self.state == ConnectionState::Sending {
            self.state = ConnectionState::Open;
            self.dispatch_next();
        }
    }

    /// A chunk of bytes arrived from the transport. Reassembles and handles
    /// as many frames as the chunk completes; any decode or validation
    /// failure tears the connection down.
    pub fn on_received(&mut self, chunk: &[u8]) {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open | ConnectionState::Sending
        ) {
            debug!("recv: {} bytes ignored, connection not active", chunk.len());
            return;
        }

        let mut input = chunk;
        loop {
            match self.receiver.advance(&mut input) {
                Ok(Some(frame)) => {
                    if let Err(_err) = self.handle_frame(&frame) {
                        debug!("close by recv error");
                        self.close();
                        return;
                    }
                }
                Ok(None) => return,
                Err(_err) => {
                    debug!("close by recv error");
                    self.close();
                    return;
                }
            }
        }
    }

    /// The transport confirmed the connection is gone (orderly or not).
    /// Releases everything and reports the terminal event.
    pub fn on_disconnected(&mut self) {
        debug!("disconnected");
        self.state = ConnectionState::Closed;
        self.receiver.reset();
        self.queue.clear();
        self.timers.disarm(TimerKind::Timeout);
        self.timers.disarm(TimerKind::KeepAlive);
        self.transport.release();
        self.handler.on_error();
    }

    /// The transport failed to establish or re-establish the connection.
    pub fn on_connect_failed(&mut self) {
        self.on_disconnected();
    }

    // --- Timer events -----------------------------------------------------

    /// The idle-receive deadline expired: the peer is dead.
    pub fn on_receive_timeout(&mut self) {
        debug!("close by receive timeout");
        self.close();
    }

    /// The ping interval elapsed. PINGREQ bypasses the queue so that a
    /// backlog of data cannot starve the keepalive, and the timer re-arms
    /// itself.
    pub fn on_keepalive(&mut self) {
        if let Ok(frame) = PingReq.encode::<N>() {
            debug!("sending PINGREQ");
            self.transport.send(frame);
        }
        self.timers
            .arm(TimerKind::KeepAlive, self.ping_interval_ms());
    }

    // --- Internals --------------------------------------------------------

    fn is_usable(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Open | ConnectionState::Sending
        )
    }

    fn idle_timeout_ms(&self) -> u32 {
        u32::from(self.options.keepalive) * 1500
    }

    fn ping_interval_ms(&self) -> u32 {
        u32::from(self.options.keepalive) * 1000
    }

    /// Validates one reassembled frame against the current state and acts
    /// on it. Any error return is fatal for the connection.
    fn handle_frame(&mut self, frame: &Frame) -> Result<(), MqttError> {
        // Every successfully parsed inbound frame counts as peer activity,
        // regardless of type.
        self.timers.arm(TimerKind::Timeout, self.idle_timeout_ms());

        match frame.packet_type() {
            packet::CONNACK => self.handle_connack(frame),
            packet::PUBLISH => self.handle_publish(frame),
            packet::PUBREC | packet::PUBREL => self.handle_qos2_step(frame),
            packet::PUBACK
            | packet::PUBCOMP
            | packet::SUBACK
            | packet::UNSUBACK
            | packet::PINGRESP => Ok(()),
            // The receiver only lets the nine inbound types through, so
            // this is unreachable in practice; kept as a second gate.
            _ => Err(ProtocolError::UnexpectedPacket.into()),
        }
    }

    fn handle_connack(&mut self, frame: &Frame) -> Result<(), MqttError> {
        if self.state != ConnectionState::Connecting {
            return Err(ProtocolError::UnexpectedPacket.into());
        }
        if frame.payload.len() != 2 {
            return Err(ProtocolError::MalformedPacket.into());
        }
        let return_code = frame.payload[1];
        if return_code != 0 {
            debug!("CONNACK refused, code {}", return_code);
            return Err(MqttError::ConnectionRefused(ConnectReasonCode::from(
                return_code,
            )));
        }

        debug!("CONNACK accepted");
        self.state = ConnectionState::Open;
        self.handler.on_open();
        self.timers
            .arm(TimerKind::KeepAlive, self.ping_interval_ms());
        Ok(())
    }

    fn handle_publish(&mut self, frame: &Frame) -> Result<(), MqttError> {
        if !self.is_usable() || frame.payload.len() < 4 {
            return Err(ProtocolError::MalformedPacket.into());
        }
        if frame.type_byte & 0x08 != 0 {
            // Duplicate redelivery: accepted and dropped, no re-delivery to
            // the host and no re-acknowledgement.
            debug!("duplicate publish ignored");
            return Ok(());
        }

        let publish = Publish::decode(frame.type_byte, &frame.payload)?;
        self.handler.on_publish(
            publish.topic,
            publish.message,
            publish.qos,
            publish.retain,
        );

        if let Some(packet_id) = publish.packet_id {
            let packet_type = if publish.qos == QoS::AtLeastOnce {
                packet::PUBACK
            } else {
                packet::PUBREC
            };
            let ack = Ack {
                packet_type,
                packet_id,
            }
            .encode::<N>()?;
            self.enqueue(ack, true);
        }
        Ok(())
    }

    /// PUBREC is answered with PUBREL, PUBREL with PUBCOMP, both echoing
    /// the peer's id. No record of previously seen ids is kept, so a
    /// redelivered handshake step is simply re-acknowledged.
    fn handle_qos2_step(&mut self, frame: &Frame) -> Result<(), MqttError> {
        if frame.payload.len() != 2 {
            return Err(ProtocolError::MalformedPacket.into());
        }
        let packet_id = u16::from_be_bytes([frame.payload[0], frame.payload[1]]);
        let packet_type = if frame.packet_type() == packet::PUBREC {
            packet::PUBREL
        } else {
            packet::PUBCOMP
        };
        let ack = Ack {
            packet_type,
            packet_id,
        }
        .encode::<N>()?;
        self.enqueue(ack, true);
        Ok(())
    }

    /// Appends a frame to the send queue and dispatches immediately when
    /// the connection is idle.
    fn enqueue(&mut self, frame: RawPacket<N>, force: bool) -> bool {
        if !self.queue.enqueue(frame, force) {
            return false;
        }
        self.dispatch_next();
        true
    }

    /// Moves the head of the queue into the transport. A no-op unless the
    /// connection is `Open`: dispatch resumes on send completion, so only
    /// one frame is ever in flight.
    fn dispatch_next(&mut self) {
        if self.state != ConnectionState::Open {
            return;
        }
        if let Some(frame) = self.queue.pop() {
            debug!("sending queued frame ({} bytes)", frame.len());
            self.transport.send(frame);
            self.state = ConnectionState::Sending;
            // Outbound traffic counts as activity for the ping schedule.
            self.timers
                .arm(TimerKind::KeepAlive, self.ping_interval_ms());
        }
    }

    /// The common fatal path: decode errors, protocol violations, timeouts
    /// and explicit disconnects all converge here.
    fn close(&mut self) {
        self.state = ConnectionState::Closing;
        self.receiver.reset();
        self.timers.disarm(TimerKind::Timeout);
        self.timers.disarm(TimerKind::KeepAlive);
        self.transport.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: usize = 256;
    const QUEUE: usize = 16;

    #[derive(Default)]
    struct MockTransport {
        sent: Vec<Vec<u8>>,
        connect_calls: u32,
        disconnect_requested: bool,
        release_requested: bool,
        refuse_connect: bool,
    }

    impl<const N: usize> MqttTransport<N> for MockTransport {
        fn connect(&mut self, host: &str, port: u16) -> bool {
            assert_eq!(host, "broker.local");
            assert_eq!(port, 1883);
            self.connect_calls += 1;
            !self.refuse_connect
        }

        fn send(&mut self, frame: RawPacket<N>) {
            self.sent.push(frame.as_slice().to_vec());
        }

        fn disconnect(&mut self) {
            self.disconnect_requested = true;
        }

        fn release(&mut self) {
            self.release_requested = true;
        }
    }

    #[derive(Default)]
    struct MockTimers {
        armed: [Option<u32>; 2],
    }

    impl MockTimers {
        fn slot(kind: TimerKind) -> usize {
            match kind {
                TimerKind::Timeout => 0,
                TimerKind::KeepAlive => 1,
            }
        }

        fn armed_for(&self, kind: TimerKind) -> Option<u32> {
            self.armed[Self::slot(kind)]
        }
    }

    impl MqttTimers for MockTimers {
        fn arm(&mut self, kind: TimerKind, after_ms: u32) {
            self.armed[Self::slot(kind)] = Some(after_ms);
        }

        fn disarm(&mut self, kind: TimerKind) {
            self.armed[Self::slot(kind)] = None;
        }
    }

    #[derive(Default)]
    struct MockHandler {
        opens: u32,
        errors: u32,
        publishes: Vec<(String, String, QoS, bool)>,
    }

    impl MqttEventHandler for MockHandler {
        fn on_open(&mut self) {
            self.opens += 1;
        }

        fn on_error(&mut self) {
            self.errors += 1;
        }

        fn on_publish(&mut self, topic: &str, message: &str, qos: QoS, retain: bool) {
            self.publishes
                .push((topic.into(), message.into(), qos, retain));
        }
    }

    type TestClient = MqttClient<'static, MockTransport, MockTimers, MockHandler, FRAME, QUEUE>;

    fn client_with(q_max: usize) -> TestClient {
        let options = MqttOptions {
            host: "broker.local",
            port: 1883,
            keepalive: 60,
            q_max,
            client_id: "dev1",
            username: None,
            password: None,
            will: None,
        };
        MqttClient::new(
            options,
            MockTransport::default(),
            MockTimers::default(),
            MockHandler::default(),
        )
    }

    const CONNACK_OK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

    fn opened(q_max: usize) -> TestClient {
        let mut client = client_with(q_max);
        assert!(client.connect());
        client.on_transport_connected();
        client.on_received(&CONNACK_OK);
        assert_eq!(client.state(), ConnectionState::Open);
        client
    }

    #[test]
    #[should_panic(expected = "queue capacity must exceed")]
    fn queue_capacity_must_exceed_depth_limit() {
        let _ = client_with(QUEUE);
    }

    #[test]
    fn connect_sequence_opens_exactly_once() {
        let mut client = client_with(4);
        assert!(client.connect());
        assert_eq!(client.transport.connect_calls, 1);

        client.on_transport_connected();
        assert_eq!(client.state(), ConnectionState::Connecting);
        // CONNECT goes straight to the transport, not through the queue.
        assert_eq!(client.transport.sent.len(), 1);
        assert_eq!(client.transport.sent[0][0], 0x10);
        assert_eq!(client.timers.armed_for(TimerKind::Timeout), Some(10_000));

        client.on_received(&CONNACK_OK);
        assert_eq!(client.state(), ConnectionState::Open);
        assert_eq!(client.handler.opens, 1);
        // Ping interval armed, idle timeout re-armed at 1.5 x keepalive.
        assert_eq!(client.timers.armed_for(TimerKind::KeepAlive), Some(60_000));
        assert_eq!(client.timers.armed_for(TimerKind::Timeout), Some(90_000));
    }

    #[test]
    fn connect_rejected_unless_closed() {
        let mut client = opened(4);
        assert!(!client.connect());
        assert_eq!(client.transport.connect_calls, 1);
    }

    #[test]
    fn connect_propagates_transport_refusal() {
        let mut client = client_with(4);
        client.transport.refuse_connect = true;
        assert!(!client.connect());
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[test]
    fn connack_refusal_closes_without_open() {
        let mut client = client_with(4);
        client.connect();
        client.on_transport_connected();
        client.on_received(&[0x20, 0x02, 0x00, 0x05]);

        assert_eq!(client.state(), ConnectionState::Closing);
        assert!(client.transport.disconnect_requested);
        assert_eq!(client.handler.opens, 0);
        assert_eq!(client.timers.armed_for(TimerKind::Timeout), None);
        assert_eq!(client.timers.armed_for(TimerKind::KeepAlive), None);
    }

    #[test]
    fn connack_outside_connecting_is_fatal() {
        let mut client = opened(4);
        client.on_received(&CONNACK_OK);
        assert_eq!(client.state(), ConnectionState::Closing);
        assert_eq!(client.handler.opens, 1);
    }

    #[test]
    fn bytes_while_closed_are_ignored() {
        let mut client = client_with(4);
        client.on_received(&CONNACK_OK);
        assert_eq!(client.state(), ConnectionState::Closed);
        assert_eq!(client.handler.opens, 0);
        assert_eq!(client.handler.publishes.len(), 0);
    }

    #[test]
    fn publish_qos0_dispatches_immediately() {
        let mut client = opened(4);
        assert!(client.publish("t/1", "hi", QoS::AtMostOnce, false));

        assert_eq!(client.state(), ConnectionState::Sending);
        assert_eq!(client.transport.sent.len(), 2);
        assert_eq!(
            client.transport.sent[1],
            [0x30, 0x07, 0x00, 0x03, b't', b'/', b'1', b'h', b'i']
        );
        // Dispatch restarts the ping schedule.
        assert_eq!(client.timers.armed_for(TimerKind::KeepAlive), Some(60_000));
    }

    #[test]
    fn publish_rejected_when_not_open() {
        let mut client = client_with(4);
        assert!(!client.publish("t", "m", QoS::AtMostOnce, false));

        client.connect();
        client.on_transport_connected();
        assert!(!client.publish("t", "m", QoS::AtMostOnce, false));
        assert_eq!(client.transport.sent.len(), 1); // CONNECT only
    }

    #[test]
    fn publish_allowed_while_sending() {
        let mut client = opened(4);
        client.publish("a", "1", QoS::AtMostOnce, false);
        assert_eq!(client.state(), ConnectionState::Sending);

        // Queued, not dispatched, while a send is outstanding.
        assert!(client.publish("b", "2", QoS::AtMostOnce, false));
        assert_eq!(client.transport.sent.len(), 2);

        client.on_send_complete();
        assert_eq!(client.transport.sent.len(), 3);
        assert_eq!(client.state(), ConnectionState::Sending);
    }

    #[test]
    fn queue_backpressure_and_forced_ack() {
        let mut client = opened(1);
        client.publish("a", "1", QoS::AtMostOnce, false); // in flight
        assert!(client.publish("b", "2", QoS::AtMostOnce, false)); // queued
        assert!(!client.publish("c", "3", QoS::AtMostOnce, false)); // over limit

        // A forced PUBACK still gets in: inbound QoS 1 publish while the
        // queue is at its limit.
        client.on_received(&[0x32, 0x07, 0x00, 0x01, b't', 0x00, 0x09, b'm', b'!']);
        assert_eq!(client.handler.publishes.len(), 1);

        client.on_send_complete(); // b goes out
        client.on_send_complete(); // the forced PUBACK goes out
        let puback = client.transport.sent.last().unwrap();
        assert_eq!(puback, &[0x40, 0x02, 0x00, 0x09]);
    }

    #[test]
    fn packet_ids_are_strictly_increasing() {
        let mut client = opened(8);
        client.publish("t", "m", QoS::AtLeastOnce, false);
        client.on_send_complete();
        client.subscribe("t", QoS::AtMostOnce);
        client.on_send_complete();
        client.unsubscribe("t");
        client.on_send_complete();

        // publish: id after the topic; (un)subscribe: id right after the
        // header.
        let sent = &client.transport.sent;
        assert_eq!(&sent[1][5..7], &[0x00, 0x01]);
        assert_eq!(&sent[2][2..4], &[0x00, 0x02]);
        assert_eq!(&sent[3][2..4], &[0x00, 0x03]);
    }

    #[test]
    fn qos0_publish_takes_no_packet_id() {
        let mut client = opened(8);
        client.publish("t", "m", QoS::AtMostOnce, false);
        client.on_send_complete();
        client.publish("t", "m", QoS::AtLeastOnce, false);
        // The QoS 1 publish gets id 1: QoS 0 did not consume one.
        assert_eq!(&client.transport.sent[2][5..7], &[0x00, 0x01]);
    }

    #[test]
    fn packet_id_wraparound_skips_zero() {
        let mut counter = PacketIdCounter { last: u16::MAX - 1 };
        assert_eq!(counter.next(), u16::MAX);
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
    }

    #[test]
    fn inbound_qos1_publish_is_acked() {
        let mut client = opened(4);
        client.on_received(&[0x32, 0x07, 0x00, 0x01, b't', 0x00, 0x2A, b'h', b'i']);

        assert_eq!(
            client.handler.publishes[0],
            ("t".into(), "hi".into(), QoS::AtLeastOnce, false)
        );
        // The PUBACK echoes id 42 and was dispatched immediately.
        assert_eq!(
            client.transport.sent.last().unwrap(),
            &[0x40, 0x02, 0x00, 0x2A]
        );
    }

    #[test]
    fn inbound_qos2_handshake() {
        let mut client = opened(4);
        client.on_received(&[0x34, 0x07, 0x00, 0x01, b't', 0x00, 0x07, b'h', b'i']);
        assert_eq!(client.handler.publishes.len(), 1);
        assert_eq!(
            client.transport.sent.last().unwrap(),
            &[0x50, 0x02, 0x00, 0x07] // PUBREC
        );

        client.on_send_complete();
        client.on_received(&[0x60, 0x02, 0x00, 0x07]); // PUBREL
        client.on_send_complete();
        assert_eq!(
            client.transport.sent.last().unwrap(),
            &[0x70, 0x02, 0x00, 0x07] // PUBCOMP
        );
    }

    #[test]
    fn outbound_qos2_pubrec_is_answered_with_pubrel() {
        let mut client = opened(4);
        client.publish("t", "m", QoS::ExactlyOnce, false);
        client.on_send_complete();

        client.on_received(&[0x50, 0x02, 0x00, 0x01]); // PUBREC for id 1
        client.on_send_complete();
        assert_eq!(
            client.transport.sent.last().unwrap(),
            &[0x60, 0x02, 0x00, 0x01] // PUBREL
        );
    }

    #[test]
    fn duplicate_publish_is_silently_dropped() {
        let mut client = opened(4);
        let sent_before = client.transport.sent.len();
        client.on_received(&[0x3A, 0x07, 0x00, 0x01, b't', 0x00, 0x05, b'h', b'i']);

        assert_eq!(client.handler.publishes.len(), 0);
        assert_eq!(client.transport.sent.len(), sent_before);
        assert_eq!(client.state(), ConnectionState::Open);
        // Still counts as activity.
        assert_eq!(client.timers.armed_for(TimerKind::Timeout), Some(90_000));
    }

    #[test]
    fn retained_qos0_publish_reaches_handler() {
        let mut client = opened(4);
        client.on_received(&[0x31, 0x07, 0x00, 0x03, b't', b'/', b'1', b'h', b'i']);
        assert_eq!(
            client.handler.publishes[0],
            ("t/1".into(), "hi".into(), QoS::AtMostOnce, true)
        );
    }

    #[test]
    fn publish_with_bad_topic_length_is_fatal() {
        let mut client = opened(4);
        client.on_received(&[0x30, 0x04, 0x00, 0x09, b't', b'm']);
        assert_eq!(client.state(), ConnectionState::Closing);
        assert!(client.transport.disconnect_requested);
        assert_eq!(client.handler.publishes.len(), 0);
    }

    #[test]
    fn oversized_frame_is_fatal() {
        let mut client = opened(4);
        client.on_received(&[0x30, 0xFF, 0x02]);
        assert_eq!(client.state(), ConnectionState::Closing);
    }

    #[test]
    fn connack_split_byte_by_byte_still_opens() {
        let mut client = client_with(4);
        client.connect();
        client.on_transport_connected();
        for byte in CONNACK_OK {
            client.on_received(&[byte]);
        }
        assert_eq!(client.state(), ConnectionState::Open);
        assert_eq!(client.handler.opens, 1);
    }

    #[test]
    fn every_inbound_frame_rearms_idle_timeout() {
        let mut client = opened(4);
        client.timers.disarm(TimerKind::Timeout);
        client.on_received(&[0xD0, 0x00]); // PINGRESP
        assert_eq!(client.timers.armed_for(TimerKind::Timeout), Some(90_000));
    }

    #[test]
    fn keepalive_fires_past_queued_data() {
        let mut client = opened(4);
        client.publish("a", "1", QoS::AtMostOnce, false); // in flight
        client.publish("b", "2", QoS::AtMostOnce, false); // queued

        client.on_keepalive();
        // PINGREQ went straight out despite the backlog, and the timer
        // re-armed itself.
        assert_eq!(client.transport.sent.last().unwrap(), &[0xC0, 0x00]);
        assert_eq!(client.timers.armed_for(TimerKind::KeepAlive), Some(60_000));
    }

    #[test]
    fn receive_timeout_tears_down() {
        let mut client = opened(4);
        client.on_receive_timeout();
        assert_eq!(client.state(), ConnectionState::Closing);
        assert!(client.transport.disconnect_requested);
        assert_eq!(client.timers.armed_for(TimerKind::Timeout), None);
        assert_eq!(client.timers.armed_for(TimerKind::KeepAlive), None);
    }

    #[test]
    fn disconnect_confirmation_releases_everything() {
        let mut client = opened(4);
        client.publish("a", "1", QoS::AtMostOnce, false);
        client.publish("b", "2", QoS::AtMostOnce, false); // left queued
        client.disconnect();

        client.on_disconnected();
        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(client.transport.release_requested);
        assert_eq!(client.handler.errors, 1);

        // Fully reusable afterwards.
        assert!(client.connect());
    }

    #[test]
    fn reconnect_error_reports_like_disconnect() {
        let mut client = client_with(4);
        client.connect();
        client.on_connect_failed();
        assert_eq!(client.state(), ConnectionState::Closed);
        assert_eq!(client.handler.errors, 1);
    }

    #[test]
    fn disconnect_rejected_when_closed() {
        let mut client = client_with(4);
        assert!(!client.disconnect());
        assert!(!client.transport.disconnect_requested);
    }
}
