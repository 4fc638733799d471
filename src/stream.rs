//! # MQTT over a Byte Stream
//!
//! [`StreamTransport`] is a ready-made [`MailTransport`] speaking MQTT v3.1.1
//! over any `embedded-io` byte stream: a TCP socket, a TLS session, a UART
//! bridge. Opening that stream is left to a [`Connector`], so network bring-up
//! stays with the application.
//!
//! The transport publishes at QoS 0 only. Inbound traffic is limited to what
//! keeps the session alive: `PINGRESP` clears an outstanding keepalive ping, a
//! broker `PINGREQ` is answered, and anything else is read and discarded.
//!
//! Only [`MailTransport::connect`] waits on the stream: it blocks until the
//! broker's `CONNACK` arrives, so the stream's read timeout bounds it.
//! [`MailTransport::poll`] reads only when the stream reports data ready.

use embassy_time::{Duration, Instant};
use embedded_io::{ErrorType, Read, ReadExactError, ReadReady, Write};
use heapless::String;

use crate::clock::Clock;
use crate::config::MAX_BROKER_LEN;
use crate::error::{ConnectReasonCode, ProtocolError, StreamError};
use crate::packet::{
    self, ConnAck, Connect, DecodePacket, Disconnect, EncodePacket, MqttPacket, PingReq,
    PingResp, Publish,
};
use crate::transport::MailTransport;
use crate::util;

/// Default interval after which an idle session is pinged.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Default size of each of the receive and transmit buffers.
pub const DEFAULT_BUF_SIZE: usize = 1024;

/// Opens the byte stream to a broker.
pub trait Connector {
    type Stream: Read + Write + ReadReady;

    /// Opens a connection to `host:port`.
    fn open(&mut self, host: &str, port: u16) -> Result<Self::Stream, IoError<Self>>;
}

/// The I/O error type of a connector's stream.
pub type IoError<K> = <<K as Connector>::Stream as ErrorType>::Error;

/// An established MQTT session and its buffers.
struct Session<S, const BUF_SIZE: usize> {
    stream: S,
    rx: [u8; BUF_SIZE],
    rx_len: usize,
    tx: [u8; BUF_SIZE],
    last_in: Instant,
    last_out: Instant,
    ping_outstanding: bool,
}

impl<S, const BUF_SIZE: usize> Session<S, BUF_SIZE>
where
    S: Read + Write + ReadReady,
{
    fn new(stream: S, now: Instant) -> Self {
        Self {
            stream,
            rx: [0; BUF_SIZE],
            rx_len: 0,
            tx: [0; BUF_SIZE],
            last_in: now,
            last_out: now,
            ping_outstanding: false,
        }
    }

    fn send(&mut self, packet: &impl EncodePacket, now: Instant) -> Result<(), StreamError<S::Error>> {
        let len = packet.encode(&mut self.tx)?;
        self.stream
            .write_all(&self.tx[..len])
            .map_err(StreamError::Io)?;
        self.stream.flush().map_err(StreamError::Io)?;
        self.last_out = now;
        Ok(())
    }

    fn handshake(
        &mut self,
        client_id: &str,
        keep_alive: Duration,
        now: Instant,
    ) -> Result<(), StreamError<S::Error>> {
        let keep_alive_secs = u16::try_from(keep_alive.as_secs()).unwrap_or(u16::MAX);
        self.send(&Connect::new(client_id, keep_alive_secs, true), now)?;

        let mut ack = [0u8; 4];
        self.stream.read_exact(&mut ack).map_err(|e| match e {
            ReadExactError::UnexpectedEof => StreamError::Protocol(ProtocolError::ConnectionClosed),
            ReadExactError::Other(e) => StreamError::Io(e),
        })?;
        let ack = ConnAck::decode(&ack)?;
        match ConnectReasonCode::from(ack.reason_code) {
            ConnectReasonCode::Success => {
                self.last_in = now;
                Ok(())
            }
            code => Err(StreamError::ConnectionRefused(code)),
        }
    }

    fn service(&mut self, keep_alive: Duration, now: Instant) -> Result<(), StreamError<S::Error>> {
        if self.stream.read_ready().map_err(StreamError::Io)? {
            if self.rx_len == BUF_SIZE {
                return Err(ProtocolError::PayloadTooLarge.into());
            }
            let n = self
                .stream
                .read(&mut self.rx[self.rx_len..])
                .map_err(StreamError::Io)?;
            if n == 0 {
                return Err(ProtocolError::ConnectionClosed.into());
            }
            self.rx_len += n;
            self.last_in = now;
            self.dispatch(now)?;
        }

        if keep_alive.as_ticks() == 0 {
            return Ok(());
        }
        let idle_in = now.saturating_duration_since(self.last_in);
        let idle_out = now.saturating_duration_since(self.last_out);
        if idle_in >= keep_alive || idle_out >= keep_alive {
            if self.ping_outstanding {
                return Err(ProtocolError::KeepAliveTimeout.into());
            }
            self.send(&PingReq, now)?;
            self.ping_outstanding = true;
            self.last_in = now;
        }
        Ok(())
    }

    /// Handles every complete packet in the receive buffer.
    fn dispatch(&mut self, now: Instant) -> Result<(), StreamError<S::Error>> {
        while let Some(len) = util::frame_len(&self.rx[..self.rx_len])? {
            let mut answer_ping = false;
            match packet::decode(&self.rx[..len])? {
                Some(MqttPacket::PingResp) => self.ping_outstanding = false,
                Some(MqttPacket::PingReq) => answer_ping = true,
                Some(MqttPacket::ConnAck(_)) => return Err(ProtocolError::InvalidResponse.into()),
                // No subscriptions are made, so inbound publishes are stray.
                Some(MqttPacket::Publish(_)) | Some(MqttPacket::Other(_)) | None => {}
            }
            self.rx.copy_within(len..self.rx_len, 0);
            self.rx_len -= len;
            if answer_ping {
                self.send(&PingResp, now)?;
            }
        }
        Ok(())
    }
}

/// A [`MailTransport`] that speaks MQTT v3.1.1 over streams opened by `K`.
///
/// # Type Parameters
///
/// - `K`: opens the byte stream to the broker
/// - `C`: the time source used for keepalive
/// - `BUF_SIZE`: size of each packet buffer; bounds the largest publish
pub struct StreamTransport<K, C, const BUF_SIZE: usize = DEFAULT_BUF_SIZE>
where
    K: Connector,
    C: Clock,
{
    connector: K,
    clock: C,
    server: Option<(String<MAX_BROKER_LEN>, u16)>,
    keep_alive: Duration,
    session: Option<Session<K::Stream, BUF_SIZE>>,
}

impl<K, C, const BUF_SIZE: usize> StreamTransport<K, C, BUF_SIZE>
where
    K: Connector,
    C: Clock,
{
    pub fn new(connector: K, clock: C) -> Self {
        Self {
            connector,
            clock,
            server: None,
            keep_alive: DEFAULT_KEEP_ALIVE,
            session: None,
        }
    }

    /// Sets the keepalive interval announced to the broker. Zero disables pings.
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }
}

impl<K, C, const BUF_SIZE: usize> MailTransport for StreamTransport<K, C, BUF_SIZE>
where
    K: Connector,
    C: Clock,
{
    type Error = StreamError<IoError<K>>;

    /// Host names longer than the configured maximum leave no server set, and
    /// the next connect fails with [`StreamError::ServerNotSet`].
    fn set_server(&mut self, host: &str, port: u16) {
        let mut owned = String::new();
        self.server = owned.push_str(host).ok().map(|()| (owned, port));
    }

    fn connect(&mut self, client_id: &str) -> Result<(), Self::Error> {
        self.session = None;
        let (host, port) = self.server.as_ref().ok_or(StreamError::ServerNotSet)?;
        let stream = self.connector.open(host, *port).map_err(StreamError::Io)?;

        let now = self.clock.now();
        let mut session = Session::new(stream, now);
        session.handshake(client_id, self.keep_alive, now)?;
        self.session = Some(session);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    fn poll(&mut self) -> Result<(), Self::Error> {
        let now = self.clock.now();
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let result = session.service(self.keep_alive, now);
        if result.is_err() {
            self.session = None;
        }
        result
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), Self::Error> {
        let now = self.clock.now();
        let session = self.session.as_mut().ok_or(StreamError::NotConnected)?;
        let result = session.send(&Publish::at_most_once(topic, payload, retain), now);
        if let Err(StreamError::Io(_)) = result {
            self.session = None;
        }
        result
    }

    fn disconnect(&mut self) {
        let now = self.clock.now();
        if let Some(mut session) = self.session.take() {
            let _ = session.send(&Disconnect, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeClock;
    use crate::{MachineState, Mailer, MailerConfig, NoDiagnostics};
    use embedded_io::ErrorKind;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Default)]
    struct Wire {
        inbound: VecDeque<u8>,
        outbound: Vec<u8>,
        closed: bool,
        fail_writes: bool,
        opened: Vec<(std::string::String, u16)>,
    }

    #[derive(Clone, Default)]
    struct FakeStream(Rc<RefCell<Wire>>);

    impl ErrorType for FakeStream {
        type Error = ErrorKind;
    }

    impl Read for FakeStream {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
            let mut wire = self.0.borrow_mut();
            let mut n = 0;
            while n < buf.len() {
                let Some(byte) = wire.inbound.pop_front() else {
                    break;
                };
                buf[n] = byte;
                n += 1;
            }
            Ok(n)
        }
    }

    impl ReadReady for FakeStream {
        fn read_ready(&mut self) -> Result<bool, ErrorKind> {
            let wire = self.0.borrow();
            Ok(wire.closed || !wire.inbound.is_empty())
        }
    }

    impl Write for FakeStream {
        fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
            let mut wire = self.0.borrow_mut();
            if wire.fail_writes {
                return Err(ErrorKind::BrokenPipe);
            }
            wire.outbound.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> Result<(), ErrorKind> {
            Ok(())
        }
    }

    struct FakeConnector {
        stream: FakeStream,
        refuse: bool,
    }

    impl Connector for FakeConnector {
        type Stream = FakeStream;

        fn open(&mut self, host: &str, port: u16) -> Result<FakeStream, ErrorKind> {
            if self.refuse {
                return Err(ErrorKind::ConnectionRefused);
            }
            self.stream
                .0
                .borrow_mut()
                .opened
                .push((host.to_string(), port));
            Ok(self.stream.clone())
        }
    }

    const CONNACK_OK: [u8; 4] = [0x20, 0x02, 0x00, 0x00];

    fn transport(clock: &FakeClock) -> (StreamTransport<FakeConnector, &FakeClock, 256>, FakeStream) {
        let stream = FakeStream::default();
        let connector = FakeConnector {
            stream: stream.clone(),
            refuse: false,
        };
        let mut transport = StreamTransport::new(connector, clock);
        transport.set_server("broker.local", 1883);
        (transport, stream)
    }

    fn connected(clock: &FakeClock) -> (StreamTransport<FakeConnector, &FakeClock, 256>, FakeStream) {
        let (mut transport, stream) = transport(clock);
        stream.0.borrow_mut().inbound.extend(CONNACK_OK);
        transport.connect("dev1").unwrap();
        stream.0.borrow_mut().outbound.clear();
        (transport, stream)
    }

    #[test]
    fn connect_requires_a_server() {
        let clock = FakeClock::new();
        let connector = FakeConnector {
            stream: FakeStream::default(),
            refuse: false,
        };
        let mut transport: StreamTransport<_, _, 256> = StreamTransport::new(connector, &clock);
        assert!(matches!(
            transport.connect("dev1"),
            Err(StreamError::ServerNotSet)
        ));
    }

    #[test]
    fn connect_sends_connect_and_accepts_connack() {
        let clock = FakeClock::new();
        let (mut transport, stream) = transport(&clock);
        stream.0.borrow_mut().inbound.extend(CONNACK_OK);

        transport.connect("dev1").unwrap();

        assert!(transport.is_connected());
        let wire = stream.0.borrow();
        assert_eq!(wire.opened, [("broker.local".to_string(), 1883)]);
        assert_eq!(wire.outbound[0], 0x10);
        assert!(wire.outbound.ends_with(b"\x00\x04dev1"));
    }

    #[test]
    fn refused_connack_reports_reason() {
        let clock = FakeClock::new();
        let (mut transport, stream) = transport(&clock);
        stream
            .0
            .borrow_mut()
            .inbound
            .extend([0x20, 0x02, 0x00, 0x05]);

        assert!(matches!(
            transport.connect("dev1"),
            Err(StreamError::ConnectionRefused(
                ConnectReasonCode::NotAuthorized
            ))
        ));
        assert!(!transport.is_connected());
    }

    #[test]
    fn missing_connack_means_closed() {
        let clock = FakeClock::new();
        let (mut transport, _stream) = transport(&clock);
        assert!(matches!(
            transport.connect("dev1"),
            Err(StreamError::Protocol(ProtocolError::ConnectionClosed))
        ));
    }

    #[test]
    fn unreachable_broker_is_an_io_error() {
        let clock = FakeClock::new();
        let (mut transport, _stream) = transport(&clock);
        transport.connector.refuse = true;
        assert!(matches!(
            transport.connect("dev1"),
            Err(StreamError::Io(ErrorKind::ConnectionRefused))
        ));
    }

    #[test]
    fn publish_writes_qos0_packet() {
        let clock = FakeClock::new();
        let (mut transport, stream) = connected(&clock);

        transport.publish("m/o", b"hi", false).unwrap();

        assert_eq!(
            stream.0.borrow().outbound,
            [0x30, 7, 0x00, 0x03, b'm', b'/', b'o', b'h', b'i']
        );
    }

    #[test]
    fn publish_needs_a_session() {
        let clock = FakeClock::new();
        let (mut transport, _stream) = transport(&clock);
        assert!(matches!(
            transport.publish("m/o", b"hi", false),
            Err(StreamError::NotConnected)
        ));
    }

    #[test]
    fn write_failure_drops_the_session() {
        let clock = FakeClock::new();
        let (mut transport, stream) = connected(&clock);
        stream.0.borrow_mut().fail_writes = true;

        assert!(matches!(
            transport.publish("m/o", b"hi", false),
            Err(StreamError::Io(ErrorKind::BrokenPipe))
        ));
        assert!(!transport.is_connected());
    }

    #[test]
    fn idle_session_is_pinged_then_timed_out() {
        let clock = FakeClock::new();
        let (mut transport, stream) = connected(&clock);

        transport.poll().unwrap();
        assert!(stream.0.borrow().outbound.is_empty());

        clock.advance(DEFAULT_KEEP_ALIVE);
        transport.poll().unwrap();
        assert_eq!(stream.0.borrow().outbound, [0xC0, 0x00]);

        clock.advance(DEFAULT_KEEP_ALIVE);
        assert!(matches!(
            transport.poll(),
            Err(StreamError::Protocol(ProtocolError::KeepAliveTimeout))
        ));
        assert!(!transport.is_connected());
    }

    #[test]
    fn pingresp_keeps_the_session_alive() {
        let clock = FakeClock::new();
        let (mut transport, stream) = connected(&clock);

        clock.advance(DEFAULT_KEEP_ALIVE);
        transport.poll().unwrap();
        stream.0.borrow_mut().inbound.extend([0xD0, 0x00]);
        transport.poll().unwrap();

        clock.advance(DEFAULT_KEEP_ALIVE);
        transport.poll().unwrap();
        assert!(transport.is_connected());
        assert_eq!(stream.0.borrow().outbound, [0xC0, 0x00, 0xC0, 0x00]);
    }

    #[test]
    fn broker_ping_is_answered_even_when_split() {
        let clock = FakeClock::new();
        let (mut transport, stream) = connected(&clock);

        stream.0.borrow_mut().inbound.push_back(0xC0);
        transport.poll().unwrap();
        assert!(stream.0.borrow().outbound.is_empty());

        stream.0.borrow_mut().inbound.push_back(0x00);
        transport.poll().unwrap();
        assert_eq!(stream.0.borrow().outbound, [0xD0, 0x00]);
    }

    #[test]
    fn stray_publish_is_discarded() {
        let clock = FakeClock::new();
        let (mut transport, stream) = connected(&clock);

        stream
            .0
            .borrow_mut()
            .inbound
            .extend([0x30, 0x05, 0x00, 0x01, b't', b'h', b'i']);
        transport.poll().unwrap();
        assert!(transport.is_connected());
        assert!(stream.0.borrow().outbound.is_empty());
    }

    #[test]
    fn peer_close_drops_the_session() {
        let clock = FakeClock::new();
        let (mut transport, stream) = connected(&clock);
        stream.0.borrow_mut().closed = true;

        assert!(matches!(
            transport.poll(),
            Err(StreamError::Protocol(ProtocolError::ConnectionClosed))
        ));
        assert!(!transport.is_connected());
    }

    #[test]
    fn disconnect_sends_disconnect() {
        let clock = FakeClock::new();
        let (mut transport, stream) = connected(&clock);

        transport.disconnect();

        assert!(!transport.is_connected());
        assert_eq!(stream.0.borrow().outbound, [0xE0, 0x00]);
    }

    #[test]
    fn mailer_delivers_over_the_stream() {
        let clock = FakeClock::new();
        let (transport, stream) = transport(&clock);
        let config = MailerConfig::new("broker.local", 1883, "mail/out", "dev1").unwrap();
        let mut mailer: Mailer<_, _, _, 128> =
            Mailer::with_parts(transport, &clock, NoDiagnostics, config);

        // First attempt: no CONNACK arrives.
        assert!(!mailer.step());
        assert!(matches!(mailer.state(), MachineState::RetryWait { .. }));

        stream.0.borrow_mut().inbound.extend(CONNACK_OK);
        clock.advance(Duration::from_secs(10));
        mailer.step();
        assert!(mailer.step());

        mailer.submit_request("a@x.com", "Hi", "Hello, world").unwrap();
        stream.0.borrow_mut().outbound.clear();
        mailer.step();
        mailer.step();

        let payload = br#""a@x.com","Hi","Hello, world""#;
        let wire = stream.0.borrow();
        assert_eq!(wire.outbound[0], 0x30);
        assert!(wire.outbound.ends_with(payload));
        assert_eq!(wire.outbound.len(), 2 + 2 + "mail/out".len() + payload.len());
    }
}
