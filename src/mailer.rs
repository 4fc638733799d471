//! # Connection-Publish State Machine
//!
//! [`Mailer`] keeps a broker connection alive and publishes the single pending
//! [`MailRequest`] once the connection is up. It is a cooperative state machine:
//! the application calls [`Mailer::step`] from its main loop, and each call
//! performs at most one transition without blocking.
//!
//! ```text
//! Disconnected --connect ok------> Connected --request pending--> Publishing
//! Disconnected --connect failed--> RetryWait
//! RetryWait    --interval elapsed-> Disconnected
//! Connected    --connection lost--> Disconnected
//! Publishing   --publish issued---> Connected
//! Publishing   --connection lost--> Disconnected (request kept)
//! ```
//!
//! Delivery is best-effort and at most once: a request is dropped from the
//! buffer as soon as its publish is issued, whether or not the transport
//! accepted it.

use embassy_time::Instant;

use crate::clock::{Clock, SystemClock};
use crate::config::MailerConfig;
use crate::diagnostics::{Diagnostics, LogDiagnostics, MailerEvent};
use crate::error::MailerError;
use crate::request::MailRequest;
use crate::transport::MailTransport;

/// Default capacity of the encoded payload.
pub const DEFAULT_PAYLOAD_SIZE: usize = 512;

/// The lifecycle state of a [`Mailer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    /// Not connected; the next step attempts to connect.
    Disconnected,
    /// The last connection attempt, made at `since`, failed.
    RetryWait { since: Instant },
    /// Connected and idle.
    Connected,
    /// Connected with a request that will be published on the next step.
    Publishing,
}

impl MachineState {
    /// Whether this state counts as connected to the broker.
    pub fn is_connected(&self) -> bool {
        matches!(self, MachineState::Connected | MachineState::Publishing)
    }
}

/// Delivers mail requests over a [`MailTransport`], reconnecting as needed.
///
/// # Type Parameters
///
/// - `T`: the broker transport
/// - `C`: the time source used for the retry interval
/// - `D`: where diagnostic events are sent
/// - `PAYLOAD_SIZE`: maximum encoded payload length in bytes. The body may use
///   whatever the recipient, subject and the eight framing bytes leave over.
///
/// # Example
///
/// ```ignore
/// let config = MailerConfig::new("192.168.1.10", 1883, "mail/out", "garage-door")?;
/// let mut mailer = Mailer::new(transport, config);
///
/// mailer.submit_request("me@example.com", "Garage", "The door is open")?;
/// loop {
///     mailer.step();
///     // other cooperative work
/// }
/// ```
pub struct Mailer<
    T,
    C = SystemClock,
    D = LogDiagnostics,
    const PAYLOAD_SIZE: usize = DEFAULT_PAYLOAD_SIZE,
> where
    T: MailTransport,
    C: Clock,
    D: Diagnostics,
{
    transport: T,
    clock: C,
    diagnostics: D,
    config: MailerConfig,
    state: MachineState,
    pending: Option<MailRequest<PAYLOAD_SIZE>>,
}

impl<T: MailTransport> Mailer<T> {
    /// Creates a mailer that reads the `embassy-time` clock and logs through
    /// [`LogDiagnostics`].
    pub fn new(transport: T, config: MailerConfig) -> Self {
        Self::with_parts(transport, SystemClock, LogDiagnostics, config)
    }
}

impl<T, C, D, const PAYLOAD_SIZE: usize> Mailer<T, C, D, PAYLOAD_SIZE>
where
    T: MailTransport,
    C: Clock,
    D: Diagnostics,
{
    /// Creates a mailer from explicit parts and applies `config`.
    pub fn with_parts(mut transport: T, clock: C, diagnostics: D, config: MailerConfig) -> Self {
        transport.set_server(config.broker(), config.port());
        Self {
            transport,
            clock,
            diagnostics,
            config,
            state: MachineState::Disconnected,
            pending: None,
        }
    }

    /// Applies a new configuration.
    ///
    /// Any open session is closed and the next step connects afresh with the
    /// new settings. A pending request survives reconfiguration.
    pub fn initialize(&mut self, config: MailerConfig) {
        if self.transport.is_connected() {
            self.transport.disconnect();
        }
        self.transport.set_server(config.broker(), config.port());
        self.config = config;
        self.state = MachineState::Disconnected;
    }

    /// Changes the publish topic. The connection state is not affected.
    pub fn set_topic(&mut self, topic: &str) -> Result<(), MailerError> {
        self.config.set_topic(topic)
    }

    /// Stores a request to be published once connected.
    ///
    /// A request that has not been published yet is replaced. On error the
    /// previous request, if any, is left in place.
    pub fn submit_request(&mut self, to: &str, subject: &str, body: &str) -> Result<(), MailerError> {
        let request = MailRequest::new(to, subject, body)?;
        if request.encoded_len() > PAYLOAD_SIZE {
            return Err(MailerError::PayloadTooLarge);
        }
        self.pending = Some(request);
        Ok(())
    }

    /// Advances the machine by one transition.
    ///
    /// Returns `true` if the machine is connected to the broker afterwards.
    pub fn step(&mut self) -> bool {
        self.state = match self.state {
            MachineState::Disconnected => self.connect(),
            MachineState::RetryWait { since } => self.wait_for_retry(since),
            MachineState::Connected => self.service_connection(),
            MachineState::Publishing => self.publish_pending(),
        };
        self.state.is_connected()
    }

    fn connect(&mut self) -> MachineState {
        match self.transport.connect(self.config.client_id()) {
            Ok(()) => {
                self.diagnostics
                    .record(self.clock.now(), &MailerEvent::Connected);
                MachineState::Connected
            }
            Err(error) => {
                let now = self.clock.now();
                self.diagnostics.record(
                    now,
                    &MailerEvent::ConnectFailed {
                        error: &error,
                        retry_in: self.config.retry_interval(),
                    },
                );
                MachineState::RetryWait { since: now }
            }
        }
    }

    fn wait_for_retry(&self, since: Instant) -> MachineState {
        let elapsed = self.clock.now().saturating_duration_since(since);
        if elapsed >= self.config.retry_interval() {
            MachineState::Disconnected
        } else {
            MachineState::RetryWait { since }
        }
    }

    fn service_connection(&mut self) -> MachineState {
        if !self.transport.is_connected() {
            self.diagnostics
                .record(self.clock.now(), &MailerEvent::ConnectionLost);
            return MachineState::Disconnected;
        }

        // Don't hand a request to a session that just failed; the next step
        // will notice the loss and the request stays pending.
        if let Err(error) = self.transport.poll() {
            self.diagnostics
                .record(self.clock.now(), &MailerEvent::PollFailed { error: &error });
            return MachineState::Connected;
        }

        if self.pending.is_some() {
            MachineState::Publishing
        } else {
            MachineState::Connected
        }
    }

    fn publish_pending(&mut self) -> MachineState {
        // The session may have dropped since the previous step saw it up.
        if !self.transport.is_connected() {
            self.diagnostics
                .record(self.clock.now(), &MailerEvent::ConnectionLost);
            return MachineState::Disconnected;
        }
        let Some(request) = self.pending.take() else {
            return MachineState::Connected;
        };
        let topic = self.config.topic();
        self.diagnostics.record(
            self.clock.now(),
            &MailerEvent::Publish {
                topic,
                to: request.to(),
                subject: request.subject(),
                body: request.body(),
            },
        );

        match request.to_payload::<PAYLOAD_SIZE>() {
            Ok(payload) => {
                if let Err(error) = self.transport.publish(topic, &payload, false) {
                    self.diagnostics
                        .record(self.clock.now(), &MailerEvent::PublishFailed { error: &error });
                }
            }
            // Only reachable if a request bypassed the length check in `submit_request`.
            Err(error) => {
                self.diagnostics
                    .record(self.clock.now(), &MailerEvent::RequestDropped { error });
            }
        }
        MachineState::Connected
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// The request waiting to be published, if any.
    pub fn pending(&self) -> Option<&MailRequest<PAYLOAD_SIZE>> {
        self.pending.as_ref()
    }

    pub fn config(&self) -> &MailerConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn diagnostics(&self) -> &D {
        &self.diagnostics
    }
}
