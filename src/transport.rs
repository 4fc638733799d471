//! # Mail Transport Abstraction
//!
//! This module defines the `MailTransport` trait, the capability the mailer
//! drives to talk to the broker. The mailer owns a transport instead of being
//! one, so the connection mechanics (sockets, TLS, packet codec) stay
//! swappable and test doubles can stand in for a real broker.
//!
//! Every method must return promptly. `connect` may wait for the broker's
//! acknowledgement, but only for a bounded time.

/// The broker connection used by a [`Mailer`](crate::Mailer).
pub trait MailTransport {
    /// The error type returned by the transport. Its `Debug` output is what the
    /// mailer logs as the failure code.
    type Error: core::fmt::Debug;

    /// Sets the broker to use for subsequent connection attempts.
    fn set_server(&mut self, host: &str, port: u16);

    /// Opens a session with the broker under `client_id`.
    fn connect(&mut self, client_id: &str) -> Result<(), Self::Error>;

    /// Returns whether the session is currently established.
    fn is_connected(&self) -> bool;

    /// Services inbound traffic and keepalive. Must not block.
    fn poll(&mut self) -> Result<(), Self::Error>;

    /// Publishes `payload` to `topic` at most once.
    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), Self::Error>;

    /// Ends the session, if any.
    fn disconnect(&mut self) {}
}

impl<T: MailTransport + ?Sized> MailTransport for &mut T {
    type Error = T::Error;

    fn set_server(&mut self, host: &str, port: u16) {
        (**self).set_server(host, port)
    }

    fn connect(&mut self, client_id: &str) -> Result<(), Self::Error> {
        (**self).connect(client_id)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn poll(&mut self) -> Result<(), Self::Error> {
        (**self).poll()
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), Self::Error> {
        (**self).publish(topic, payload, retain)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }
}
