//! # Send Mail over MQTT from Embedded Systems
//!
//! `mqtt-mailer` is a `no_std`, `no_alloc` reliability layer for devices that
//! need to send the occasional email. The device publishes a small message to
//! an MQTT broker, and a relaying program on another machine turns it into mail.
//!
//! ## Core Features
//!
//! - **Cooperative:** [`Mailer::step`] does a bounded amount of work and never
//!   sleeps, so it fits into a superloop next to other tasks.
//! - **Self-healing connection:** failed connects are retried at a fixed
//!   interval, and a lost connection is re-established automatically.
//! - **One request in flight:** the latest [`Mailer::submit_request`] wins; an
//!   unsent earlier request is replaced.
//! - **Transport agnostic:** the [`MailTransport`] trait abstracts the broker
//!   connection. [`StreamTransport`] implements it for MQTT v3.1.1 over any
//!   `embedded-io` byte stream.
//! - **Injected time and logging:** a [`Clock`] and a [`Diagnostics`] sink are
//!   supplied by the caller, so the state machine runs unchanged on a host.
//!
//! ## Wire Format
//!
//! Each request is published, non-retained, as
//! `"<to>","<subject>","<body>"`. Quote characters inside fields are not
//! escaped; see [`request`].
//!
//! ## Usage
//!
//! ```ignore
//! use mqtt_mailer::{Mailer, MailerConfig, StreamTransport, SystemClock};
//!
//! let transport = StreamTransport::new(TcpConnector::new(stack), SystemClock);
//! let config = MailerConfig::new("192.168.1.10", 1883, "mail/out", "garage-door")?;
//! let mut mailer = Mailer::new(transport, config);
//!
//! loop {
//!     if door_opened() {
//!         mailer.submit_request("me@example.com", "Garage", "The door is open")?;
//!     }
//!     mailer.step();
//! }
//! ```

#![cfg_attr(not(test), no_std)]
pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod mailer;
pub mod packet;
pub mod request;
pub mod stream;
pub mod transport;
pub mod util;

#[cfg(test)]
mod testing;

// Re-export key types for easier access at the crate root.
pub use clock::{Clock, SystemClock};
pub use config::MailerConfig;
pub use diagnostics::{Diagnostics, LogDiagnostics, MailerEvent, NoDiagnostics};
pub use error::{MailerError, StreamError};
pub use mailer::{MachineState, Mailer};
pub use request::MailRequest;
pub use stream::{Connector, StreamTransport};
pub use transport::MailTransport;
