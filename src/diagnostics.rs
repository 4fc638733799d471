//! # Diagnostics
//!
//! The mailer reports what it does through the [`Diagnostics`] trait instead of
//! writing to a global output. Events are observational only; nothing in the
//! state machine depends on how (or whether) they are recorded.
//!
//! [`LogDiagnostics`] renders each event as a single line prefixed with the
//! millisecond timestamp at which it happened, and forwards it to whichever
//! backend feature is enabled:
//!
//! - `log`: the `log` facade (`info!` / `warn!`)
//! - `defmt`: `defmt::info!` / `defmt::warn!`
//! - `esp32-log`: `esp_println::println!`

use core::fmt;

use embassy_time::{Duration, Instant};

use crate::error::MailerError;

/// Something the mailer did or observed.
#[derive(Clone, Copy)]
pub enum MailerEvent<'a> {
    /// The transport accepted the connection.
    Connected,
    /// The transport refused or failed to connect; the next attempt follows after `retry_in`.
    ConnectFailed {
        error: &'a dyn fmt::Debug,
        retry_in: Duration,
    },
    /// The transport reported the connection as gone.
    ConnectionLost,
    /// Servicing inbound traffic failed.
    PollFailed { error: &'a dyn fmt::Debug },
    /// A pending request is being published.
    Publish {
        topic: &'a str,
        to: &'a str,
        subject: &'a str,
        body: &'a str,
    },
    /// The transport rejected the publish. The request is not retried.
    PublishFailed { error: &'a dyn fmt::Debug },
    /// The pending request could not be encoded and was discarded.
    RequestDropped { error: MailerError },
}

/// How noteworthy an event is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
}

impl MailerEvent<'_> {
    pub fn severity(&self) -> Severity {
        match self {
            MailerEvent::Connected | MailerEvent::Publish { .. } => Severity::Info,
            _ => Severity::Warning,
        }
    }
}

impl fmt::Display for MailerEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailerEvent::Connected => f.write_str("Connected to MQTT broker"),
            MailerEvent::ConnectFailed { error, retry_in } => write!(
                f,
                "Failed to connect to MQTT broker, rc={:?}. Retry in {} seconds.",
                error,
                retry_in.as_secs()
            ),
            MailerEvent::ConnectionLost => f.write_str("Lost connection to MQTT broker"),
            MailerEvent::PollFailed { error } => write!(f, "MQTT poll failed: {error:?}"),
            MailerEvent::Publish {
                topic,
                to,
                subject,
                body,
            } => write!(f, "MQTT publish [{topic}]: \"{to}\",\"{subject}\",\"{body}\""),
            MailerEvent::PublishFailed { error } => write!(f, "MQTT publish failed: {error:?}"),
            MailerEvent::RequestDropped { error } => write!(f, "Dropped mail request: {error}"),
        }
    }
}

impl fmt::Debug for MailerEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A sink for mailer events.
pub trait Diagnostics {
    /// Records `event`, which happened at `at`.
    fn record(&mut self, at: Instant, event: &MailerEvent<'_>);
}

impl<D: Diagnostics + ?Sized> Diagnostics for &mut D {
    fn record(&mut self, at: Instant, event: &MailerEvent<'_>) {
        (**self).record(at, event)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDiagnostics;

impl Diagnostics for NoDiagnostics {
    fn record(&mut self, _at: Instant, _event: &MailerEvent<'_>) {}
}

/// Writes timestamped lines to the enabled logging backend.
///
/// With no backend feature enabled this behaves like [`NoDiagnostics`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn record(&mut self, at: Instant, event: &MailerEvent<'_>) {
        let ms = at.as_millis();

        #[cfg(feature = "log")]
        match event.severity() {
            Severity::Info => log::info!("{} {}", ms, event),
            Severity::Warning => log::warn!("{} {}", ms, event),
        }

        #[cfg(feature = "defmt")]
        match event.severity() {
            Severity::Info => defmt::info!("{=u64} {}", ms, defmt::Display2Format(event)),
            Severity::Warning => defmt::warn!("{=u64} {}", ms, defmt::Display2Format(event)),
        }

        #[cfg(feature = "esp32-log")]
        esp_println::println!("{} {}", ms, event);

        let _ = (ms, event);
    }
}
