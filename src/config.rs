//! Mailer configuration.

use embassy_time::Duration;
use heapless::String;

use crate::error::{Field, MailerError};

/// Maximum length of the broker host name or address.
pub const MAX_BROKER_LEN: usize = 64;

/// Maximum length of a topic string.
pub const MAX_TOPIC_LEN: usize = 128;

/// Longest client identifier every MQTT 3.1.1 broker must accept.
pub const MAX_CLIENT_ID_LEN: usize = 23;

/// The standard unencrypted MQTT port.
pub const DEFAULT_PORT: u16 = 1883;

/// Delay between failed connection attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Connection and publishing settings for a [`Mailer`](crate::Mailer).
///
/// # Example
///
/// ```ignore
/// let config = MailerConfig::new("192.168.1.10", DEFAULT_PORT, "mail/out", "garage-door")?
///     .with_retry_interval(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailerConfig {
    broker: String<MAX_BROKER_LEN>,
    port: u16,
    topic: String<MAX_TOPIC_LEN>,
    client_id: String<MAX_CLIENT_ID_LEN>,
    retry_interval: Duration,
}

impl MailerConfig {
    /// Creates a configuration with the default retry interval.
    pub fn new(broker: &str, port: u16, topic: &str, client_id: &str) -> Result<Self, MailerError> {
        Ok(Self {
            broker: bounded(broker, Field::Broker)?,
            port,
            topic: bounded(topic, Field::Topic)?,
            client_id: bounded(client_id, Field::ClientId)?,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        })
    }

    /// Sets the delay between failed connection attempts.
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn broker(&self) -> &str {
        &self.broker
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Replaces the publish topic. On error the previous topic is kept.
    pub fn set_topic(&mut self, topic: &str) -> Result<(), MailerError> {
        self.topic = bounded(topic, Field::Topic)?;
        Ok(())
    }
}

pub(crate) fn bounded<const N: usize>(value: &str, field: Field) -> Result<String<N>, MailerError> {
    let mut owned = String::new();
    owned
        .push_str(value)
        .map_err(|_| MailerError::FieldTooLong(field))?;
    Ok(owned)
}
