//! # Error Types
//!
//! Errors surfaced to callers of the mailer, plus the error types used by the
//! built-in stream transport and its MQTT packet codec.

use core::fmt;

/// Identifies which input was rejected by a capacity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Field {
    Broker,
    Topic,
    ClientId,
    Recipient,
    Subject,
    Body,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Broker => "broker address",
            Field::Topic => "topic",
            Field::ClientId => "client id",
            Field::Recipient => "recipient",
            Field::Subject => "subject",
            Field::Body => "body",
        };
        f.write_str(name)
    }
}

/// Reasons a received payload could not be parsed as a mail triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PayloadError {
    /// The payload is not valid UTF-8.
    InvalidUtf8,
    /// Fewer than three fields were present.
    MissingField,
    /// More than three fields were present.
    ExtraField,
    /// A quoted field was never closed.
    UnterminatedQuote,
    /// A closing quote was followed by something other than a comma.
    UnexpectedCharacter(usize),
}

/// The primary error enum for the mailer API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MailerError {
    /// An input string does not fit its fixed-size buffer.
    FieldTooLong(Field),
    /// The encoded payload does not fit the destination buffer.
    PayloadTooLarge,
    /// A payload received from the broker is not a valid mail triplet.
    MalformedPayload(PayloadError),
}

impl From<PayloadError> for MailerError {
    fn from(err: PayloadError) -> Self {
        MailerError::MalformedPayload(err)
    }
}

impl fmt::Display for MailerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailerError::FieldTooLong(field) => write!(f, "{field} is too long"),
            MailerError::PayloadTooLarge => f.write_str("payload does not fit the buffer"),
            MailerError::MalformedPayload(err) => write!(f, "malformed payload: {err:?}"),
        }
    }
}

impl core::error::Error for MailerError {}

/// Represents the reason codes for a connection refusal (`CONNACK`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ConnectReasonCode {
    /// The connection was accepted.
    Success = 0,
    /// The broker does not support the requested MQTT protocol version.
    UnacceptableProtocolVersion = 1,
    /// The client identifier is not valid.
    IdentifierRejected = 2,
    /// The broker is unavailable.
    ServerUnavailable = 3,
    /// The username or password is not valid.
    BadUserNameOrPassword = 4,
    /// The client is not authorized to connect.
    NotAuthorized = 5,
    /// An unknown or unspecified error occurred.
    Other(u8),
}

impl From<u8> for ConnectReasonCode {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Success,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            _ => Self::Other(val),
        }
    }
}

/// Enumerates specific MQTT protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// An invalid packet type was received.
    InvalidPacketType(u8),
    /// The server sent an invalid or unexpected response.
    InvalidResponse,
    /// The connection was closed by the broker.
    ConnectionClosed,
    /// A packet was received that was not correctly formed.
    MalformedPacket,
    /// The payload of a message exceeds the maximum allowable size.
    PayloadTooLarge,
    /// A string was not valid UTF-8.
    InvalidUtf8String,
    /// The broker stopped answering keepalive pings.
    KeepAliveTimeout,
}

/// Errors produced while encoding or decoding MQTT packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecError {
    /// The buffer provided for an operation was too small.
    BufferTooSmall,
    /// The bytes violate the MQTT wire format.
    Protocol(ProtocolError),
}

impl From<ProtocolError> for CodecError {
    fn from(err: ProtocolError) -> Self {
        CodecError::Protocol(err)
    }
}

/// Errors reported by [`StreamTransport`](crate::stream::StreamTransport).
///
/// It is generic over the I/O error type `E` of the underlying byte stream.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamError<E> {
    /// An error occurred in the underlying byte stream.
    Io(E),
    /// A protocol-level error occurred.
    Protocol(ProtocolError),
    /// The connection was refused by the broker. The enclosed code provides the reason.
    ConnectionRefused(ConnectReasonCode),
    /// The transport is not currently connected to the broker.
    NotConnected,
    /// No broker address has been configured.
    ServerNotSet,
    /// The buffer provided for an operation was too small.
    BufferTooSmall,
}

impl<E> From<CodecError> for StreamError<E> {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::BufferTooSmall => StreamError::BufferTooSmall,
            CodecError::Protocol(p) => StreamError::Protocol(p),
        }
    }
}

impl<E> From<ProtocolError> for StreamError<E> {
    fn from(err: ProtocolError) -> Self {
        StreamError::Protocol(err)
    }
}

impl<E: fmt::Debug> fmt::Display for StreamError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamError::Io(e) => write!(f, "i/o error: {e:?}"),
            StreamError::Protocol(p) => write!(f, "protocol error: {p:?}"),
            StreamError::ConnectionRefused(code) => write!(f, "connection refused: {code:?}"),
            StreamError::NotConnected => f.write_str("not connected"),
            StreamError::ServerNotSet => f.write_str("no broker address configured"),
            StreamError::BufferTooSmall => f.write_str("buffer too small"),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for StreamError<E> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_map_from_connack_bytes() {
        assert_eq!(ConnectReasonCode::from(0), ConnectReasonCode::Success);
        assert_eq!(ConnectReasonCode::from(5), ConnectReasonCode::NotAuthorized);
        assert_eq!(ConnectReasonCode::from(0x87), ConnectReasonCode::Other(0x87));
    }

    #[test]
    fn codec_errors_convert_into_stream_errors() {
        let err: StreamError<()> = CodecError::BufferTooSmall.into();
        assert!(matches!(err, StreamError::BufferTooSmall));

        let err: StreamError<()> = CodecError::Protocol(ProtocolError::MalformedPacket).into();
        assert!(matches!(
            err,
            StreamError::Protocol(ProtocolError::MalformedPacket)
        ));
    }
}
