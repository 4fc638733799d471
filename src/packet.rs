//! # MQTT Packet Structures and Serialization
//!
//! The subset of MQTT v3.1.1 control packets needed to connect, keep a session
//! alive and publish at QoS 0.

use crate::error::{CodecError, ProtocolError};
use crate::util::{self, read_utf8_string, write_utf8_string};

/// Represents the Quality of Service (QoS) levels for MQTT messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

/// A trait for packets that can be encoded into a byte buffer.
pub trait EncodePacket {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError>;
}

/// A trait for packets that can be decoded from a byte buffer.
pub trait DecodePacket<'a>: Sized {
    fn decode(buf: &'a [u8]) -> Result<Self, CodecError>;
}

/// Packets a client can receive from the broker.
#[derive(Debug)]
pub enum MqttPacket<'a> {
    ConnAck(ConnAck),
    Publish(Publish<'a>),
    PingReq,
    PingResp,
    /// A well-formed packet this client has no use for (e.g. `PUBACK`).
    Other(u8),
}

/// Decodes one complete, framed packet.
pub fn decode(buf: &[u8]) -> Result<Option<MqttPacket<'_>>, CodecError> {
    if buf.is_empty() {
        return Ok(None);
    }

    let packet_type = buf[0] >> 4;
    let packet = match packet_type {
        2 => MqttPacket::ConnAck(ConnAck::decode(buf)?),
        3 => MqttPacket::Publish(Publish::decode(buf)?),
        12 => MqttPacket::PingReq,
        13 => MqttPacket::PingResp,
        4..=11 | 14 => MqttPacket::Other(packet_type),
        _ => return Err(ProtocolError::InvalidPacketType(packet_type).into()),
    };

    Ok(Some(packet))
}

/// Writes the remaining length for a packet whose body was written starting at
/// `content_start`, then moves the body up against the fixed header.
fn finish_packet(buf: &mut [u8], content_start: usize, cursor: usize) -> Result<usize, CodecError> {
    let remaining_len = cursor - content_start;
    let len_bytes = util::write_variable_byte_integer(&mut buf[1..content_start], remaining_len)?;
    let header_len = 1 + len_bytes;
    buf.copy_within(content_start..cursor, header_len);
    Ok(header_len + remaining_len)
}

// --- CONNECT Packet ---
#[derive(Debug)]
pub struct Connect<'a> {
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: &'a str,
}

impl<'a> Connect<'a> {
    pub fn new(client_id: &'a str, keep_alive: u16, clean_session: bool) -> Self {
        Self {
            client_id,
            keep_alive,
            clean_session,
        }
    }
}

impl EncodePacket for Connect<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        // Fixed header, 4 bytes reserved for the remaining length, then the
        // 10-byte variable header.
        if buf.len() < 15 {
            return Err(CodecError::BufferTooSmall);
        }
        let mut cursor = 0;
        buf[cursor] = 0x10;
        cursor += 1;
        cursor += 4;
        let content_start = cursor;
        cursor += write_utf8_string(&mut buf[cursor..], "MQTT")?;
        // Protocol level 4 is MQTT 3.1.1
        buf[cursor] = 4;
        cursor += 1;
        let mut flags = 0;
        if self.clean_session {
            flags |= 0x02;
        }
        buf[cursor] = flags;
        cursor += 1;
        buf[cursor..cursor + 2].copy_from_slice(&self.keep_alive.to_be_bytes());
        cursor += 2;
        cursor += write_utf8_string(&mut buf[cursor..], self.client_id)?;
        finish_packet(buf, content_start, cursor)
    }
}

// --- CONNACK Packet ---
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnAck {
    pub session_present: bool,
    pub reason_code: u8,
}

impl DecodePacket<'_> for ConnAck {
    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        match buf {
            [0x20, 0x02, flags, reason_code, ..] => Ok(Self {
                session_present: (flags & 0x01) != 0,
                reason_code: *reason_code,
            }),
            [0x20, ..] => Err(ProtocolError::MalformedPacket.into()),
            _ => Err(ProtocolError::InvalidResponse.into()),
        }
    }
}

// --- PUBLISH Packet ---
#[derive(Debug)]
pub struct Publish<'a> {
    pub topic: &'a str,
    pub qos: QoS,
    pub retain: bool,
    pub payload: &'a [u8],
    pub packet_id: Option<u16>,
}

impl<'a> Publish<'a> {
    /// A QoS 0 publish, which carries no packet identifier.
    pub fn at_most_once(topic: &'a str, payload: &'a [u8], retain: bool) -> Self {
        Self {
            topic,
            qos: QoS::AtMostOnce,
            retain,
            payload,
            packet_id: None,
        }
    }
}

impl<'a> DecodePacket<'a> for Publish<'a> {
    fn decode(buf: &'a [u8]) -> Result<Self, CodecError> {
        let flags = buf[0] & 0x0F;
        let qos = match (flags >> 1) & 0x03 {
            0 => QoS::AtMostOnce,
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            _ => return Err(ProtocolError::MalformedPacket.into()),
        };
        let retain = (flags & 0x01) != 0;

        let mut cursor = 1;
        let remaining_len = util::read_variable_byte_integer(&mut cursor, buf)?;
        let packet_end = cursor + remaining_len;
        if buf.len() < packet_end {
            return Err(ProtocolError::MalformedPacket.into());
        }

        let topic = read_utf8_string(&mut cursor, buf)?;

        let packet_id = if qos != QoS::AtMostOnce {
            let id = buf
                .get(cursor..cursor + 2)
                .ok_or(ProtocolError::MalformedPacket)?;
            cursor += 2;
            Some(u16::from_be_bytes([id[0], id[1]]))
        } else {
            None
        };

        let payload = buf
            .get(cursor..packet_end)
            .ok_or(ProtocolError::MalformedPacket)?;

        Ok(Publish {
            topic,
            qos,
            retain,
            payload,
            packet_id,
        })
    }
}

impl EncodePacket for Publish<'_> {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        if buf.len() < 5 {
            return Err(CodecError::BufferTooSmall);
        }
        let mut cursor = 0;

        let mut flags = (self.qos as u8) << 1;
        if self.retain {
            flags |= 0x01;
        }
        buf[cursor] = 0x30 | flags;
        cursor += 1;

        // Reserve space for remaining length (max 4 bytes)
        cursor += 4;
        let content_start = cursor;

        cursor += write_utf8_string(&mut buf[cursor..], self.topic)?;

        // Packet ID (only for QoS > 0)
        if self.qos != QoS::AtMostOnce
            && let Some(id) = self.packet_id
        {
            buf.get_mut(cursor..cursor + 2)
                .ok_or(CodecError::BufferTooSmall)?
                .copy_from_slice(&id.to_be_bytes());
            cursor += 2;
        }

        buf.get_mut(cursor..cursor + self.payload.len())
            .ok_or(CodecError::BufferTooSmall)?
            .copy_from_slice(self.payload);
        cursor += self.payload.len();

        finish_packet(buf, content_start, cursor)
    }
}

/// Encodes a packet that consists of a fixed header only.
fn encode_header_only(buf: &mut [u8], first_byte: u8) -> Result<usize, CodecError> {
    let header = buf.get_mut(..2).ok_or(CodecError::BufferTooSmall)?;
    header[0] = first_byte;
    header[1] = 0x00;
    Ok(2)
}

// --- PINGREQ Packet ---
#[derive(Debug)]
pub struct PingReq;

impl EncodePacket for PingReq {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        encode_header_only(buf, 0xC0)
    }
}

// --- PINGRESP Packet ---
#[derive(Debug)]
pub struct PingResp;

impl EncodePacket for PingResp {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        encode_header_only(buf, 0xD0)
    }
}

// --- DISCONNECT Packet ---
#[derive(Debug)]
pub struct Disconnect;

impl EncodePacket for Disconnect {
    fn encode(&self, buf: &mut [u8]) -> Result<usize, CodecError> {
        encode_header_only(buf, 0xE0)
    }
}
