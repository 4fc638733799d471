//! # MQTT Serialization Utilities
//!
//! Helper functions for reading and writing MQTT-specific data types from and to
//! byte buffers, such as variable-byte integers and length-prefixed strings.

use crate::error::{CodecError, ProtocolError};

/// Reads a variable-byte integer from the buffer, advancing the cursor.
///
/// This is the encoding MQTT uses for the remaining length of a packet.
pub fn read_variable_byte_integer(cursor: &mut usize, buf: &[u8]) -> Result<usize, CodecError> {
    let mut multiplier = 1;
    let mut value = 0;
    let mut i = 0;
    loop {
        let encoded_byte = buf
            .get(*cursor + i)
            .ok_or(ProtocolError::MalformedPacket)?;
        value += (encoded_byte & 127) as usize * multiplier;
        if (encoded_byte & 128) == 0 {
            break;
        }
        multiplier *= 128;
        i += 1;
        if i >= 4 {
            return Err(ProtocolError::MalformedPacket.into());
        }
    }
    *cursor += i + 1;
    Ok(value)
}

/// Writes a variable-byte integer at the start of `buf` and returns the byte count.
pub fn write_variable_byte_integer(buf: &mut [u8], mut val: usize) -> Result<usize, CodecError> {
    let mut i = 0;
    loop {
        let mut encoded_byte = (val % 128) as u8;
        val /= 128;
        if val > 0 {
            encoded_byte |= 128;
        }
        *buf.get_mut(i).ok_or(CodecError::BufferTooSmall)? = encoded_byte;
        i += 1;
        if val == 0 {
            break;
        }
    }
    Ok(i)
}

/// Returns the total length of the first packet in `buf`, if it is complete.
///
/// `Ok(None)` means more bytes are needed before the packet can be framed.
pub fn frame_len(buf: &[u8]) -> Result<Option<usize>, CodecError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let mut multiplier = 1;
    let mut remaining = 0;
    let mut cursor = 1;
    loop {
        let Some(encoded_byte) = buf.get(cursor) else {
            return Ok(None);
        };
        remaining += (encoded_byte & 127) as usize * multiplier;
        cursor += 1;
        if (encoded_byte & 128) == 0 {
            break;
        }
        multiplier *= 128;
        if cursor > 4 {
            return Err(ProtocolError::MalformedPacket.into());
        }
    }
    let total = cursor + remaining;
    Ok((buf.len() >= total).then_some(total))
}

/// Reads a UTF-8 encoded string (prefixed with a 2-byte length) from the buffer.
pub fn read_utf8_string<'a>(cursor: &mut usize, buf: &'a [u8]) -> Result<&'a str, CodecError> {
    let len_bytes = buf
        .get(*cursor..*cursor + 2)
        .ok_or(ProtocolError::MalformedPacket)?;
    let len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
    *cursor += 2;
    let s = core::str::from_utf8(
        buf.get(*cursor..*cursor + len)
            .ok_or(ProtocolError::MalformedPacket)?,
    )
    .map_err(|_| ProtocolError::InvalidUtf8String)?;
    *cursor += len;
    Ok(s)
}

/// Writes a UTF-8 encoded string (prefixed with a 2-byte length) to the buffer.
pub fn write_utf8_string(buf: &mut [u8], s: &str) -> Result<usize, CodecError> {
    let len = s.len();
    if len > u16::MAX as usize {
        return Err(ProtocolError::PayloadTooLarge.into());
    }
    let len_bytes = (len as u16).to_be_bytes();

    let required_space = 2 + len;
    let slice = buf
        .get_mut(0..required_space)
        .ok_or(CodecError::BufferTooSmall)?;

    slice[0..2].copy_from_slice(&len_bytes);
    slice[2..].copy_from_slice(s.as_bytes());
    Ok(required_space)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_byte_integer_uses_continuation_bits() {
        let mut buf = [0u8; 4];
        assert_eq!(write_variable_byte_integer(&mut buf, 127), Ok(1));
        assert_eq!(buf[0], 0x7F);

        assert_eq!(write_variable_byte_integer(&mut buf, 321), Ok(2));
        assert_eq!(&buf[..2], &[0xC1, 0x02]);

        let mut cursor = 0;
        assert_eq!(read_variable_byte_integer(&mut cursor, &buf), Ok(321));
        assert_eq!(cursor, 2);
    }

    #[test]
    fn variable_byte_integer_rejects_five_byte_lengths() {
        let buf = [0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let mut cursor = 0;
        assert_eq!(
            read_variable_byte_integer(&mut cursor, &buf),
            Err(CodecError::Protocol(ProtocolError::MalformedPacket))
        );
    }

    #[test]
    fn frame_len_waits_for_complete_packets() {
        assert_eq!(frame_len(&[]), Ok(None));
        assert_eq!(frame_len(&[0xD0]), Ok(None));
        assert_eq!(frame_len(&[0xD0, 0x00]), Ok(Some(2)));
        assert_eq!(frame_len(&[0x20, 0x02, 0x00]), Ok(None));
        assert_eq!(frame_len(&[0x20, 0x02, 0x00, 0x00, 0xD0]), Ok(Some(4)));
        assert_eq!(frame_len(&[0x30, 0x80]), Ok(None));
    }

    #[test]
    fn utf8_strings_are_length_prefixed() {
        let mut buf = [0u8; 8];
        assert_eq!(write_utf8_string(&mut buf, "MQTT"), Ok(6));
        assert_eq!(&buf[..6], b"\x00\x04MQTT");

        let mut cursor = 0;
        assert_eq!(read_utf8_string(&mut cursor, &buf), Ok("MQTT"));
        assert_eq!(cursor, 6);

        let mut small = [0u8; 3];
        assert_eq!(
            write_utf8_string(&mut small, "MQTT"),
            Err(CodecError::BufferTooSmall)
        );
    }
}
