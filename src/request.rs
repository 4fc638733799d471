//! # Mail Requests and Their Wire Format
//!
//! A [`MailRequest`] is the single outstanding "send this mail" intent. On the
//! wire it is published as three double-quoted fields joined by commas:
//!
//! ```text
//! "<to>","<subject>","<body>"
//! ```
//!
//! No escaping is applied when encoding. A field that itself contains a `"`
//! produces a payload the relaying program cannot split correctly; the format
//! is kept as-is for compatibility with existing relays.

use heapless::{String, Vec};

use crate::config::bounded;
use crate::error::{Field, MailerError, PayloadError};

/// Maximum length of the recipient address.
pub const MAX_RECIPIENT_LEN: usize = 64;

/// Maximum length of the subject line.
pub const MAX_SUBJECT_LEN: usize = 128;

/// Default capacity of the body text.
pub const DEFAULT_BODY_SIZE: usize = 256;

/// Six quote characters and two commas.
pub const FRAMING_LEN: usize = 8;

/// A pending mail request with inline storage for all three fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailRequest<const BODY_SIZE: usize = DEFAULT_BODY_SIZE> {
    to: String<MAX_RECIPIENT_LEN>,
    subject: String<MAX_SUBJECT_LEN>,
    body: String<BODY_SIZE>,
}

impl<const BODY_SIZE: usize> MailRequest<BODY_SIZE> {
    /// Copies the three fields into a new request.
    pub fn new(to: &str, subject: &str, body: &str) -> Result<Self, MailerError> {
        Ok(Self {
            to: bounded(to, Field::Recipient)?,
            subject: bounded(subject, Field::Subject)?,
            body: bounded(body, Field::Body)?,
        })
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Length in bytes of the encoded payload.
    pub fn encoded_len(&self) -> usize {
        self.to.len() + self.subject.len() + self.body.len() + FRAMING_LEN
    }

    /// Writes `"<to>","<subject>","<body>"` into `buf` and returns the byte count.
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize, MailerError> {
        let len = self.encoded_len();
        let out = buf.get_mut(..len).ok_or(MailerError::PayloadTooLarge)?;

        let mut cursor = 0;
        let mut put = |bytes: &[u8]| {
            out[cursor..cursor + bytes.len()].copy_from_slice(bytes);
            cursor += bytes.len();
        };
        put(b"\"");
        put(self.to.as_bytes());
        put(b"\",\"");
        put(self.subject.as_bytes());
        put(b"\",\"");
        put(self.body.as_bytes());
        put(b"\"");

        Ok(len)
    }

    /// Encodes the request into an owned, fixed-capacity buffer.
    pub fn to_payload<const N: usize>(&self) -> Result<Vec<u8, N>, MailerError> {
        let mut payload = Vec::new();
        payload
            .resize(self.encoded_len(), 0)
            .map_err(|_| MailerError::PayloadTooLarge)?;
        self.encode(&mut payload)?;
        Ok(payload)
    }

    /// Parses a payload the way the relaying program does.
    ///
    /// Fields follow CSV rules: a field is either bare text without commas, or
    /// enclosed in double quotes where `""` stands for a literal quote.
    /// Exactly three fields are accepted.
    pub fn decode(payload: &[u8]) -> Result<Self, MailerError> {
        let text = core::str::from_utf8(payload).map_err(|_| PayloadError::InvalidUtf8)?;
        let mut fields = CsvFields { text, pos: 0, done: false };

        let to = fields.next_field()?.ok_or(PayloadError::MissingField)?;
        let subject = fields.next_field()?.ok_or(PayloadError::MissingField)?;
        let body = fields.next_field()?.ok_or(PayloadError::MissingField)?;
        if fields.next_field::<BODY_SIZE>()?.is_some() {
            return Err(PayloadError::ExtraField.into());
        }

        Ok(Self { to, subject, body })
    }
}

/// Splits a single CSV record into fields, unquoting as it goes.
struct CsvFields<'a> {
    text: &'a str,
    pos: usize,
    done: bool,
}

impl CsvFields<'_> {
    fn next_field<const N: usize>(&mut self) -> Result<Option<String<N>>, MailerError> {
        if self.done {
            return Ok(None);
        }
        let rest = &self.text[self.pos..];
        let mut out = String::<N>::new();
        let overflow = |_| MailerError::PayloadTooLarge;

        if let Some(quoted) = rest.strip_prefix('"') {
            let mut chars = quoted.char_indices();
            loop {
                let Some((i, c)) = chars.next() else {
                    return Err(PayloadError::UnterminatedQuote.into());
                };
                if c != '"' {
                    out.push(c).map_err(overflow)?;
                    continue;
                }
                // A quote either escapes a following quote or closes the field.
                match quoted[i + 1..].chars().next() {
                    Some('"') => {
                        out.push('"').map_err(overflow)?;
                        chars.next();
                    }
                    Some(',') => {
                        self.pos += 1 + i + 2;
                        return Ok(Some(out));
                    }
                    None => {
                        self.done = true;
                        return Ok(Some(out));
                    }
                    Some(_) => {
                        return Err(PayloadError::UnexpectedCharacter(self.pos + 1 + i + 1).into());
                    }
                }
            }
        }

        match rest.find(',') {
            Some(end) => {
                out.push_str(&rest[..end]).map_err(overflow)?;
                self.pos += end + 1;
            }
            None => {
                out.push_str(rest).map_err(overflow)?;
                self.done = true;
            }
        }
        Ok(Some(out))
    }
}
