//! Frame structure and encoding/decoding

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use tracing::trace;

use crate::{
    crc,
    error::{Error, Result},
    schema::{self, Report},
};

/// Outgoing frame
///
/// # Frame Structure
///
/// ```text
/// ┌─────────────┬─────────────┬─────────────┬─────────────┐
/// │   Address   │  Function   │   Payload   │     CRC     │
/// │   1 byte    │   1 byte    │   N bytes   │   2 bytes   │
/// └─────────────┴─────────────┴─────────────┴─────────────┘
/// ```
///
/// There is no length prefix or delimiter: one transport chunk carries
/// exactly one frame. Multi-byte payload values are big-endian.
///
/// # Examples
///
/// ```
/// use wuzhi_core::Frame;
///
/// let frame = Frame::new(vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x01]);
/// let encoded = frame.encode();
/// assert_eq!(&encoded[6..], &[0x84, 0x0A]);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    /// Address, function and payload, without the CRC trailer
    pub body: Bytes,
}

impl Frame {
    /// Create a frame from its body (address + function + payload)
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self { body: body.into() }
    }

    /// Correlation key of this frame
    pub fn key(&self) -> Option<u8> {
        correlation_key(&self.body)
    }

    /// Encode frame to bytes, CRC trailer appended
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.size());
        buf.put_slice(&self.body);
        buf.put_slice(&crc::calculate(&self.body));
        buf
    }

    /// Get total encoded size
    pub fn size(&self) -> usize {
        self.body.len() + crc::TRAILER_LEN
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("body", &nice_hex(&self.body))
            .field("crc", &hex::encode(crc::calculate(&self.body)))
            .finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&nice_hex(&self.body))
    }
}

/// Decoded inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Structured reply matching a known shape
    Report(Report),
    /// CRC-verified frame of unknown shape, trailer stripped
    Raw(Bytes),
}

impl Reply {
    /// Decode a complete inbound frame
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Buffer is shorter than the CRC trailer
    /// - CRC verification fails
    /// - A known reply shape does not fit in the frame
    ///
    /// Frames with an unknown discriminator decode as [`Reply::Raw`].
    ///
    /// # Examples
    ///
    /// ```
    /// use wuzhi_core::{Frame, Reply};
    ///
    /// let echo = Frame::new(vec![0x01, 0x06, 0x00, 0x12, 0x00, 0x01]).encode();
    /// let reply = Reply::decode(&echo).unwrap();
    /// assert!(matches!(reply, Reply::Raw(_)));
    /// ```
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < crc::TRAILER_LEN {
            return Err(Error::FrameTooShort {
                expected: crc::TRAILER_LEN,
                actual: buf.len(),
            });
        }

        let (data, trailer) = buf.split_at(buf.len() - crc::TRAILER_LEN);
        let expected = crc::calculate(data);
        if expected != trailer {
            return Err(Error::CrcMismatch {
                expected,
                received: [trailer[0], trailer[1]],
            });
        }

        let shape = data
            .get(schema::DISCRIMINATOR_OFFSET)
            .copied()
            .and_then(schema::shape_for);

        match shape {
            Some(shape) => {
                trace!(kind = %shape.kind, "Decoding structured reply");
                Ok(Self::Report(shape.decode(data)?))
            }
            None => Ok(Self::Raw(Bytes::copy_from_slice(data))),
        }
    }

    /// Structured report, if this reply has one
    pub fn report(&self) -> Option<&Report> {
        match self {
            Self::Report(report) => Some(report),
            Self::Raw(_) => None,
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Reply {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Report(report) => serde::Serialize::serialize(report, serializer),
            Self::Raw(bytes) => serializer.serialize_str(&nice_hex(bytes)),
        }
    }
}

/// Correlation key of a frame: its first byte (the device address)
pub fn correlation_key(frame: &[u8]) -> Option<u8> {
    frame.first().copied()
}

/// Render a frame as `address+function | discriminator | 16-bit words`
///
/// ```
/// use wuzhi_core::frame::nice_hex;
///
/// assert_eq!(nice_hex(&[0x01, 0x03, 0x3c, 0x0b, 0xb8, 0x00]), "0103 | 3c | 0bb8 00");
/// ```
pub fn nice_hex(bytes: &[u8]) -> String {
    let head = hex::encode(&bytes[..bytes.len().min(2)]);
    let discriminator = bytes
        .get(schema::DISCRIMINATOR_OFFSET)
        .map(|b| format!("{b:02x}"))
        .unwrap_or_default();
    let words: Vec<String> = bytes
        .get(schema::DISCRIMINATOR_OFFSET + 1..)
        .unwrap_or_default()
        .chunks(2)
        .map(hex::encode)
        .collect();

    format!("{head} | {discriminator} | {}", words.join(" "))
}
