//! Frame struct with typed accessors.
//!
//! Represents a complete protocol frame with header and payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.

use bytes::Bytes;

use super::wire_format::{Header, HEADER_SIZE};

/// A complete protocol frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes (zero-copy via `bytes::Bytes`). Conventionally UTF-8
    /// JSON, except still-picture replies which are a binary blob.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the message-type code.
    #[inline]
    pub fn message_type(&self) -> u16 {
        self.header.message_type
    }

    /// Get the session identifier from the header.
    #[inline]
    pub fn session_id(&self) -> u32 {
        self.header.session_id
    }

    /// Get the sequence number from the header.
    #[inline]
    pub fn sequence(&self) -> u32 {
        self.header.sequence
    }
}

/// Build a complete frame as a single byte vector.
///
/// Encodes the header and appends the payload into a contiguous buffer,
/// ready to hand to the transport.
///
/// # Example
///
/// ```
/// use dvrip_client::protocol::{build_frame, Header};
///
/// let header = Header::new(0x12, 1, 1000, 5);
/// let bytes = build_frame(&header, b"hello");
/// assert_eq!(bytes.len(), 20 + 5);
/// ```
pub fn build_frame(header: &Header, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_accessors() {
        let header = Header::new(0x12, 42, 1001, 5);
        let frame = Frame::new(header, Bytes::from_static(b"hello"));

        assert_eq!(frame.message_type(), 1001);
        assert_eq!(frame.session_id(), 0x12);
        assert_eq!(frame.sequence(), 42);
        assert_eq!(frame.payload(), b"hello");
    }

    #[test]
    fn build_frame_layout() {
        let header = Header::new(0x12, 1, 1000, 5);
        let bytes = build_frame(&header, b"hello");

        assert_eq!(bytes.len(), HEADER_SIZE + 5);
        let parsed = Header::decode(&bytes[..HEADER_SIZE]).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(&bytes[HEADER_SIZE..], b"hello");
    }

    #[test]
    fn build_frame_empty_payload() {
        let header = Header::new(0, 0, 1006, 0);
        let bytes = build_frame(&header, b"");
        assert_eq!(bytes.len(), HEADER_SIZE);
    }
}
