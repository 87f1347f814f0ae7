//! Wire format encoding and decoding.
//!
//! Implements the 20-byte DVRIP header:
//! ```text
//! ┌───────┬─────────┬──────────┬────────────┬──────────┬─────────┬─────────┬───────────┬──────────┐
//! │ Magic │ Version │ Reserved │ Session ID │ Sequence │ TotalPkt│ CurrPkt │ Msg type  │ Length   │
//! │ 0xFF  │ 1 byte  │ 2 bytes  │ 4 bytes    │ 4 bytes  │ 1 byte  │ 1 byte  │ 2 bytes   │ 4 bytes  │
//! │       │         │          │ uint32 LE  │ uint32 LE│         │         │ uint16 LE │ uint32 LE│
//! └───────┴─────────┴──────────┴────────────┴──────────┴─────────┴─────────┴───────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Little Endian. The packet counters are
//! always zero (the fragmentation scheme they describe is unused in the
//! wild), so the decoded [`Header`] carries only the four meaningful fields.

/// Header size in bytes (fixed, exactly 20).
pub const HEADER_SIZE: usize = 20;

/// First byte of every frame.
pub const MAGIC: u8 = 0xFF;

/// Version byte transmitted in outbound frames. Devices send 0x01, the
/// vendor's own clients send 0x00; both are seen inbound and neither is
/// rejected.
pub const VERSION: u8 = 0x00;

/// Maximum accepted payload length (max i32).
pub const MAX_PAYLOAD_SIZE: u32 = 2_147_483_647;

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Session identifier assigned by the device at login (0 pre-login).
    pub session_id: u32,
    /// Per-connection monotonically increasing sequence number.
    pub sequence: u32,
    /// Message-type code (see [`super::CommandType`]).
    pub message_type: u16,
    /// Payload length in bytes (header not included).
    pub payload_length: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(session_id: u32, sequence: u32, message_type: u16, payload_length: u32) -> Self {
        Self {
            session_id,
            sequence,
            message_type,
            payload_length,
        }
    }

    /// Encode header to bytes (Little Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use dvrip_client::protocol::Header;
    ///
    /// let header = Header::new(0x12, 7, 1000, 64);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 20);
    /// assert_eq!(bytes[0], 0xFF);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = MAGIC;
        buf[1] = VERSION;
        // buf[2..4] reserved, zero
        buf[4..8].copy_from_slice(&self.session_id.to_le_bytes());
        buf[8..12].copy_from_slice(&self.sequence.to_le_bytes());
        // buf[12] total-packet counter, buf[13] current-packet counter: zero
        buf[14..16].copy_from_slice(&self.message_type.to_le_bytes());
        buf[16..20].copy_from_slice(&self.payload_length.to_le_bytes());
        buf
    }

    /// Decode header from bytes (Little Endian).
    ///
    /// Returns `None` if the buffer is too short. The magic byte is NOT
    /// checked here; the framing layer checks it before decoding so it can
    /// distinguish "need more bytes" from "stream is corrupt".
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            session_id: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            sequence: u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            message_type: u16::from_le_bytes([buf[14], buf[15]]),
            payload_length: u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]),
        })
    }
}
