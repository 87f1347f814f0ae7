//! Frame buffer for accumulating partial reads.
//!
//! Hides the streaming nature of TCP: socket reads of arbitrary size are
//! appended, complete frames are pulled off the front one at a time. Uses
//! `bytes::BytesMut` so the unconsumed tail stays at the front of the
//! buffer without copying and payloads are handed out zero-copy.

use bytes::BytesMut;

use super::frame::Frame;
use super::wire_format::{Header, HEADER_SIZE, MAGIC, MAX_PAYLOAD_SIZE};
use crate::error::{DvripError, Result};

/// Initial capacity of the inbound buffer.
const INITIAL_CAPACITY: usize = 128 * 1024;

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
}

impl FrameBuffer {
    /// Create a new frame buffer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Append raw bytes from a socket read.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract the next complete frame from the front of the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on a framing violation
    ///
    /// Frames already extracted stay valid when a later call errors, so a
    /// read that carries good frames followed by garbage still delivers the
    /// good frames before the connection is torn down.
    ///
    /// # Errors
    ///
    /// A first byte other than the protocol magic, or a claimed payload
    /// length above the protocol maximum, is an unrecoverable framing error:
    /// the stream has lost sync and the connection must be torn down.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.buffer.len() < HEADER_SIZE {
            return Ok(None);
        }

        if self.buffer[0] != MAGIC {
            return Err(DvripError::Protocol(format!(
                "invalid frame identification byte 0x{:02x}",
                self.buffer[0]
            )));
        }

        // Peek the header; the frame is consumed only once it is whole.
        let header = Header::decode(&self.buffer[..HEADER_SIZE]).expect("buffer has enough bytes");

        if header.payload_length > MAX_PAYLOAD_SIZE {
            return Err(DvripError::Protocol(format!(
                "payload length {} exceeds maximum {}",
                header.payload_length, MAX_PAYLOAD_SIZE
            )));
        }

        let total = HEADER_SIZE + header.payload_length as usize;
        if self.buffer.len() < total {
            return Ok(None);
        }

        let _ = self.buffer.split_to(HEADER_SIZE);
        let payload = self.buffer.split_to(header.payload_length as usize).freeze();
        Ok(Some(Frame::new(header, payload)))
    }

    /// Get the number of buffered (not yet consumed) bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
