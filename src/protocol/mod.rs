//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the binary DVRIP framing:
//! - 20-byte header encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Frame struct with typed accessors
//! - The message-type codes the core depends on

mod command;
mod frame;
mod frame_buffer;
mod wire_format;

pub use command::CommandType;
pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{Header, HEADER_SIZE, MAGIC, MAX_PAYLOAD_SIZE, VERSION};
