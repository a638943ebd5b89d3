//! Delimited, checksummed framing for the ISN protocol stack.
//!
//! Every packet on a byte stream is framed with:
//! - A delimiter byte for stream synchronization
//! - A length field (short: one byte, compact: one to three bytes) and its
//!   CRC-8 check byte
//! - The packet body: protocol tag followed by payload
//! - A CRC-8 (short) or CRC-16 (compact) checksum
//!
//! Corrupted frames are counted and skipped; they never reach the parent.

pub mod codec;
pub mod crc;
pub mod error;
pub mod layer;

pub use codec::{
    Decoded, FrameCodec, FrameConfig, FrameMode, Packet, COMPACT_SIZE_CEILING, DEFAULT_DELIMITER,
    DEFAULT_MAX_SIZE, SHORT_MAX_SIZE,
};
pub use error::{FrameError, Result};
pub use layer::{Frame, RetryState, CTRL_ACK, CTRL_DATA, MIN_FRAME_SIZE};
