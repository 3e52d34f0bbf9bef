//! Error types for the framing layer.
//!
//! Every [`FrameError`] is fatal to the connection that produced it: a
//! corrupt header leaves no reliable way to find the next frame boundary, so
//! the stream is never resynchronised.

use std::io;

use thiserror::Error;

use crate::packet::{ErrorCode, HEADER_SIZE, MAGIC};

/// Wire-level framing failures.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The first header byte was not the protocol magic.
    #[error("bad header magic: expected {MAGIC:#04x}, found {found:#04x}")]
    BadMagic {
        /// Byte found at offset 0.
        found: u8,
    },

    /// The continuation byte was neither of the two markers.
    #[error("bad continuation marker: {found:#04x}")]
    BadMarker {
        /// Byte found at offset 10.
        found: u8,
    },

    /// The header announced a payload larger than the receive buffer.
    #[error("frame payload exceeds limit: {size} > {max}")]
    Oversized {
        /// Payload length announced by the header.
        size: usize,
        /// Largest payload the receiver accepts.
        max: usize,
    },

    /// The stream ended inside a frame.
    #[error("premature EOF: {buffered} of {expected} frame bytes received")]
    Truncated {
        /// Bytes of the partial frame received before EOF.
        buffered: usize,
        /// Bytes the partial frame needed (at least [`HEADER_SIZE`]).
        expected: usize,
    },
}

impl FrameError {
    /// Code reported in the `Suspend` packet that tears the connection down.
    #[must_use]
    pub const fn suspend_code(&self) -> ErrorCode {
        match self {
            Self::Truncated { .. } => ErrorCode::SocketClosed,
            Self::BadMagic { .. } | Self::BadMarker { .. } | Self::Oversized { .. } => {
                ErrorCode::InvalidPacket
            }
        }
    }

    /// Report whether the error came from a half-received frame at EOF.
    #[must_use]
    pub const fn is_truncation(&self) -> bool { matches!(self, Self::Truncated { .. }) }
}

impl From<FrameError> for io::Error {
    fn from(error: FrameError) -> Self {
        let kind = if error.is_truncation() {
            io::ErrorKind::UnexpectedEof
        } else {
            io::ErrorKind::InvalidData
        };
        io::Error::new(kind, error)
    }
}

const _: () = assert!(HEADER_SIZE == 11);
