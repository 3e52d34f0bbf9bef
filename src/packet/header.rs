//! Fixed 11-byte packet header codec.
//!
//! ```text
//! 0      magic (0x01)
//! 1..3   sequence          u16 little-endian
//! 3      request type
//! 4..8   payload length    u32 little-endian
//! 8      file kind
//! 9      operation id
//! 10     continuation      0xF0 = more frames follow, 0x0F = last frame
//! ```
//!
//! Both functions are pure and independent of any transport.

use super::{FileKind, RequestType};
use crate::{
    byte_order::{read_wire_u16, read_wire_u32, write_wire_u16, write_wire_u32},
    codec::FrameError,
};

/// Size of the encoded header in bytes.
pub const HEADER_SIZE: usize = 11;
/// Value of the first header byte for every valid frame.
pub const MAGIC: u8 = 0x01;
/// Continuation marker: more frames belong to the same logical message.
pub const MORE_FRAMES: u8 = 0xF0;
/// Continuation marker: this frame ends the logical message.
pub const LAST_FRAME: u8 = 0x0F;

mod offset {
    pub const MAGIC: usize = 0;
    pub const SEQUENCE: usize = 1;
    pub const REQUEST_TYPE: usize = 3;
    pub const DATA_SIZE: usize = 4;
    pub const FILE_KIND: usize = 8;
    pub const OPERATION_ID: usize = 9;
    pub const CONTINUATION: usize = 10;
}

/// Decoded header fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PacketHeader {
    /// Position of the frame within one logical transfer. Wraps at `u16::MAX`.
    pub sequence: u16,
    /// Purpose of the packet.
    pub request_type: RequestType,
    /// Length of the payload that follows the header.
    pub data_size: u32,
    /// Storage area the packet refers to.
    pub file_kind: FileKind,
    /// Handler owning the packet; `0` addresses the connection itself.
    pub operation_id: u8,
    /// `true` when more frames follow for the same logical message.
    pub continuation: bool,
}

impl PacketHeader {
    /// Header for a connection-level packet with an empty payload.
    #[must_use]
    pub const fn new(request_type: RequestType) -> Self {
        Self {
            sequence: 0,
            request_type,
            data_size: 0,
            file_kind: FileKind::None,
            operation_id: 0,
            continuation: false,
        }
    }
}

/// Serialise `header` into its wire form.
///
/// # Examples
///
/// ```
/// use filewire::packet::{PacketHeader, RequestType, decode_header, encode_header};
///
/// let header = PacketHeader::new(RequestType::ConnectionCheck);
/// let bytes = encode_header(&header);
/// assert_eq!(bytes[0], 0x01);
/// assert_eq!(decode_header(&bytes).expect("valid header"), header);
/// ```
#[must_use]
pub fn encode_header(header: &PacketHeader) -> [u8; HEADER_SIZE] {
    let mut bytes = [0u8; HEADER_SIZE];
    bytes[offset::MAGIC] = MAGIC;
    bytes[offset::SEQUENCE..offset::REQUEST_TYPE].copy_from_slice(&write_wire_u16(header.sequence));
    bytes[offset::REQUEST_TYPE] = header.request_type.as_byte();
    bytes[offset::DATA_SIZE..offset::FILE_KIND].copy_from_slice(&write_wire_u32(header.data_size));
    bytes[offset::FILE_KIND] = header.file_kind.as_byte();
    bytes[offset::OPERATION_ID] = header.operation_id;
    bytes[offset::CONTINUATION] = if header.continuation {
        MORE_FRAMES
    } else {
        LAST_FRAME
    };
    bytes
}

/// Parse a header from its wire form.
///
/// # Errors
///
/// Returns [`FrameError::BadMagic`] when the first byte is not [`MAGIC`] and
/// [`FrameError::BadMarker`] when the continuation byte is neither
/// [`MORE_FRAMES`] nor [`LAST_FRAME`].
pub fn decode_header(bytes: &[u8; HEADER_SIZE]) -> Result<PacketHeader, FrameError> {
    let magic = bytes[offset::MAGIC];
    if magic != MAGIC {
        return Err(FrameError::BadMagic { found: magic });
    }
    let continuation = match bytes[offset::CONTINUATION] {
        MORE_FRAMES => true,
        LAST_FRAME => false,
        found => return Err(FrameError::BadMarker { found }),
    };
    Ok(PacketHeader {
        sequence: read_wire_u16([bytes[offset::SEQUENCE], bytes[offset::SEQUENCE + 1]]),
        request_type: RequestType::from_byte(bytes[offset::REQUEST_TYPE]),
        data_size: read_wire_u32([
            bytes[offset::DATA_SIZE],
            bytes[offset::DATA_SIZE + 1],
            bytes[offset::DATA_SIZE + 2],
            bytes[offset::DATA_SIZE + 3],
        ]),
        file_kind: FileKind::from_byte(bytes[offset::FILE_KIND]),
        operation_id: bytes[offset::OPERATION_ID],
        continuation,
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    #[test]
    fn encodes_documented_layout() {
        let header = PacketHeader {
            sequence: 0x0102,
            request_type: RequestType::File,
            data_size: 0x0A0B_0C0D,
            file_kind: FileKind::User,
            operation_id: 7,
            continuation: true,
        };
        assert_eq!(
            encode_header(&header),
            [0x01, 0x02, 0x01, 8, 0x0D, 0x0C, 0x0B, 0x0A, 1, 7, 0xF0]
        );
    }

    #[test]
    fn last_frame_uses_closing_marker() {
        let bytes = encode_header(&PacketHeader::new(RequestType::Suspend));
        assert_eq!(bytes[10], LAST_FRAME);
    }

    #[rstest]
    #[case::zero(0x00)]
    #[case::two(0x02)]
    #[case::marker_value(0xF0)]
    fn rejects_bad_magic(#[case] magic: u8) {
        let mut bytes = encode_header(&PacketHeader::new(RequestType::File));
        bytes[0] = magic;
        assert_eq!(
            decode_header(&bytes),
            Err(FrameError::BadMagic { found: magic })
        );
    }

    #[rstest]
    #[case(0x00)]
    #[case(0xFF)]
    #[case(0x0E)]
    fn rejects_bad_marker(#[case] marker: u8) {
        let mut bytes = encode_header(&PacketHeader::new(RequestType::File));
        bytes[10] = marker;
        assert_eq!(
            decode_header(&bytes),
            Err(FrameError::BadMarker { found: marker })
        );
    }

    fn header_strategy() -> impl Strategy<Value = PacketHeader> {
        (
            any::<u16>(),
            any::<u8>(),
            any::<u32>(),
            any::<u8>(),
            any::<u8>(),
            any::<bool>(),
        )
            .prop_map(
                |(sequence, request, data_size, kind, operation_id, continuation)| PacketHeader {
                    sequence,
                    request_type: RequestType::from_byte(request),
                    data_size,
                    file_kind: FileKind::from_byte(kind),
                    operation_id,
                    continuation,
                },
            )
    }

    proptest! {
        #[test]
        fn header_round_trips(header in header_strategy()) {
            prop_assert_eq!(decode_header(&encode_header(&header)), Ok(header));
        }
    }
}
