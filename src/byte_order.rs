//! Helpers for explicit wire byte-order conversions.
//!
//! The filewire header stores its multi-byte fields little-endian. These
//! helpers keep Clippy expectations scoped to the conversion points so
//! protocol code can remain explicit about wire endianness without repeating
//! lint annotations.

/// Serialise a `u16` in wire byte order (little-endian).
///
/// # Examples
///
/// ```
/// use filewire::byte_order::write_wire_u16;
///
/// assert_eq!(write_wire_u16(0x1234), [0x34, 0x12]);
/// ```
#[must_use]
pub fn write_wire_u16(value: u16) -> [u8; 2] {
    #[expect(
        clippy::little_endian_bytes,
        reason = "The filewire header stores integers little-endian."
    )]
    value.to_le_bytes()
}

/// Parse a wire-order `u16` from its on-wire representation.
///
/// # Examples
///
/// ```
/// use filewire::byte_order::read_wire_u16;
///
/// assert_eq!(read_wire_u16([0x34, 0x12]), 0x1234);
/// ```
#[must_use]
pub fn read_wire_u16(bytes: [u8; 2]) -> u16 {
    #[expect(
        clippy::little_endian_bytes,
        reason = "The filewire header stores integers little-endian."
    )]
    u16::from_le_bytes(bytes)
}

/// Serialise a `u32` in wire byte order (little-endian).
///
/// # Examples
///
/// ```
/// use filewire::byte_order::write_wire_u32;
///
/// assert_eq!(write_wire_u32(0x1234_5678), [0x78, 0x56, 0x34, 0x12]);
/// ```
#[must_use]
pub fn write_wire_u32(value: u32) -> [u8; 4] {
    #[expect(
        clippy::little_endian_bytes,
        reason = "The filewire header stores integers little-endian."
    )]
    value.to_le_bytes()
}

/// Parse a wire-order `u32` from its on-wire representation.
///
/// # Examples
///
/// ```
/// use filewire::byte_order::read_wire_u32;
///
/// assert_eq!(read_wire_u32([0x78, 0x56, 0x34, 0x12]), 0x1234_5678);
/// ```
#[must_use]
pub fn read_wire_u32(bytes: [u8; 4]) -> u32 {
    #[expect(
        clippy::little_endian_bytes,
        reason = "The filewire header stores integers little-endian."
    )]
    u32::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    //! Round-trip tests for wire byte-order conversion helpers.

    use rstest::rstest;

    use super::{read_wire_u16, read_wire_u32, write_wire_u16, write_wire_u32};

    #[rstest]
    #[case::u16(
        0x1234u32,
        &write_wire_u16(0x1234)[..],
        &[0x34, 0x12],
        u32::from(read_wire_u16([0x34, 0x12]))
    )]
    #[case::u32(
        0x1234_5678u32,
        &write_wire_u32(0x1234_5678)[..],
        &[0x78, 0x56, 0x34, 0x12],
        read_wire_u32([0x78, 0x56, 0x34, 0x12])
    )]
    fn wire_byte_order_round_trip(
        #[case] value: u32,
        #[case] written: &[u8],
        #[case] expected_bytes: &[u8],
        #[case] read_back: u32,
    ) {
        assert_eq!(written, expected_bytes);
        assert_eq!(read_back, value);
    }
}
