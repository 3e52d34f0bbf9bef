//! In-memory packet model and the fixed-header wire codec.
//!
//! A [`Packet`] is the decoded form of one frame: an 11-byte
//! [`PacketHeader`] followed by `data_size` payload bytes. Packets are
//! immutable once built; the payload is a cheaply cloneable [`Bytes`].

mod header;
mod kind;
pub mod payload;

use bytes::Bytes;
pub use header::{
    HEADER_SIZE,
    LAST_FRAME,
    MAGIC,
    MORE_FRAMES,
    PacketHeader,
    decode_header,
    encode_header,
};
pub use kind::{ErrorCode, FileKind, RequestType};
pub use payload::{ErrorReport, FileDescriptor, FileRequest, PayloadError};

/// A decoded frame.
///
/// The header's `data_size` always equals the payload length: constructors
/// derive it from the payload rather than accepting it separately.
///
/// # Examples
///
/// ```
/// use filewire::packet::{FileKind, Packet, RequestType};
///
/// let packet = Packet::new(RequestType::File, &b"chunk"[..])
///     .with_operation_id(3)
///     .with_file_kind(FileKind::Dlc)
///     .with_continuation(true);
/// assert_eq!(packet.header().data_size, 5);
/// assert!(packet.continuation());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    header: PacketHeader,
    payload: Bytes,
}

impl Packet {
    /// Create a connection-level packet carrying `payload`.
    ///
    /// Payloads longer than `u32::MAX` saturate the header length; encoders
    /// reject such packets as oversized.
    #[must_use]
    pub fn new(request_type: RequestType, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let mut header = PacketHeader::new(request_type);
        header.data_size = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        Self { header, payload }
    }

    /// Assemble a packet from a decoded header and its payload.
    ///
    /// Only the frame assembler calls this, after reading exactly
    /// `header.data_size` bytes.
    pub(crate) fn from_wire(header: PacketHeader, payload: Bytes) -> Self {
        debug_assert_eq!(
            usize::try_from(header.data_size).ok(),
            Some(payload.len()),
            "payload length must match the header"
        );
        Self { header, payload }
    }

    /// Build an `Error` packet reporting that `request` failed with `code`.
    #[must_use]
    pub fn error(request: RequestType, code: ErrorCode, operation_id: u8) -> Self {
        Self::new(RequestType::Error, ErrorReport { request, code }.encode())
            .with_operation_id(operation_id)
    }

    /// Build a connection-level `Suspend` packet carrying `code`.
    #[must_use]
    pub fn suspend(code: ErrorCode) -> Self {
        Self::new(RequestType::Suspend, Bytes::copy_from_slice(&[code.as_byte()]))
    }

    /// Build a keepalive probe.
    #[must_use]
    pub fn connection_check() -> Self {
        Self::new(
            RequestType::ConnectionCheck,
            Bytes::copy_from_slice(&[RequestType::ConnectionCheck.as_byte()]),
        )
    }

    /// Set the sequence number.
    #[must_use]
    pub fn with_sequence(mut self, sequence: u16) -> Self {
        self.header.sequence = sequence;
        self
    }

    /// Set the file kind.
    #[must_use]
    pub fn with_file_kind(mut self, file_kind: FileKind) -> Self {
        self.header.file_kind = file_kind;
        self
    }

    /// Set the owning operation id.
    #[must_use]
    pub fn with_operation_id(mut self, operation_id: u8) -> Self {
        self.header.operation_id = operation_id;
        self
    }

    /// Set whether more frames follow.
    #[must_use]
    pub fn with_continuation(mut self, continuation: bool) -> Self {
        self.header.continuation = continuation;
        self
    }

    /// Borrow the header.
    #[must_use]
    pub const fn header(&self) -> &PacketHeader { &self.header }

    /// Purpose of the packet.
    #[must_use]
    pub const fn request_type(&self) -> RequestType { self.header.request_type }

    /// Sequence number within the logical transfer.
    #[must_use]
    pub const fn sequence(&self) -> u16 { self.header.sequence }

    /// Storage area the packet refers to.
    #[must_use]
    pub const fn file_kind(&self) -> FileKind { self.header.file_kind }

    /// Handler owning the packet.
    #[must_use]
    pub const fn operation_id(&self) -> u8 { self.header.operation_id }

    /// `true` when more frames follow.
    #[must_use]
    pub const fn continuation(&self) -> bool { self.header.continuation }

    /// Borrow the payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] { &self.payload }

    /// Consume the packet, returning its payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes { self.payload }

    /// Error code carried by a `Suspend` packet, if any.
    #[must_use]
    pub fn suspend_code(&self) -> Option<ErrorCode> {
        match self.request_type() {
            RequestType::Suspend => self.payload.first().map(|&b| ErrorCode::from_byte(b)),
            _ => None,
        }
    }
}
