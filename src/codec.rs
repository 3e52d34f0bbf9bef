//! Framing for the fixed-header packet protocol.
//!
//! Inbound bytes arrive in arbitrary chunks and are stitched back into
//! [`Packet`]s by a [`FrameAssembler`]. Outbound packets are staged whole by a
//! [`FrameSender`] and written in bounded slices. [`PacketCodec`] wraps the
//! assembler for use with `tokio_util::codec::Framed`, which the test client
//! relies on.
//!
//! # Error Handling
//!
//! Every framing fault is reported as a [`FrameError`] and is fatal to the
//! connection: the protocol has no resynchronisation marker.

use std::{collections::VecDeque, io};

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::packet::{HEADER_SIZE, Packet, encode_header};

mod assembler;
pub mod error;
mod sender;

pub use assembler::FrameAssembler;
pub use error::FrameError;
pub use sender::FrameSender;

/// Default upper bound on an inbound payload (512 KiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 512 * 1024;

/// Default size of a single outbound write (128 KiB).
pub const DEFAULT_SEND_CHUNK: usize = 128 * 1024;

/// Append the wire form of `packet` to `dst`.
///
/// # Errors
///
/// Returns [`FrameError::Oversized`] when the payload does not fit the
/// header's 32-bit length field.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use filewire::{
///     codec::encode_packet,
///     packet::{HEADER_SIZE, Packet},
/// };
///
/// let mut buf = BytesMut::new();
/// encode_packet(&Packet::connection_check(), &mut buf).expect("encode");
/// assert_eq!(buf.len(), HEADER_SIZE + 1);
/// ```
pub fn encode_packet(packet: &Packet, dst: &mut BytesMut) -> Result<(), FrameError> {
    let payload = packet.payload();
    let max = usize::try_from(u32::MAX).unwrap_or(usize::MAX);
    if payload.len() > max {
        return Err(FrameError::Oversized {
            size: payload.len(),
            max,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&encode_header(packet.header()));
    dst.put_slice(payload);
    Ok(())
}

/// `tokio_util` codec speaking the packet protocol.
///
/// Decoding drains whatever bytes are buffered into the assembler, so packets
/// are yielded in arrival order regardless of how the stream was chunked.
#[derive(Debug)]
pub struct PacketCodec {
    assembler: FrameAssembler,
    ready: VecDeque<Packet>,
}

impl PacketCodec {
    /// Create a codec accepting payloads of at most `max_payload` bytes.
    #[must_use]
    pub fn new(max_payload: usize) -> Self {
        Self {
            assembler: FrameAssembler::new(max_payload),
            ready: VecDeque::new(),
        }
    }
}

impl Default for PacketCodec {
    fn default() -> Self { Self::new(DEFAULT_MAX_PAYLOAD) }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.ready.is_empty() && !src.is_empty() {
            let chunk = src.split();
            self.assembler.feed(&chunk, &mut self.ready)?;
        }
        Ok(self.ready.pop_front())
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(packet) = self.decode(src)? {
            return Ok(Some(packet));
        }
        self.assembler.finish()?;
        Ok(None)
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_packet(&item, dst).map_err(io::Error::from)
    }
}
