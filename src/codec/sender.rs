//! Chunked writer for the send path.

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{FrameError, encode_packet};
use crate::packet::Packet;

/// Stages one encoded packet at a time and writes it in bounded slices.
///
/// A partially written packet is finished before the next is staged, so
/// frames from different operations never interleave on the wire.
#[derive(Debug)]
pub struct FrameSender {
    chunk_size: usize,
    staged: BytesMut,
    sent: usize,
}

impl FrameSender {
    /// Create a sender writing at most `chunk_size` bytes per write.
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            staged: BytesMut::with_capacity(chunk_size),
            sent: 0,
        }
    }

    /// Largest slice handed to a single write.
    #[must_use]
    pub const fn chunk_size(&self) -> usize { self.chunk_size }

    /// Report whether no packet is waiting to be written.
    #[must_use]
    pub fn is_idle(&self) -> bool { self.staged.is_empty() }

    /// Bytes of the staged packet not yet written.
    #[must_use]
    pub fn remaining(&self) -> usize { self.staged.len() - self.sent }

    /// Encode `packet` into the staging buffer.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Oversized`] when the packet cannot be encoded.
    pub fn stage(&mut self, packet: &Packet) -> Result<(), FrameError> {
        debug_assert!(self.is_idle(), "previous packet must be fully written");
        self.staged.clear();
        self.sent = 0;
        encode_packet(packet, &mut self.staged)
    }

    /// Write the next slice of the staged packet.
    ///
    /// Returns the number of bytes written; `0` when nothing is staged.
    ///
    /// # Errors
    ///
    /// Propagates write failures. A writer accepting zero bytes yields
    /// [`io::ErrorKind::WriteZero`].
    pub async fn write_chunk<W>(&mut self, writer: &mut W) -> io::Result<usize>
    where
        W: AsyncWrite + Unpin,
    {
        if self.is_idle() {
            return Ok(0);
        }
        let end = (self.sent + self.chunk_size).min(self.staged.len());
        let written = writer.write(&self.staged[self.sent..end]).await?;
        if written == 0 {
            return Err(io::ErrorKind::WriteZero.into());
        }
        self.sent += written;
        if self.sent == self.staged.len() {
            self.staged.clear();
            self.sent = 0;
        }
        Ok(written)
    }

    /// Write the rest of the staged packet and flush `writer`.
    ///
    /// # Errors
    ///
    /// Propagates write and flush failures.
    pub async fn flush_staged<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while !self.is_idle() {
            self.write_chunk(writer).await?;
        }
        writer.flush().await
    }

    /// Stage `packet` and write it completely.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] if encoding or writing fails.
    pub async fn send<W>(&mut self, packet: &Packet, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        self.stage(packet)?;
        self.flush_staged(writer).await
    }

    /// Drop any staged bytes.
    pub fn reset(&mut self) {
        self.staged.clear();
        self.sent = 0;
    }
}
