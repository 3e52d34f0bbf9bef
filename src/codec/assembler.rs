//! Incremental frame reassembly for the receive path.

use bytes::BytesMut;

use super::FrameError;
use crate::packet::{HEADER_SIZE, Packet, PacketHeader, decode_header};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    /// Accumulating the fixed header.
    Header,
    /// Header decoded; accumulating `header.data_size` payload bytes.
    Payload(PacketHeader),
}

/// Turns an arbitrarily chunked byte stream into [`Packet`]s.
///
/// The assembler alternates between collecting [`HEADER_SIZE`] header bytes
/// and collecting the payload the header announces. A chunk may complete
/// several packets or none; completed packets are emitted in stream order.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use filewire::{
///     codec::{FrameAssembler, encode_packet},
///     packet::{Packet, RequestType},
/// };
///
/// let mut wire = BytesMut::new();
/// encode_packet(&Packet::new(RequestType::File, &b"hello"[..]), &mut wire).expect("encode");
///
/// let mut assembler = FrameAssembler::new(1024);
/// let mut out = Vec::new();
/// let (head, tail) = wire.split_at(4);
/// assembler.feed(head, &mut out).expect("partial header");
/// assert!(out.is_empty());
/// assembler.feed(tail, &mut out).expect("rest of frame");
/// assert_eq!(out[0].payload(), b"hello");
/// ```
#[derive(Debug)]
pub struct FrameAssembler {
    max_payload: usize,
    phase: Phase,
    buffer: BytesMut,
}

impl FrameAssembler {
    /// Create an assembler rejecting payloads longer than `max_payload`.
    #[must_use]
    pub fn new(max_payload: usize) -> Self {
        Self {
            max_payload,
            phase: Phase::Header,
            buffer: BytesMut::with_capacity(HEADER_SIZE),
        }
    }

    /// Largest payload this assembler accepts.
    #[must_use]
    pub const fn max_payload(&self) -> usize { self.max_payload }

    /// Consume `chunk`, pushing every packet it completes into `out`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::BadMagic`] or [`FrameError::BadMarker`] for a
    /// malformed header and [`FrameError::Oversized`] when the announced
    /// payload exceeds [`max_payload`](Self::max_payload). Packets completed
    /// earlier in the same chunk are still pushed. After an error the
    /// assembler is reset; the stream it was reading cannot be trusted.
    pub fn feed<E>(&mut self, mut chunk: &[u8], out: &mut E) -> Result<(), FrameError>
    where
        E: Extend<Packet>,
    {
        while !chunk.is_empty() {
            let wanted = self.target() - self.buffer.len();
            let take = wanted.min(chunk.len());
            let (head, rest) = chunk.split_at(take);
            self.buffer.extend_from_slice(head);
            chunk = rest;
            if self.buffer.len() == self.target()
                && let Err(e) = self.complete_step(out)
            {
                self.reset();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Check that the stream ended on a frame boundary.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Truncated`] when a partial frame is buffered.
    pub fn finish(&self) -> Result<(), FrameError> {
        if self.is_idle() {
            return Ok(());
        }
        let (buffered, expected) = match self.phase {
            Phase::Header => (self.buffer.len(), HEADER_SIZE),
            Phase::Payload(header) => (
                HEADER_SIZE + self.buffer.len(),
                HEADER_SIZE + payload_len(&header),
            ),
        };
        Err(FrameError::Truncated { buffered, expected })
    }

    /// Discard any partial frame and wait for a fresh header.
    pub fn reset(&mut self) {
        self.phase = Phase::Header;
        self.buffer.clear();
    }

    /// Report whether no partial frame is buffered.
    #[must_use]
    pub fn is_idle(&self) -> bool { self.phase == Phase::Header && self.buffer.is_empty() }

    fn target(&self) -> usize {
        match self.phase {
            Phase::Header => HEADER_SIZE,
            Phase::Payload(header) => payload_len(&header),
        }
    }

    fn complete_step<E>(&mut self, out: &mut E) -> Result<(), FrameError>
    where
        E: Extend<Packet>,
    {
        match self.phase {
            Phase::Header => {
                let mut raw = [0u8; HEADER_SIZE];
                raw.copy_from_slice(&self.buffer);
                let header = decode_header(&raw)?;
                let size = payload_len(&header);
                if size > self.max_payload {
                    return Err(FrameError::Oversized {
                        size,
                        max: self.max_payload,
                    });
                }
                self.buffer.clear();
                self.buffer.reserve(size);
                self.phase = Phase::Payload(header);
                if size == 0 {
                    self.emit(header, out);
                }
            }
            Phase::Payload(header) => self.emit(header, out),
        }
        Ok(())
    }

    fn emit<E>(&mut self, header: PacketHeader, out: &mut E)
    where
        E: Extend<Packet>,
    {
        let payload = self.buffer.split().freeze();
        self.phase = Phase::Header;
        out.extend(std::iter::once(Packet::from_wire(header, payload)));
    }
}

fn payload_len(header: &PacketHeader) -> usize {
    usize::try_from(header.data_size).unwrap_or(usize::MAX)
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;
    use crate::{
        codec::encode_packet,
        packet::{FileKind, RequestType},
    };

    fn wire(packets: &[Packet]) -> BytesMut {
        let mut buf = BytesMut::new();
        for packet in packets {
            encode_packet(packet, &mut buf).expect("encode packet");
        }
        buf
    }

    fn sample_packets() -> Vec<Packet> {
        vec![
            Packet::new(RequestType::FileRequest, vec![1u8; 20]).with_operation_id(1),
            Packet::connection_check(),
            Packet::new(RequestType::File, Vec::new())
                .with_operation_id(2)
                .with_file_kind(FileKind::User),
            Packet::new(RequestType::File, vec![7u8; 300])
                .with_sequence(9)
                .with_continuation(true),
        ]
    }

    #[test]
    fn emits_every_packet_of_a_single_chunk_in_order() {
        let packets = sample_packets();
        let mut assembler = FrameAssembler::new(1024);
        let mut out = Vec::new();
        assembler
            .feed(&wire(&packets), &mut out)
            .expect("valid stream");
        assert_eq!(out, packets);
        assert!(assembler.is_idle());
    }

    #[test]
    fn zero_length_payload_completes_with_its_header() {
        let packet = Packet::new(RequestType::IdRequest, Vec::new()).with_operation_id(3);
        let mut assembler = FrameAssembler::new(16);
        let mut out = Vec::new();
        assembler
            .feed(&wire(std::slice::from_ref(&packet)), &mut out)
            .expect("valid header");
        assert_eq!(out, vec![packet]);
    }

    #[rstest]
    #[case::at_limit(64, true)]
    #[case::over_limit(65, false)]
    fn enforces_payload_limit(#[case] size: usize, #[case] accepted: bool) {
        let packet = Packet::new(RequestType::File, vec![0u8; size]);
        let mut assembler = FrameAssembler::new(64);
        let mut out = Vec::new();
        let result = assembler.feed(&wire(&[packet]), &mut out);
        if accepted {
            assert_eq!(result, Ok(()));
            assert_eq!(out.len(), 1);
        } else {
            assert_eq!(result, Err(FrameError::Oversized { size, max: 64 }));
            assert!(out.is_empty());
            assert!(assembler.is_idle());
        }
    }

    #[test]
    fn packets_before_a_bad_header_are_still_emitted() {
        let mut bytes = wire(&[Packet::connection_check()]);
        bytes.extend_from_slice(&[0x02; HEADER_SIZE]);
        let mut assembler = FrameAssembler::new(64);
        let mut out = Vec::new();
        let result = assembler.feed(&bytes, &mut out);
        assert_eq!(result, Err(FrameError::BadMagic { found: 0x02 }));
        assert_eq!(out, vec![Packet::connection_check()]);
    }

    #[rstest]
    #[case::mid_header(5, 5, HEADER_SIZE)]
    #[case::mid_payload(HEADER_SIZE + 3, HEADER_SIZE + 3, HEADER_SIZE + 10)]
    fn finish_reports_truncation(
        #[case] cut: usize,
        #[case] buffered: usize,
        #[case] expected: usize,
    ) {
        let bytes = wire(&[Packet::new(RequestType::File, vec![1u8; 10])]);
        let mut assembler = FrameAssembler::new(64);
        let mut out: Vec<Packet> = Vec::new();
        assembler.feed(&bytes[..cut], &mut out).expect("partial");
        assert_eq!(
            assembler.finish(),
            Err(FrameError::Truncated { buffered, expected })
        );
        assembler.reset();
        assert_eq!(assembler.finish(), Ok(()));
    }

    proptest! {
        #[test]
        fn chunking_does_not_change_output(cuts in proptest::collection::vec(1usize..64, 0..40)) {
            let packets = sample_packets();
            let bytes = wire(&packets);
            let mut assembler = FrameAssembler::new(1024);
            let mut out = Vec::new();
            let mut rest = &bytes[..];
            for cut in cuts {
                let (head, tail) = rest.split_at(cut.min(rest.len()));
                assembler.feed(head, &mut out).expect("valid stream");
                rest = tail;
            }
            assembler.feed(rest, &mut out).expect("valid stream");
            prop_assert_eq!(out, packets);
            prop_assert!(assembler.is_idle());
        }
    }
}
