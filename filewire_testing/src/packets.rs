//! Builders for client-side request packets.

use filewire::packet::{FileDescriptor, FileKind, FileRequest, Packet, RequestType};

/// `FileRequest` asking for `name` owned by `user_id`.
///
/// # Panics
///
/// Panics if `name` cannot be encoded.
#[must_use]
pub fn file_request(user_id: u32, kind: FileKind, name: &str, operation_id: u8) -> Packet {
    let payload = FileRequest {
        user_id,
        name: name.to_owned(),
    }
    .encode()
    .expect("encode file request");
    Packet::new(RequestType::FileRequest, payload)
        .with_file_kind(kind)
        .with_operation_id(operation_id)
}

/// `FileInfo` announcing an upload of `size` bytes.
///
/// # Panics
///
/// Panics if `name` cannot be encoded.
#[must_use]
pub fn file_info(size: u32, user_id: u32, kind: FileKind, name: &str, operation_id: u8) -> Packet {
    let payload = FileDescriptor {
        size,
        user_id,
        name: name.to_owned(),
    }
    .encode()
    .expect("encode file descriptor");
    Packet::new(RequestType::FileInfo, payload)
        .with_file_kind(kind)
        .with_operation_id(operation_id)
        .with_continuation(true)
}

/// Split `data` into `File` packets of at most `chunk` bytes, the last one
/// marked final. Empty data yields a single empty final packet.
#[must_use]
pub fn file_chunks(data: &[u8], chunk: usize, operation_id: u8) -> Vec<Packet> {
    if data.is_empty() {
        return vec![Packet::new(RequestType::File, Vec::new()).with_operation_id(operation_id)];
    }
    let count = data.len().div_ceil(chunk.max(1));
    data.chunks(chunk.max(1))
        .enumerate()
        .map(|(i, part)| {
            Packet::new(RequestType::File, part.to_vec())
                .with_sequence(u16::try_from(i + 1).unwrap_or(u16::MAX))
                .with_operation_id(operation_id)
                .with_continuation(i + 1 < count)
        })
        .collect()
}

/// `IdRequest` for a new user id.
#[must_use]
pub fn id_request(operation_id: u8) -> Packet {
    Packet::new(RequestType::IdRequest, Vec::new()).with_operation_id(operation_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_mark_only_the_last_final() {
        let packets = file_chunks(b"abcdefg", 3, 4);
        let flags: Vec<_> = packets.iter().map(Packet::continuation).collect();
        assert_eq!(flags, [true, true, false]);
        assert!(packets.iter().all(|p| p.operation_id() == 4));
        assert_eq!(packets[2].payload(), b"g");
    }
}
