//! Payload layouts for the request types the server understands.
//!
//! All integers are little-endian. File names are ASCII and prefixed by a
//! single length byte, so they are at most 255 bytes long.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{ErrorCode, RequestType};
use crate::byte_order::{read_wire_u32, write_wire_u32};

/// Errors raised while parsing or building a payload.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    /// The payload ended before a field was complete.
    #[error("payload truncated: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required to read the field.
        needed: usize,
        /// Bytes present in the payload.
        available: usize,
    },
    /// The file name contained non-ASCII bytes.
    #[error("file name is not ASCII")]
    NameNotAscii,
    /// The file name does not fit the one-byte length prefix.
    #[error("file name is {len} bytes; at most 255 are allowed")]
    NameTooLong {
        /// Length of the rejected name.
        len: usize,
    },
}

fn read_u32(payload: &[u8], at: usize) -> Result<u32, PayloadError> {
    let end = at + 4;
    let field = payload.get(at..end).ok_or(PayloadError::Truncated {
        needed: end,
        available: payload.len(),
    })?;
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(field);
    Ok(read_wire_u32(bytes))
}

fn read_name(payload: &[u8], len_at: usize) -> Result<String, PayloadError> {
    let len = usize::from(*payload.get(len_at).ok_or(PayloadError::Truncated {
        needed: len_at + 1,
        available: payload.len(),
    })?);
    let start = len_at + 1;
    let raw = payload
        .get(start..start + len)
        .ok_or(PayloadError::Truncated {
            needed: start + len,
            available: payload.len(),
        })?;
    if !raw.is_ascii() {
        return Err(PayloadError::NameNotAscii);
    }
    Ok(raw.iter().map(|&b| char::from(b)).collect())
}

fn put_name(buf: &mut BytesMut, name: &str) -> Result<(), PayloadError> {
    if !name.is_ascii() {
        return Err(PayloadError::NameNotAscii);
    }
    let len = u8::try_from(name.len()).map_err(|_| PayloadError::NameTooLong { len: name.len() })?;
    buf.put_u8(len);
    buf.put_slice(name.as_bytes());
    Ok(())
}

/// Body of a `FileRequest`: `[user id: u32][name len: u8][name]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRequest {
    /// Owner of the requested file; selects the user directory.
    pub user_id: u32,
    /// File name relative to its root.
    pub name: String,
}

impl FileRequest {
    /// Parse a `FileRequest` payload.
    ///
    /// # Errors
    ///
    /// Returns a [`PayloadError`] when the payload is truncated or the name is
    /// not ASCII.
    pub fn parse(payload: &[u8]) -> Result<Self, PayloadError> {
        Ok(Self {
            user_id: read_u32(payload, 0)?,
            name: read_name(payload, 4)?,
        })
    }

    /// Build the wire payload.
    ///
    /// # Errors
    ///
    /// Returns a [`PayloadError`] when the name is not ASCII or too long.
    pub fn encode(&self) -> Result<Bytes, PayloadError> {
        let mut buf = BytesMut::with_capacity(5 + self.name.len());
        buf.put_slice(&write_wire_u32(self.user_id));
        put_name(&mut buf, &self.name)?;
        Ok(buf.freeze())
    }
}

/// Body of a `FileInfo`: `[size: u32][user id: u32][name len: u8][name]`.
///
/// Sent by the server ahead of a download and by clients to open an upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDescriptor {
    /// Total file length in bytes.
    pub size: u32,
    /// Owner of the file.
    pub user_id: u32,
    /// File name relative to its root.
    pub name: String,
}

impl FileDescriptor {
    /// Parse a `FileInfo` payload.
    ///
    /// # Errors
    ///
    /// Returns a [`PayloadError`] when the payload is truncated or the name is
    /// not ASCII.
    pub fn parse(payload: &[u8]) -> Result<Self, PayloadError> {
        Ok(Self {
            size: read_u32(payload, 0)?,
            user_id: read_u32(payload, 4)?,
            name: read_name(payload, 8)?,
        })
    }

    /// Build the wire payload.
    ///
    /// # Errors
    ///
    /// Returns a [`PayloadError`] when the name is not ASCII or too long.
    pub fn encode(&self) -> Result<Bytes, PayloadError> {
        let mut buf = BytesMut::with_capacity(9 + self.name.len());
        buf.put_slice(&write_wire_u32(self.size));
        buf.put_slice(&write_wire_u32(self.user_id));
        put_name(&mut buf, &self.name)?;
        Ok(buf.freeze())
    }
}

/// Body of an `Error` packet: the request that failed and why.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ErrorReport {
    /// Type of the request that failed.
    pub request: RequestType,
    /// Failure reason.
    pub code: ErrorCode,
}

impl ErrorReport {
    /// Parse an `Error` payload.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Truncated`] when fewer than two bytes are present.
    pub fn parse(payload: &[u8]) -> Result<Self, PayloadError> {
        match payload {
            [request, code, ..] => Ok(Self {
                request: RequestType::from_byte(*request),
                code: ErrorCode::from_byte(*code),
            }),
            _ => Err(PayloadError::Truncated {
                needed: 2,
                available: payload.len(),
            }),
        }
    }

    /// Build the wire payload.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(&[self.request.as_byte(), self.code.as_byte()])
    }
}

/// Build the payload of an `Id` packet.
#[must_use]
pub fn encode_user_id(user_id: u32) -> Bytes { Bytes::copy_from_slice(&write_wire_u32(user_id)) }

/// Parse the payload of an `Id` packet.
///
/// # Errors
///
/// Returns [`PayloadError::Truncated`] when fewer than four bytes are present.
pub fn parse_user_id(payload: &[u8]) -> Result<u32, PayloadError> { read_u32(payload, 0) }
