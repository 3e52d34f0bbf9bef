//! A framed protocol client for driving a server in tests.

use std::{net::SocketAddr, time::Duration};

use filewire::{
    ErrorCode,
    FileKind,
    Packet,
    PacketCodec,
    RequestType,
    packet::{FileDescriptor, payload::parse_user_id},
};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::packets::{file_chunks, file_info, file_request, id_request};

/// How long [`TestClient::recv`] waits before giving up.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Client end of one connection, speaking whole packets.
#[derive(Debug)]
pub struct TestClient {
    framed: Framed<TcpStream, PacketCodec>,
}

impl TestClient {
    /// Connect to `addr`.
    ///
    /// # Panics
    ///
    /// Panics if the connection is refused.
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect to server");
        Self {
            framed: Framed::new(stream, PacketCodec::default()),
        }
    }

    /// Send one packet.
    ///
    /// # Panics
    ///
    /// Panics if the write fails.
    pub async fn send(&mut self, packet: Packet) {
        self.framed.send(packet).await.expect("send packet");
    }

    /// Write raw bytes, bypassing the codec.
    ///
    /// # Panics
    ///
    /// Panics if the write fails.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        use tokio::io::AsyncWriteExt;
        self.framed
            .get_mut()
            .write_all(bytes)
            .await
            .expect("write raw bytes");
    }

    /// Next packet of any type, or `None` once the server closes.
    ///
    /// # Panics
    ///
    /// Panics on a decode error or if nothing arrives within five seconds.
    pub async fn recv_raw(&mut self) -> Option<Packet> {
        tokio::time::timeout(RECV_TIMEOUT, self.framed.next())
            .await
            .expect("packet in time")
            .map(|res| res.expect("decode packet"))
    }

    /// Next packet that is not a keepalive probe.
    ///
    /// # Panics
    ///
    /// Panics as [`recv_raw`](Self::recv_raw) does, or if the server closes.
    pub async fn recv(&mut self) -> Packet {
        loop {
            let packet = self.recv_raw().await.expect("connection open");
            if packet.request_type() != RequestType::ConnectionCheck {
                return packet;
            }
        }
    }

    /// Download `name` from `user_id`'s directory.
    ///
    /// Returns the `FileInfo` packet and the reassembled body.
    ///
    /// # Panics
    ///
    /// Panics if the server answers with anything but a complete download.
    pub async fn download(&mut self, user_id: u32, name: &str, operation_id: u8) -> (Packet, Vec<u8>) {
        self.send(file_request(user_id, FileKind::User, name, operation_id))
            .await;
        let info = self.recv().await;
        assert_eq!(
            info.request_type(),
            RequestType::FileInfo,
            "expected FileInfo, got {info:?}"
        );
        let size = FileDescriptor::parse(info.payload())
            .expect("parse file descriptor")
            .size;
        let mut body = Vec::new();
        loop {
            let chunk = self.recv().await;
            assert_eq!(chunk.request_type(), RequestType::File, "expected File, got {chunk:?}");
            assert_eq!(chunk.operation_id(), operation_id);
            body.extend_from_slice(chunk.payload());
            if !chunk.continuation() {
                break;
            }
        }
        assert_eq!(
            u32::try_from(body.len()).ok(),
            Some(size),
            "body length matches FileInfo"
        );
        (info, body)
    }

    /// Upload `data` as `name` into `user_id`'s directory in `chunk`-byte
    /// packets and return the server's reply.
    ///
    /// # Panics
    ///
    /// Panics if `data` is longer than `u32::MAX` or a write fails.
    pub async fn upload(
        &mut self,
        user_id: u32,
        name: &str,
        data: &[u8],
        chunk: usize,
        operation_id: u8,
    ) -> Packet {
        let size = u32::try_from(data.len()).expect("upload fits in u32");
        self.send(file_info(size, user_id, FileKind::User, name, operation_id))
            .await;
        for packet in file_chunks(data, chunk, operation_id) {
            self.send(packet).await;
        }
        self.recv().await
    }

    /// Request a new user id.
    ///
    /// # Panics
    ///
    /// Panics if the server answers with anything but an `Id` packet.
    pub async fn request_id(&mut self, operation_id: u8) -> u32 {
        self.send(id_request(operation_id)).await;
        let reply = self.recv().await;
        assert_eq!(reply.request_type(), RequestType::Id, "expected Id, got {reply:?}");
        parse_user_id(reply.payload()).expect("parse user id")
    }

    /// Send a `Suspend` carrying `code`.
    ///
    /// # Panics
    ///
    /// Panics if the write fails.
    pub async fn suspend(&mut self, code: ErrorCode) { self.send(Packet::suspend(code)).await; }

    /// Wait for the server to close the connection, returning any packets
    /// received first.
    ///
    /// A read error such as a reset counts as closed.
    ///
    /// # Panics
    ///
    /// Panics if the connection stays open for more than five seconds
    /// without traffic.
    pub async fn drain_until_closed(&mut self) -> Vec<Packet> {
        let mut seen = Vec::new();
        loop {
            let next = tokio::time::timeout(RECV_TIMEOUT, self.framed.next())
                .await
                .expect("connection closed in time");
            match next {
                Some(Ok(packet)) => seen.push(packet),
                Some(Err(_)) | None => return seen,
            }
        }
    }
}
