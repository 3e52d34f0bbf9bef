//! Tests driving [`serve_connection`] over in-memory streams.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rstest::{fixture, rstest};
use tempfile::TempDir;
use tokio::{
    io::{AsyncWriteExt, DuplexStream, duplex},
    task::JoinHandle,
};
use tokio_util::codec::Framed;

use super::*;
use crate::{
    codec::PacketCodec,
    config::LivenessConfig,
    packet::{FileDescriptor, FileKind, FileRequest, Packet, RequestType},
};

type Client = Framed<DuplexStream, PacketCodec>;

#[fixture]
fn config() -> ServerConfig {
    ServerConfig {
        download_chunk: 4,
        send_chunk: 3,
        liveness: LivenessConfig {
            keepalive: Duration::from_secs(1),
            window: Duration::from_secs(4),
            handshake: Duration::from_secs(2),
        },
        ..ServerConfig::default()
    }
}

struct Served {
    _dir: TempDir,
    client: Client,
    shutdown: CancellationToken,
    task: JoinHandle<(ErrorCode, ConnectionSlot)>,
}

async fn serve(config: ServerConfig) -> Served {
    let dir = TempDir::new().expect("create temp dir");
    let store = Arc::new(
        FileStore::bootstrap(dir.path())
            .await
            .expect("bootstrap store"),
    );
    std::fs::create_dir(dir.path().join("user/7")).expect("create user dir");
    std::fs::write(dir.path().join("user/7/a.txt"), b"hello world").expect("write file");

    let (client, server) = duplex(64 * 1024);
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let task = tokio::spawn(async move {
        let mut slot = ConnectionSlot::new(&config);
        let code = serve_connection(&mut slot, server, store, &config, &token).await;
        (code, slot)
    });
    Served {
        _dir: dir,
        client: Framed::new(client, PacketCodec::default()),
        shutdown,
        task,
    }
}

async fn next_frame(client: &mut Client) -> Packet {
    client
        .next()
        .await
        .expect("stream open")
        .expect("valid frame")
}

/// Next packet that is not a keepalive probe.
async fn next(client: &mut Client) -> Packet {
    loop {
        let packet = next_frame(client).await;
        if packet.request_type() != RequestType::ConnectionCheck {
            return packet;
        }
    }
}

fn download_request(op: u8) -> Packet {
    let payload = FileRequest {
        user_id: 7,
        name: "a.txt".into(),
    }
    .encode()
    .expect("encode request");
    Packet::new(RequestType::FileRequest, payload)
        .with_file_kind(FileKind::User)
        .with_operation_id(op)
}

#[rstest]
#[tokio::test]
async fn streams_a_download(config: ServerConfig) {
    let mut served = serve(config).await;
    served
        .client
        .send(download_request(3))
        .await
        .expect("send request");

    let info = next(&mut served.client).await;
    assert_eq!(info.request_type(), RequestType::FileInfo);
    let descriptor = FileDescriptor::parse(info.payload()).expect("descriptor");
    assert_eq!((descriptor.size, descriptor.user_id), (11, 7));

    let mut body = Vec::new();
    loop {
        let packet = next(&mut served.client).await;
        assert_eq!(packet.request_type(), RequestType::File);
        assert_eq!(packet.operation_id(), 3);
        body.extend_from_slice(packet.payload());
        if !packet.continuation() {
            break;
        }
    }
    assert_eq!(body, b"hello world");

    drop(served.client);
    let (code, slot) = served.task.await.expect("connection task");
    assert_eq!(code, ErrorCode::SocketClosed);
    assert!(!slot.session().is_live());
}

#[rstest]
#[tokio::test]
async fn malformed_frame_gets_a_farewell(config: ServerConfig) {
    let mut served = serve(config).await;
    served
        .client
        .get_mut()
        .write_all(&[0x7f; 11])
        .await
        .expect("write garbage");

    let farewell = next(&mut served.client).await;
    assert_eq!(farewell.suspend_code(), Some(ErrorCode::InvalidPacket));
    assert!(served.client.next().await.is_none(), "socket closed after farewell");
    let (code, _) = served.task.await.expect("connection task");
    assert_eq!(code, ErrorCode::InvalidPacket);
}

#[rstest]
#[tokio::test]
async fn shutdown_suspends_the_client(config: ServerConfig) {
    let mut served = serve(config).await;
    served.shutdown.cancel();

    let farewell = next(&mut served.client).await;
    assert_eq!(farewell.suspend_code(), Some(ErrorCode::ManualShutdown));
    let (code, _) = served.task.await.expect("connection task");
    assert_eq!(code, ErrorCode::ManualShutdown);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn silent_client_fails_the_connection_check(config: ServerConfig) {
    let mut served = serve(config).await;

    let mut probes = 0;
    let farewell = loop {
        let packet = next_frame(&mut served.client).await;
        if packet.request_type() == RequestType::ConnectionCheck {
            probes += 1;
            continue;
        }
        break packet;
    };
    assert!(probes >= 1, "keepalive probes precede the timeout");
    assert_eq!(
        farewell.suspend_code(),
        Some(ErrorCode::ConnectionCheckFailed)
    );
    let (code, _) = served.task.await.expect("connection task");
    assert_eq!(code, ErrorCode::ConnectionCheckFailed);
}

#[rstest]
#[tokio::test]
async fn peer_suspend_closes_without_farewell(config: ServerConfig) {
    let mut served = serve(config).await;
    served
        .client
        .send(Packet::suspend(ErrorCode::ManualShutdown))
        .await
        .expect("send suspend");

    let (code, _) = served.task.await.expect("connection task");
    assert_eq!(code, ErrorCode::ManualShutdown);
    while let Some(frame) = served.client.next().await {
        let packet = frame.expect("valid frame");
        assert_eq!(packet.request_type(), RequestType::ConnectionCheck);
    }
}

#[rstest]
#[tokio::test]
async fn recycled_slot_is_pristine(config: ServerConfig) {
    let served = serve(config).await;
    drop(served.client);
    let (_, mut slot) = served.task.await.expect("connection task");
    assert!(!slot.is_pristine());

    slot.recycle();
    assert!(slot.is_pristine());
    assert!(slot.session_mut().take_inbound().is_some());
}
