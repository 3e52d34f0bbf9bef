//! Unit tests for the dispatcher.

use std::time::Duration;

use tempfile::TempDir;
use tokio::time::timeout;

use super::*;
use crate::packet::{FileDescriptor, FileKind, FileRequest, payload::parse_user_id};

const LIMITS: HandlerLimits = HandlerLimits {
    download_chunk: 8,
    max_upload: 1024,
};

async fn store() -> (TempDir, Arc<FileStore>) {
    let dir = TempDir::new().expect("create temp dir");
    let store = FileStore::bootstrap(dir.path())
        .await
        .expect("bootstrap store");
    (dir, Arc::new(store))
}

async fn next(rx: &mut PacketReceiver) -> Packet {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("reply in time")
        .expect("queue open")
}

fn upload_info(op: u8, name: &str, size: u32) -> Packet {
    let payload = FileDescriptor {
        size,
        user_id: 1,
        name: name.into(),
    }
    .encode()
    .expect("encode descriptor");
    Packet::new(RequestType::FileInfo, payload)
        .with_file_kind(FileKind::User)
        .with_operation_id(op)
        .with_continuation(true)
}

#[tokio::test]
async fn id_request_starts_a_handler() {
    let (_dir, store) = store().await;
    let mut session = Session::new();
    let mut outbound = session.take_outbound().expect("outbound receiver");
    let mut dispatcher = Dispatcher::new(&session, store, LIMITS);

    let flow = dispatcher.dispatch(Packet::new(RequestType::IdRequest, Vec::new()).with_operation_id(4));
    assert_eq!(flow, ControlFlow::Continue(()));

    let reply = next(&mut outbound).await;
    assert_eq!(reply.request_type(), RequestType::Id);
    assert_eq!(reply.operation_id(), 4);
    assert_eq!(parse_user_id(reply.payload()).expect("user id"), 1);
    dispatcher.drain().await;
    assert_eq!(session.user_id(), 1);
    assert_eq!(dispatcher.state(), DispatchState::Closed);
}

#[tokio::test]
async fn unmatched_continuation_is_dropped() {
    let (_dir, store) = store().await;
    let mut session = Session::new();
    let mut outbound = session.take_outbound().expect("outbound receiver");
    let mut dispatcher = Dispatcher::new(&session, store, LIMITS);

    let stray = Packet::new(RequestType::File, vec![1, 2, 3]).with_operation_id(9);
    assert_eq!(dispatcher.dispatch(stray), ControlFlow::Continue(()));
    assert_eq!(dispatcher.state(), DispatchState::Idle);
    assert!(outbound.try_recv().is_none());
}

#[tokio::test]
async fn upload_receives_routed_chunks() {
    let (dir, store) = store().await;
    let mut session = Session::new();
    let mut outbound = session.take_outbound().expect("outbound receiver");
    let mut dispatcher = Dispatcher::new(&session, store, LIMITS);
    std::fs::create_dir(dir.path().join("user/1")).expect("create user dir");

    let _ = dispatcher.dispatch(upload_info(2, "b.bin", 5));
    assert_eq!(dispatcher.state(), DispatchState::Active);
    assert_eq!(dispatcher.active_ids(), vec![2]);
    let stray = Packet::new(RequestType::File, vec![0xee]).with_operation_id(3);
    let _ = dispatcher.dispatch(stray);
    for (chunk, more) in [(&b"abc"[..], true), (&b"de"[..], false)] {
        let packet = Packet::new(RequestType::File, chunk.to_vec())
            .with_operation_id(2)
            .with_continuation(more);
        let _ = dispatcher.dispatch(packet);
    }

    let reply = next(&mut outbound).await;
    assert_eq!(reply.request_type(), RequestType::FileSaveDone);
    assert_eq!(reply.payload(), [ErrorCode::Success.as_byte()]);
    dispatcher.drain().await;
    let saved = std::fs::read(dir.path().join("user/1/b.bin")).expect("read upload");
    assert_eq!(saved, b"abcde");
}

#[tokio::test]
async fn colliding_operation_id_is_refused() {
    let (_dir, store) = store().await;
    let mut session = Session::new();
    let mut outbound = session.take_outbound().expect("outbound receiver");
    let mut dispatcher = Dispatcher::new(&session, store, LIMITS);

    let _ = dispatcher.dispatch(upload_info(7, "c.bin", 4));
    let request = FileRequest {
        user_id: 1,
        name: "c.bin".into(),
    }
    .encode()
    .expect("encode request");
    let _ = dispatcher.dispatch(
        Packet::new(RequestType::FileRequest, request)
            .with_file_kind(FileKind::User)
            .with_operation_id(7),
    );

    let refusal = next(&mut outbound).await;
    assert_eq!(refusal.request_type(), RequestType::Error);
    assert_eq!(refusal.operation_id(), 7);
    assert_eq!(
        refusal.payload(),
        [
            RequestType::FileRequest.as_byte(),
            ErrorCode::InvalidPacket.as_byte()
        ]
    );
    assert_eq!(dispatcher.active_ids(), vec![7]);
}

#[tokio::test]
async fn suspend_fans_out_and_kills_the_session() {
    let (_dir, store) = store().await;
    let mut session = Session::new();
    let mut outbound = session.take_outbound().expect("outbound receiver");
    let mut dispatcher = Dispatcher::new(&session, store, LIMITS);

    let _ = dispatcher.dispatch(upload_info(1, "d.bin", 4));
    let flow = dispatcher.dispatch(Packet::suspend(ErrorCode::SocketClosed));
    assert_eq!(flow, ControlFlow::Break(ErrorCode::SocketClosed));
    assert_eq!(dispatcher.state(), DispatchState::Draining);
    assert!(!session.is_live());

    timeout(Duration::from_secs(5), dispatcher.drain())
        .await
        .expect("handlers finish");
    assert!(dispatcher.active_ids().is_empty());
    assert!(outbound.try_recv().is_none(), "suspend aborts silently");
}

#[tokio::test]
async fn connection_check_and_stray_replies_are_ignored() {
    let (_dir, store) = store().await;
    let mut session = Session::new();
    let mut outbound = session.take_outbound().expect("outbound receiver");
    let mut dispatcher = Dispatcher::new(&session, store, LIMITS);

    for packet in [
        Packet::connection_check(),
        Packet::new(RequestType::Id, vec![1, 0, 0, 0]),
        Packet::new(RequestType::HealthRecord, Vec::new()),
    ] {
        assert_eq!(dispatcher.dispatch(packet), ControlFlow::Continue(()));
    }
    assert!(outbound.try_recv().is_none());
    assert!(session.is_live());
}

#[tokio::test]
async fn shutdown_suspends_with_manual_shutdown() {
    let (_dir, store) = store().await;
    let mut session = Session::new();
    let inbox = session.take_inbound().expect("inbound receiver");
    let dispatcher = Dispatcher::new(&session, store, LIMITS);
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let code = timeout(Duration::from_secs(5), dispatcher.run(inbox, shutdown))
        .await
        .expect("dispatcher stops");
    assert_eq!(code, ErrorCode::ManualShutdown);
    assert_eq!(session.farewell(), Some(ErrorCode::ManualShutdown));
    assert!(!session.is_live());
}

#[tokio::test]
async fn run_stops_on_injected_suspend() {
    let (_dir, store) = store().await;
    let mut session = Session::new();
    let inbox = session.take_inbound().expect("inbound receiver");
    session
        .inbound()
        .send(Packet::suspend(ErrorCode::ConnectionCheckFailed))
        .expect("queue open");
    let dispatcher = Dispatcher::new(&session, store, LIMITS);

    let code = dispatcher.run(inbox, CancellationToken::new()).await;
    assert_eq!(code, ErrorCode::ConnectionCheckFailed);
    assert_eq!(session.farewell(), None);
}
