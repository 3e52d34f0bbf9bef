//! Connection lifecycle: id allocation, routing, liveness and teardown.

use std::time::Duration;

use filewire::{
    ErrorCode,
    FileKind,
    LivenessConfig,
    Packet,
    RequestType,
    ServerConfig,
    packet::ErrorReport,
};
use filewire_testing::{TestServer, TestStore, file_info, id_request, test_store, within};
use futures::future::join_all;
use rstest::rstest;
use tokio::time::{sleep, timeout};

fn short_liveness() -> ServerConfig {
    ServerConfig {
        liveness: LivenessConfig {
            keepalive: Duration::from_millis(50),
            window: Duration::from_millis(400),
            handshake: Duration::from_millis(300),
        },
        ..ServerConfig::default()
    }
}

#[rstest]
#[tokio::test]
async fn first_allocated_id_is_one(test_store: TestStore) {
    let server = TestServer::start(&test_store).await;
    let mut client = server.connect().await;

    assert_eq!(client.request_id(0).await, 1);
    assert_eq!(client.request_id(1).await, 2);
    assert_eq!(test_store.user_ids(), [0, 1, 2]);

    server.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn concurrent_allocations_are_unique(test_store: TestStore) {
    let server = TestServer::start(&test_store).await;
    let mut clients = Vec::new();
    for _ in 0..8 {
        clients.push(server.connect().await);
    }

    let mut ids = join_all(
        clients
            .iter_mut()
            .enumerate()
            .map(|(i, client)| client.request_id(u8::try_from(i).expect("small index"))),
    )
    .await;
    ids.sort_unstable();
    assert_eq!(ids, (1..=8).collect::<Vec<u32>>());

    drop(clients);
    server.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn unmatched_continuation_is_dropped(test_store: TestStore) {
    let server = TestServer::start(&test_store).await;
    let mut client = server.connect().await;

    client
        .send(Packet::new(RequestType::File, b"stray".to_vec()).with_operation_id(33))
        .await;
    assert_eq!(client.request_id(1).await, 1, "stray packet got no reply");

    server.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn operation_id_collision_is_refused(test_store: TestStore) {
    test_store.write_user_file(3, "seed", b"x");
    let server = TestServer::start(&test_store).await;
    let mut client = server.connect().await;

    client.send(file_info(10, 3, FileKind::User, "slow", 5)).await;
    client.send(id_request(5)).await;
    let reply = client.recv().await;
    assert_eq!(reply.request_type(), RequestType::Error);
    assert_eq!(reply.operation_id(), 5);
    let report = ErrorReport::parse(reply.payload()).expect("error report");
    assert_eq!(report.request, RequestType::IdRequest);
    assert_eq!(report.code, ErrorCode::InvalidPacket);
    assert_eq!(test_store.user_ids(), [0, 3], "refused request allocated nothing");

    server.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn malformed_header_gets_a_farewell(test_store: TestStore) {
    let server = TestServer::start(&test_store).await;
    let mut client = server.connect().await;

    client.send_raw(&[0x7f; 11]).await;
    let seen = client.drain_until_closed().await;
    let farewell = seen
        .iter()
        .find(|p| p.request_type() == RequestType::Suspend)
        .expect("farewell sent");
    assert_eq!(farewell.suspend_code(), Some(ErrorCode::InvalidPacket));

    server.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn shutdown_suspends_open_connections(test_store: TestStore) {
    let server = TestServer::start(&test_store).await;
    let mut client = server.connect().await;
    assert_eq!(client.request_id(1).await, 1);

    let stopping = tokio::spawn(server.shutdown());
    let seen = client.drain_until_closed().await;
    let last = seen.last().expect("farewell sent");
    assert_eq!(last.suspend_code(), Some(ErrorCode::ManualShutdown));
    within!(5, stopping).expect("server task");
}

#[rstest]
#[tokio::test]
async fn peer_suspend_ends_the_session(test_store: TestStore) {
    let server = TestServer::start(&test_store).await;
    let mut client = server.connect().await;

    client.suspend(ErrorCode::ManualShutdown).await;
    let seen = client.drain_until_closed().await;
    assert!(
        seen.iter().all(|p| p.request_type() == RequestType::ConnectionCheck),
        "no farewell answers a peer suspend: {seen:?}"
    );

    server.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn silent_client_fails_the_connection_check(test_store: TestStore) {
    let server = TestServer::start_with(&test_store, short_liveness()).await;
    let mut client = server.connect().await;

    let seen = client.drain_until_closed().await;
    let (last, probes) = seen.split_last().expect("farewell sent");
    assert_eq!(last.suspend_code(), Some(ErrorCode::ConnectionCheckFailed));
    assert!(
        probes
            .iter()
            .all(|p| p.request_type() == RequestType::ConnectionCheck)
    );
    assert!(!probes.is_empty(), "keepalive probes precede the timeout");

    server.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn active_client_outlives_the_window(test_store: TestStore) {
    let server = TestServer::start_with(&test_store, short_liveness()).await;
    let mut client = server.connect().await;

    for _ in 0..8 {
        sleep(Duration::from_millis(100)).await;
        client.send(Packet::connection_check()).await;
    }
    assert_eq!(client.request_id(1).await, 1);

    server.shutdown().await;
}

#[rstest]
#[tokio::test]
async fn full_pool_defers_new_clients(test_store: TestStore) {
    let config = ServerConfig {
        max_clients: 1,
        ..ServerConfig::default()
    };
    let server = TestServer::start_with(&test_store, config).await;
    let mut first = server.connect().await;
    assert_eq!(first.request_id(1).await, 1);

    let mut second = server.connect().await;
    second.send(id_request(1)).await;
    assert!(
        timeout(Duration::from_millis(300), second.recv()).await.is_err(),
        "second client waits while the pool is full"
    );

    drop(first);
    let reply = second.recv().await;
    assert_eq!(reply.request_type(), RequestType::Id);

    drop(second);
    server.shutdown().await;
}
