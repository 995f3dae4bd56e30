//! End-to-end tests against a running server over real TCP

mod common;

use common::socks5_mock::*;
use common::*;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

async fn negotiate(stream: &mut TcpStream, request: &[u8]) -> [u8; 2] {
    stream.write_all(request).await.unwrap();
    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await.unwrap();
    reply
}

async fn read_until_closed(stream: &mut TcpStream) -> Vec<u8> {
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut out))
        .await
        .expect("server must close the connection")
        .unwrap();
    out
}

#[tokio::test]
async fn test_server_connect_no_auth() {
    let (upstream, upstream_task) = spawn_ping_pong_upstream().await;
    let server = TestServer::start(TestConfigBuilder::new().build(), None).await;

    let mut client = TcpStream::connect(server.addr).await.unwrap();
    assert_eq!(negotiate(&mut client, &create_auth_request_no_auth()).await, [5, 0]);

    let mut request = create_connect_ipv4(upstream);
    request.extend_from_slice(b"ping");
    client.write_all(&request).await.unwrap();

    let out = read_until_closed(&mut client).await;
    upstream_task.await.unwrap();
    assert_eq!(&out[..8], &[5, 0, 0, 1, 127, 0, 0, 1]);
    assert_eq!(&out[10..], b"pong");

    server.stop().await;
}

#[tokio::test]
async fn test_server_connect_with_password() {
    let (upstream, upstream_task) = spawn_ping_pong_upstream().await;
    let config = TestConfigBuilder::new().auth_required(true).build();
    let server = TestServer::start(config, None).await;

    let mut client = TcpStream::connect(server.addr).await.unwrap();
    assert_eq!(negotiate(&mut client, &create_auth_request_password()).await, [5, 2]);
    assert_eq!(
        negotiate(&mut client, &create_password_auth("testuser", "testpass")).await,
        [1, 0]
    );

    let mut request = create_connect_ipv4(upstream);
    request.extend_from_slice(b"ping");
    client.write_all(&request).await.unwrap();

    let out = read_until_closed(&mut client).await;
    upstream_task.await.unwrap();
    assert_eq!(out[1], 0x00);
    assert_eq!(&out[10..], b"pong");

    server.stop().await;
}

#[tokio::test]
async fn test_server_wrong_password() {
    let config = TestConfigBuilder::new().auth_required(true).build();
    let server = TestServer::start(config, None).await;

    let mut client = TcpStream::connect(server.addr).await.unwrap();
    assert_eq!(negotiate(&mut client, &create_auth_request_password()).await, [5, 2]);
    assert_eq!(
        negotiate(&mut client, &create_password_auth("testuser", "wrong")).await,
        [1, 1]
    );
    assert!(read_until_closed(&mut client).await.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_server_bind_rejected_by_default_rules() {
    let (_listener, target) = create_test_listener().await;
    let server = TestServer::start(TestConfigBuilder::new().build(), None).await;

    let mut client = TcpStream::connect(server.addr).await.unwrap();
    negotiate(&mut client, &create_auth_request_no_auth()).await;
    client
        .write_all(&create_request_ipv4(sockgate::socks::SOCKS5_CMD_TCP_BIND, target))
        .await
        .unwrap();

    assert_eq!(read_until_closed(&mut client).await, reply_without_bind(0x02));
    server.stop().await;
}

#[tokio::test]
async fn test_server_bind_allowed_but_not_supported() {
    let (_listener, target) = create_test_listener().await;
    let config = TestConfigBuilder::new().allow_bind(true).build();
    let server = TestServer::start(config, None).await;

    let mut client = TcpStream::connect(server.addr).await.unwrap();
    negotiate(&mut client, &create_auth_request_no_auth()).await;
    client
        .write_all(&create_request_ipv4(sockgate::socks::SOCKS5_CMD_TCP_BIND, target))
        .await
        .unwrap();

    assert_eq!(read_until_closed(&mut client).await, reply_without_bind(0x07));
    server.stop().await;
}

#[tokio::test]
async fn test_server_destination_allow_list() {
    let (_listener, target) = create_test_listener().await;
    let config = TestConfigBuilder::new().destination("10.*").build();
    let server = TestServer::start(config, None).await;

    let mut client = TcpStream::connect(server.addr).await.unwrap();
    negotiate(&mut client, &create_auth_request_no_auth()).await;
    client.write_all(&create_connect_ipv4(target)).await.unwrap();

    assert_eq!(read_until_closed(&mut client).await, reply_without_bind(0x02));
    server.stop().await;
}

#[tokio::test]
async fn test_server_shutdown_cancels_tunnels() {
    let (listener, upstream) = create_test_listener().await;
    // Upstream accepts and then stays silent
    let upstream_task = tokio::spawn(async move {
        let (conn, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(conn);
    });

    let server = TestServer::start(TestConfigBuilder::new().build(), None).await;

    let mut client = TcpStream::connect(server.addr).await.unwrap();
    negotiate(&mut client, &create_auth_request_no_auth()).await;
    client.write_all(&create_connect_ipv4(upstream)).await.unwrap();

    let mut reply = [0u8; 10];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 0x00);

    server.stop().await;

    // The relay is cancelled and the client sees EOF
    assert!(read_until_closed(&mut client).await.is_empty());
    upstream_task.abort();
}

#[tokio::test]
async fn test_server_connection_limit() {
    let (listener, upstream) = create_test_listener().await;
    let upstream_task = tokio::spawn(async move {
        let (conn, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(conn);
    });

    let config = TestConfigBuilder::new().max_connections(1).build();
    let server = TestServer::start(config, None).await;

    // First client holds the only slot with an open tunnel
    let mut first = TcpStream::connect(server.addr).await.unwrap();
    assert_eq!(negotiate(&mut first, &create_auth_request_no_auth()).await, [5, 0]);
    first.write_all(&create_connect_ipv4(upstream)).await.unwrap();
    let mut reply = [0u8; 10];
    first.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply[1], 0x00);

    // Second client is not served while the slot is taken
    let mut second = TcpStream::connect(server.addr).await.unwrap();
    second.write_all(&create_auth_request_no_auth()).await.unwrap();
    let mut method = [0u8; 2];
    let waited =
        tokio::time::timeout(Duration::from_millis(300), second.read_exact(&mut method)).await;
    assert!(waited.is_err(), "second client was served past the limit");

    // Closing the first tunnel frees the slot
    drop(first);
    tokio::time::timeout(Duration::from_secs(2), second.read_exact(&mut method))
        .await
        .expect("second client must be served once the slot is free")
        .unwrap();
    assert_eq!(method, [5, 0]);

    server.stop().await;
    upstream_task.abort();
}
