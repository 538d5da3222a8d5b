//! End-to-end echo behaviour over TLS.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

mod common;

#[tokio::test]
async fn test_echo_roundtrip() {
    let server = common::start_server(common::test_config(10, 512)).await;

    let mut stream = common::connect(server.addr).await.unwrap();
    let message = b"Hello, Echo Server!";
    assert_eq!(common::roundtrip(&mut stream, message).await, message);
    assert_eq!(server.admission.active_count(), 1);

    stream.shutdown().await.unwrap();
    assert!(
        common::wait_until(Duration::from_secs(5), || server.admission.active_count() == 0).await,
        "slot should be released after clean close"
    );
}

#[tokio::test]
async fn test_small_buffer_preserves_content_and_order() {
    let server = common::start_server(common::test_config(10, 4)).await;

    let mut stream = common::connect(server.addr).await.unwrap();
    assert_eq!(common::roundtrip(&mut stream, b"HELLOWORLD").await, b"HELLOWORLD");
}

#[tokio::test]
async fn test_large_payload_fidelity() {
    let server = common::start_server(common::test_config(10, 512)).await;

    let payload: Vec<u8> = (0..256 * 1024u32).map(|i| (i % 251) as u8).collect();
    let stream = common::connect(server.addr).await.unwrap();
    let (mut reader, mut writer) = tokio::io::split(stream);

    let expected_len = payload.len();
    let sender = tokio::spawn(async move {
        writer.write_all(&payload).await.unwrap();
        writer.flush().await.unwrap();
        (writer, payload)
    });

    let mut echoed = vec![0u8; expected_len];
    common::within("large echo", reader.read_exact(&mut echoed))
        .await
        .unwrap();

    let (_writer, payload) = sender.await.unwrap();
    assert_eq!(echoed, payload);
}

#[tokio::test]
async fn test_abrupt_disconnect_does_not_affect_other_sessions() {
    let server = common::start_server(common::test_config(10, 512)).await;

    let mut a = common::connect(server.addr).await.unwrap();
    let mut b = common::connect(server.addr).await.unwrap();
    assert_eq!(common::roundtrip(&mut a, b"from a").await, b"from a");
    assert_eq!(common::roundtrip(&mut b, b"from b").await, b"from b");

    // Drop the TCP stream without a TLS close_notify.
    drop(a);
    assert!(
        common::wait_until(Duration::from_secs(5), || server.admission.active_count() == 1).await,
        "abruptly closed session should release its slot"
    );

    assert_eq!(common::roundtrip(&mut b, b"still here").await, b"still here");
}

#[tokio::test]
async fn test_failed_handshake_releases_slot() {
    let server = common::start_server(common::test_config(1, 512)).await;

    // Plain TCP speaking garbage instead of a ClientHello.
    let mut raw = tokio::net::TcpStream::connect(server.addr).await.unwrap();
    raw.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
    let mut sink = Vec::new();
    let _ = common::within("handshake failure", raw.read_to_end(&mut sink)).await;

    assert!(
        common::wait_until(Duration::from_secs(5), || server.admission.active_count() == 0).await,
        "failed handshake should release its slot"
    );

    let mut stream = common::connect(server.addr).await.unwrap();
    assert_eq!(common::roundtrip(&mut stream, b"ok").await, b"ok");
}

#[tokio::test]
async fn test_shutdown_stops_accepting_but_keeps_sessions() {
    let server = common::start_server(common::test_config(10, 512)).await;

    let mut open = common::connect(server.addr).await.unwrap();
    assert_eq!(common::roundtrip(&mut open, b"before").await, b"before");

    server.shutdown.trigger();
    let summary = common::within("acceptor stop", server.handle).await.unwrap();
    assert_eq!(summary.accepted, 1);
    assert_eq!(summary.rejected, 0);

    assert!(tokio::net::TcpStream::connect(server.addr).await.is_err());

    // Already admitted sessions are not cancelled by the acceptor stopping.
    assert_eq!(common::roundtrip(&mut open, b"after").await, b"after");
    assert_eq!(server.admission.active_count(), 1);
}
