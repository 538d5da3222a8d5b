//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use tls_echo_server::server::AcceptorSummary;
use tls_echo_server::{AdmissionController, EchoConfig, EchoServer, Shutdown};

/// Path of a file under `tests/fixtures`.
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Loopback config on an ephemeral port using the fixture credentials.
pub fn test_config(max_connections: usize, buffer_size: usize) -> EchoConfig {
    let mut config = EchoConfig::default();
    config.listener.host = "127.0.0.1".into();
    config.listener.port = 0;
    config.listener.max_connections = max_connections;
    config.listener.buffer_size = buffer_size;
    config.tls.cert_path = fixture("server.crt").display().to_string();
    config.tls.key_path = fixture("server.key").display().to_string();
    config
}

/// A running echo server.
pub struct TestServer {
    pub addr: SocketAddr,
    pub admission: AdmissionController,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<AcceptorSummary>,
}

/// Bind and start an echo server in the background.
pub async fn start_server(config: EchoConfig) -> TestServer {
    let server = EchoServer::bind(&config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let admission = server.admission();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();

    let handle = tokio::spawn(server.run(rx));

    TestServer {
        addr,
        admission,
        shutdown,
        handle,
    }
}

fn connector() -> TlsConnector {
    let ca = std::fs::read(fixture("ca.crt")).unwrap();
    let mut roots = RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut ca.as_slice()) {
        let cert: CertificateDer<'static> = cert.unwrap();
        roots.add(cert).unwrap();
    }

    let config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

/// Open a TLS connection to the server.
pub async fn connect(addr: SocketAddr) -> std::io::Result<TlsStream<TcpStream>> {
    let tcp = TcpStream::connect(addr).await?;
    let name = ServerName::try_from("localhost").unwrap();
    connector().connect(name, tcp).await
}

/// Send `message` and read back the same number of bytes.
pub async fn roundtrip(stream: &mut TlsStream<TcpStream>, message: &[u8]) -> Vec<u8> {
    stream.write_all(message).await.unwrap();
    stream.flush().await.unwrap();

    let mut echoed = vec![0u8; message.len()];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut echoed))
        .await
        .expect("echo timed out")
        .unwrap();
    echoed
}

/// Expect the server to refuse the connection (closed without a session).
pub async fn assert_refused(addr: SocketAddr) {
    let attempt = tokio::time::timeout(Duration::from_secs(5), async {
        let mut stream = connect(addr).await?;
        // A handshake can appear to finish client-side before the close lands.
        stream.write_all(b"x").await?;
        let mut buf = [0u8; 1];
        match stream.read(&mut buf).await? {
            0 => Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof)),
            _ => Ok(()),
        }
    })
    .await
    .expect("refused connection hung");

    assert!(attempt.is_err(), "connection should have been refused");
}

/// Poll `condition` until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Run `f` with a deadline, panicking with `what` if it expires.
pub async fn within<T>(what: &str, f: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(10), f)
        .await
        .unwrap_or_else(|_| panic!("{what} timed out"))
}
