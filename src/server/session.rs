//! Per-connection echo session.
//!
//! # Contract
//! - Every read of `n` bytes is written back (and flushed) in full before the
//!   next read, so chunks are never reordered or coalesced
//! - A clean end of stream is a normal exit; so is a peer that drops TCP
//!   without sending a TLS close_notify
//! - Any error ends this session only
//! - The admission slot is dropped on every exit path

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_rustls::TlsAcceptor;

use crate::config::ListenerConfig;
use crate::net::Connection;

/// How long a finished session waits for its close_notify to go out.
const CLOSE_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Ways a session can end abnormally.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),

    #[error("TLS handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("read failed: {0}")]
    Read(#[source] io::Error),

    #[error("write failed: {0}")]
    Write(#[source] io::Error),
}

/// What a finished session moved.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EchoSummary {
    /// Bytes echoed back to the peer.
    pub bytes: u64,
    /// Read/write round trips.
    pub chunks: u64,
    /// Whether the peer closed cleanly (TLS close_notify or plain EOF).
    pub clean_close: bool,
}

/// Per-session settings derived from the listener config.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub buffer_size: usize,
    pub handshake_timeout: Option<Duration>,
}

impl SessionSettings {
    pub fn from_config(config: &ListenerConfig) -> Self {
        Self {
            buffer_size: config.buffer_size,
            handshake_timeout: config.handshake_timeout(),
        }
    }
}

/// Mirror every byte read from `stream` back to it until end of stream.
pub async fn echo<S>(stream: &mut S, buffer_size: usize) -> Result<EchoSummary, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; buffer_size];
    let mut summary = EchoSummary::default();

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => {
                summary.clean_close = true;
                return Ok(summary);
            }
            Ok(n) => n,
            // rustls reports a TCP close without close_notify this way
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(summary),
            Err(e) => return Err(SessionError::Read(e)),
        };

        tracing::trace!(bytes = n, "Received chunk");

        stream.write_all(&buf[..n]).await.map_err(SessionError::Write)?;
        stream.flush().await.map_err(SessionError::Write)?;

        summary.bytes += n as u64;
        summary.chunks += 1;
    }
}

/// Handshake, then echo until the peer goes away.
pub async fn serve_connection(
    connection: Connection,
    acceptor: TlsAcceptor,
    settings: &SessionSettings,
) -> Result<EchoSummary, SessionError> {
    let (stream, _slot) = connection.into_parts();

    let handshake = acceptor.accept(stream);
    let mut tls = match settings.handshake_timeout {
        Some(limit) => tokio::time::timeout(limit, handshake)
            .await
            .map_err(|_| SessionError::HandshakeTimeout(limit))?,
        None => handshake.await,
    }
    .map_err(SessionError::Handshake)?;

    tracing::debug!("TLS handshake complete");

    let summary = echo(&mut tls, settings.buffer_size).await?;
    if summary.clean_close {
        close_gracefully(&mut tls, CLOSE_NOTIFY_TIMEOUT).await;
    }
    Ok(summary)
}

/// Best effort close_notify, bounded by `limit`. Returns whether it completed.
async fn close_gracefully<S>(stream: &mut S, limit: Duration) -> bool
where
    S: AsyncWrite + Unpin,
{
    match tokio::time::timeout(limit, stream.shutdown()).await {
        Ok(Ok(())) => true,
        // The peer may already be gone.
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "close_notify not delivered");
            false
        }
        Err(_) => {
            tracing::debug!(timeout = ?limit, "close_notify timed out");
            false
        }
    }
}

/// Task body for one admitted connection. Never fails the caller.
pub async fn run_session(connection: Connection, acceptor: TlsAcceptor, settings: SessionSettings) {
    match serve_connection(connection, acceptor, &settings).await {
        Ok(summary) => tracing::info!(
            bytes = summary.bytes,
            chunks = summary.chunks,
            clean_close = summary.clean_close,
            "Client disconnected"
        ),
        Err(e) => tracing::warn!(error = %e, "Session ended with error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};
    use tokio::io::{DuplexStream, ReadBuf};
    use tokio_test::io::Builder;

    /// Duplex end that records the size of every write it accepts.
    struct RecordingStream {
        inner: DuplexStream,
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl AsyncRead for RecordingStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for RecordingStream {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
            if let Poll::Ready(Ok(n)) = &poll {
                self.writes.lock().unwrap().push(buf[..*n].to_vec());
            }
            poll
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    #[tokio::test]
    async fn echoes_until_end_of_stream() {
        let mut stream = Builder::new()
            .read(b"ping")
            .write(b"ping")
            .read(b"pong")
            .write(b"pong")
            .build();

        let summary = echo(&mut stream, 512).await.unwrap();
        assert_eq!(
            summary,
            EchoSummary {
                bytes: 8,
                chunks: 2,
                clean_close: true
            }
        );
    }

    #[tokio::test]
    async fn writes_never_exceed_buffer_size() {
        let (mut client, server) = tokio::io::duplex(64);
        let writes = Arc::new(Mutex::new(Vec::new()));
        let mut server = RecordingStream {
            inner: server,
            writes: Arc::clone(&writes),
        };

        let session = tokio::spawn(async move { echo(&mut server, 4).await });

        client.write_all(b"HELLOWORLD").await.unwrap();
        client.shutdown().await.unwrap();
        let mut echoed = Vec::new();
        client.read_to_end(&mut echoed).await.unwrap();

        let summary = session.await.unwrap().unwrap();
        assert_eq!(echoed, b"HELLOWORLD");
        assert_eq!(summary.bytes, 10);

        let writes = writes.lock().unwrap();
        assert!(writes.iter().all(|chunk| !chunk.is_empty() && chunk.len() <= 4));
        assert_eq!(writes.concat(), b"HELLOWORLD");
    }

    #[tokio::test]
    async fn read_error_ends_session() {
        let mut stream = Builder::new()
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"))
            .build();

        let err = echo(&mut stream, 16).await.unwrap_err();
        assert!(matches!(err, SessionError::Read(e) if e.kind() == io::ErrorKind::ConnectionReset));
    }

    #[tokio::test]
    async fn write_error_is_session_local() {
        let mut stream = Builder::new()
            .read(b"ping")
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
            .build();

        let err = echo(&mut stream, 16).await.unwrap_err();
        assert!(matches!(err, SessionError::Write(_)));
    }

    #[tokio::test]
    async fn missing_close_notify_is_not_an_error() {
        let mut stream = Builder::new()
            .read(b"ab")
            .write(b"ab")
            .read_error(io::Error::new(io::ErrorKind::UnexpectedEof, "no close_notify"))
            .build();

        let summary = echo(&mut stream, 16).await.unwrap();
        assert_eq!(summary.bytes, 2);
        assert!(!summary.clean_close);
    }

    /// Accepts writes but never finishes a shutdown.
    struct StalledClose;

    impl AsyncWrite for StalledClose {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    #[tokio::test]
    async fn close_notify_wait_is_bounded() {
        let mut stream = StalledClose;
        let closed = tokio::time::timeout(
            Duration::from_secs(5),
            close_gracefully(&mut stream, Duration::from_millis(50)),
        )
        .await
        .expect("close wait should give up on its own");
        assert!(!closed);
    }

    #[tokio::test]
    async fn close_notify_is_sent_to_live_peer() {
        let (mut client, mut server) = tokio::io::duplex(64);
        assert!(close_gracefully(&mut server, Duration::from_secs(1)).await);

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }
}
