//! TCP transport using length-prefixed frames.

use super::{Transport, TransportError};
use async_trait::async_trait;
use conductor_types::{read_frame, write_frame, WireError, MAX_FRAME_SIZE};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Transport over a plain TCP connection.
///
/// The two halves are locked independently so a pending `recv()` never
/// blocks `send()`.
#[derive(Debug)]
pub struct TcpTransport {
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    connected: AtomicBool,
    max_frame_size: usize,
}

impl TcpTransport {
    /// Create an unconnected transport.
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Create an unconnected transport that rejects inbound frames larger
    /// than `max_frame_size`.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            connected: AtomicBool::new(false),
            max_frame_size,
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, address: &str) -> Result<(), TransportError> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{}: {}", address, e)))?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not set TCP_NODELAY: {}", e);
        }

        let (read_half, write_half) = stream.into_split();
        *self.reader.lock().await = Some(read_half);
        *self.writer.lock().await = Some(write_half);
        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!("Connected to conductor at {}", address);
        Ok(())
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(TransportError::NotConnected)?;

        write_frame(writer, data).await.map_err(|e| {
            self.connected.store(false, Ordering::SeqCst);
            TransportError::SendFailed(e.to_string())
        })
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        let mut reader = self.reader.lock().await;
        let reader = reader.as_mut().ok_or(TransportError::NotConnected)?;

        match read_frame(reader, self.max_frame_size).await {
            Ok(frame) => Ok(frame),
            Err(WireError::ConnectionClosed) => {
                self.connected.store(false, Ordering::SeqCst);
                Err(TransportError::ConnectionClosed)
            }
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                Err(TransportError::ReceiveFailed(e.to_string()))
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        // The read half is left to the receiving task; it sees EOF once the
        // conductor closes its side.
        if let Some(mut writer) = self.writer.lock().await.take() {
            writer
                .shutdown()
                .await
                .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn frames_cross_a_real_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let frame = read_frame(&mut stream, MAX_FRAME_SIZE).await.unwrap();
            write_frame(&mut stream, &frame).await.unwrap();
        });

        let transport = TcpTransport::new();
        transport.connect(&addr).await.unwrap();
        assert!(transport.is_connected());

        transport.send(b"ping").await.unwrap();
        assert_eq!(transport.recv().await.unwrap(), b"ping");
        server.await.unwrap();

        // Server dropped its end
        assert!(matches!(
            transport.recv().await,
            Err(TransportError::ConnectionClosed)
        ));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn send_before_connect_fails() {
        let transport = TcpTransport::new();
        assert!(matches!(
            transport.send(b"x").await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            transport.recv().await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let transport = TcpTransport::new();
        assert!(matches!(
            transport.connect(&addr).await,
            Err(TransportError::ConnectionFailed(_))
        ));
    }

    #[tokio::test]
    async fn oversized_inbound_frame_is_a_receive_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            write_frame(&mut stream, &[0u8; 64]).await.unwrap();
            stream
        });

        let transport = TcpTransport::with_max_frame_size(16);
        transport.connect(&addr).await.unwrap();
        let _stream = server.await.unwrap();

        assert!(matches!(
            transport.recv().await,
            Err(TransportError::ReceiveFailed(_))
        ));
    }
}
