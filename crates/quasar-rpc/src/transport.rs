//! Transport abstraction and frame I/O.
//!
//! The runtime speaks to byte streams through the [`Connection`] and
//! [`Listener`] traits so that servers and clients are testable over
//! in-memory pipes and deployable over TCP without code changes. Frame
//! I/O lives here too: one frame on the wire is a header followed by
//! its payload, written and read as a unit.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener as TokioTcpListener, TcpStream};
use tracing::debug;

use crate::error::{ProtocolError, TransportError};
use crate::frame::{FrameHeader, FRAME_HEADER_SIZE};

/// A bidirectional byte stream carrying frames.
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {}

impl Connection for TcpStream {}
impl Connection for tokio::io::DuplexStream {}

/// Accepts inbound connections.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Waits for the next inbound connection.
    async fn accept(&self) -> Result<Box<dyn Connection>, TransportError>;

    /// Address the listener is bound to.
    fn local_addr(&self) -> Result<SocketAddr, TransportError>;
}

/// TCP listener.
#[derive(Debug)]
pub struct TcpListener {
    inner: TokioTcpListener,
}

impl TcpListener {
    /// Binds to the given address.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let inner = TokioTcpListener::bind(addr).await?;
        let local = inner.local_addr()?;
        debug!(addr = %local, "listener bound");
        Ok(Self { inner })
    }
}

#[async_trait]
impl Listener for TcpListener {
    async fn accept(&self) -> Result<Box<dyn Connection>, TransportError> {
        let (stream, peer) = self.inner.accept().await?;
        stream.set_nodelay(true)?;
        debug!(peer = %peer, "connection accepted");
        Ok(Box::new(stream))
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.inner.local_addr()?)
    }
}

/// Connects to a TCP endpoint.
pub async fn connect_tcp(addr: SocketAddr) -> Result<Box<dyn Connection>, TransportError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::ConnectionRefused => {
                TransportError::ConnectionRefused(addr.to_string())
            }
            _ => TransportError::Io(e),
        })?;
    stream.set_nodelay(true)?;
    Ok(Box::new(stream))
}

/// Creates a connected in-memory pair, for tests and in-process wiring.
#[must_use]
pub fn memory_pair(max_buf_size: usize) -> (Box<dyn Connection>, Box<dyn Connection>) {
    let (a, b) = tokio::io::duplex(max_buf_size);
    (Box::new(a), Box::new(b))
}

/// Writes one frame: header then payload, flushed together.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    header: &FrameHeader,
    payload: &[u8],
) -> std::io::Result<()> {
    writer.write_all(&header.encode()).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Reads one frame, validating the header before the payload.
///
/// Returns `Ok(None)` on a clean end-of-stream at a frame boundary;
/// end-of-stream mid-frame is an I/O error.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<(FrameHeader, Vec<u8>)>, ProtocolError> {
    let mut header_bytes = [0u8; FRAME_HEADER_SIZE];
    match reader.read_exact(&mut header_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(ProtocolError::Io(e)),
    }

    let header = FrameHeader::decode(&header_bytes);
    header.validate()?;

    let mut payload = vec![0u8; header.payload_len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(Some((header, payload)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_roundtrip_over_memory_pair() {
        let (mut a, mut b) = memory_pair(4096);

        let header = FrameHeader::new(1, 1001, 42, 4);
        write_frame(&mut a, &header, b"data").await.unwrap();

        let (decoded, payload) = read_frame(&mut b).await.unwrap().unwrap();
        assert_eq!(decoded, header);
        assert_eq!(payload, b"data");
    }

    #[tokio::test]
    async fn clean_eof_reads_as_none() {
        let (a, mut b) = memory_pair(4096);
        drop(a);
        assert!(read_frame(&mut b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn eof_mid_frame_is_an_error() {
        let (mut a, mut b) = memory_pair(4096);

        // Header promises 100 bytes; deliver 3 and hang up.
        let header = FrameHeader::new(1, 1001, 1, 100);
        a.write_all(&header.encode()).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);

        assert!(matches!(
            read_frame(&mut b).await,
            Err(ProtocolError::Io(_))
        ));
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected_before_allocation() {
        let (mut a, mut b) = memory_pair(4096);

        let header = FrameHeader::new(1, 1001, 1, u32::MAX);
        a.write_all(&header.encode()).await.unwrap();

        assert!(matches!(
            read_frame(&mut b).await,
            Err(ProtocolError::MessageTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn tcp_listener_accepts_connections() {
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move { connect_tcp(addr).await });
        let mut server_side = listener.accept().await.unwrap();
        let mut client_side = client.await.unwrap().unwrap();

        let header = FrameHeader::new(1, 1001, 7, 2);
        write_frame(&mut client_side, &header, b"ok").await.unwrap();
        let (decoded, payload) = read_frame(&mut server_side).await.unwrap().unwrap();
        assert_eq!(decoded.call_id, 7);
        assert_eq!(payload, b"ok");
    }
}
