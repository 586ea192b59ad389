//! Byte stream abstraction shared by every radio backend

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::net::TcpStream;

/// A connected transport stream that can read and write bytes
#[async_trait]
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    /// Close the transport gracefully
    async fn shutdown(&mut self) -> io::Result<()> {
        AsyncWriteExt::shutdown(self).await
    }
}

impl TransportStream for bluer::rfcomm::Stream {}

impl TransportStream for TcpStream {}

impl TransportStream for DuplexStream {}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_shutdown_signals_eof() {
        let (mut near, mut far) = tokio::io::duplex(64);
        near.write_all(b"bye\n").await.unwrap();
        TransportStream::shutdown(&mut near).await.unwrap();

        let mut received = Vec::new();
        far.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"bye\n");
    }
}
