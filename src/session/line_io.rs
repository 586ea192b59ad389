//! Line-oriented reader and writer over a byte stream

use crate::error::{Result, SerialError};
use btserial_shared::codec::{self, CodecError, LineDecoder, MAX_LINE_LENGTH};
use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Buffered line reader.
///
/// Bytes received but not yet returned stay in the internal buffer, so
/// `read_line` can be raced against other futures without losing data.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
    decoder: LineDecoder,
    eof: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            decoder: LineDecoder::new(),
            eof: false,
        }
    }

    /// Whether at least one complete line is buffered.
    ///
    /// Never waits: pulls whatever bytes the stream has ready right now, then
    /// answers from the buffer. A partial line is not ready. A partial line
    /// longer than [`MAX_LINE_LENGTH`] is a stream fault.
    pub fn has_line(&mut self) -> Result<bool> {
        while !self.decoder.has_line() && !self.eof {
            self.check_pending_len()?;
            match self.inner.read_buf(self.decoder.buffer_mut()).now_or_never() {
                Some(Ok(0)) => self.eof = true,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(SerialError::StreamFault(e)),
                None => break,
            }
        }
        Ok(self.decoder.has_line())
    }

    /// Wait for the next complete line, terminator stripped.
    ///
    /// Returns `Ok(None)` once the remote end closed the stream and every
    /// buffered line was delivered. Unterminated text left at end of stream
    /// is delivered as a final line.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(line) = self.decoder.decode_next()? {
                return Ok(Some(line));
            }
            if self.eof {
                return Ok(self.decoder.take_remainder());
            }
            self.check_pending_len()?;

            let n = self
                .inner
                .read_buf(self.decoder.buffer_mut())
                .await
                .map_err(SerialError::StreamFault)?;
            if n == 0 {
                self.eof = true;
            }
        }
    }

    /// Refuse to buffer more of an unterminated line than the cap allows
    fn check_pending_len(&self) -> Result<()> {
        let pending = self.decoder.buffered_len();
        if pending > MAX_LINE_LENGTH && !self.decoder.has_line() {
            return Err(CodecError::LineTooLong(pending).into());
        }
        Ok(())
    }

    /// Whether the remote end closed the stream
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Unbuffered line writer: every call is flushed immediately.
#[derive(Debug)]
pub struct LineWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write `text` followed by the line terminator and flush.
    pub async fn write_line(&mut self, text: &str) -> Result<()> {
        let encoded = codec::encode(text)?;
        self.inner
            .write_all(&encoded)
            .await
            .map_err(SerialError::StreamFault)?;
        self.inner.flush().await.map_err(SerialError::StreamFault)
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[tokio::test]
    async fn test_line_split_across_writes() {
        let (near, mut far) = tokio::io::duplex(1024);
        let mut reader = LineReader::new(near);

        far.write_all(b"PI").await.unwrap();
        tokio::task::yield_now().await;
        assert!(!reader.has_line().unwrap());

        far.write_all(b"NG\r\n").await.unwrap();
        assert!(reader.has_line().unwrap());
        assert_eq!(reader.read_line().await.unwrap(), Some("PING".to_string()));
        assert!(!reader.has_line().unwrap());
    }

    #[tokio::test]
    async fn test_eof_delivers_remainder_then_none() {
        let (near, mut far) = tokio::io::duplex(1024);
        let mut reader = LineReader::new(near);

        far.write_all(b"one\ntwo").await.unwrap();
        drop(far);

        assert_eq!(reader.read_line().await.unwrap(), Some("one".to_string()));
        assert_eq!(reader.read_line().await.unwrap(), Some("two".to_string()));
        assert_eq!(reader.read_line().await.unwrap(), None);
        assert!(reader.is_eof());
    }

    #[tokio::test]
    async fn test_read_line_is_cancel_safe() {
        let (near, mut far) = tokio::io::duplex(1024);
        let mut reader = LineReader::new(near);

        far.write_all(b"hal").await.unwrap();
        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(20), reader.read_line()).await;
        assert!(timed_out.is_err());

        far.write_all(b"f\n").await.unwrap();
        assert_eq!(reader.read_line().await.unwrap(), Some("half".to_string()));
    }

    #[tokio::test]
    async fn test_unterminated_flood_is_stream_fault() {
        let flood = vec![b'x'; MAX_LINE_LENGTH * 3];

        let (near, mut far) = tokio::io::duplex(256 * 1024);
        far.write_all(&flood).await.unwrap();
        let mut reader = LineReader::new(near);
        match reader.has_line().unwrap_err() {
            SerialError::StreamFault(e) => assert_eq!(e.kind(), io::ErrorKind::InvalidData),
            other => panic!("unexpected error: {other:?}"),
        }
        // Stops pulling shortly after the cap instead of draining the peer
        assert!(reader.decoder.buffered_len() < flood.len());

        let (near, mut far) = tokio::io::duplex(256 * 1024);
        far.write_all(&flood).await.unwrap();
        let mut reader = LineReader::new(near);
        let err = reader.read_line().await.unwrap_err();
        assert!(err.is_stream_fault());
    }

    #[tokio::test]
    async fn test_writer_appends_terminator() {
        let (near, mut far) = tokio::io::duplex(1024);
        let mut writer = LineWriter::new(near);
        writer.write_line("PING").await.unwrap();

        let mut buf = [0u8; 5];
        far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PING\n");
    }

    #[tokio::test]
    async fn test_write_to_dropped_peer_faults() {
        let (near, far) = tokio::io::duplex(1024);
        drop(far);
        let mut writer = LineWriter::new(near);

        let err = writer.write_line("PING").await.unwrap_err();
        match err {
            SerialError::StreamFault(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
