//! Newline-delimited codec for serial streams
//!
//! All records are framed as:
//! ```text
//! [ N bytes: UTF-8 text ][ optional '\r' ][ '\n' ]
//! ```
//!
//! There is no length prefix and no checksum. A trailing carriage return is
//! stripped on decode so peers sending CRLF are read the same as LF peers.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Maximum line size (64 KiB) to prevent memory exhaustion
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Record terminator written after every line
pub const LINE_TERMINATOR: u8 = b'\n';

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Line too long: {0} bytes (max: {MAX_LINE_LENGTH})")]
    LineTooLong(usize),
}

/// Encode a line of text into a terminated byte buffer
pub fn encode(line: &str) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::with_capacity(line.len() + 1);
    encode_into(line, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a line directly into a provided buffer
pub fn encode_into(line: &str, buf: &mut BytesMut) -> Result<(), CodecError> {
    if line.len() > MAX_LINE_LENGTH {
        return Err(CodecError::LineTooLong(line.len()));
    }

    buf.reserve(line.len() + 1);
    buf.put_slice(line.as_bytes());
    buf.put_u8(LINE_TERMINATOR);

    Ok(())
}

/// Try to decode one terminated line from a buffer
///
/// Returns:
/// - `Ok(Some(line))` if a complete line was decoded (terminator stripped)
/// - `Ok(None)` if more data is needed
/// - `Err(...)` if the pending line exceeds [`MAX_LINE_LENGTH`]
pub fn decode(buf: &mut BytesMut) -> Result<Option<String>, CodecError> {
    let Some(pos) = buf.iter().position(|&b| b == LINE_TERMINATOR) else {
        if buf.len() > MAX_LINE_LENGTH {
            return Err(CodecError::LineTooLong(buf.len()));
        }
        return Ok(None);
    };

    if pos > MAX_LINE_LENGTH {
        return Err(CodecError::LineTooLong(pos));
    }

    let mut line = buf.split_to(pos);
    buf.advance(1);

    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }

    Ok(Some(String::from_utf8_lossy(&line).into_owned()))
}

/// Decoder state for streaming line decoding
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Partial line data being accumulated
    buffer: BytesMut,
}

impl LineDecoder {
    /// Create a new line decoder
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Mutable access to the underlying buffer, for reading straight into it
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Whether at least one complete line is buffered
    pub fn has_line(&self) -> bool {
        self.buffer.contains(&LINE_TERMINATOR)
    }

    /// Try to decode the next line from the buffer
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all complete lines
    pub fn decode_next(&mut self) -> Result<Option<String>, CodecError> {
        decode(&mut self.buffer)
    }

    /// Take whatever unterminated text remains, e.g. when the stream ended
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = self.buffer.split();
        let mut text = String::from_utf8_lossy(&rest).into_owned();
        if text.ends_with('\r') {
            text.pop();
        }
        Some(text)
    }

    /// Get the number of buffered bytes
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer (e.g., on connection reset)
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_appends_terminator() {
        let encoded = encode("PING").unwrap();
        assert_eq!(&encoded[..], b"PING\n");
    }

    #[test]
    fn test_decode_strips_crlf() {
        let mut buf = BytesMut::from(&b"hello\r\nworld\n"[..]);
        assert_eq!(decode(&mut buf).unwrap(), Some("hello".to_string()));
        assert_eq!(decode(&mut buf).unwrap(), Some("world".to_string()));
        assert_eq!(decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_line_not_ready() {
        let mut decoder = LineDecoder::new();
        decoder.extend(b"PI");
        assert!(!decoder.has_line());
        assert_eq!(decoder.decode_next().unwrap(), None);

        decoder.extend(b"NG\n");
        assert!(decoder.has_line());
        assert_eq!(decoder.decode_next().unwrap(), Some("PING".to_string()));
        assert!(!decoder.has_line());
    }

    #[test]
    fn test_empty_line() {
        let mut decoder = LineDecoder::new();
        decoder.extend(b"\n");
        assert_eq!(decoder.decode_next().unwrap(), Some(String::new()));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut decoder = LineDecoder::new();
        decoder.extend(&[0x66, 0xFF, 0x6F, b'\n']);
        assert_eq!(decoder.decode_next().unwrap(), Some("f\u{FFFD}o".to_string()));
    }

    #[test]
    fn test_line_too_long() {
        let long = "x".repeat(MAX_LINE_LENGTH + 1);
        assert!(matches!(encode(&long), Err(CodecError::LineTooLong(_))));

        let mut decoder = LineDecoder::new();
        decoder.extend(long.as_bytes());
        assert!(matches!(
            decoder.decode_next(),
            Err(CodecError::LineTooLong(n)) if n == MAX_LINE_LENGTH + 1
        ));
    }

    #[test]
    fn test_take_remainder() {
        let mut decoder = LineDecoder::new();
        decoder.extend(b"one\ntwo\r");
        assert_eq!(decoder.decode_next().unwrap(), Some("one".to_string()));
        assert_eq!(decoder.take_remainder(), Some("two".to_string()));
        assert_eq!(decoder.take_remainder(), None);
        assert_eq!(decoder.buffered_len(), 0);
    }
}
