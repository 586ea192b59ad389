//! Serial sessions over a radio stream socket
//!
//! A session owns one peer's socket and exposes line-oriented reads and
//! writes once connected. Reconnecting always allocates a fresh socket.

mod line_io;
mod serial;

pub use line_io::{LineReader, LineWriter};
pub use serial::{CloseHandle, SerialSession, SessionConfig};
