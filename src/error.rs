//! Error types for radio capability and serial session operations.
//!
//! Capability absence is not an error at the registry surface: queries answer
//! `false` and enumeration skips what it cannot resolve. The types here cover
//! what is surfaced to callers of `connect`, `read_line` and `write_line`, plus
//! the radio-level failures the registry absorbs.

use btserial_shared::codec::CodecError;
use std::io;
use thiserror::Error;

/// Errors surfaced by a serial session.
#[derive(Debug, Error)]
pub enum SerialError {
    /// The connect handshake did not succeed. Peer unreachable, service not
    /// offered, pairing revoked and similar causes are not distinguished.
    #[error("Connect failed: {0}")]
    ConnectFault(#[source] io::Error),

    /// A read or write on an established session failed, or the session is
    /// not connected.
    #[error("Stream fault: {0}")]
    StreamFault(#[source] io::Error),

    /// The service identifier cannot change while a connection is up.
    #[error("Service identifier cannot change while connected")]
    AlreadyConnected,
}

/// A specialized [`Result`] type for session operations.
pub type Result<T> = std::result::Result<T, SerialError>;

impl SerialError {
    /// Stream fault for an operation attempted on a session that is not connected.
    pub(crate) fn not_connected() -> Self {
        Self::StreamFault(io::Error::new(
            io::ErrorKind::NotConnected,
            "session is not connected",
        ))
    }

    /// Stream fault for an operation interrupted by a close request.
    pub(crate) fn closed() -> Self {
        Self::StreamFault(io::Error::new(
            io::ErrorKind::ConnectionAborted,
            "session closed",
        ))
    }

    /// Returns `true` if this error came from a failed handshake.
    #[inline]
    #[must_use]
    pub fn is_connect_fault(&self) -> bool {
        matches!(self, Self::ConnectFault(_))
    }

    /// Returns `true` if this error came from a read or write.
    #[inline]
    #[must_use]
    pub fn is_stream_fault(&self) -> bool {
        matches!(self, Self::StreamFault(_))
    }
}

impl From<CodecError> for SerialError {
    fn from(err: CodecError) -> Self {
        Self::StreamFault(io::Error::new(io::ErrorKind::InvalidData, err))
    }
}

/// Capability-level failures inside a radio backend.
#[derive(Debug, Error)]
pub enum RadioError {
    /// No usable adapter on this system.
    #[error("No Bluetooth adapter available")]
    AdapterUnavailable,

    /// A bonded peer handle could not be resolved into a usable peer.
    #[error("Peer could not be resolved: {0}")]
    UnresolvablePeer(String),

    /// The BlueZ daemon reported an error.
    #[error("BlueZ error: {0}")]
    Bluez(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<bluer::Error> for RadioError {
    fn from(err: bluer::Error) -> Self {
        Self::Bluez(err.to_string())
    }
}

impl From<RadioError> for io::Error {
    fn from(err: RadioError) -> Self {
        match err {
            RadioError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
