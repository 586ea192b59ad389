//! Radio capability abstraction for pluggable Bluetooth backends

use crate::error::RadioError;
use crate::transport::TransportStream;
use async_trait::async_trait;
use std::fmt;
use std::io;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identity of one allocated socket, unique per radio instance
pub type SocketId = u64;

/// Caller-chosen tag identifying an enable request when its outcome arrives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnableToken(pub u32);

/// Outcome of a user enable request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnableOutcome {
    pub token: EnableToken,
    pub enabled: bool,
}

/// A stream socket bound to one peer and service, not yet connected
#[async_trait]
pub trait RadioSocket: Send + 'static {
    /// The stream type a successful handshake produces
    type Stream: TransportStream;

    /// Identity of this socket
    fn id(&self) -> SocketId;

    /// Whether the socket has not been closed yet
    fn is_open(&self) -> bool;

    /// Run the connect handshake, returning the byte stream on success.
    ///
    /// Suspends until the transport establishes the stream or faults. There
    /// is no timeout here.
    async fn connect(&mut self) -> io::Result<Self::Stream>;

    /// Release the socket. Idempotent.
    async fn close(&mut self);
}

/// Capabilities consumed from the local radio subsystem
#[async_trait]
pub trait Radio: Send + Sync + 'static {
    /// Opaque handle to a bonded peer
    type Handle: Clone + fmt::Debug + Send + Sync + 'static;

    /// The socket type this radio allocates
    type Socket: RadioSocket;

    /// Whether a usable adapter exists
    fn adapter_present(&self) -> bool;

    /// Whether the adapter is powered on
    async fn adapter_enabled(&self) -> bool;

    /// Stop any in-progress discovery scan
    async fn cancel_active_scan(&self);

    /// Handles of all peers bonded with the local adapter
    async fn bonded_peer_handles(&self) -> Result<Vec<Self::Handle>, RadioError>;

    /// Human-readable name of a peer, if it has one
    async fn peer_name(&self, handle: &Self::Handle) -> Option<String>;

    /// Hardware address of a peer
    async fn peer_address(&self, handle: &Self::Handle) -> Result<String, RadioError>;

    /// Allocate a socket for `(peer, service)` without connecting it
    async fn open_stream_socket(
        &self,
        handle: &Self::Handle,
        service_id: Uuid,
    ) -> Result<Self::Socket, RadioError>;

    /// Start the platform enable flow. The outcome is sent on `completion`.
    fn request_user_enable(&self, token: EnableToken, completion: mpsc::UnboundedSender<EnableOutcome>);
}

/// The stream type produced by a radio's sockets
pub type StreamOf<R> = <<R as Radio>::Socket as RadioSocket>::Stream;
