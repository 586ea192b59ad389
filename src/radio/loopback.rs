//! In-memory radio backed by `tokio::io::duplex` pipes
//!
//! Every accepted connection hands its far end to whoever calls
//! [`LoopbackRadio::accept`], so a test can play the remote peer.

use crate::error::RadioError;
use crate::radio::traits::{EnableOutcome, EnableToken, Radio, RadioSocket, SocketId};
use async_trait::async_trait;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::io::DuplexStream;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Pipe capacity for each simulated link
const PIPE_CAPACITY: usize = 64 * 1024;

/// How a scripted peer reacts to a connect handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerBehavior {
    /// Accept and hand the far end to `accept()`
    Accept,
    /// Refuse immediately
    Refuse,
    /// Never answer; the handshake stays pending until closed out from under it
    Hang,
    /// The bonded handle cannot be resolved into a peer
    Unresolvable,
}

/// A scripted bonded peer
#[derive(Debug, Clone)]
pub struct LoopbackPeer {
    pub address: String,
    pub name: Option<String>,
    pub behavior: PeerBehavior,
}

impl LoopbackPeer {
    /// A peer that accepts connections
    pub fn new(address: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: Some(name.into()),
            behavior: PeerBehavior::Accept,
        }
    }

    /// Change how this peer reacts to a handshake
    pub fn with_behavior(mut self, behavior: PeerBehavior) -> Self {
        self.behavior = behavior;
        self
    }
}

/// The far end of an accepted loopback connection
#[derive(Debug)]
pub struct LoopbackConnection {
    pub peer_address: String,
    pub service_id: Uuid,
    pub socket_id: SocketId,
    pub stream: DuplexStream,
}

/// In-memory radio for tests and demos
#[derive(Debug)]
pub struct LoopbackRadio {
    present: bool,
    enabled: AtomicBool,
    scanning: AtomicBool,
    scan_cancellations: AtomicUsize,
    peers: Vec<LoopbackPeer>,
    next_socket_id: AtomicU64,
    accepted_tx: mpsc::UnboundedSender<LoopbackConnection>,
    accepted_rx: Mutex<mpsc::UnboundedReceiver<LoopbackConnection>>,
}

impl Default for LoopbackRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackRadio {
    /// A present, powered adapter with no bonded peers
    pub fn new() -> Self {
        let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();
        Self {
            present: true,
            enabled: AtomicBool::new(true),
            scanning: AtomicBool::new(false),
            scan_cancellations: AtomicUsize::new(0),
            peers: Vec::new(),
            next_socket_id: AtomicU64::new(1),
            accepted_tx,
            accepted_rx: Mutex::new(accepted_rx),
        }
    }

    /// A system with no adapter at all
    pub fn absent() -> Self {
        let mut radio = Self::new();
        radio.present = false;
        radio.enabled = AtomicBool::new(false);
        radio
    }

    /// Add a bonded peer
    pub fn with_peer(mut self, peer: LoopbackPeer) -> Self {
        self.peers.push(peer);
        self
    }

    /// Power the adapter on or off
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Pretend a discovery scan is running
    pub fn start_scan(&self) {
        self.scanning.store(true, Ordering::SeqCst);
    }

    /// Whether a scan is running
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// How many times a scan cancellation was requested
    pub fn scan_cancellations(&self) -> usize {
        self.scan_cancellations.load(Ordering::SeqCst)
    }

    /// Wait for the next accepted connection and return its far end
    pub async fn accept(&self) -> Option<LoopbackConnection> {
        self.accepted_rx.lock().await.recv().await
    }
}

#[async_trait]
impl Radio for LoopbackRadio {
    type Handle = usize;
    type Socket = LoopbackSocket;

    fn adapter_present(&self) -> bool {
        self.present
    }

    async fn adapter_enabled(&self) -> bool {
        self.present && self.enabled.load(Ordering::SeqCst)
    }

    async fn cancel_active_scan(&self) {
        self.scanning.store(false, Ordering::SeqCst);
        self.scan_cancellations.fetch_add(1, Ordering::SeqCst);
    }

    async fn bonded_peer_handles(&self) -> Result<Vec<usize>, RadioError> {
        if !self.present {
            return Err(RadioError::AdapterUnavailable);
        }
        Ok((0..self.peers.len()).collect())
    }

    async fn peer_name(&self, handle: &usize) -> Option<String> {
        self.peers.get(*handle).and_then(|p| p.name.clone())
    }

    async fn peer_address(&self, handle: &usize) -> Result<String, RadioError> {
        match self.peers.get(*handle) {
            Some(peer) if peer.behavior != PeerBehavior::Unresolvable => Ok(peer.address.clone()),
            Some(peer) => Err(RadioError::UnresolvablePeer(peer.address.clone())),
            None => Err(RadioError::UnresolvablePeer(format!("handle {}", handle))),
        }
    }

    async fn open_stream_socket(
        &self,
        handle: &usize,
        service_id: Uuid,
    ) -> Result<LoopbackSocket, RadioError> {
        let peer = self
            .peers
            .get(*handle)
            .filter(|p| p.behavior != PeerBehavior::Unresolvable)
            .ok_or_else(|| RadioError::UnresolvablePeer(format!("handle {}", handle)))?;

        let id = self.next_socket_id.fetch_add(1, Ordering::SeqCst);
        debug!("[LOOPBACK] Socket {} allocated for {}", id, peer.address);

        Ok(LoopbackSocket {
            id,
            peer: peer.clone(),
            service_id,
            open: true,
            accepted_tx: self.accepted_tx.clone(),
        })
    }

    fn request_user_enable(&self, token: EnableToken, completion: mpsc::UnboundedSender<EnableOutcome>) {
        if self.present {
            self.enabled.store(true, Ordering::SeqCst);
        }
        let _ = completion.send(EnableOutcome {
            token,
            enabled: self.present,
        });
    }
}

/// Socket of the loopback radio
#[derive(Debug)]
pub struct LoopbackSocket {
    id: SocketId,
    peer: LoopbackPeer,
    service_id: Uuid,
    open: bool,
    accepted_tx: mpsc::UnboundedSender<LoopbackConnection>,
}

#[async_trait]
impl RadioSocket for LoopbackSocket {
    type Stream = DuplexStream;

    fn id(&self) -> SocketId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn connect(&mut self) -> io::Result<DuplexStream> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "socket closed"));
        }

        match self.peer.behavior {
            PeerBehavior::Accept => {
                let (near, far) = tokio::io::duplex(PIPE_CAPACITY);
                self.accepted_tx
                    .send(LoopbackConnection {
                        peer_address: self.peer.address.clone(),
                        service_id: self.service_id,
                        socket_id: self.id,
                        stream: far,
                    })
                    .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "no listener"))?;
                Ok(near)
            }
            PeerBehavior::Refuse => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{} refused the connection", self.peer.address),
            )),
            PeerBehavior::Hang => std::future::pending::<io::Result<DuplexStream>>().await,
            PeerBehavior::Unresolvable => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} cannot be resolved", self.peer.address),
            )),
        }
    }

    async fn close(&mut self) {
        self.open = false;
    }
}
