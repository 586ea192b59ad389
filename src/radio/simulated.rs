//! Simulated radio: bonded peers are TCP endpoints
//!
//! Lets the console run without Bluetooth hardware. Pair it with the
//! `echo-peer` binary listening on the configured endpoint.

use crate::error::RadioError;
use crate::radio::traits::{EnableOutcome, EnableToken, Radio, RadioSocket, SocketId};
use async_trait::async_trait;
use std::io;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// Default simulated peer endpoint (matches the echo peer's default)
pub const DEFAULT_SIMULATED_ENDPOINT: &str = "127.0.0.1:9000";

/// A bonded peer simulated by a TCP endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedPeer {
    pub name: String,
    pub address: String,
    pub endpoint: String,
}

impl Default for SimulatedPeer {
    fn default() -> Self {
        Self {
            name: "echo-peer".into(),
            address: "00:00:00:00:00:01".into(),
            endpoint: DEFAULT_SIMULATED_ENDPOINT.into(),
        }
    }
}

impl FromStr for SimulatedPeer {
    type Err = String;

    /// Parse `NAME=ADDRESS@HOST:PORT`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, rest) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=ADDRESS@HOST:PORT, got '{}'", s))?;
        let (address, endpoint) = rest
            .split_once('@')
            .ok_or_else(|| format!("missing '@HOST:PORT' in '{}'", s))?;

        if address.trim().is_empty() {
            return Err(format!("empty address in '{}'", s));
        }
        if endpoint.trim().is_empty() {
            return Err(format!("empty endpoint in '{}'", s));
        }

        Ok(Self {
            name: name.trim().to_string(),
            address: address.trim().to_string(),
            endpoint: endpoint.trim().to_string(),
        })
    }
}

/// Radio whose peers are reached over TCP
#[derive(Debug)]
pub struct SimulatedRadio {
    peers: Vec<SimulatedPeer>,
    enabled: AtomicBool,
    next_socket_id: AtomicU64,
}

impl SimulatedRadio {
    /// Create a powered simulated radio with the given bonded peers
    pub fn new(peers: Vec<SimulatedPeer>) -> Self {
        info!("[SIM] Simulated radio with {} peer(s)", peers.len());
        Self {
            peers,
            enabled: AtomicBool::new(true),
            next_socket_id: AtomicU64::new(1),
        }
    }

    /// Power the simulated adapter on or off
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}

#[async_trait]
impl Radio for SimulatedRadio {
    type Handle = usize;
    type Socket = SimulatedSocket;

    fn adapter_present(&self) -> bool {
        true
    }

    async fn adapter_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn cancel_active_scan(&self) {
        // No discovery in simulation
    }

    async fn bonded_peer_handles(&self) -> Result<Vec<usize>, RadioError> {
        Ok((0..self.peers.len()).collect())
    }

    async fn peer_name(&self, handle: &usize) -> Option<String> {
        self.peers.get(*handle).map(|p| p.name.clone())
    }

    async fn peer_address(&self, handle: &usize) -> Result<String, RadioError> {
        self.peers
            .get(*handle)
            .map(|p| p.address.clone())
            .ok_or_else(|| RadioError::UnresolvablePeer(format!("handle {}", handle)))
    }

    async fn open_stream_socket(
        &self,
        handle: &usize,
        service_id: Uuid,
    ) -> Result<SimulatedSocket, RadioError> {
        let peer = self
            .peers
            .get(*handle)
            .ok_or_else(|| RadioError::UnresolvablePeer(format!("handle {}", handle)))?;

        Ok(SimulatedSocket {
            id: self.next_socket_id.fetch_add(1, Ordering::SeqCst),
            endpoint: peer.endpoint.clone(),
            service_id,
            open: true,
        })
    }

    fn request_user_enable(&self, token: EnableToken, completion: mpsc::UnboundedSender<EnableOutcome>) {
        self.enabled.store(true, Ordering::SeqCst);
        let _ = completion.send(EnableOutcome { token, enabled: true });
    }
}

/// TCP-backed socket of the simulated radio
#[derive(Debug)]
pub struct SimulatedSocket {
    id: SocketId,
    endpoint: String,
    service_id: Uuid,
    open: bool,
}

#[async_trait]
impl RadioSocket for SimulatedSocket {
    type Stream = TcpStream;

    fn id(&self) -> SocketId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn connect(&mut self) -> io::Result<TcpStream> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "socket closed"));
        }
        debug!(
            "[SIM] Connecting to {} (service {})",
            self.endpoint, self.service_id
        );
        let stream = TcpStream::connect(&self.endpoint).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    async fn close(&mut self) {
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_simulated_peer() {
        let peer: SimulatedPeer = "HC-05=00:11:22:33:44:55@127.0.0.1:9100".parse().unwrap();
        assert_eq!(peer.name, "HC-05");
        assert_eq!(peer.address, "00:11:22:33:44:55");
        assert_eq!(peer.endpoint, "127.0.0.1:9100");
    }

    #[test]
    fn test_parse_simulated_peer_errors() {
        assert!("no-equals".parse::<SimulatedPeer>().is_err());
        assert!("name=addr".parse::<SimulatedPeer>().is_err());
        assert!("name=@127.0.0.1:1".parse::<SimulatedPeer>().is_err());
    }

    #[test]
    fn test_default_peer() {
        let peer = SimulatedPeer::default();
        assert_eq!(peer.endpoint, DEFAULT_SIMULATED_ENDPOINT);
    }

    #[tokio::test]
    async fn test_connect_refused_when_nothing_listens() {
        // Bind then drop to get a port with no listener
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        drop(listener);

        let radio = SimulatedRadio::new(vec![SimulatedPeer {
            endpoint,
            ..Default::default()
        }]);
        let mut socket = radio.open_stream_socket(&0, Uuid::nil()).await.unwrap();
        assert!(socket.connect().await.is_err());

        socket.close().await;
        assert!(!socket.is_open());
        assert_eq!(
            socket.connect().await.unwrap_err().kind(),
            io::ErrorKind::NotConnected
        );
    }

    #[tokio::test]
    async fn test_connect_reaches_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            buf
        });

        let radio = SimulatedRadio::new(vec![SimulatedPeer {
            endpoint,
            ..Default::default()
        }]);
        assert_eq!(radio.peer_address(&0).await.unwrap(), "00:00:00:00:00:01");
        assert_eq!(radio.peer_name(&0).await.as_deref(), Some("echo-peer"));

        let mut socket = radio.open_stream_socket(&0, Uuid::nil()).await.unwrap();
        let mut stream = socket.connect().await.unwrap();
        stream.write_all(b"PING\n").await.unwrap();
        assert_eq!(&server.await.unwrap(), b"PING\n");
    }
}
