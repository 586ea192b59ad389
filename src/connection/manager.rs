//! Connection manager driving one serial session on a background task

use crate::radio::Radio;
use crate::session::{CloseHandle, SerialSession};
use anyhow::{anyhow, Result};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Events emitted by the connection manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Handshake started
    Connecting { peer: String },
    /// Session established
    Connected { peer: String },
    /// Handshake failed; the session is closed
    ConnectFailed { peer: String, reason: String },
    /// A complete line arrived from the peer
    LineReceived(String),
    /// A read or write on the established link failed
    StreamFault { reason: String },
    /// Session closed, either on request or because the link ended
    Disconnected { peer: String, reason: String },
}

/// Configuration for the connection manager
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Upper bound on the connect handshake. `None` waits for the transport.
    pub connect_timeout: Option<Duration>,
    /// Outbound line queue depth
    pub outbound_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(15)),
            outbound_capacity: 100,
        }
    }
}

/// The session currently driven by the worker
struct ActiveSession {
    peer: String,
    close: CloseHandle,
    outbound_tx: mpsc::Sender<String>,
    task: JoinHandle<()>,
}

/// Holds at most one active session and runs its connect and read loop
/// off the caller's task.
pub struct ConnectionManager {
    config: ManagerConfig,
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    event_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    active: Option<ActiveSession>,
}

impl ConnectionManager {
    pub fn new(config: ManagerConfig) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            config,
            event_tx,
            event_rx,
            active: None,
        }
    }

    /// Make `session` the active one.
    ///
    /// The previously active session is closed first and its worker awaited,
    /// so its final event precedes this session's `Connecting`. That event is
    /// `Disconnected` for an established session and `ConnectFailed` for one
    /// still in its handshake.
    pub async fn connect<R: Radio>(&mut self, mut session: SerialSession<R>) {
        self.close().await;

        // Take the close handle for the connection about to be made
        if session.is_connected() {
            session.close().await;
        }

        let peer = session.peer().to_string();
        let close = session.close_handle();
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_capacity);

        let config = self.config.clone();
        let event_tx = self.event_tx.clone();
        let task = tokio::spawn(async move {
            session_worker(session, config, outbound_rx, event_tx).await;
        });

        self.active = Some(ActiveSession {
            peer,
            close,
            outbound_tx,
            task,
        });
    }

    /// Queue a line for the active session's writer
    pub async fn send(&self, line: impl Into<String>) -> Result<()> {
        let active = self
            .active
            .as_ref()
            .ok_or_else(|| anyhow!("No active session"))?;
        active
            .outbound_tx
            .send(line.into())
            .await
            .map_err(|_| anyhow!("Session to {} is closed", active.peer))
    }

    /// Close the active session, if any, and wait for its worker to finish
    pub async fn close(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        debug!("[CONN] Closing session to {}", active.peer);
        active.close.close();
        if let Err(e) = active.task.await {
            error!("[CONN] Session worker for {} failed: {}", active.peer, e);
        }
    }

    /// Receive the next connection event
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.event_rx.recv().await
    }

    /// Whether a session worker is still running
    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .map(|a| !a.task.is_finished())
            .unwrap_or(false)
    }

    /// Display form of the active session's peer
    pub fn active_peer(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.peer.as_str())
    }
}

/// Connect, then pump lines both ways until the session ends
async fn session_worker<R: Radio>(
    mut session: SerialSession<R>,
    config: ManagerConfig,
    mut outbound_rx: mpsc::Receiver<String>,
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
) {
    let peer = session.peer().to_string();
    let close = session.close_handle();
    let _ = event_tx.send(ConnectionEvent::Connecting { peer: peer.clone() });

    // The watchdog closes the session instead of dropping the handshake
    let watchdog = config.connect_timeout.map(|limit| {
        let close = close.clone();
        let peer = peer.clone();
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            warn!("[CONN] Connect to {} timed out after {:?}", peer, limit);
            close.close();
        })
    });

    let connected = session.connect().await;
    if let Some(watchdog) = watchdog {
        watchdog.abort();
    }

    if let Err(e) = connected {
        let _ = event_tx.send(ConnectionEvent::ConnectFailed {
            peer,
            reason: e.to_string(),
        });
        return;
    }

    let _ = event_tx.send(ConnectionEvent::Connected { peer: peer.clone() });

    let reason = loop {
        tokio::select! {
            _ = close.closed() => break "closed by request".to_string(),

            outbound = outbound_rx.recv() => {
                let Some(line) = outbound else {
                    break "manager dropped".to_string();
                };
                if let Err(e) = session.write_line(&line).await {
                    let _ = event_tx.send(ConnectionEvent::StreamFault { reason: e.to_string() });
                    break e.to_string();
                }
            }

            result = session.read_line() => match result {
                Ok(Some(line)) => {
                    let _ = event_tx.send(ConnectionEvent::LineReceived(line));
                }
                Ok(None) => break "peer closed the stream".to_string(),
                Err(e) => {
                    // A close request surfaces here as a fault too
                    if close.is_closed() {
                        break "closed by request".to_string();
                    }
                    let _ = event_tx.send(ConnectionEvent::StreamFault { reason: e.to_string() });
                    break e.to_string();
                }
            },
        }
    };

    session.close().await;
    info!("[CONN] Disconnected from {}: {}", peer, reason);
    let _ = event_tx.send(ConnectionEvent::Disconnected { peer, reason });
}
