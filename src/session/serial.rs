//! Serial session: one peer's connection lifecycle and line I/O

use crate::error::{Result, SerialError};
use crate::peer::Peer;
use crate::radio::{Radio, RadioSocket, SocketId, StreamOf};
use crate::session::line_io::{LineReader, LineWriter};
use crate::transport::TransportStream;
use btserial_shared::service::SERIAL_PORT_PROFILE;
use btserial_shared::state_machine::{
    is_valid_transition, SessionEvent, SessionState, SessionStateMachine, TransitionResult,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Upper bound on the graceful shutdown performed by `close()`
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Service identifier selecting the profile opened on the peer
    pub service_id: Uuid,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            service_id: SERIAL_PORT_PROFILE,
        }
    }
}

/// Cloneable handle that closes a session from another task.
///
/// Firing it makes a pending `connect` fail and a pending `read_line` return a
/// stream fault, and `is_connected()` reports `false` from then on. The task
/// that owns the session still calls [`SerialSession::close`] to release the
/// socket. A handle only affects the connection it was taken for: once the
/// session is closed, a new handle must be taken.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CloseHandle {
    /// Request the session to close
    pub fn close(&self) {
        self.tx.send_replace(true);
    }

    /// Whether close was requested
    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until close is requested
    pub async fn closed(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

/// One peer's serial connection.
///
/// Not internally synchronized: a single task owns the session and drives
/// every transition. Other tasks interrupt it through a [`CloseHandle`].
pub struct SerialSession<R: Radio> {
    radio: Arc<R>,
    peer: Peer<R::Handle>,
    service_id: Uuid,
    fsm: SessionStateMachine,
    socket: Option<R::Socket>,
    reader: Option<LineReader<ReadHalf<StreamOf<R>>>>,
    writer: Option<LineWriter<WriteHalf<StreamOf<R>>>>,
    had_connected_before: bool,
    close_signal: CloseHandle,
}

impl<R: Radio> SerialSession<R> {
    /// Create an idle session for `peer`
    pub fn new(radio: Arc<R>, peer: Peer<R::Handle>, config: SessionConfig) -> Self {
        Self {
            radio,
            peer,
            service_id: config.service_id,
            fsm: SessionStateMachine::new(),
            socket: None,
            reader: None,
            writer: None,
            had_connected_before: false,
            close_signal: new_close_signal(),
        }
    }

    pub fn peer(&self) -> &Peer<R::Handle> {
        &self.peer
    }

    pub fn service_id(&self) -> Uuid {
        self.service_id
    }

    /// Change the service identifier used by the next connect
    pub fn set_service_id(&mut self, service_id: Uuid) -> Result<()> {
        if self.fsm.state() == SessionState::Connected {
            return Err(SerialError::AlreadyConnected);
        }
        self.service_id = service_id;
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.fsm.state()
    }

    /// Connected and not asked to close
    pub fn is_connected(&self) -> bool {
        self.fsm.state() == SessionState::Connected && !self.close_signal.is_closed()
    }

    /// Identity of the current raw socket, if one was allocated
    pub fn socket_id(&self) -> Option<SocketId> {
        self.socket.as_ref().map(|s| s.id())
    }

    /// Handle for closing this session's current connection from elsewhere
    pub fn close_handle(&self) -> CloseHandle {
        self.close_signal.clone()
    }

    /// Establish the connection.
    ///
    /// Suspends until the handshake completes or faults; there is no internal
    /// timeout. Callers wanting one fire the [`CloseHandle`] from a timer. A
    /// connected session is closed first and reconnected on a fresh socket.
    pub async fn connect(&mut self) -> Result<()> {
        if self.fsm.state() == SessionState::Connected {
            self.close().await;
        }

        // A socket that was connected once cannot be reopened
        if self.had_connected_before {
            if let Some(mut stale) = self.socket.take() {
                if stale.is_open() {
                    stale.close().await;
                }
                debug!("[SESSION] Discarded stale socket {}", stale.id());
            }
            self.had_connected_before = false;
        }

        self.transition(SessionEvent::ConnectRequested);

        let mut socket = match self
            .radio
            .open_stream_socket(self.peer.handle(), self.service_id)
            .await
        {
            Ok(socket) => socket,
            Err(e) => {
                warn!("[SESSION] Could not allocate socket for {}: {}", self.peer, e);
                self.fail_handshake();
                return Err(SerialError::ConnectFault(e.into()));
            }
        };

        // An active scan starves connection attempts on the shared radio
        self.radio.cancel_active_scan().await;

        info!("[SESSION] Connecting to {} (service {})", self.peer, self.service_id);
        let close_signal = self.close_signal.clone();
        let outcome = tokio::select! {
            biased;
            _ = close_signal.closed() => Err(io::Error::new(
                io::ErrorKind::Interrupted,
                "connect cancelled by close",
            )),
            res = socket.connect() => res,
        };

        match outcome {
            Ok(stream) => {
                let (read_half, write_half) = tokio::io::split(stream);
                self.reader = Some(LineReader::new(read_half));
                self.writer = Some(LineWriter::new(write_half));
                self.socket = Some(socket);
                self.had_connected_before = true;
                self.transition(SessionEvent::HandshakeSucceeded);
                info!("[SESSION] Connected to {}", self.peer);
                Ok(())
            }
            Err(e) => {
                warn!("[SESSION] Connect to {} failed: {}", self.peer, e);
                socket.close().await;
                self.fail_handshake();
                Err(SerialError::ConnectFault(e))
            }
        }
    }

    /// Close the connection. Idempotent and never fails.
    pub async fn close(&mut self) {
        let reader = self.reader.take();
        let writer = self.writer.take();

        if let (Some(reader), Some(writer)) = (reader, writer) {
            let mut stream = reader.into_inner().unsplit(writer.into_inner());
            match tokio::time::timeout(SHUTDOWN_GRACE, TransportStream::shutdown(&mut stream)).await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("[SESSION] Shutdown of {} failed: {}", self.peer, e),
                Err(_) => debug!("[SESSION] Shutdown of {} timed out", self.peer),
            }
        }

        if let Some(socket) = self.socket.as_mut() {
            socket.close().await;
        }

        let was = self.fsm.state();
        self.transition(SessionEvent::CloseRequested);
        if was == SessionState::Connected {
            info!("[SESSION] Closed connection to {}", self.peer);
        }

        // Wake anything still waiting on this connection, then start a fresh epoch
        self.close_signal.close();
        self.close_signal = new_close_signal();
    }

    /// Non-blocking readiness check: is a complete line buffered?
    pub fn has_line(&mut self) -> Result<bool> {
        if self.close_signal.is_closed() {
            return Err(SerialError::closed());
        }
        self.reader
            .as_mut()
            .ok_or_else(SerialError::not_connected)?
            .has_line()
    }

    /// Wait for the next line.
    ///
    /// `Ok(None)` means the remote end closed the stream. A close request
    /// from a [`CloseHandle`] interrupts the wait with a stream fault.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        let close_signal = self.close_signal.clone();
        if close_signal.is_closed() {
            return Err(SerialError::closed());
        }
        let reader = self.reader.as_mut().ok_or_else(SerialError::not_connected)?;

        tokio::select! {
            biased;
            _ = close_signal.closed() => Err(SerialError::closed()),
            line = reader.read_line() => line,
        }
    }

    /// Write one line and flush it
    pub async fn write_line(&mut self, text: &str) -> Result<()> {
        if self.close_signal.is_closed() {
            return Err(SerialError::closed());
        }
        self.writer
            .as_mut()
            .ok_or_else(SerialError::not_connected)?
            .write_line(text)
            .await
    }

    fn fail_handshake(&mut self) {
        self.transition(SessionEvent::HandshakeFailed);
        self.close_signal = new_close_signal();
    }

    fn transition(&mut self, event: SessionEvent) {
        let from = self.fsm.state();
        match self.fsm.process_event(event) {
            TransitionResult::Success(to) => {
                debug_assert!(is_valid_transition(from, to));
                if from != to {
                    debug!("[SESSION] {}: {} -> {}", self.peer.address(), from, to);
                }
            }
            TransitionResult::Invalid { from, event } => {
                warn!("[SESSION] Ignored {:?} in state {}", event, from);
            }
        }
    }
}

fn new_close_signal() -> CloseHandle {
    let (tx, _rx) = watch::channel(false);
    CloseHandle { tx: Arc::new(tx) }
}
