//! Serial sessions to bonded Bluetooth peers
//!
//! - `registry`: capability queries and bonded peer enumeration
//! - `session`: connect/close lifecycle and line I/O for one peer
//! - `connection`: drives the active session on a background task
//! - `radio`: the capability interface and its BlueZ, simulated and loopback backends
//! - `transport`: byte streams produced by radio sockets

pub mod connection;
pub mod error;
pub mod peer;
pub mod radio;
pub mod registry;
pub mod session;
pub mod transport;

pub use btserial_shared::service::SERIAL_PORT_PROFILE;
pub use btserial_shared::SessionState;
pub use error::{RadioError, Result, SerialError};
pub use peer::Peer;
pub use registry::PeerRegistry;
pub use session::{CloseHandle, SerialSession, SessionConfig};
