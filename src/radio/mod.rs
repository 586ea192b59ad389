//! Radio backends
//!
//! - `bluez`: real Bluetooth through BlueZ (Linux)
//! - `simulated`: peers simulated as TCP endpoints, for development
//! - `loopback`: in-memory pipes, for tests

pub mod bluez;
pub mod loopback;
pub mod simulated;
pub mod traits;

pub use bluez::{BluezConfig, BluezRadio, BluezSocket};
pub use loopback::{LoopbackConnection, LoopbackPeer, LoopbackRadio, PeerBehavior};
pub use simulated::{SimulatedPeer, SimulatedRadio, SimulatedSocket};
pub use traits::{EnableOutcome, EnableToken, Radio, RadioSocket, SocketId, StreamOf};
