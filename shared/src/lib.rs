//! btserial Shared Protocol Types
//!
//! This crate provides the line codec, the session state machine and the
//! service identifiers shared by the serial client and the echo peer.

pub mod codec;
pub mod state_machine;

pub use state_machine::{SessionEvent, SessionState, SessionStateMachine};
pub use uuid::Uuid;

/// Well-known service identifiers
pub mod service {
    use uuid::Uuid;

    /// Serial Port Profile (SPP) service class UUID
    pub const SERIAL_PORT_PROFILE: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

    /// RFCOMM channel the echo peer listens on by default
    pub const DEFAULT_RFCOMM_CHANNEL: u8 = 1;

    /// Parse a service identifier from its 128-bit string form
    pub fn parse(text: &str) -> Result<Uuid, uuid::Error> {
        Uuid::parse_str(text.trim())
    }
}
