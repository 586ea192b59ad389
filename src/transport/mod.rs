//! Byte streams produced by radio sockets

mod traits;

pub use traits::TransportStream;
