//! Connection management for a single active serial session
//!
//! This module handles:
//! - Closing the previous session before a new one connects
//! - Connecting on a background task with an optional timeout
//! - Bidirectional line streaming reported as events

mod manager;

pub use manager::{ConnectionEvent, ConnectionManager, ManagerConfig};
