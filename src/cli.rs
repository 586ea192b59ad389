//! Command-line argument parsing.

use std::time::Duration;

use btserial::connection::ManagerConfig;
use btserial::radio::{BluezConfig, SimulatedPeer};
use btserial::session::SessionConfig;
use clap::{Parser, ValueEnum};
use uuid::Uuid;

/// Which radio backend to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RadioMode {
    /// Real Bluetooth through BlueZ
    Bluez,
    /// Peers simulated as TCP endpoints (for development)
    #[default]
    Simulated,
}

/// Serial console for bonded Bluetooth peers.
#[derive(Parser, Debug, Clone)]
#[command(name = "btserial")]
#[command(about = "Line-oriented serial console for bonded Bluetooth peers")]
#[command(version)]
pub struct Cli {
    /// Radio backend.
    #[arg(long, value_enum, default_value_t = RadioMode::Simulated)]
    pub mode: RadioMode,

    /// Address of the bonded peer to connect to.
    #[arg(long)]
    pub peer: Option<String>,

    /// List bonded peers.
    #[arg(long)]
    pub list: bool,

    /// Start a discovery scan first (bluez mode). Listing and connecting
    /// cancel it.
    #[arg(long)]
    pub scan: bool,

    /// Service UUID to open on the peer.
    #[arg(long, default_value = "00001101-0000-1000-8000-00805F9B34FB")]
    pub service: Uuid,

    /// Fixed RFCOMM channel instead of resolving the service (bluez mode).
    #[arg(long)]
    pub channel: Option<u8>,

    /// Simulated bonded peer as NAME=ADDRESS@HOST:PORT (repeatable).
    #[arg(long = "sim-peer")]
    pub sim_peers: Vec<SimulatedPeer>,

    /// Connect timeout in seconds (0 waits for the transport).
    #[arg(long, default_value_t = 15)]
    pub connect_timeout: u64,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            service_id: self.service,
        }
    }

    pub fn bluez_config(&self) -> BluezConfig {
        BluezConfig {
            channel: self.channel,
            ..Default::default()
        }
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            connect_timeout: (self.connect_timeout > 0)
                .then(|| Duration::from_secs(self.connect_timeout)),
            ..Default::default()
        }
    }

    /// Configured simulated peers, or the default echo peer
    pub fn simulated_peers(&self) -> Vec<SimulatedPeer> {
        if self.sim_peers.is_empty() {
            vec![SimulatedPeer::default()]
        } else {
            self.sim_peers.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btserial::SERIAL_PORT_PROFILE;

    #[test]
    fn test_default_values() {
        let cli = Cli::parse_from(["btserial"]);
        assert_eq!(cli.mode, RadioMode::Simulated);
        assert_eq!(cli.service, SERIAL_PORT_PROFILE);
        assert!(cli.peer.is_none());
        assert!(!cli.list);
        assert!(!cli.scan);
        assert_eq!(cli.log_level, "info");
        assert_eq!(
            cli.manager_config().connect_timeout,
            Some(Duration::from_secs(15))
        );
        assert_eq!(cli.simulated_peers(), vec![SimulatedPeer::default()]);
    }

    #[test]
    fn test_sim_peers_repeatable() {
        let cli = Cli::parse_from([
            "btserial",
            "--sim-peer",
            "a=00:00:00:00:00:0A@127.0.0.1:9001",
            "--sim-peer",
            "b=00:00:00:00:00:0B@127.0.0.1:9002",
        ]);
        let peers = cli.simulated_peers();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[1].name, "b");
        assert_eq!(peers[1].endpoint, "127.0.0.1:9002");
    }

    #[test]
    fn test_bad_sim_peer_rejected() {
        assert!(Cli::try_parse_from(["btserial", "--sim-peer", "nonsense"]).is_err());
    }

    #[test]
    fn test_bluez_options() {
        let cli = Cli::parse_from([
            "btserial",
            "--mode",
            "bluez",
            "--channel",
            "3",
            "--peer",
            "00:11:22:33:44:55",
            "--connect-timeout",
            "0",
            "--scan",
        ]);
        assert_eq!(cli.mode, RadioMode::Bluez);
        assert_eq!(cli.bluez_config().channel, Some(3));
        assert_eq!(cli.peer.as_deref(), Some("00:11:22:33:44:55"));
        assert_eq!(cli.manager_config().connect_timeout, None);
        assert!(cli.scan);
    }
}
