mod cli;

use anyhow::{anyhow, bail, Result};
use btserial::connection::{ConnectionEvent, ConnectionManager};
use btserial::radio::{BluezRadio, EnableToken, Radio, SimulatedRadio};
use btserial::PeerRegistry;
use cli::{Cli, RadioMode};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const ENABLE_REQUEST: EnableToken = EnableToken(1);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Initialize tracing; RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.mode {
        RadioMode::Bluez => {
            let radio = BluezRadio::new(cli.bluez_config()).await;
            if cli.scan {
                if let Err(e) = radio.start_scan().await {
                    warn!("[MAIN] Could not start discovery: {}", e);
                }
            }
            run(Arc::new(radio), &cli).await
        }
        RadioMode::Simulated => {
            if cli.scan {
                info!("[MAIN] Discovery is not simulated; --scan ignored");
            }
            let radio = SimulatedRadio::new(cli.simulated_peers());
            run(Arc::new(radio), &cli).await
        }
    }
}

async fn run<R: Radio>(radio: Arc<R>, cli: &Cli) -> Result<()> {
    let registry = PeerRegistry::with_config(radio, cli.session_config());

    if !registry.is_radio_supported() {
        bail!("Bluetooth is not supported on this system");
    }

    if !registry.is_radio_enabled().await {
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.request_enable_radio(ENABLE_REQUEST, tx);
        match rx.recv().await {
            Some(outcome) if outcome.token == ENABLE_REQUEST && outcome.enabled => {
                info!("[MAIN] Bluetooth enabled");
            }
            _ => bail!("Bluetooth must be enabled to continue"),
        }
    }

    if cli.list || cli.peer.is_none() {
        let peers = registry.list_bonded_peers().await;
        let mut listed: Vec<_> = peers.iter().collect();
        listed.sort_by(|a, b| a.address().cmp(b.address()));
        for peer in listed {
            println!("{}", peer);
        }
    }

    let Some(address) = cli.peer.as_deref() else {
        return Ok(());
    };
    let peer = registry
        .find_peer(address)
        .await
        .ok_or_else(|| anyhow!("{} is not a bonded peer", address))?;

    let mut manager = ConnectionManager::new(cli.manager_config());
    manager.connect(registry.session(peer)).await;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("[MAIN] Interrupted, closing session");
                manager.close().await;
                break;
            }

            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if let Err(e) = manager.send(line).await {
                        warn!("[MAIN] Failed to send: {}", e);
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    warn!("[MAIN] Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            },

            event = manager.recv() => match event {
                Some(ConnectionEvent::Connecting { peer }) => info!("[MAIN] Connecting to {}...", peer),
                Some(ConnectionEvent::Connected { peer }) => info!("[MAIN] Connected to {}", peer),
                Some(ConnectionEvent::ConnectFailed { peer, reason }) => {
                    bail!("Connect to {} failed: {}", peer, reason);
                }
                Some(ConnectionEvent::LineReceived(line)) => println!("{}", line),
                Some(ConnectionEvent::StreamFault { reason }) => warn!("[MAIN] Stream fault: {}", reason),
                Some(ConnectionEvent::Disconnected { peer, reason }) => {
                    info!("[MAIN] Disconnected from {}: {}", peer, reason);
                    break;
                }
                None => {
                    error!("[MAIN] Connection manager closed");
                    break;
                }
            },
        }
    }

    Ok(())
}
