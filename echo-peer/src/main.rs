//! Echo peer: accepts serial connections and echoes every line back
//!
//! Listens on TCP for the simulated radio, or as an RFCOMM Serial Port
//! Profile server on a BlueZ adapter.

use anyhow::{Context, Result};
use bluer::rfcomm::{Profile, Role};
use btserial_shared::codec::{self, CodecError, LineDecoder};
use btserial_shared::service::{DEFAULT_RFCOMM_CHANNEL, SERIAL_PORT_PROFILE};
use bytes::BytesMut;
use clap::Parser;
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Echo peer for btserial sessions.
#[derive(Parser, Debug, Clone)]
#[command(name = "echo-peer")]
#[command(about = "Echoes each received line back to the sender")]
#[command(version)]
struct Args {
    /// TCP listen address.
    #[arg(long, default_value = "127.0.0.1:9000")]
    listen: String,

    /// Serve RFCOMM on the local Bluetooth adapter instead of TCP.
    #[arg(long)]
    rfcomm: bool,

    /// RFCOMM channel (with --rfcomm).
    #[arg(long, default_value_t = DEFAULT_RFCOMM_CHANNEL)]
    channel: u8,

    /// Text prepended to every echoed line.
    #[arg(long, default_value = "echo: ")]
    prefix: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    if args.rfcomm {
        serve_rfcomm(args.channel, args.prefix).await
    } else {
        serve_tcp(&args.listen, args.prefix).await
    }
}

async fn serve_tcp(listen: &str, prefix: String) -> Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("binding {}", listen))?;
    info!("[ECHO] Listening on tcp://{}", listener.local_addr()?);

    loop {
        let (socket, remote) = listener.accept().await?;
        info!("[ECHO] Connection from {}", remote);
        let prefix = prefix.clone();
        tokio::spawn(async move {
            report(&remote.to_string(), echo_lines(socket, &prefix).await);
        });
    }
}

async fn serve_rfcomm(channel: u8, prefix: String) -> Result<()> {
    let session = bluer::Session::new().await?;
    let adapter = session.default_adapter().await?;
    info!("[BT] Using Bluetooth adapter: {}", adapter.name());

    if !adapter.is_powered().await? {
        info!("[BT] Powering on Bluetooth adapter...");
        adapter.set_powered(true).await?;
    }

    // Advertise the Serial Port Profile so clients can resolve the channel
    let profile = Profile {
        uuid: SERIAL_PORT_PROFILE,
        name: Some("btserial echo".into()),
        role: Some(Role::Server),
        channel: Some(channel.into()),
        require_authentication: Some(false),
        require_authorization: Some(false),
        ..Default::default()
    };
    let mut requests = session.register_profile(profile).await?;
    info!("[BT] RFCOMM echo listening on channel {}", channel);

    while let Some(request) = requests.next().await {
        let remote = request.device().to_string();
        let stream = match request.accept() {
            Ok(stream) => stream,
            Err(e) => {
                warn!("[BT] Failed to accept {}: {}", remote, e);
                continue;
            }
        };
        info!("[BT] Connection from {}", remote);
        let prefix = prefix.clone();
        tokio::spawn(async move {
            report(&remote, echo_lines(stream, &prefix).await);
        });
    }

    Ok(())
}

fn report(remote: &str, result: Result<usize>) {
    match result {
        Ok(count) => info!("[ECHO] {} disconnected after {} line(s)", remote, count),
        Err(e) => warn!("[ECHO] {} dropped: {:#}", remote, e),
    }
}

/// Echo each line of `stream` back with `prefix` until the peer hangs up.
/// Returns the number of lines echoed.
async fn echo_lines<S>(mut stream: S, prefix: &str) -> Result<usize>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut decoder = LineDecoder::new();
    let mut read_buf = vec![0u8; 4096];
    let mut reply = BytesMut::new();
    let mut echoed = 0;

    loop {
        let n = stream.read(&mut read_buf).await?;
        if n == 0 {
            // Unterminated text at hangup is echoed too; the write may fail
            if let Some(last) = decoder.take_remainder() {
                if push_echo(prefix, &last, &mut reply) && stream.write_all(&reply).await.is_ok() {
                    echoed += 1;
                }
            }
            return Ok(echoed);
        }
        decoder.extend(&read_buf[..n]);

        loop {
            match decoder.decode_next() {
                Ok(Some(line)) => {
                    debug!("[ECHO] <- {}", line);
                    if push_echo(prefix, &line, &mut reply) {
                        echoed += 1;
                    }
                }
                Ok(None) => break,
                Err(CodecError::LineTooLong(len)) => {
                    warn!("[ECHO] Dropping {} byte line", len);
                    decoder.clear();
                    break;
                }
            }
        }

        if !reply.is_empty() {
            stream.write_all(&reply).await?;
            stream.flush().await?;
            reply.clear();
        }
    }
}

/// Append the prefixed echo of `line` to `reply`; a line that no longer
/// fits once prefixed is skipped.
fn push_echo(prefix: &str, line: &str, reply: &mut BytesMut) -> bool {
    match codec::encode_into(&format!("{}{}", prefix, line), reply) {
        Ok(()) => true,
        Err(e) => {
            warn!("[ECHO] Skipping line too long to echo: {}", e);
            false
        }
    }
}
