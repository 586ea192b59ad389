//! BlueZ radio backend: bonded device enumeration, discovery and RFCOMM sockets

use crate::error::RadioError;
use crate::radio::traits::{EnableOutcome, EnableToken, Radio, RadioSocket, SocketId};
use async_trait::async_trait;
use bluer::rfcomm::{Profile, ProfileHandle, Role, SocketAddr as RfcommAddr, Stream as RfcommStream};
use bluer::{Adapter, AdapterEvent, Address, Session};
use futures::StreamExt;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Configuration for the BlueZ radio
#[derive(Debug, Clone)]
pub struct BluezConfig {
    /// Fixed RFCOMM channel. `None` resolves the channel from the service UUID
    /// through a registered client profile.
    pub channel: Option<u8>,
    /// How long a discovery scan runs
    pub scan_duration: Duration,
}

impl Default for BluezConfig {
    fn default() -> Self {
        Self {
            channel: None,
            scan_duration: Duration::from_secs(10),
        }
    }
}

/// Radio backed by the system's default BlueZ adapter
pub struct BluezRadio {
    session: Option<Session>,
    adapter: Option<Adapter>,
    config: BluezConfig,
    /// Background discovery task, if a scan is running
    scan: Mutex<Option<JoinHandle<()>>>,
    next_socket_id: AtomicU64,
}

impl fmt::Debug for BluezRadio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BluezRadio")
            .field("adapter", &self.adapter.as_ref().map(|a| a.name().to_string()))
            .field("config", &self.config)
            .finish()
    }
}

impl BluezRadio {
    /// Connect to BlueZ and pick the default adapter.
    ///
    /// Never fails: a missing daemon or adapter yields a radio that reports
    /// itself unsupported.
    pub async fn new(config: BluezConfig) -> Self {
        let (session, adapter) = match Self::get_adapter().await {
            Ok((session, adapter)) => {
                info!("[BT] Using Bluetooth adapter: {}", adapter.name());
                (Some(session), Some(adapter))
            }
            Err(e) => {
                warn!("[BT] No usable Bluetooth adapter: {}", e);
                (None, None)
            }
        };

        Self {
            session,
            adapter,
            config,
            scan: Mutex::new(None),
            next_socket_id: AtomicU64::new(1),
        }
    }

    /// Get the default Bluetooth adapter
    async fn get_adapter() -> bluer::Result<(Session, Adapter)> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        Ok((session, adapter))
    }

    fn adapter(&self) -> Result<&Adapter, RadioError> {
        self.adapter.as_ref().ok_or(RadioError::AdapterUnavailable)
    }

    /// Start a background discovery scan for the configured duration.
    ///
    /// A running scan is replaced. Discovered devices are logged only; new
    /// pairings happen outside this crate.
    pub async fn start_scan(&self) -> Result<(), RadioError> {
        let adapter = self.adapter()?.clone();
        let scan_duration = self.config.scan_duration;

        let task = tokio::spawn(async move {
            let discover = match adapter.discover_devices().await {
                Ok(discover) => discover,
                Err(e) => {
                    warn!("[BT] Discovery failed to start: {}", e);
                    return;
                }
            };
            tokio::pin!(discover);

            let scan_result = timeout(scan_duration, async {
                while let Some(evt) = discover.next().await {
                    if let AdapterEvent::DeviceAdded(addr) = evt {
                        debug!("[BT] Discovered {}", addr);
                    }
                }
            })
            .await;

            // Timeout is expected, not an error
            if scan_result.is_err() {
                info!("[BT] Discovery scan completed");
            }
        });

        if let Some(previous) = self.scan.lock().await.replace(task) {
            previous.abort();
        }
        Ok(())
    }
}

#[async_trait]
impl Radio for BluezRadio {
    type Handle = Address;
    type Socket = BluezSocket;

    fn adapter_present(&self) -> bool {
        self.adapter.is_some()
    }

    async fn adapter_enabled(&self) -> bool {
        match &self.adapter {
            Some(adapter) => adapter.is_powered().await.unwrap_or(false),
            None => false,
        }
    }

    async fn cancel_active_scan(&self) {
        // Dropping the discovery stream ends the scan
        if let Some(task) = self.scan.lock().await.take() {
            task.abort();
            debug!("[BT] Discovery scan cancelled");
        }
    }

    async fn bonded_peer_handles(&self) -> Result<Vec<Address>, RadioError> {
        let adapter = self.adapter()?;
        let mut bonded = Vec::new();

        for addr in adapter.device_addresses().await? {
            let device = match adapter.device(addr) {
                Ok(device) => device,
                Err(e) => {
                    debug!("[BT] Skipping {}: {}", addr, e);
                    continue;
                }
            };
            match device.is_paired().await {
                Ok(true) => bonded.push(addr),
                Ok(false) => {}
                Err(e) => debug!("[BT] Pairing state of {} unknown: {}", addr, e),
            }
        }

        Ok(bonded)
    }

    async fn peer_name(&self, handle: &Address) -> Option<String> {
        let device = self.adapter.as_ref()?.device(*handle).ok()?;
        device.name().await.ok().flatten()
    }

    async fn peer_address(&self, handle: &Address) -> Result<String, RadioError> {
        self.adapter()?.device(*handle)?;
        Ok(handle.to_string())
    }

    async fn open_stream_socket(
        &self,
        handle: &Address,
        service_id: Uuid,
    ) -> Result<BluezSocket, RadioError> {
        let adapter = self.adapter()?.clone();
        let session = self.session.clone().ok_or(RadioError::AdapterUnavailable)?;
        adapter.device(*handle)?;

        Ok(BluezSocket {
            id: self.next_socket_id.fetch_add(1, Ordering::SeqCst),
            session,
            adapter,
            address: *handle,
            service_id,
            channel: self.config.channel,
            profile: None,
            open: true,
        })
    }

    fn request_user_enable(&self, token: EnableToken, completion: mpsc::UnboundedSender<EnableOutcome>) {
        let Some(adapter) = self.adapter.clone() else {
            let _ = completion.send(EnableOutcome { token, enabled: false });
            return;
        };

        tokio::spawn(async move {
            info!("[BT] Powering on Bluetooth adapter...");
            let enabled = match adapter.set_powered(true).await {
                Ok(()) => true,
                Err(e) => {
                    warn!("[BT] Failed to power on adapter: {}", e);
                    false
                }
            };
            let _ = completion.send(EnableOutcome { token, enabled });
        });
    }
}

/// RFCOMM socket bound to one device and service
pub struct BluezSocket {
    id: SocketId,
    session: Session,
    adapter: Adapter,
    address: Address,
    service_id: Uuid,
    channel: Option<u8>,
    /// Client profile registration, kept alive while connected
    profile: Option<ProfileHandle>,
    open: bool,
}

impl BluezSocket {
    /// Resolve the service through BlueZ by registering a client profile for
    /// the UUID and asking the device to connect it.
    async fn connect_profile(&mut self) -> io::Result<RfcommStream> {
        let uuid = self.service_id;
        let profile = Profile {
            uuid,
            name: Some("btserial".into()),
            role: Some(Role::Client),
            require_authentication: Some(false),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };

        let mut handle = self.session.register_profile(profile).await.map_err(to_io)?;
        let device = self.adapter.device(self.address).map_err(to_io)?;
        info!("[BT] Connecting to {} service {}", self.address, uuid);

        let connect = device.connect_profile(&uuid);
        tokio::pin!(connect);
        let mut connect_done = false;

        let stream = loop {
            tokio::select! {
                res = &mut connect, if !connect_done => {
                    connect_done = true;
                    res.map_err(to_io)?;
                }
                req = handle.next() => {
                    let req = req.ok_or_else(|| {
                        io::Error::new(io::ErrorKind::ConnectionAborted, "profile unregistered")
                    })?;
                    break req.accept().map_err(to_io)?;
                }
            }
        };

        self.profile = Some(handle);
        Ok(stream)
    }
}

#[async_trait]
impl RadioSocket for BluezSocket {
    type Stream = RfcommStream;

    fn id(&self) -> SocketId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn connect(&mut self) -> io::Result<RfcommStream> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "socket closed"));
        }

        let stream = match self.channel {
            Some(channel) => {
                info!("[BT] Connecting to {} channel {}", self.address, channel);
                RfcommStream::connect(RfcommAddr::new(self.address, channel)).await?
            }
            None => self.connect_profile().await?,
        };

        match stream.peer_addr() {
            Ok(remote) => info!("[BT] Connected to {} channel {}", remote.addr, remote.channel),
            Err(_) => info!("[BT] Connected to {}", self.address),
        }
        Ok(stream)
    }

    async fn close(&mut self) {
        self.open = false;
        self.profile = None;
    }
}

fn to_io(err: impl fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BluezConfig::default();
        assert_eq!(config.scan_duration, Duration::from_secs(10));
        assert!(config.channel.is_none());
    }

    #[test]
    fn test_to_io_keeps_message() {
        let err = to_io("Page Timeout");
        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert_eq!(err.to_string(), "Page Timeout");
    }
}
