//! Peer registry: capability queries and bonded peer enumeration

use crate::peer::Peer;
use crate::radio::{EnableOutcome, EnableToken, Radio};
use crate::session::{SerialSession, SessionConfig};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Entry point for discovering peers and creating sessions to them
#[derive(Debug)]
pub struct PeerRegistry<R: Radio> {
    radio: Arc<R>,
    config: SessionConfig,
}

impl<R: Radio> PeerRegistry<R> {
    /// Create a registry whose sessions use the Serial Port Profile
    pub fn new(radio: Arc<R>) -> Self {
        Self::with_config(radio, SessionConfig::default())
    }

    /// Create a registry with a custom session configuration
    pub fn with_config(radio: Arc<R>, config: SessionConfig) -> Self {
        Self { radio, config }
    }

    /// The underlying radio
    pub fn radio(&self) -> &Arc<R> {
        &self.radio
    }

    /// Whether the system has a usable adapter
    pub fn is_radio_supported(&self) -> bool {
        self.radio.adapter_present()
    }

    /// Whether the adapter is powered on. `false` when there is no adapter.
    pub async fn is_radio_enabled(&self) -> bool {
        self.radio.adapter_present() && self.radio.adapter_enabled().await
    }

    /// All peers bonded with the local adapter, one entry per address.
    ///
    /// Cancels any discovery scan first. Peers whose address cannot be
    /// resolved are skipped. Returns an empty set when there is no adapter.
    pub async fn list_bonded_peers(&self) -> HashSet<Peer<R::Handle>> {
        self.radio.cancel_active_scan().await;

        let handles = match self.radio.bonded_peer_handles().await {
            Ok(handles) => handles,
            Err(e) => {
                warn!("[REGISTRY] Cannot enumerate bonded peers: {}", e);
                return HashSet::new();
            }
        };

        let mut peers = HashSet::with_capacity(handles.len());
        for handle in handles {
            let address = match self.radio.peer_address(&handle).await {
                Ok(address) => address,
                Err(e) => {
                    warn!("[REGISTRY] Skipping bonded peer {:?}: {}", handle, e);
                    continue;
                }
            };
            let name = self.radio.peer_name(&handle).await;
            let peer = Peer::new(address, name, handle);

            if peers.contains(&peer) {
                debug!("[REGISTRY] Duplicate bonded entry for {}", peer.address());
                continue;
            }
            peers.insert(peer);
        }

        info!("[REGISTRY] {} bonded peer(s)", peers.len());
        peers
    }

    /// Look up a bonded peer by address (case-insensitive)
    pub async fn find_peer(&self, address: &str) -> Option<Peer<R::Handle>> {
        self.list_bonded_peers()
            .await
            .into_iter()
            .find(|p| p.matches_address(address))
    }

    /// Ask the platform to power the adapter on.
    ///
    /// Returns immediately; the outcome arrives on `completion` tagged with
    /// `token`.
    pub fn request_enable_radio(
        &self,
        token: EnableToken,
        completion: mpsc::UnboundedSender<EnableOutcome>,
    ) {
        info!("[REGISTRY] Requesting radio enable (token {})", token.0);
        self.radio.request_user_enable(token, completion);
    }

    /// A new idle session to `peer` using this registry's configuration
    pub fn session(&self, peer: Peer<R::Handle>) -> SerialSession<R> {
        SerialSession::new(self.radio.clone(), peer, self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::{LoopbackPeer, LoopbackRadio, PeerBehavior};
    use btserial_shared::SessionState;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_duplicate_addresses_collapse() {
        let radio = LoopbackRadio::new()
            .with_peer(LoopbackPeer::new("00:11:22:33:44:55", "HC-05"))
            .with_peer(LoopbackPeer::new("00:11:22:33:44:55", "HC-05 again"))
            .with_peer(LoopbackPeer::new("aa:bb:cc:dd:ee:ff", "Printer"));
        let registry = PeerRegistry::new(Arc::new(radio));

        let peers = registry.list_bonded_peers().await;
        assert_eq!(peers.len(), 2);
        assert!(peers.iter().any(|p| p.address() == "AA:BB:CC:DD:EE:FF"));
    }

    #[tokio::test]
    async fn test_absent_adapter() {
        let registry = PeerRegistry::new(Arc::new(LoopbackRadio::absent()));
        assert!(!registry.is_radio_supported());
        assert!(!registry.is_radio_enabled().await);
        assert!(registry.list_bonded_peers().await.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_adapter_then_enable() {
        let radio = LoopbackRadio::new();
        radio.set_enabled(false);
        let registry = PeerRegistry::new(Arc::new(radio));
        assert!(registry.is_radio_supported());
        assert!(!registry.is_radio_enabled().await);

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.request_enable_radio(EnableToken(1), tx);
        let outcome = rx.recv().await.unwrap();
        assert_eq!(outcome.token, EnableToken(1));
        assert!(outcome.enabled);
        assert!(registry.is_radio_enabled().await);
    }

    #[tokio::test]
    async fn test_unresolvable_peer_skipped() {
        let radio = LoopbackRadio::new()
            .with_peer(LoopbackPeer::new("00:11:22:33:44:55", "HC-05"))
            .with_peer(
                LoopbackPeer::new("66:77:88:99:AA:BB", "Ghost")
                    .with_behavior(PeerBehavior::Unresolvable),
            );
        let registry = PeerRegistry::new(Arc::new(radio));

        let peers = registry.list_bonded_peers().await;
        assert_eq!(peers.len(), 1);
        assert_eq!(peers.iter().next().unwrap().name(), Some("HC-05"));
    }

    #[tokio::test]
    async fn test_listing_cancels_scan() {
        let radio = Arc::new(LoopbackRadio::new());
        radio.start_scan();
        let registry = PeerRegistry::new(radio.clone());

        registry.list_bonded_peers().await;
        assert!(!radio.is_scanning());
        assert_eq!(radio.scan_cancellations(), 1);
    }

    #[tokio::test]
    async fn test_find_peer_and_session() {
        let radio = LoopbackRadio::new().with_peer(LoopbackPeer::new("00:11:22:33:44:55", "HC-05"));
        let custom = Uuid::from_u128(0xABCD);
        let registry = PeerRegistry::with_config(
            Arc::new(radio),
            SessionConfig { service_id: custom },
        );

        assert!(registry.find_peer("ff:ff:ff:ff:ff:ff").await.is_none());
        let peer = registry.find_peer("00:11:22:33:44:55").await.unwrap();

        let session = registry.session(peer);
        assert_eq!(session.service_id(), custom);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.is_connected());
    }
}
