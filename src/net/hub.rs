//! Session Hub
//!
//! Connects transport peers to the authority. Owns the peer channel
//! table, forwards validated client messages into the request inbox, and
//! fans step events out to every connected peer.

use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::core::ids::PeerId;
use crate::world::state::WorldState;
use crate::authority::step::{Authority, ConstraintProbe, StepResult};
use crate::net::protocol::{ClientMessage, ServerMessage, WorldSnapshot};

/// Hub errors. Unlike request no-ops these are connection-level faults
/// and are reported to the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HubError {
    /// Session is full.
    #[error("session is full")]
    SessionFull,

    /// No such connected peer.
    #[error("peer not connected")]
    UnknownPeer,

    /// Caller is not the hosting peer.
    #[error("caller is not the host")]
    NotHost,
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum connected peers.
    pub max_peers: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self { max_peers: 8 }
    }
}

/// A connected peer.
struct PeerHandle {
    name: String,
    sender: mpsc::Sender<ServerMessage>,
}

/// The session hub: authority plus its connected peers.
pub struct SessionHub {
    authority: Authority,
    config: HubConfig,
    peers: BTreeMap<PeerId, PeerHandle>,
    /// First joiner; the only peer allowed session-level controls.
    host: Option<PeerId>,
}

impl SessionHub {
    /// Create a hub over a prepared world.
    pub fn new(world: WorldState, config: HubConfig) -> Self {
        Self {
            authority: Authority::new(world),
            config,
            peers: BTreeMap::new(),
            host: None,
        }
    }

    /// The authority (test and tooling access).
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Connected peer count.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// The hosting peer, if any.
    pub fn host(&self) -> Option<PeerId> {
        self.host
    }

    /// Admit a peer: allocate an id, create its interactor, and send the
    /// welcome snapshot. The first peer to join becomes the host. The
    /// join event reaches existing peers with the next step's batch.
    pub async fn join(
        &mut self,
        name: &str,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<PeerId, HubError> {
        if self.peers.len() >= self.config.max_peers {
            return Err(HubError::SessionFull);
        }

        let peer = PeerId::generate();
        self.authority.connect(peer);
        self.peers.insert(peer, PeerHandle {
            name: name.to_string(),
            sender,
        });

        if self.host.is_none() {
            self.host = Some(peer);
            info!("{} ({}) joined as host", name, peer.short_hex());
        } else {
            info!("{} ({}) joined", name, peer.short_hex());
        }

        let welcome = ServerMessage::Welcome {
            peer_id: peer.to_uuid_string(),
            snapshot: WorldSnapshot::capture(&self.authority.world),
        };
        self.send_to(peer, welcome).await;

        Ok(peer)
    }

    /// Handle one message from a connected peer.
    pub async fn handle_message(
        &mut self,
        peer: PeerId,
        message: ClientMessage,
    ) -> Result<(), HubError> {
        if !self.peers.contains_key(&peer) {
            return Err(HubError::UnknownPeer);
        }

        match message {
            ClientMessage::Join { .. } => {
                // Already joined over this connection; nothing to do.
            }
            ClientMessage::Request(envelope) => {
                if envelope.from != peer {
                    warn!(
                        "dropping request from {} claiming to be {}",
                        peer.short_hex(),
                        envelope.from.short_hex()
                    );
                    return Ok(());
                }
                self.authority.submit(envelope);
            }
            ClientMessage::SyncRequest => {
                let snapshot = WorldSnapshot::capture(&self.authority.world);
                self.send_to(peer, ServerMessage::Snapshot(snapshot)).await;
            }
            ClientMessage::Ping { timestamp } => {
                self.send_to(peer, ServerMessage::Pong { timestamp }).await;
            }
            ClientMessage::Leave => {
                self.disconnect(peer);
            }
        }

        Ok(())
    }

    /// Host control: start the session.
    pub fn start_session(&mut self, caller: PeerId) -> Result<(), HubError> {
        if self.host != Some(caller) {
            return Err(HubError::NotHost);
        }
        self.authority.start_session();
        Ok(())
    }

    /// Host control: flip the steal policy.
    pub fn set_steal_policy(&mut self, caller: PeerId, allowed: bool) -> Result<(), HubError> {
        if self.host != Some(caller) {
            return Err(HubError::NotHost);
        }
        self.authority.set_steal_policy(allowed);
        Ok(())
    }

    /// Drop a peer. Its holdings are released on the next step's event
    /// batch; host role passes to the next connected peer.
    pub fn disconnect(&mut self, peer: PeerId) {
        if self.peers.remove(&peer).is_none() {
            return;
        }
        self.authority.disconnect(peer);

        if self.host == Some(peer) {
            self.host = self.peers.keys().next().copied();
            if let Some(new_host) = self.host {
                info!("host role passed to {}", new_host.short_hex());
            }
        }
    }

    /// Run one authority step and broadcast the resulting events.
    pub fn step<P: ConstraintProbe>(&mut self, probe: &P) -> StepResult {
        let result = self.authority.step(probe);

        if !result.events.is_empty() {
            let message = ServerMessage::Events {
                events: result.events.clone(),
            };
            self.broadcast(message);
        }

        result
    }

    /// Notify every peer and drop all connections.
    pub fn shutdown(&mut self, reason: &str) {
        info!("shutting down session: {}", reason);
        self.broadcast(ServerMessage::Shutdown { reason: reason.to_string() });

        let peers: Vec<PeerId> = self.peers.keys().copied().collect();
        for peer in peers {
            self.authority.disconnect(peer);
        }
        self.peers.clear();
        self.host = None;
    }

    /// Send to every connected peer. The step loop must never wait on a
    /// peer's outbound channel, so a full or closed channel drops the
    /// message for that peer; it resyncs via snapshot on reconnect.
    fn broadcast(&self, message: ServerMessage) {
        for (peer, handle) in &self.peers {
            if let Err(err) = handle.sender.try_send(message.clone()) {
                warn!(
                    "dropped broadcast to {} ({}): {}",
                    handle.name,
                    peer.short_hex(),
                    err
                );
            }
        }
    }

    async fn send_to(&self, peer: PeerId, message: ServerMessage) {
        if let Some(handle) = self.peers.get(&peer) {
            if handle.sender.send(message).await.is_err() {
                warn!("send to {} failed", peer.short_hex());
            }
        }
    }
}
