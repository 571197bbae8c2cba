//! Protocol Messages
//!
//! Wire format for peer-authority traffic. Messages are serialized as
//! JSON for debugging ease, with binary (bincode) available for the flat
//! payloads used in production.

use serde::{Serialize, Deserialize};

use crate::core::hash::StateHash;
use crate::world::state::WorldState;
use crate::world::events::StateEvent;
use crate::authority::request::RequestEnvelope;

/// Messages sent from a peer to the authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join the session.
    Join { name: String },

    /// An interaction intent.
    Request(RequestEnvelope),

    /// Ask for a full snapshot (reconnection).
    SyncRequest,

    /// Ping for latency measurement.
    Ping { timestamp: u64 },

    /// Leaving the session.
    Leave,
}

/// Messages sent from the authority to peers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join accepted; carries the peer id and a full snapshot.
    Welcome {
        peer_id: String,
        snapshot: WorldSnapshot,
    },

    /// Full state snapshot (on join or sync request).
    Snapshot(WorldSnapshot),

    /// Applied mutations from one step, in application order.
    Events { events: Vec<StateEvent> },

    /// Pong response.
    Pong { timestamp: u64 },

    /// Authority is shutting down.
    Shutdown { reason: String },
}

/// A verifiable copy of the full replicated state.
///
/// The hash is computed over the same fields the authority hashes, so a
/// mirror can check integrity before adopting the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Tick the snapshot was taken on
    pub tick: u32,

    /// Hash of `world` at capture time
    pub hash: StateHash,

    /// The replicated state itself
    pub world: WorldState,
}

impl WorldSnapshot {
    /// Capture a snapshot of the authoritative world.
    pub fn capture(world: &WorldState) -> Self {
        Self {
            tick: world.tick,
            hash: world.compute_hash(),
            world: world.clone(),
        }
    }

    /// Does the carried state still match the carried hash?
    pub fn verify(&self) -> bool {
        self.world.compute_hash() == self.hash
    }
}

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::{PeerId, ObjectId};
    use crate::core::fixed::FixedVec2;
    use crate::world::object::GrabbableObject;
    use crate::world::registry::Capabilities;
    use crate::authority::request::InteractionRequest;

    #[test]
    fn test_client_message_json_roundtrip() {
        let msg = ClientMessage::Request(RequestEnvelope::new(
            PeerId::new([1; 16]),
            3,
            InteractionRequest::Grab { object: ObjectId(7) },
        ));

        let json = msg.to_json().unwrap();
        let parsed = ClientMessage::from_json(&json).unwrap();

        if let ClientMessage::Request(envelope) = parsed {
            assert_eq!(envelope.seq, 3);
            assert_eq!(envelope.request, InteractionRequest::Grab { object: ObjectId(7) });
        } else {
            panic!("wrong message type");
        }
    }

    #[test]
    fn test_snapshot_verifies_after_roundtrip() {
        let mut world = WorldState::new();
        world.add_object(
            GrabbableObject::new(ObjectId(1), FixedVec2::ZERO),
            Capabilities::grabbable(),
        );
        world.add_peer(PeerId::new([1; 16]));

        let snapshot = WorldSnapshot::capture(&world);
        assert!(snapshot.verify());

        let msg = ServerMessage::Snapshot(snapshot);
        let json = msg.to_json().unwrap();
        let parsed = ServerMessage::from_json(&json).unwrap();

        if let ServerMessage::Snapshot(snapshot) = parsed {
            assert!(snapshot.verify());
            assert_eq!(snapshot.tick, 0);
        } else {
            panic!("wrong message type");
        }
    }

    #[test]
    fn test_tampered_snapshot_fails_verify() {
        let mut world = WorldState::new();
        world.add_object(
            GrabbableObject::new(ObjectId(1), FixedVec2::ZERO),
            Capabilities::grabbable(),
        );

        let mut snapshot = WorldSnapshot::capture(&world);
        snapshot.world.tick = 99;
        assert!(!snapshot.verify());
    }
}
