//! Interaction Requests
//!
//! Client intents sent to the authority. A request never mutates state on
//! the sender; it is validated and applied (or dropped) on the authority.

use serde::{Serialize, Deserialize};

use crate::core::ids::{PeerId, ObjectId, PuzzleId};
use crate::core::fixed::FixedVec2;
use crate::world::puzzle::PuzzleSignal;

/// A client intent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractionRequest {
    /// Grab an object (or steal it, if policy permits).
    Grab { object: ObjectId },

    /// Drop the held object, optionally as a throw.
    Drop { throw: bool },

    /// Consume a one-shot item.
    Pickup { object: ObjectId },

    /// Route a signal to a puzzle.
    Puzzle { puzzle: PuzzleId, signal: PuzzleSignal },

    /// Move the sender's hold anchor (owner-authoritative, continuous).
    Anchor { position: FixedVec2 },
}

impl InteractionRequest {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            InteractionRequest::Grab { .. } => "grab",
            InteractionRequest::Drop { .. } => "drop",
            InteractionRequest::Pickup { .. } => "pickup",
            InteractionRequest::Puzzle { .. } => "puzzle",
            InteractionRequest::Anchor { .. } => "anchor",
        }
    }

    /// Anchor updates are continuous owner writes, exempt from the
    /// session-start gate.
    pub fn is_anchor(&self) -> bool {
        matches!(self, InteractionRequest::Anchor { .. })
    }
}

/// A request stamped with its sender and a per-sender sequence number.
///
/// The transport delivers requests per-sender in order; `seq` lets the
/// authority drop duplicates from retransmission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Sending peer
    pub from: PeerId,

    /// Monotonic per-sender sequence number
    pub seq: u64,

    /// The intent itself
    pub request: InteractionRequest,
}

impl RequestEnvelope {
    /// Wrap a request.
    pub fn new(from: PeerId, seq: u64, request: InteractionRequest) -> Self {
        Self { from, seq, request }
    }

    /// Serialize for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from the wire.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = RequestEnvelope::new(
            PeerId::new([7; 16]),
            42,
            InteractionRequest::Grab { object: ObjectId(3) },
        );

        let bytes = envelope.to_bytes().unwrap();
        let decoded = RequestEnvelope::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_request_json_tag() {
        let request = InteractionRequest::Drop { throw: true };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"type\":\"drop\""));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(InteractionRequest::Drop { throw: false }.kind(), "drop");
        assert_eq!(
            InteractionRequest::Anchor { position: FixedVec2::ZERO }.kind(),
            "anchor"
        );
        assert!(InteractionRequest::Anchor { position: FixedVec2::ZERO }.is_anchor());
    }
}
