//! State Events
//!
//! Broadcast payloads generated by authoritative mutations. Every
//! successful cell write fans out as exactly one of these; observers
//! rebuild their mirrors from the stream.

use serde::{Serialize, Deserialize};

use crate::core::ids::{PeerId, ObjectId, PuzzleId, DoorId};
use crate::core::fixed::FixedVec2;

/// Event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StateEventData {
    /// An object's holder changed. A steal emits exactly one of these
    /// with both `previous` and `holder` set; observers never see an
    /// intermediate free state.
    OwnershipChanged {
        object: ObjectId,
        holder: Option<PeerId>,
        previous: Option<PeerId>,
        /// Drop was a throw; the physics collaborator applies the impulse
        thrown: bool,
        /// Holder cell revision after the change
        revision: u64,
    },

    /// A one-shot item was consumed.
    ItemPickedUp {
        object: ObjectId,
        by: PeerId,
    },

    /// A puzzle reached its terminal solved state.
    PuzzleSolved {
        puzzle: PuzzleId,
    },

    /// A door opened or closed.
    DoorStateChanged {
        door: DoorId,
        open: bool,
        revision: u64,
    },

    /// A peer moved its hold anchor (owner-authoritative write).
    AnchorMoved {
        peer: PeerId,
        position: FixedVec2,
        revision: u64,
    },

    /// The hosting peer changed the steal policy.
    StealPolicyChanged {
        allowed: bool,
    },

    /// The hosting peer started the session.
    SessionStarted,

    /// A peer joined; its interactor starts empty. Mirrors that predate
    /// the join create the interactor from this event.
    PeerJoined {
        peer: PeerId,
    },

    /// A peer left; its holdings were already released via
    /// `OwnershipChanged` events in the same step.
    PeerLeft {
        peer: PeerId,
    },
}

/// A broadcast event with the authority tick it was applied on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateEvent {
    /// Authority tick when the mutation was applied
    pub tick: u32,

    /// Event data
    pub data: StateEventData,
}

impl StateEvent {
    /// Create an event.
    pub fn new(tick: u32, data: StateEventData) -> Self {
        Self { tick, data }
    }

    /// Create an ownership-changed event.
    pub fn ownership_changed(
        tick: u32,
        object: ObjectId,
        holder: Option<PeerId>,
        previous: Option<PeerId>,
        thrown: bool,
        revision: u64,
    ) -> Self {
        Self::new(tick, StateEventData::OwnershipChanged {
            object,
            holder,
            previous,
            thrown,
            revision,
        })
    }

    /// Create an item-picked-up event.
    pub fn item_picked_up(tick: u32, object: ObjectId, by: PeerId) -> Self {
        Self::new(tick, StateEventData::ItemPickedUp { object, by })
    }

    /// Create a puzzle-solved event.
    pub fn puzzle_solved(tick: u32, puzzle: PuzzleId) -> Self {
        Self::new(tick, StateEventData::PuzzleSolved { puzzle })
    }

    /// Create a door-state-changed event.
    pub fn door_state_changed(tick: u32, door: DoorId, open: bool, revision: u64) -> Self {
        Self::new(tick, StateEventData::DoorStateChanged { door, open, revision })
    }

    /// Create an anchor-moved event.
    pub fn anchor_moved(tick: u32, peer: PeerId, position: FixedVec2, revision: u64) -> Self {
        Self::new(tick, StateEventData::AnchorMoved { peer, position, revision })
    }

    /// Object this event concerns, if any (for filtering in tests).
    pub fn object_id(&self) -> Option<ObjectId> {
        match &self.data {
            StateEventData::OwnershipChanged { object, .. } => Some(*object),
            StateEventData::ItemPickedUp { object, .. } => Some(*object),
            _ => None,
        }
    }
}
