//! World Entities
//!
//! Replicated entity state: grabbable objects, per-peer interactors,
//! one-shot items, doors, and the session-wide server policy.
//! All mutable truth lives in `Cell`s so write gating is explicit.

use serde::{Serialize, Deserialize};

use crate::core::ids::{PeerId, ObjectId, DoorId};
use crate::core::fixed::{Fixed, FixedVec2, DEFAULT_BREAK_DISTANCE};
use crate::core::cell::{Cell, WriteSource, CellWriteError};

/// A physical, ownable item in the world.
///
/// The holder is server-authoritative: only the authority transitions it,
/// and "locked" is simply "holder is set", so the two can never disagree.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GrabbableObject {
    /// Stable object id from the level definition
    pub id: ObjectId,

    /// Current holder (None = free). Server-authoritative.
    holder: Cell<Option<PeerId>>,

    /// Object-level steal override (works even when the session policy
    /// forbids stealing)
    pub can_be_stolen: bool,

    /// Last known world position, fed by the physics collaborator
    pub position: FixedVec2,

    /// Distance beyond which the hold constraint breaks
    pub break_distance: Fixed,
}

impl GrabbableObject {
    /// Create a free object at a position.
    pub fn new(id: ObjectId, position: FixedVec2) -> Self {
        Self {
            id,
            holder: Cell::server_authoritative(None),
            can_be_stolen: false,
            position,
            break_distance: DEFAULT_BREAK_DISTANCE,
        }
    }

    /// Builder-style steal override.
    pub fn with_steal_override(mut self, can_be_stolen: bool) -> Self {
        self.can_be_stolen = can_be_stolen;
        self
    }

    /// Current holder, if held.
    pub fn holder(&self) -> Option<PeerId> {
        *self.holder.get()
    }

    /// Is the object currently held?
    pub fn is_locked(&self) -> bool {
        self.holder.get().is_some()
    }

    /// Revision of the holder cell (for broadcast dedupe).
    pub fn holder_revision(&self) -> u64 {
        self.holder.revision()
    }

    /// Authority-only holder transition. Returns whether the value changed.
    pub(crate) fn set_holder(&mut self, holder: Option<PeerId>) -> Result<bool, CellWriteError> {
        self.holder.try_set(WriteSource::Authority, holder)
    }

    /// Observer-side holder update from a broadcast.
    pub(crate) fn apply_holder_broadcast(&mut self, holder: Option<PeerId>, revision: u64) -> bool {
        self.holder.apply_broadcast(holder, revision)
    }
}

/// A player's holding slot.
///
/// At most one held object per interactor. The anchor (desired hold point)
/// is the one owner-authoritative field in the protocol: the owning peer
/// writes it every frame, the authority only reads it for the break check.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GrabInteractor {
    /// Owning peer
    pub peer: PeerId,

    /// Object currently held, if any
    held: Option<ObjectId>,

    /// Desired hold point, owner-authoritative
    anchor: Cell<FixedVec2>,
}

impl GrabInteractor {
    /// Create an empty interactor for a peer.
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            held: None,
            anchor: Cell::owner_authoritative(peer, FixedVec2::ZERO),
        }
    }

    /// Object currently held.
    pub fn held(&self) -> Option<ObjectId> {
        self.held
    }

    /// Is this interactor holding anything?
    pub fn is_holding(&self) -> bool {
        self.held.is_some()
    }

    /// Current anchor position.
    pub fn anchor(&self) -> FixedVec2 {
        *self.anchor.get()
    }

    /// Revision of the anchor cell.
    pub fn anchor_revision(&self) -> u64 {
        self.anchor.revision()
    }

    /// Write the anchor. Gated to the owning peer by the cell policy.
    pub fn update_anchor(
        &mut self,
        source: WriteSource,
        position: FixedVec2,
    ) -> Result<bool, CellWriteError> {
        self.anchor.try_set(source, position)
    }

    /// Authority-only held-slot update (set on grab, cleared on drop/steal).
    pub(crate) fn set_held(&mut self, object: Option<ObjectId>) {
        self.held = object;
    }

    /// Observer-side anchor update from a broadcast.
    pub(crate) fn apply_anchor_broadcast(&mut self, position: FixedVec2, revision: u64) -> bool {
        self.anchor.apply_broadcast(position, revision)
    }
}

/// A one-shot consumable pickup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemState {
    /// Stable object id
    pub id: ObjectId,

    /// Whether the item has been consumed. Server-authoritative, monotonic.
    taken: Cell<bool>,
}

impl ItemState {
    /// Create an available item.
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            taken: Cell::server_authoritative(false),
        }
    }

    /// Has the item been consumed?
    pub fn is_taken(&self) -> bool {
        *self.taken.get()
    }

    /// Authority-only consume. Returns false if already taken.
    pub(crate) fn take(&mut self) -> Result<bool, CellWriteError> {
        self.taken.try_set(WriteSource::Authority, true)
    }
}

/// An openable door, driven by puzzle side effects.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DoorState {
    /// Stable door id
    pub id: DoorId,

    /// Open state. Server-authoritative.
    open: Cell<bool>,
}

impl DoorState {
    /// Create a closed door.
    pub fn new(id: DoorId) -> Self {
        Self {
            id,
            open: Cell::server_authoritative(false),
        }
    }

    /// Is the door open?
    pub fn is_open(&self) -> bool {
        *self.open.get()
    }

    /// Revision of the open cell.
    pub fn revision(&self) -> u64 {
        self.open.revision()
    }

    /// Authority-only state change. Setting the current value is a no-op
    /// and emits no broadcast.
    pub(crate) fn set_open(&mut self, open: bool) -> Result<bool, CellWriteError> {
        self.open.try_set(WriteSource::Authority, open)
    }

    /// Observer-side state update from a broadcast.
    pub(crate) fn apply_open_broadcast(&mut self, open: bool, revision: u64) -> bool {
        self.open.apply_broadcast(open, revision)
    }
}

/// Session-wide replicated configuration, set by the hosting peer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerPolicy {
    /// May peers steal objects out of other peers' hands?
    pub allow_stealing_from_hands: Cell<bool>,

    /// Has the hosting peer started the session? Interaction requests
    /// before this are rejected as no-ops; anchor updates are exempt.
    pub session_started: Cell<bool>,
}

impl ServerPolicy {
    /// Default policy: stealing off, session not started.
    pub fn new() -> Self {
        Self {
            allow_stealing_from_hands: Cell::server_authoritative(false),
            session_started: Cell::server_authoritative(false),
        }
    }
}

impl Default for ServerPolicy {
    fn default() -> Self {
        Self::new()
    }
}
