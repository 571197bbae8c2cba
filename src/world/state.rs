//! World State
//!
//! The authoritative container for all replicated state. Uses BTreeMap
//! everywhere so iteration (and therefore hashing and event order) is
//! deterministic.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::core::ids::{PeerId, ObjectId, PuzzleId, DoorId};
use crate::core::hash::{StateHash, StateHasher};
use crate::world::object::{GrabbableObject, GrabInteractor, ItemState, DoorState, ServerPolicy};
use crate::world::puzzle::PuzzleState;
use crate::world::registry::{IdentityRegistry, Capabilities};
use crate::world::events::StateEvent;

/// Complete authoritative world state for one session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorldState {
    /// Current authority tick
    pub tick: u32,

    /// Session-wide policy cells
    pub policy: ServerPolicy,

    /// All grabbable objects
    pub objects: BTreeMap<ObjectId, GrabbableObject>,

    /// All one-shot items
    pub items: BTreeMap<ObjectId, ItemState>,

    /// Per-peer holding slots
    pub interactors: BTreeMap<PeerId, GrabInteractor>,

    /// All puzzle instances
    pub puzzles: BTreeMap<PuzzleId, PuzzleState>,

    /// All doors
    pub doors: BTreeMap<DoorId, DoorState>,

    /// Object id to capabilities/holder mapping
    pub registry: IdentityRegistry,

    /// Events generated since the last `take_events` (cleared each step)
    #[serde(skip)]
    pending_events: Vec<StateEvent>,
}

impl WorldState {
    /// Create an empty world.
    pub fn new() -> Self {
        Self {
            tick: 0,
            policy: ServerPolicy::new(),
            objects: BTreeMap::new(),
            items: BTreeMap::new(),
            interactors: BTreeMap::new(),
            puzzles: BTreeMap::new(),
            doors: BTreeMap::new(),
            registry: IdentityRegistry::new(),
            pending_events: Vec::new(),
        }
    }

    /// Add a grabbable object and register its capabilities.
    pub fn add_object(&mut self, object: GrabbableObject, caps: Capabilities) {
        self.registry.register(object.id, caps);
        self.objects.insert(object.id, object);
    }

    /// Add a one-shot item.
    pub fn add_item(&mut self, item: ItemState) {
        self.registry.register(item.id, Capabilities::item());
        self.items.insert(item.id, item);
    }

    /// Add a puzzle instance.
    pub fn add_puzzle(&mut self, puzzle: PuzzleState) {
        self.puzzles.insert(puzzle.id, puzzle);
    }

    /// Add a door.
    pub fn add_door(&mut self, door: DoorState) {
        self.doors.insert(door.id, door);
    }

    /// Add a peer's interactor (created with the player character).
    pub fn add_peer(&mut self, peer: PeerId) {
        self.interactors.insert(peer, GrabInteractor::new(peer));
    }

    /// Current holder of an object via the registry.
    pub fn resolve(&self, object: ObjectId) -> Option<PeerId> {
        self.registry.resolve(object)
    }

    /// Push a broadcast event.
    pub fn push_event(&mut self, event: StateEvent) {
        self.pending_events.push(event);
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<StateEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Number of pending events (test helper).
    pub fn pending_event_count(&self) -> usize {
        self.pending_events.len()
    }

    /// Set a door's state. No-op (no event) when unchanged.
    pub fn set_door(&mut self, id: DoorId, open: bool) -> bool {
        let Some(door) = self.doors.get_mut(&id) else {
            tracing::warn!("door {:?} not found, dropping state change", id);
            return false;
        };

        match door.set_open(open) {
            Ok(true) => {
                let revision = door.revision();
                let event = StateEvent::door_state_changed(self.tick, id, open, revision);
                self.push_event(event);
                true
            }
            Ok(false) => false,
            Err(err) => {
                tracing::warn!("dropped door write: {}", err);
                false
            }
        }
    }

    /// Hash the observer-visible replicated fields for snapshot and
    /// mirror verification.
    ///
    /// Physics-fed object positions and puzzle-internal progress
    /// (button counts, plate counts, entered code) are excluded: the
    /// former are not replicated through this protocol, the latter are
    /// authority-private and surface only as the solved flag.
    pub fn compute_hash(&self) -> StateHash {
        let mut hasher = StateHasher::for_world_state();

        hasher.update_u32(self.tick);
        hasher.update_bool(*self.policy.allow_stealing_from_hands.get());
        hasher.update_bool(*self.policy.session_started.get());

        for (id, object) in &self.objects {
            hasher.update_u32(id.0);
            hasher.update_opt_uuid(object.holder().as_ref().map(|p| &p.0));
            hasher.update_bool(object.can_be_stolen);
        }

        for (id, item) in &self.items {
            hasher.update_u32(id.0);
            hasher.update_bool(item.is_taken());
        }

        for (peer, interactor) in &self.interactors {
            hasher.update_uuid(&peer.0);
            match interactor.held() {
                Some(object) => {
                    hasher.update_u8(1);
                    hasher.update_u32(object.0);
                }
                None => hasher.update_u8(0),
            }
            hasher.update_vec2(interactor.anchor());
        }

        for (id, puzzle) in &self.puzzles {
            hasher.update_u32(id.0);
            hasher.update_bool(puzzle.is_solved());
        }

        for (id, door) in &self.doors {
            hasher.update_u32(id.0);
            hasher.update_bool(door.is_open());
        }

        hasher.finalize()
    }
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new()
    }
}
