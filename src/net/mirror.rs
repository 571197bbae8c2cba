//! Observer Mirror
//!
//! A peer's read-only copy of the replicated state. Adopted from a
//! verified snapshot, then kept current by replaying broadcast events.
//! Revision guards on the cells make duplicate or out-of-order event
//! delivery harmless.

use tracing::warn;

use crate::core::cell::WriteSource;
use crate::core::hash::StateHash;
use crate::world::object::GrabInteractor;
use crate::world::state::WorldState;
use crate::world::events::{StateEvent, StateEventData};
use crate::net::protocol::WorldSnapshot;

/// Mirror adoption failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MirrorError {
    /// Snapshot state does not hash to the carried hash.
    #[error("snapshot hash mismatch")]
    SnapshotHashMismatch,
}

/// An observer's copy of the world.
pub struct WorldMirror {
    world: WorldState,
}

impl WorldMirror {
    /// Adopt a snapshot after verifying its hash.
    pub fn from_snapshot(snapshot: WorldSnapshot) -> Result<Self, MirrorError> {
        if !snapshot.verify() {
            return Err(MirrorError::SnapshotHashMismatch);
        }
        Ok(Self { world: snapshot.world })
    }

    /// The mirrored state.
    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// Does the mirror currently hash to `expected`?
    pub fn matches(&self, expected: StateHash) -> bool {
        self.world.compute_hash() == expected
    }

    /// Replay one broadcast event onto the mirror.
    pub fn apply_event(&mut self, event: &StateEvent) {
        if event.tick > self.world.tick {
            self.world.tick = event.tick;
        }

        match &event.data {
            StateEventData::OwnershipChanged { object, holder, previous, revision, .. } => {
                let Some(obj) = self.world.objects.get_mut(object) else {
                    warn!("ownership event for unknown object {:?}", object);
                    return;
                };
                if !obj.apply_holder_broadcast(*holder, *revision) {
                    return;
                }

                self.world.registry.set_holder(*object, *holder);
                if let Some(previous) = previous {
                    if let Some(interactor) = self.world.interactors.get_mut(previous) {
                        interactor.set_held(None);
                    }
                }
                if let Some(holder) = holder {
                    if let Some(interactor) = self.world.interactors.get_mut(holder) {
                        interactor.set_held(Some(*object));
                    }
                }
            }
            StateEventData::ItemPickedUp { object, .. } => {
                if let Some(item) = self.world.items.get_mut(object) {
                    let _ = item.take();
                }
            }
            StateEventData::PuzzleSolved { puzzle } => {
                if let Some(puzzle) = self.world.puzzles.get_mut(puzzle) {
                    puzzle.mark_solved();
                }
            }
            StateEventData::DoorStateChanged { door, open, revision } => {
                if let Some(door) = self.world.doors.get_mut(door) {
                    door.apply_open_broadcast(*open, *revision);
                }
            }
            StateEventData::AnchorMoved { peer, position, revision } => {
                if let Some(interactor) = self.world.interactors.get_mut(peer) {
                    interactor.apply_anchor_broadcast(*position, *revision);
                }
            }
            StateEventData::StealPolicyChanged { allowed } => {
                let _ = self
                    .world
                    .policy
                    .allow_stealing_from_hands
                    .try_set(WriteSource::Authority, *allowed);
            }
            StateEventData::SessionStarted => {
                let _ = self
                    .world
                    .policy
                    .session_started
                    .try_set(WriteSource::Authority, true);
            }
            StateEventData::PeerJoined { peer } => {
                self.world
                    .interactors
                    .entry(*peer)
                    .or_insert_with(|| GrabInteractor::new(*peer));
            }
            StateEventData::PeerLeft { peer } => {
                self.world.interactors.remove(peer);
                self.world.registry.clear_peer(*peer);
            }
        }
    }

    /// Replay a batch in order.
    pub fn apply_events(&mut self, events: &[StateEvent]) {
        for event in events {
            self.apply_event(event);
        }
    }
}
