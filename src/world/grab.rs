//! Ownership Arbitration
//!
//! Grab, drop, steal and disconnect transitions for grabbable objects.
//! Each object is a two-state machine, `Free` or `Held(peer)`; the
//! authority is the only mutator, so no transition ever races another.
//!
//! A steal clears the previous holder and installs the new one inside a
//! single apply step and emits exactly one `OwnershipChanged` event, so
//! observers never see the object pass through `Free` or be held twice.

use tracing::{debug, info, warn};

use crate::core::ids::{PeerId, ObjectId};
use crate::world::state::WorldState;
use crate::world::events::StateEvent;
use crate::world::{ApplyOutcome, NoOpReason};

/// Why an object was force-dropped by the authority.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropCause {
    /// Explicit drop request from the holder
    Requested { thrown: bool },
    /// Anchor-to-object distance exceeded the breaking distance
    ConstraintBroken,
    /// The holder disconnected
    Disconnected,
    /// The object was removed from the world (level unload)
    Unloaded,
}

/// Attempt a grab by `peer` on `object`.
///
/// Handles all four cases: free grab, re-grab by the current holder
/// (idempotent no-op), steal (policy gated), and rejection.
pub fn try_grab(state: &mut WorldState, peer: PeerId, object: ObjectId) -> ApplyOutcome {
    if !state.interactors.contains_key(&peer) {
        return ApplyOutcome::NoOp(NoOpReason::UnknownPeer);
    }

    let grabbable = state
        .registry
        .capabilities(object)
        .map(|caps| caps.grabbable)
        .unwrap_or(false);
    if !state.objects.contains_key(&object) || !grabbable {
        warn!("stale grab request from {} for {:?}", peer.short_hex(), object);
        return ApplyOutcome::NoOp(NoOpReason::StaleObject);
    }

    let current_holder = state.objects[&object].holder();

    // Idempotent replay: already holding this exact object.
    if current_holder == Some(peer) {
        debug!("{} re-grabbed {:?}, no-op", peer.short_hex(), object);
        return ApplyOutcome::NoOp(NoOpReason::AlreadyHeldBySelf);
    }

    // One held object per interactor.
    if state.interactors[&peer].is_holding() {
        return ApplyOutcome::NoOp(NoOpReason::HandsFull);
    }

    if let Some(previous) = current_holder {
        let allowed = *state.policy.allow_stealing_from_hands.get()
            || state.objects[&object].can_be_stolen;
        if !allowed {
            debug!(
                "{} cannot steal {:?} from {}",
                peer.short_hex(),
                object,
                previous.short_hex()
            );
            return ApplyOutcome::NoOp(NoOpReason::NotStealable);
        }

        // Steal: release the previous holder and install the new one in
        // the same step. One holder-cell write, one event, no
        // intermediate Free state.
        if let Some(prev_interactor) = state.interactors.get_mut(&previous) {
            prev_interactor.set_held(None);
        }
        install_holder(state, peer, object, Some(previous));
        info!(
            "{} stole {:?} from {}",
            peer.short_hex(),
            object,
            previous.short_hex()
        );
        return ApplyOutcome::Applied;
    }

    install_holder(state, peer, object, None);
    info!("{} grabbed {:?}", peer.short_hex(), object);
    ApplyOutcome::Applied
}

/// Attempt a drop of whatever `peer` is holding.
pub fn try_drop(state: &mut WorldState, peer: PeerId, thrown: bool) -> ApplyOutcome {
    let Some(interactor) = state.interactors.get(&peer) else {
        return ApplyOutcome::NoOp(NoOpReason::UnknownPeer);
    };
    let Some(object) = interactor.held() else {
        return ApplyOutcome::NoOp(NoOpReason::NotHolding);
    };

    release(state, peer, object, DropCause::Requested { thrown });
    ApplyOutcome::Applied
}

/// Attempt a one-shot item pickup.
pub fn try_pickup(state: &mut WorldState, peer: PeerId, object: ObjectId) -> ApplyOutcome {
    let Some(item) = state.items.get_mut(&object) else {
        warn!("stale pickup request from {} for {:?}", peer.short_hex(), object);
        return ApplyOutcome::NoOp(NoOpReason::StaleObject);
    };

    match item.take() {
        Ok(true) => {
            let tick = state.tick;
            state.push_event(StateEvent::item_picked_up(tick, object, peer));
            info!("{} picked up item {:?}", peer.short_hex(), object);
            ApplyOutcome::Applied
        }
        Ok(false) => ApplyOutcome::NoOp(NoOpReason::ItemAlreadyTaken),
        Err(err) => {
            warn!("dropped item write: {}", err);
            ApplyOutcome::NoOp(NoOpReason::ItemAlreadyTaken)
        }
    }
}

/// Force-drop an object held by anyone (break check, disconnect).
pub fn force_drop(state: &mut WorldState, object: ObjectId, cause: DropCause) {
    if let Some(holder) = state.resolve(object) {
        release(state, holder, object, cause);
    }
}

/// Disconnect recovery: force-drop everything the peer holds, remove its
/// interactor, and clear its registry entries. Restores all invariants
/// without any explicit request from the leaving peer.
pub fn disconnect_cleanup(state: &mut WorldState, peer: PeerId) {
    let held = state.registry.held_by(peer);
    for object in held {
        release(state, peer, object, DropCause::Disconnected);
    }

    if state.interactors.remove(&peer).is_some() {
        let tick = state.tick;
        state.push_event(StateEvent::new(
            tick,
            crate::world::events::StateEventData::PeerLeft { peer },
        ));
        info!("peer {} cleaned up after disconnect", peer.short_hex());
    }
}

/// Set a new holder on a currently-releasable object and emit the event.
fn install_holder(
    state: &mut WorldState,
    peer: PeerId,
    object: ObjectId,
    previous: Option<PeerId>,
) {
    let tick = state.tick;

    let revision = {
        let Some(obj) = state.objects.get_mut(&object) else {
            return;
        };
        match obj.set_holder(Some(peer)) {
            Ok(_) => obj.holder_revision(),
            Err(err) => {
                warn!("dropped holder write: {}", err);
                return;
            }
        }
    };

    state.registry.set_holder(object, Some(peer));
    if let Some(interactor) = state.interactors.get_mut(&peer) {
        interactor.set_held(Some(object));
    }

    state.push_event(StateEvent::ownership_changed(
        tick,
        object,
        Some(peer),
        previous,
        false,
        revision,
    ));
}

/// Clear the holder of an object and emit the event.
fn release(state: &mut WorldState, holder: PeerId, object: ObjectId, cause: DropCause) {
    let tick = state.tick;

    let revision = {
        let Some(obj) = state.objects.get_mut(&object) else {
            return;
        };
        match obj.set_holder(None) {
            Ok(_) => obj.holder_revision(),
            Err(err) => {
                warn!("dropped holder write: {}", err);
                return;
            }
        }
    };

    state.registry.set_holder(object, None);
    if let Some(interactor) = state.interactors.get_mut(&holder) {
        interactor.set_held(None);
    }

    let thrown = matches!(cause, DropCause::Requested { thrown: true });
    match cause {
        DropCause::Requested { .. } => {
            info!("{} dropped {:?}", holder.short_hex(), object)
        }
        DropCause::ConstraintBroken => {
            info!("{:?} broke free from {}", object, holder.short_hex())
        }
        DropCause::Disconnected => {
            info!("{:?} released, holder {} disconnected", object, holder.short_hex())
        }
        DropCause::Unloaded => {
            info!("{:?} released, object unloaded", object)
        }
    }

    state.push_event(StateEvent::ownership_changed(
        tick,
        object,
        None,
        Some(holder),
        thrown,
        revision,
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cell::WriteSource;
    use crate::core::fixed::FixedVec2;
    use crate::world::events::StateEventData;
    use crate::world::object::{GrabbableObject, ItemState};
    use crate::world::registry::Capabilities;

    fn world_with_object() -> (WorldState, PeerId, PeerId, ObjectId) {
        let mut world = WorldState::new();
        let p1 = PeerId::new([1; 16]);
        let p2 = PeerId::new([2; 16]);
        let object = ObjectId(1);

        world.add_peer(p1);
        world.add_peer(p2);
        world.add_object(
            GrabbableObject::new(object, FixedVec2::ZERO),
            Capabilities::grabbable(),
        );
        (world, p1, p2, object)
    }

    #[test]
    fn test_free_grab() {
        let (mut world, p1, _, object) = world_with_object();

        assert_eq!(try_grab(&mut world, p1, object), ApplyOutcome::Applied);
        assert_eq!(world.resolve(object), Some(p1));
        assert_eq!(world.interactors[&p1].held(), Some(object));
        assert!(world.objects[&object].is_locked());
    }

    #[test]
    fn test_grab_blocked_without_steal_policy() {
        let (mut world, p1, p2, object) = world_with_object();

        try_grab(&mut world, p1, object);
        world.take_events();

        let outcome = try_grab(&mut world, p2, object);
        assert_eq!(outcome, ApplyOutcome::NoOp(NoOpReason::NotStealable));
        assert_eq!(world.resolve(object), Some(p1));
        assert_eq!(world.take_events().len(), 0);
    }

    #[test]
    fn test_steal_with_session_policy() {
        // single event, previous holder cleared atomically
        let (mut world, p1, p2, object) = world_with_object();
        world
            .policy
            .allow_stealing_from_hands
            .try_set(WriteSource::Authority, true)
            .unwrap();

        try_grab(&mut world, p1, object);
        world.take_events();

        assert_eq!(try_grab(&mut world, p2, object), ApplyOutcome::Applied);
        assert_eq!(world.resolve(object), Some(p2));
        assert_eq!(world.interactors[&p1].held(), None);
        assert_eq!(world.interactors[&p2].held(), Some(object));

        let events = world.take_events();
        assert_eq!(events.len(), 1);
        match &events[0].data {
            StateEventData::OwnershipChanged { holder, previous, .. } => {
                assert_eq!(*holder, Some(p2));
                assert_eq!(*previous, Some(p1));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_steal_with_object_override() {
        let (mut world, p1, p2, _) = world_with_object();
        let stealable = ObjectId(2);
        world.add_object(
            GrabbableObject::new(stealable, FixedVec2::ZERO).with_steal_override(true),
            Capabilities::grabbable(),
        );

        try_grab(&mut world, p1, stealable);
        assert_eq!(try_grab(&mut world, p2, stealable), ApplyOutcome::Applied);
        assert_eq!(world.resolve(stealable), Some(p2));
    }

    #[test]
    fn test_regrab_is_idempotent() {
        // replaying a grab by the current holder is a no-op
        let (mut world, p1, _, object) = world_with_object();

        try_grab(&mut world, p1, object);
        let revision_before = world.objects[&object].holder_revision();
        world.take_events();

        let outcome = try_grab(&mut world, p1, object);
        assert_eq!(outcome, ApplyOutcome::NoOp(NoOpReason::AlreadyHeldBySelf));
        assert_eq!(world.objects[&object].holder_revision(), revision_before);
        assert_eq!(world.take_events().len(), 0);
    }

    #[test]
    fn test_hands_full_blocks_second_grab() {
        let (mut world, p1, _, object) = world_with_object();
        let second = ObjectId(2);
        world.add_object(
            GrabbableObject::new(second, FixedVec2::ZERO),
            Capabilities::grabbable(),
        );

        try_grab(&mut world, p1, object);
        let outcome = try_grab(&mut world, p1, second);
        assert_eq!(outcome, ApplyOutcome::NoOp(NoOpReason::HandsFull));
        assert_eq!(world.resolve(second), None);
    }

    #[test]
    fn test_drop_and_throw() {
        let (mut world, p1, _, object) = world_with_object();

        try_grab(&mut world, p1, object);
        world.take_events();

        assert_eq!(try_drop(&mut world, p1, true), ApplyOutcome::Applied);
        assert_eq!(world.resolve(object), None);
        assert!(!world.objects[&object].is_locked());

        let events = world.take_events();
        assert_eq!(events.len(), 1);
        match &events[0].data {
            StateEventData::OwnershipChanged { holder, thrown, .. } => {
                assert_eq!(*holder, None);
                assert!(*thrown);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_drop_with_empty_hands_is_noop() {
        let (mut world, p1, _, _) = world_with_object();
        assert_eq!(
            try_drop(&mut world, p1, false),
            ApplyOutcome::NoOp(NoOpReason::NotHolding)
        );
    }

    #[test]
    fn test_disconnect_cleanup() {
        let (mut world, p1, _, object) = world_with_object();

        try_grab(&mut world, p1, object);
        world.take_events();

        disconnect_cleanup(&mut world, p1);
        assert_eq!(world.resolve(object), None);
        assert!(!world.objects[&object].is_locked());
        assert!(!world.interactors.contains_key(&p1));

        let events = world.take_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0].data,
            StateEventData::OwnershipChanged { holder: None, .. }
        ));
        assert!(matches!(events[1].data, StateEventData::PeerLeft { .. }));
    }

    #[test]
    fn test_pickup_once() {
        let (mut world, p1, p2, _) = world_with_object();
        world.add_item(ItemState::new(ObjectId(10)));

        assert_eq!(try_pickup(&mut world, p1, ObjectId(10)), ApplyOutcome::Applied);
        assert_eq!(
            try_pickup(&mut world, p2, ObjectId(10)),
            ApplyOutcome::NoOp(NoOpReason::ItemAlreadyTaken)
        );
    }

    #[test]
    fn test_unknown_object_is_stale_noop() {
        let (mut world, p1, _, _) = world_with_object();
        assert_eq!(
            try_grab(&mut world, p1, ObjectId(99)),
            ApplyOutcome::NoOp(NoOpReason::StaleObject)
        );
    }

    #[test]
    fn test_mutual_exclusion_over_random_interleavings() {
        // whatever the request order, an object has at most one holder
        // and exactly one interactor references it.
        use rand::prelude::*;
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let (mut world, p1, p2, object) = world_with_object();
            let p3 = PeerId::new([3; 16]);
            world.add_peer(p3);
            if rng.gen_bool(0.5) {
                world
                    .policy
                    .allow_stealing_from_hands
                    .try_set(WriteSource::Authority, true)
                    .unwrap();
            }

            let peers = [p1, p2, p3];
            for _ in 0..40 {
                let peer = peers[rng.gen_range(0..3)];
                if rng.gen_bool(0.7) {
                    try_grab(&mut world, peer, object);
                } else {
                    try_drop(&mut world, peer, rng.gen_bool(0.3));
                }

                let holders: Vec<_> = world
                    .interactors
                    .values()
                    .filter(|i| i.held() == Some(object))
                    .map(|i| i.peer)
                    .collect();
                assert!(holders.len() <= 1, "object held by {:?}", holders);
                assert_eq!(world.resolve(object), holders.first().copied());
                assert_eq!(world.resolve(object), world.objects[&object].holder());
            }
        }
    }
}
