//! Authority Step Loop
//!
//! The single mutation point for a session. Requests from all peers are
//! queued into one inbox and applied in arrival order inside `step`, so
//! every race (two grabs on the same object, a grab against a disconnect)
//! is settled by queue position. Nothing mutates the world outside a step.

use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info};

use crate::core::ids::{PeerId, ObjectId};
use crate::core::cell::{set_or_drop, WriteSource, CellWriteError};
use crate::core::fixed::{FixedVec2, within_distance};
use crate::world::state::WorldState;
use crate::world::object::GrabbableObject;
use crate::world::events::{StateEvent, StateEventData};
use crate::world::{grab, puzzle, ApplyOutcome, NoOpReason};
use crate::world::puzzle::PuzzleSignal;
use crate::authority::request::{InteractionRequest, RequestEnvelope};

/// Decides each tick whether a peer's hold on an object survives.
///
/// The default probe compares positions; tests substitute closures to
/// force or forbid breaks without simulating physics.
pub trait ConstraintProbe {
    fn hold_intact(&self, object: &GrabbableObject, anchor: FixedVec2) -> bool;
}

impl<F> ConstraintProbe for F
where
    F: Fn(&GrabbableObject, FixedVec2) -> bool,
{
    fn hold_intact(&self, object: &GrabbableObject, anchor: FixedVec2) -> bool {
        self(object, anchor)
    }
}

/// Distance probe over the physics-fed object position and the holder's
/// anchor, using the object's own break distance.
pub struct DistanceProbe;

impl ConstraintProbe for DistanceProbe {
    fn hold_intact(&self, object: &GrabbableObject, anchor: FixedVec2) -> bool {
        within_distance(object.position, anchor, object.break_distance)
    }
}

/// Result of one authority step.
#[derive(Debug, Default)]
pub struct StepResult {
    /// Events to broadcast, in application order
    pub events: Vec<StateEvent>,
}

/// The authoritative session driver.
pub struct Authority {
    /// The world it owns
    pub world: WorldState,

    /// Pending requests in arrival order
    inbox: VecDeque<RequestEnvelope>,

    /// Highest sequence number seen per sender, for retransmission dedupe
    last_seq: BTreeMap<PeerId, u64>,
}

impl Authority {
    /// Create an authority over a world.
    pub fn new(world: WorldState) -> Self {
        Self {
            world,
            inbox: VecDeque::new(),
            last_seq: BTreeMap::new(),
        }
    }

    /// Queue a request for the next step.
    ///
    /// Requests at or below the sender's last seen sequence number are
    /// duplicates from retransmission and are dropped here. Returns
    /// whether the request was queued.
    pub fn submit(&mut self, envelope: RequestEnvelope) -> bool {
        let last = self.last_seq.get(&envelope.from).copied().unwrap_or(0);
        if envelope.seq <= last {
            debug!(
                "dropping duplicate {} request from {} (seq {} <= {})",
                envelope.request.kind(),
                envelope.from.short_hex(),
                envelope.seq,
                last
            );
            return false;
        }

        self.last_seq.insert(envelope.from, envelope.seq);
        self.inbox.push_back(envelope);
        true
    }

    /// Run one step: advance the tick, drain the inbox in arrival order,
    /// then run the break check over every active hold.
    pub fn step<P: ConstraintProbe>(&mut self, probe: &P) -> StepResult {
        self.world.tick += 1;

        while let Some(envelope) = self.inbox.pop_front() {
            let outcome = self.apply(envelope.from, &envelope.request);
            if let ApplyOutcome::NoOp(reason) = outcome {
                debug!(
                    "{} request from {} dropped: {:?}",
                    envelope.request.kind(),
                    envelope.from.short_hex(),
                    reason
                );
            }
        }

        self.run_break_check(probe);

        StepResult {
            events: self.world.take_events(),
        }
    }

    /// Validate and apply one request. The dispatch point for every
    /// client-originated mutation.
    pub fn apply(&mut self, from: PeerId, request: &InteractionRequest) -> ApplyOutcome {
        if !*self.world.policy.session_started.get() && !request.is_anchor() {
            return ApplyOutcome::NoOp(NoOpReason::SessionNotStarted);
        }

        match request {
            InteractionRequest::Grab { object } => {
                grab::try_grab(&mut self.world, from, *object)
            }
            InteractionRequest::Drop { throw } => {
                grab::try_drop(&mut self.world, from, *throw)
            }
            InteractionRequest::Pickup { object } => {
                grab::try_pickup(&mut self.world, from, *object)
            }
            InteractionRequest::Puzzle { puzzle: id, signal } => {
                puzzle::apply_puzzle_signal(&mut self.world, *id, signal)
            }
            InteractionRequest::Anchor { position } => self.apply_anchor(from, *position),
        }
    }

    fn apply_anchor(&mut self, from: PeerId, position: FixedVec2) -> ApplyOutcome {
        let tick = self.world.tick;
        let Some(interactor) = self.world.interactors.get_mut(&from) else {
            return ApplyOutcome::NoOp(NoOpReason::UnknownPeer);
        };

        match interactor.update_anchor(WriteSource::Peer(from), position) {
            Ok(true) => {
                let revision = interactor.anchor_revision();
                self.world
                    .push_event(StateEvent::anchor_moved(tick, from, position, revision));
                ApplyOutcome::Applied
            }
            Ok(false) => ApplyOutcome::Applied,
            Err(CellWriteError::NotOwner | CellWriteError::NotAuthority) => {
                ApplyOutcome::NoOp(NoOpReason::NotOwner)
            }
        }
    }

    /// Force-drop every hold whose constraint no longer survives.
    fn run_break_check<P: ConstraintProbe>(&mut self, probe: &P) {
        let mut broken = Vec::new();
        for interactor in self.world.interactors.values() {
            let Some(object_id) = interactor.held() else {
                continue;
            };
            if let Some(object) = self.world.objects.get(&object_id) {
                if !probe.hold_intact(object, interactor.anchor()) {
                    broken.push(object_id);
                }
            }
        }

        for object_id in broken {
            info!("hold on {:?} exceeded break distance", object_id);
            grab::force_drop(&mut self.world, object_id, grab::DropCause::ConstraintBroken);
        }
    }

    /// Physics collaborator callback: an object entered or left a plate
    /// volume. Routed through the registry to the linked puzzle; objects
    /// without a plate capability are ignored.
    pub fn object_on_plate(&mut self, object: ObjectId, present: bool) -> ApplyOutcome {
        let Some(puzzle_id) = self
            .world
            .registry
            .capabilities(object)
            .and_then(|caps| caps.puzzle_plate)
        else {
            return ApplyOutcome::NoOp(NoOpReason::StaleObject);
        };

        puzzle::apply_puzzle_signal(
            &mut self.world,
            puzzle_id,
            &PuzzleSignal::PlateChange { added: present },
        )
    }

    /// Hosting peer starts the session, unlocking gameplay requests.
    pub fn start_session(&mut self) {
        let tick = self.world.tick;
        let cell = &mut self.world.policy.session_started;
        if set_or_drop(cell, WriteSource::Authority, true, "session_started") {
            info!("session started at tick {}", tick);
            self.world
                .push_event(StateEvent::new(tick, StateEventData::SessionStarted));
        }
    }

    /// Hosting peer flips the steal policy mid-session.
    pub fn set_steal_policy(&mut self, allowed: bool) {
        let tick = self.world.tick;
        let cell = &mut self.world.policy.allow_stealing_from_hands;
        if set_or_drop(cell, WriteSource::Authority, allowed, "allow_stealing_from_hands") {
            info!("steal policy set to {}", allowed);
            self.world.push_event(StateEvent::new(
                tick,
                StateEventData::StealPolicyChanged { allowed },
            ));
        }
    }

    /// A peer connected. Creates its interactor and announces the join
    /// so mirrors adopted before this peer existed can create it too.
    pub fn connect(&mut self, peer: PeerId) {
        if self.world.interactors.contains_key(&peer) {
            return;
        }
        let tick = self.world.tick;
        self.world.add_peer(peer);
        self.world
            .push_event(StateEvent::new(tick, StateEventData::PeerJoined { peer }));
    }

    /// Level unload: retire an object. Any active hold is force-dropped
    /// first; later requests naming the id are stale no-ops.
    pub fn unload_object(&mut self, object: ObjectId) {
        if self.world.resolve(object).is_some() {
            grab::force_drop(&mut self.world, object, grab::DropCause::Unloaded);
        }
        self.world.objects.remove(&object);
        self.world.items.remove(&object);
        self.world.registry.unregister(object);
        info!("unloaded {:?}", object);
    }

    /// A peer disconnected. Release its holdings and forget its state.
    pub fn disconnect(&mut self, peer: PeerId) {
        grab::disconnect_cleanup(&mut self.world, peer);
        self.last_seq.remove(&peer);
        self.inbox.retain(|envelope| envelope.from != peer);
    }

    /// Queued requests awaiting the next step.
    pub fn inbox_len(&self) -> usize {
        self.inbox.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ids::ObjectId;
    use crate::core::fixed::FIXED_ONE;
    use crate::world::registry::Capabilities;

    fn no_breaks(_: &GrabbableObject, _: FixedVec2) -> bool {
        true
    }

    fn started_authority() -> (Authority, PeerId, PeerId, ObjectId) {
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

        let mut authority = Authority::new(world);
        authority.start_session();
        authority.step(&no_breaks);
        (authority, p1, p2, object)
    }

    #[test]
    fn test_arrival_order_settles_grab_race() {
        // Two grabs for the same object in one step: queue position wins.
        let (mut authority, p1, p2, object) = started_authority();

        authority.submit(RequestEnvelope::new(
            p1,
            1,
            InteractionRequest::Grab { object },
        ));
        authority.submit(RequestEnvelope::new(
            p2,
            1,
            InteractionRequest::Grab { object },
        ));

        let result = authority.step(&no_breaks);
        assert_eq!(authority.world.resolve(object), Some(p1));

        let ownership: Vec<_> = result
            .events
            .iter()
            .filter(|e| matches!(e.data, StateEventData::OwnershipChanged { .. }))
            .collect();
        assert_eq!(ownership.len(), 1);
    }

    #[test]
    fn test_duplicate_seq_dropped() {
        let (mut authority, p1, _, object) = started_authority();

        let envelope = RequestEnvelope::new(p1, 1, InteractionRequest::Grab { object });
        assert!(authority.submit(envelope.clone()));
        assert!(!authority.submit(envelope));
        assert_eq!(authority.inbox_len(), 1);
    }

    #[test]
    fn test_requests_gated_before_session_start() {
        let mut world = WorldState::new();
        let p1 = PeerId::new([1; 16]);
        world.add_peer(p1);
        world.add_object(
            GrabbableObject::new(ObjectId(1), FixedVec2::ZERO),
            Capabilities::grabbable(),
        );
        let mut authority = Authority::new(world);

        let outcome = authority.apply(p1, &InteractionRequest::Grab { object: ObjectId(1) });
        assert_eq!(outcome, ApplyOutcome::NoOp(NoOpReason::SessionNotStarted));

        // Anchor updates flow regardless
        let outcome = authority.apply(
            p1,
            &InteractionRequest::Anchor { position: FixedVec2::new(10, 10) },
        );
        assert_eq!(outcome, ApplyOutcome::Applied);
        assert_eq!(
            authority.world.interactors[&p1].anchor(),
            FixedVec2::new(10, 10)
        );
    }

    #[test]
    fn test_break_check_force_drops() {
        let (mut authority, p1, _, object) = started_authority();

        authority.submit(RequestEnvelope::new(
            p1,
            1,
            InteractionRequest::Grab { object },
        ));
        authority.step(&no_breaks);
        assert_eq!(authority.world.resolve(object), Some(p1));

        // Object drifts far beyond the break distance
        authority.world.objects.get_mut(&object).unwrap().position =
            FixedVec2::new(100 * FIXED_ONE, 0);

        let result = authority.step(&DistanceProbe);
        assert_eq!(authority.world.resolve(object), None);
        assert!(result.events.iter().any(|e| matches!(
            e.data,
            StateEventData::OwnershipChanged { holder: None, .. }
        )));
    }

    #[test]
    fn test_hold_within_break_distance_survives() {
        let (mut authority, p1, _, object) = started_authority();

        authority.submit(RequestEnvelope::new(
            p1,
            1,
            InteractionRequest::Grab { object },
        ));
        authority.submit(RequestEnvelope::new(
            p1,
            2,
            InteractionRequest::Anchor { position: FixedVec2::new(FIXED_ONE, 0) },
        ));
        authority.step(&DistanceProbe);

        assert_eq!(authority.world.resolve(object), Some(p1));
    }

    #[test]
    fn test_disconnect_clears_queued_requests() {
        let (mut authority, p1, p2, object) = started_authority();

        authority.submit(RequestEnvelope::new(
            p1,
            1,
            InteractionRequest::Grab { object },
        ));
        authority.step(&no_breaks);

        // Requests queued by a peer that then disconnects never apply
        authority.submit(RequestEnvelope::new(p1, 2, InteractionRequest::Drop { throw: false }));
        authority.disconnect(p1);
        let result = authority.step(&no_breaks);

        assert_eq!(authority.world.resolve(object), None);
        assert!(!authority.world.interactors.contains_key(&p1));
        assert!(authority.world.interactors.contains_key(&p2));
        assert!(result
            .events
            .iter()
            .any(|e| matches!(e.data, StateEventData::PeerLeft { .. })));
    }

    #[test]
    fn test_plate_objects_route_to_their_puzzle() {
        use crate::core::ids::PuzzleId;
        use crate::world::puzzle::PuzzleState;

        let mut world = WorldState::new();
        world.add_puzzle(PuzzleState::new(PuzzleId(1)).with_plates(2));
        world.add_object(
            GrabbableObject::new(ObjectId(10), FixedVec2::ZERO),
            Capabilities::grabbable_plate(PuzzleId(1)),
        );
        world.add_object(
            GrabbableObject::new(ObjectId(11), FixedVec2::ZERO),
            Capabilities::grabbable_plate(PuzzleId(1)),
        );
        world.add_object(
            GrabbableObject::new(ObjectId(12), FixedVec2::ZERO),
            Capabilities::grabbable(),
        );
        let mut authority = Authority::new(world);
        authority.start_session();

        // A non-plate object on the plate contributes nothing
        assert_eq!(
            authority.object_on_plate(ObjectId(12), true),
            ApplyOutcome::NoOp(NoOpReason::StaleObject)
        );

        authority.object_on_plate(ObjectId(10), true);
        assert!(!authority.world.puzzles[&PuzzleId(1)].is_solved());

        authority.object_on_plate(ObjectId(11), true);
        assert!(authority.world.puzzles[&PuzzleId(1)].is_solved());
    }

    #[test]
    fn test_connect_announces_peer_once() {
        let (mut authority, _, _, _) = started_authority();
        let p3 = PeerId::new([3; 16]);

        authority.connect(p3);
        authority.connect(p3);
        let result = authority.step(&no_breaks);

        assert!(authority.world.interactors.contains_key(&p3));
        let joins = result
            .events
            .iter()
            .filter(|e| e.data == StateEventData::PeerJoined { peer: p3 })
            .count();
        assert_eq!(joins, 1);
    }

    #[test]
    fn test_unload_object_makes_requests_stale() {
        let (mut authority, p1, _, object) = started_authority();

        authority.submit(RequestEnvelope::new(
            p1,
            1,
            InteractionRequest::Grab { object },
        ));
        authority.step(&no_breaks);
        assert_eq!(authority.world.resolve(object), Some(p1));

        authority.unload_object(object);
        let result = authority.step(&no_breaks);

        // The hold is released and the holder's slot cleared
        assert!(result.events.iter().any(|e| matches!(
            e.data,
            StateEventData::OwnershipChanged { holder: None, .. }
        )));
        assert_eq!(authority.world.interactors[&p1].held(), None);
        assert!(!authority.world.registry.contains(object));

        // Requests naming the retired id are dropped, not faulted
        let outcome = authority.apply(p1, &InteractionRequest::Grab { object });
        assert_eq!(outcome, ApplyOutcome::NoOp(NoOpReason::StaleObject));
    }

    #[test]
    fn test_steal_policy_event_once() {
        let (mut authority, _, _, _) = started_authority();

        authority.set_steal_policy(true);
        authority.set_steal_policy(true);
        let result = authority.step(&no_breaks);

        let flips = result
            .events
            .iter()
            .filter(|e| matches!(e.data, StateEventData::StealPolicyChanged { .. }))
            .count();
        assert_eq!(flips, 1);
    }
}
