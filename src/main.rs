//! Holdfast Server
//!
//! Authoritative interaction server. The demo below drives a scripted
//! session through the full request pipeline and checks that an observer
//! mirror replaying the broadcast stream converges on the same state.

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use holdfast::{
    DistanceProbe, InteractionRequest, ObjectId, PeerId, RequestEnvelope, WorldState,
    FIXED_ONE, TICK_RATE, VERSION,
};
use holdfast::core::ids::{DoorId, PuzzleId};
use holdfast::core::fixed::FixedVec2;
use holdfast::world::object::{DoorState, GrabbableObject, ItemState};
use holdfast::world::puzzle::{PuzzleSignal, PuzzleState};
use holdfast::world::registry::Capabilities;
use holdfast::authority::step::Authority;
use holdfast::net::mirror::WorldMirror;
use holdfast::net::protocol::WorldSnapshot;

fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Holdfast Server v{}", VERSION);
    info!("Step Rate: {} Hz", TICK_RATE);

    demo_session()?;
    Ok(())
}

/// Scripted session exercising grabs, steals, puzzles, and cleanup.
fn demo_session() -> anyhow::Result<()> {
    info!("=== Starting Demo Session ===");

    let mut world = WorldState::new();
    let crate_id = ObjectId(1);
    world.add_object(
        GrabbableObject::new(crate_id, FixedVec2::ZERO),
        Capabilities::grabbable(),
    );
    world.add_item(ItemState::new(ObjectId(2)));
    world.add_door(DoorState::new(DoorId(1)));
    world.add_door(DoorState::new(DoorId(2)));
    world.add_puzzle(
        PuzzleState::new(PuzzleId(1))
            .with_buttons(2)
            .with_linked_door(DoorId(1)),
    );
    world.add_puzzle(
        PuzzleState::new(PuzzleId(2))
            .with_code("42")
            .with_linked_door(DoorId(2)),
    );

    let alice = PeerId::generate();
    let bob = PeerId::generate();
    world.add_peer(alice);
    world.add_peer(bob);
    info!("peers: alice={} bob={}", alice.short_hex(), bob.short_hex());

    let mut authority = Authority::new(world);
    let mut mirror = WorldMirror::from_snapshot(WorldSnapshot::capture(&authority.world))
        .map_err(anyhow::Error::from)?;
    let probe = DistanceProbe;
    let mut total_events = 0usize;

    authority.start_session();

    let script: Vec<(PeerId, InteractionRequest)> = vec![
        (alice, InteractionRequest::Anchor { position: FixedVec2::ZERO }),
        (alice, InteractionRequest::Grab { object: crate_id }),
        // Bob tries to steal while the policy forbids it: dropped
        (bob, InteractionRequest::Grab { object: crate_id }),
        (bob, InteractionRequest::Pickup { object: ObjectId(2) }),
        (alice, InteractionRequest::Puzzle {
            puzzle: PuzzleId(1),
            signal: PuzzleSignal::ButtonPress,
        }),
        (bob, InteractionRequest::Puzzle {
            puzzle: PuzzleId(1),
            signal: PuzzleSignal::ButtonPress,
        }),
        (bob, InteractionRequest::Puzzle {
            puzzle: PuzzleId(2),
            signal: PuzzleSignal::CodeAppend { symbol: "4".into() },
        }),
        (bob, InteractionRequest::Puzzle {
            puzzle: PuzzleId(2),
            signal: PuzzleSignal::CodeAppend { symbol: "2".into() },
        }),
        (bob, InteractionRequest::Puzzle {
            puzzle: PuzzleId(2),
            signal: PuzzleSignal::CodeSubmit,
        }),
    ];

    let mut seqs = std::collections::BTreeMap::new();
    for (peer, request) in script {
        let seq = seqs.entry(peer).or_insert(0u64);
        *seq += 1;
        authority.submit(RequestEnvelope::new(peer, *seq, request));

        let result = authority.step(&probe);
        total_events += result.events.len();
        mirror.apply_events(&result.events);
    }

    // Host flips the policy; now the steal goes through
    authority.set_steal_policy(true);
    let bob_seq = seqs.entry(bob).or_insert(0u64);
    *bob_seq += 1;
    authority.submit(RequestEnvelope::new(
        bob,
        *bob_seq,
        InteractionRequest::Grab { object: crate_id },
    ));
    let result = authority.step(&probe);
    total_events += result.events.len();
    mirror.apply_events(&result.events);
    info!("crate holder after steal: {:?}", authority.world.resolve(crate_id).map(|p| p.short_hex()));

    // The crate drifts out of reach and the hold breaks
    if let Some(object) = authority.world.objects.get_mut(&crate_id) {
        object.position = FixedVec2::new(50 * FIXED_ONE, 0);
    }
    let result = authority.step(&probe);
    total_events += result.events.len();
    mirror.apply_events(&result.events);

    // Alice leaves; nothing of hers lingers
    authority.disconnect(alice);
    let result = authority.step(&probe);
    total_events += result.events.len();
    mirror.apply_events(&result.events);

    info!("=== Session Results ===");
    info!("door 1 open: {}", authority.world.doors[&DoorId(1)].is_open());
    info!("door 2 open: {}", authority.world.doors[&DoorId(2)].is_open());
    info!("total events: {}", total_events);

    let hash = authority.world.compute_hash();
    info!("final state hash: {}", hex::encode(hash));

    let mut expected = authority.world.clone();
    expected.tick = mirror.world().tick;
    if mirror.matches(expected.compute_hash()) {
        info!("MIRROR CONVERGED: observer state matches the authority");
    } else {
        info!("MIRROR DIVERGED: observer state differs from the authority");
    }

    Ok(())
}
