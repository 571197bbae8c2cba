//! # Holdfast Server
//!
//! Server-authoritative object interaction for a small co-op session:
//! grab/drop/steal arbitration, one-shot pickups, puzzle state machines,
//! and door side effects, replicated to observer peers as events.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     HOLDFAST SERVER                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Shared primitives                         │
//! │  ├── ids.rs      - Peer/object/puzzle/door identifiers       │
//! │  ├── fixed.rs    - Q16.16 fixed-point anchors and distances  │
//! │  ├── cell.rs     - Write-gated replicated state cells        │
//! │  └── hash.rs     - State hashing for snapshot verification   │
//! │                                                              │
//! │  world/          - Replicated model (authority-mutated)      │
//! │  ├── object.rs   - Grabbables, interactors, items, doors     │
//! │  ├── registry.rs - Object id to capabilities/holder mapping  │
//! │  ├── grab.rs     - Ownership arbitration                     │
//! │  ├── puzzle.rs   - Puzzle state machines                     │
//! │  ├── state.rs    - The world container and its hash          │
//! │  └── events.rs   - Broadcast event payloads                  │
//! │                                                              │
//! │  authority/      - Request pipeline                          │
//! │  ├── request.rs  - Client intents and envelopes              │
//! │  └── step.rs     - Inbox, step loop, break check             │
//! │                                                              │
//! │  net/            - Transport-facing (non-deterministic)      │
//! │  ├── protocol.rs - Wire message types and snapshots          │
//! │  ├── mirror.rs   - Observer-side state replay                │
//! │  └── hub.rs      - Peer channels and event fan-out           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Authority Guarantee
//!
//! Every replicated mutation happens inside an authority step, applied
//! from a single inbox in arrival order:
//! - At most one holder per object, ever
//! - Steals are one atomic transition, never holder-free-holder
//! - Invalid, stale, and unauthorized requests are dropped silently
//! - A disconnect releases everything the peer held, no request needed

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod authority;
pub mod core;
pub mod net;
pub mod world;

// Re-export commonly used types
pub use crate::core::cell::{Cell, CellWriteError, WritePolicy, WriteSource};
pub use crate::core::fixed::{Fixed, FixedVec2, FIXED_HALF, FIXED_ONE, FIXED_SCALE};
pub use crate::core::ids::{DoorId, ObjectId, PeerId, PuzzleId};
pub use crate::authority::request::{InteractionRequest, RequestEnvelope};
pub use crate::authority::step::{Authority, ConstraintProbe, DistanceProbe};
pub use crate::world::state::WorldState;
pub use crate::world::{ApplyOutcome, NoOpReason};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Authority step rate (Hz)
pub const TICK_RATE: u32 = 60;
