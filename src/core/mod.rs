//! Core Primitives
//!
//! Identifier newtypes, fixed-point math for anchors, replicated state
//! cells, and state hashing. Everything here is deterministic and free of
//! I/O; the world and authority layers build on these.

pub mod ids;
pub mod fixed;
pub mod hash;
pub mod cell;
