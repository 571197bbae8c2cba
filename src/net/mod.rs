//! Wire protocol, observer mirrors, and the session hub.

pub mod hub;
pub mod mirror;
pub mod protocol;
