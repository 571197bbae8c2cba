//! Request pipeline and the authoritative step loop.

pub mod request;
pub mod step;
