//! World-State Hashing
//!
//! Deterministic hashing of replicated state for snapshot verification:
//! a joining or reconnecting observer hashes the snapshot it applied and
//! compares against the authority's hash before trusting its mirror.

use sha2::{Sha256, Digest};
use super::fixed::{Fixed, FixedVec2};

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

/// Deterministic hasher for replicated world state.
///
/// Wraps SHA-256 with helpers for the types the world stores.
/// Order of updates is critical: always feed BTreeMap iteration order.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for world state snapshots.
    pub fn for_world_state() -> Self {
        Self::new(b"HOLDFAST_WORLD_V1")
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a Fixed value.
    #[inline]
    pub fn update_fixed(&mut self, value: Fixed) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a FixedVec2.
    #[inline]
    pub fn update_vec2(&mut self, value: FixedVec2) {
        self.update_fixed(value.x);
        self.update_fixed(value.y);
    }

    /// Update with a boolean.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(value as u8);
    }

    /// Update with a 16-byte id.
    #[inline]
    pub fn update_uuid(&mut self, id: &[u8; 16]) {
        self.hasher.update(id);
    }

    /// Update with an optional peer id. The presence byte keeps
    /// `None` distinguishable from a peer of all zeroes.
    #[inline]
    pub fn update_opt_uuid(&mut self, id: Option<&[u8; 16]>) {
        match id {
            Some(bytes) => {
                self.update_u8(1);
                self.hasher.update(bytes);
            }
            None => self.update_u8(0),
        }
    }

    /// Update with a string (length-prefixed).
    #[inline]
    pub fn update_str(&mut self, s: &str) {
        self.update_u32(s.len() as u32);
        self.hasher.update(s.as_bytes());
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> StateHash {
        self.hasher.finalize().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_separation() {
        let h1 = StateHasher::new(b"A").finalize();
        let h2 = StateHasher::new(b"B").finalize();
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_option_presence_byte() {
        let mut h1 = StateHasher::for_world_state();
        h1.update_opt_uuid(Some(&[0u8; 16]));

        let mut h2 = StateHasher::for_world_state();
        h2.update_opt_uuid(None);
        h2.update_uuid(&[0u8; 16]);

        // None followed by a zero id must not collide with Some(zero id)
        assert_ne!(h1.finalize(), h2.finalize());
    }

    #[test]
    fn test_deterministic() {
        let build = || {
            let mut h = StateHasher::for_world_state();
            h.update_u32(42);
            h.update_bool(true);
            h.update_str("code");
            h.finalize()
        };
        assert_eq!(build(), build());
    }
}
