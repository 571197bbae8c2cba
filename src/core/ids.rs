//! Stable Identifiers
//!
//! Identifier newtypes for peers and world entities.
//! All implement Ord so they can key BTreeMaps with deterministic iteration.

use serde::{Serialize, Deserialize};

/// Unique peer identifier (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Default)]
pub struct PeerId(pub [u8; 16]);

impl PeerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random peer id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().into_bytes())
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s)
            .ok()
            .map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Short hex form for log lines.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

/// Stable identifier of a world object (grabbables, items, plates).
///
/// Assigned at world load from the level definition and never reused
/// within a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct ObjectId(pub u32);

/// Stable identifier of a puzzle instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct PuzzleId(pub u32);

/// Stable identifier of a door.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct DoorId(pub u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_ordering() {
        let id1 = PeerId::new([0; 16]);
        let id2 = PeerId::new([1; 16]);
        let id3 = PeerId::new([0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);

        assert!(id1 < id2);
        assert!(id1 < id3);
        assert!(id3 < id2);
    }

    #[test]
    fn test_peer_id_uuid_roundtrip() {
        let id = PeerId::generate();
        let s = id.to_uuid_string();
        assert_eq!(PeerId::from_uuid_str(&s), Some(id));
    }

    #[test]
    fn test_object_id_ordering() {
        assert!(ObjectId(1) < ObjectId(2));
        assert_eq!(ObjectId(7), ObjectId(7));
    }
}
