//! Identity Registry
//!
//! Maps stable object ids to typed capability records and the current
//! holder. Capabilities are resolved once at world load; the holder index
//! is updated by ownership arbitration in the same authoritative step that
//! transitions the object, so `resolve` is always consistent with the
//! object's own holder cell on the authority.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::core::ids::{PeerId, ObjectId, PuzzleId};

/// What an object can do, resolved once at load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Can be grabbed and held
    pub grabbable: bool,

    /// One-shot consumable pickup
    pub pickup_item: bool,

    /// Acts as a pressure plate for a puzzle
    pub puzzle_plate: Option<PuzzleId>,
}

impl Capabilities {
    /// Plain grabbable object.
    pub fn grabbable() -> Self {
        Self { grabbable: true, ..Default::default() }
    }

    /// Consumable item.
    pub fn item() -> Self {
        Self { pickup_item: true, ..Default::default() }
    }

    /// Grabbable that also weighs down a plate.
    pub fn grabbable_plate(puzzle: PuzzleId) -> Self {
        Self { grabbable: true, pickup_item: false, puzzle_plate: Some(puzzle) }
    }
}

/// Registry entry for one object.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct RegistryEntry {
    caps: Capabilities,
    holder: Option<PeerId>,
}

/// Object id to capabilities/holder mapping.
///
/// Absence of a holder mapping is the normal "unheld" state, not a failure.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdentityRegistry {
    entries: BTreeMap<ObjectId, RegistryEntry>,
}

impl IdentityRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self { entries: BTreeMap::new() }
    }

    /// Register an object with its capabilities. Called at world load.
    pub fn register(&mut self, id: ObjectId, caps: Capabilities) {
        self.entries.insert(id, RegistryEntry { caps, holder: None });
    }

    /// Remove an object (level unload).
    pub fn unregister(&mut self, id: ObjectId) {
        self.entries.remove(&id);
    }

    /// Is the object known at all?
    pub fn contains(&self, id: ObjectId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Capability record for an object.
    pub fn capabilities(&self, id: ObjectId) -> Option<Capabilities> {
        self.entries.get(&id).map(|e| e.caps)
    }

    /// Current holder of an object, or None if unheld or unknown.
    pub fn resolve(&self, id: ObjectId) -> Option<PeerId> {
        self.entries.get(&id).and_then(|e| e.holder)
    }

    /// Update the holder index. Arbitration calls this in the same step
    /// that transitions the object's holder cell.
    pub(crate) fn set_holder(&mut self, id: ObjectId, holder: Option<PeerId>) {
        if let Some(entry) = self.entries.get_mut(&id) {
            entry.holder = holder;
        }
    }

    /// All objects currently held by a peer (for disconnect cleanup).
    pub fn held_by(&self, peer: PeerId) -> Vec<ObjectId> {
        self.entries
            .iter()
            .filter(|(_, e)| e.holder == Some(peer))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Clear every mapping that points at a peer. Returns the cleared ids.
    pub(crate) fn clear_peer(&mut self, peer: PeerId) -> Vec<ObjectId> {
        let cleared = self.held_by(peer);
        for id in &cleared {
            self.set_holder(*id, None);
        }
        cleared
    }

    /// Number of registered objects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Is the registry empty?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_unknown_is_none() {
        let registry = IdentityRegistry::new();
        assert_eq!(registry.resolve(ObjectId(42)), None);
    }

    #[test]
    fn test_resolve_unheld_is_none() {
        let mut registry = IdentityRegistry::new();
        registry.register(ObjectId(1), Capabilities::grabbable());
        assert_eq!(registry.resolve(ObjectId(1)), None);
        assert!(registry.contains(ObjectId(1)));
    }

    #[test]
    fn test_holder_roundtrip() {
        let mut registry = IdentityRegistry::new();
        let peer = PeerId::new([1; 16]);
        registry.register(ObjectId(1), Capabilities::grabbable());

        registry.set_holder(ObjectId(1), Some(peer));
        assert_eq!(registry.resolve(ObjectId(1)), Some(peer));

        registry.set_holder(ObjectId(1), None);
        assert_eq!(registry.resolve(ObjectId(1)), None);
    }

    #[test]
    fn test_clear_peer() {
        let mut registry = IdentityRegistry::new();
        let p1 = PeerId::new([1; 16]);
        let p2 = PeerId::new([2; 16]);

        registry.register(ObjectId(1), Capabilities::grabbable());
        registry.register(ObjectId(2), Capabilities::grabbable());
        registry.register(ObjectId(3), Capabilities::grabbable());
        registry.set_holder(ObjectId(1), Some(p1));
        registry.set_holder(ObjectId(2), Some(p1));
        registry.set_holder(ObjectId(3), Some(p2));

        let cleared = registry.clear_peer(p1);
        assert_eq!(cleared, vec![ObjectId(1), ObjectId(2)]);
        assert_eq!(registry.resolve(ObjectId(1)), None);
        assert_eq!(registry.resolve(ObjectId(3)), Some(p2));
    }
}
