//! Replicated State Cell
//!
//! A server-owned, client-observed value container with an explicit write
//! policy. The authoritative peer (or the designated owning peer, for
//! owner-authoritative cells) is the only legal writer; everyone else holds
//! read-only mirrors updated via broadcast.
//!
//! Writes go through `try_set`, which reports rejection instead of silently
//! mutating. An unauthorized write is a policy violation: it is dropped and
//! logged, never queued or retried, and the caller observes truth only
//! through subsequent broadcasts.

use serde::{Serialize, Deserialize};
use tracing::warn;

use super::ids::PeerId;

/// Who may write a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WritePolicy {
    /// Only the authority may set; all peers are notified.
    ServerAuthoritative,
    /// Only the designated owning peer may set. The authority reads the
    /// value for validation but does not derive it.
    OwnerAuthoritative(PeerId),
}

/// The party attempting a write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteSource {
    /// The authoritative peer (server-side code path).
    Authority,
    /// A regular peer, identified by id.
    Peer(PeerId),
}

/// A write was rejected by the cell's policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CellWriteError {
    /// Cell is server-authoritative and the caller is not the authority.
    #[error("write rejected: caller is not the authority")]
    NotAuthority,

    /// Cell is owner-authoritative and the caller is not its owner.
    #[error("write rejected: caller is not the owning peer")]
    NotOwner,
}

/// Replicated value with write gating and change tracking.
///
/// The revision counter increments on every applied change; broadcast
/// fan-out uses it to deliver each change exactly once to each observer
/// under normal operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cell<T> {
    value: T,
    policy: WritePolicy,
    revision: u64,
}

impl<T: Clone + PartialEq> Cell<T> {
    /// Create a server-authoritative cell.
    pub fn server_authoritative(initial: T) -> Self {
        Self {
            value: initial,
            policy: WritePolicy::ServerAuthoritative,
            revision: 0,
        }
    }

    /// Create an owner-authoritative cell writable by `owner`.
    pub fn owner_authoritative(owner: PeerId, initial: T) -> Self {
        Self {
            value: initial,
            policy: WritePolicy::OwnerAuthoritative(owner),
            revision: 0,
        }
    }

    /// Last-applied value visible to the caller.
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Number of applied changes since creation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Write policy of this cell.
    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    /// Attempt a write.
    ///
    /// Returns `Ok(true)` if the value changed (observers must be notified),
    /// `Ok(false)` if the write was legal but the value was already equal,
    /// and `Err` if the caller had no right to write. Callers at the
    /// protocol boundary drop the error after logging; it never propagates
    /// to the requesting peer.
    pub fn try_set(&mut self, source: WriteSource, value: T) -> Result<bool, CellWriteError> {
        match (self.policy, source) {
            (WritePolicy::ServerAuthoritative, WriteSource::Authority) => {}
            (WritePolicy::ServerAuthoritative, WriteSource::Peer(_)) => {
                return Err(CellWriteError::NotAuthority);
            }
            (WritePolicy::OwnerAuthoritative(owner), WriteSource::Peer(p)) if p == owner => {}
            (WritePolicy::OwnerAuthoritative(_), WriteSource::Authority) => {
                // The authority may force-set an owner cell during cleanup
                // (disconnects, steals). Regular mutation stays with the owner.
            }
            (WritePolicy::OwnerAuthoritative(_), WriteSource::Peer(_)) => {
                return Err(CellWriteError::NotOwner);
            }
        }

        if self.value == value {
            return Ok(false);
        }

        self.value = value;
        self.revision += 1;
        Ok(true)
    }

    /// Apply a broadcast value on an observer mirror.
    ///
    /// Skips stale deliveries: only revisions newer than the local one win.
    pub fn apply_broadcast(&mut self, value: T, revision: u64) -> bool {
        if revision <= self.revision {
            return false;
        }
        self.value = value;
        self.revision = revision;
        true
    }
}

/// Log-and-drop helper for boundary code: applies a write, returning
/// whether observers need notification, swallowing policy violations.
pub fn set_or_drop<T: Clone + PartialEq>(
    cell: &mut Cell<T>,
    source: WriteSource,
    value: T,
    what: &str,
) -> bool {
    match cell.try_set(source, value) {
        Ok(changed) => changed,
        Err(err) => {
            warn!("dropped write to {}: {}", what, err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_cell_rejects_peer_write() {
        let mut cell = Cell::server_authoritative(false);
        let peer = PeerId::new([1; 16]);

        let result = cell.try_set(WriteSource::Peer(peer), true);
        assert_eq!(result, Err(CellWriteError::NotAuthority));
        assert!(!cell.get());
        assert_eq!(cell.revision(), 0);
    }

    #[test]
    fn test_server_cell_accepts_authority_write() {
        let mut cell = Cell::server_authoritative(false);

        assert_eq!(cell.try_set(WriteSource::Authority, true), Ok(true));
        assert!(cell.get());
        assert_eq!(cell.revision(), 1);
    }

    #[test]
    fn test_equal_write_is_not_a_change() {
        let mut cell = Cell::server_authoritative(7u32);
        assert_eq!(cell.try_set(WriteSource::Authority, 7), Ok(false));
        assert_eq!(cell.revision(), 0);
    }

    #[test]
    fn test_owner_cell_gates_by_peer() {
        let owner = PeerId::new([1; 16]);
        let stranger = PeerId::new([2; 16]);
        let mut cell = Cell::owner_authoritative(owner, 0u32);

        assert_eq!(cell.try_set(WriteSource::Peer(stranger), 5), Err(CellWriteError::NotOwner));
        assert_eq!(cell.try_set(WriteSource::Peer(owner), 5), Ok(true));
        assert_eq!(*cell.get(), 5);
    }

    #[test]
    fn test_authority_can_force_owner_cell() {
        let owner = PeerId::new([1; 16]);
        let mut cell = Cell::owner_authoritative(owner, 3u32);

        assert_eq!(cell.try_set(WriteSource::Authority, 0), Ok(true));
        assert_eq!(*cell.get(), 0);
    }

    #[test]
    fn test_broadcast_skips_stale_revisions() {
        let mut mirror = Cell::server_authoritative(0u32);

        assert!(mirror.apply_broadcast(10, 2));
        assert!(!mirror.apply_broadcast(5, 1));
        assert_eq!(*mirror.get(), 10);
        assert_eq!(mirror.revision(), 2);
    }
}
