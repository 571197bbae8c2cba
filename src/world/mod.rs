//! Replicated world model: objects, puzzles, doors, the identity
//! registry and the ownership arbitration that mutates them.

pub mod events;
pub mod grab;
pub mod object;
pub mod puzzle;
pub mod registry;
pub mod state;

/// Result of applying a validated request on the authority.
///
/// A `NoOp` is not an error. Rejected and stale requests are dropped
/// without a response; the reason exists for logging and tests only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// State changed; events were pushed for broadcast.
    Applied,
    /// Nothing changed. Dropped silently.
    NoOp(NoOpReason),
}

/// Why a request changed nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoOpReason {
    /// Object id unknown or lacks the needed capability
    StaleObject,
    /// Puzzle id unknown
    StalePuzzle,
    /// Sender has no interactor in this session
    UnknownPeer,
    /// Sender already holds this object (idempotent replay)
    AlreadyHeldBySelf,
    /// Sender already holds another object
    HandsFull,
    /// Object is held and neither policy nor override permits stealing
    NotStealable,
    /// Drop with nothing in hand
    NotHolding,
    /// One-shot item was already consumed
    ItemAlreadyTaken,
    /// Puzzle is in its terminal solved state
    PuzzleAlreadySolved,
    /// Button/plate signal aimed at a code-mode puzzle
    SignalIgnoredInCodeMode,
    /// Code signal aimed at a non-code puzzle
    NotACodePuzzle,
    /// Gameplay request before the host started the session
    SessionNotStarted,
    /// Owner-authoritative write from the wrong peer
    NotOwner,
}

impl ApplyOutcome {
    /// Did the request mutate state?
    pub fn applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied)
    }
}
