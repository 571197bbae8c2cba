//! Puzzle State Machine
//!
//! A small per-puzzle machine: `Unsolved -> Solved`, terminal. Progress is
//! driven by aggregated signals funneled through the request pipeline.
//! When a non-empty required code is configured the puzzle runs in code
//! mode and button/plate signals are ignored entirely.

use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::core::ids::{PuzzleId, DoorId};
use crate::core::cell::{Cell, WriteSource};
use crate::world::state::WorldState;
use crate::world::events::StateEvent;
use crate::world::{ApplyOutcome, NoOpReason};

/// A signal aimed at a puzzle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PuzzleSignal {
    /// A button linked to the puzzle was pressed.
    ButtonPress,

    /// An object entered (`added`) or left a pressure plate.
    PlateChange { added: bool },

    /// A symbol was entered on the code panel.
    CodeAppend { symbol: String },

    /// The submit button on the code panel was pressed.
    CodeSubmit,
}

/// Solvability progress for one puzzle instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PuzzleState {
    /// Stable puzzle id
    pub id: PuzzleId,

    /// Button presses needed (0 = not required)
    pub required_button_presses: u32,

    /// Plates that must be occupied (0 = not required)
    pub required_plate_count: u32,

    /// Expected code; non-empty switches the puzzle to code mode
    pub required_code: String,

    /// Door opened on solve, if any
    pub linked_door: Option<DoorId>,

    button_press_count: u32,
    plate_count: u32,
    current_code: String,
    solved: Cell<bool>,
}

impl PuzzleState {
    /// Create an unsolved puzzle with no requirements.
    pub fn new(id: PuzzleId) -> Self {
        Self {
            id,
            required_button_presses: 0,
            required_plate_count: 0,
            required_code: String::new(),
            linked_door: None,
            button_press_count: 0,
            plate_count: 0,
            current_code: String::new(),
            solved: Cell::server_authoritative(false),
        }
    }

    /// Require a number of button presses.
    pub fn with_buttons(mut self, presses: u32) -> Self {
        self.required_button_presses = presses;
        self
    }

    /// Require a number of occupied plates.
    pub fn with_plates(mut self, plates: u32) -> Self {
        self.required_plate_count = plates;
        self
    }

    /// Require a code (switches to code mode).
    pub fn with_code(mut self, code: &str) -> Self {
        self.required_code = code.to_string();
        self
    }

    /// Open a door on solve.
    pub fn with_linked_door(mut self, door: DoorId) -> Self {
        self.linked_door = Some(door);
        self
    }

    /// Is the puzzle in code mode?
    pub fn code_mode(&self) -> bool {
        !self.required_code.is_empty()
    }

    /// Terminal solved state.
    pub fn is_solved(&self) -> bool {
        *self.solved.get()
    }

    /// Accumulated button presses.
    pub fn button_press_count(&self) -> u32 {
        self.button_press_count
    }

    /// Currently occupied plates.
    pub fn plate_count(&self) -> u32 {
        self.plate_count
    }

    /// Code entered so far.
    pub fn current_code(&self) -> &str {
        &self.current_code
    }

    /// Non-code-mode solve check.
    fn requirements_met(&self) -> bool {
        let buttons_ok = self.required_button_presses == 0
            || self.button_press_count >= self.required_button_presses;
        let plates_ok = self.required_plate_count == 0
            || self.plate_count >= self.required_plate_count;
        buttons_ok && plates_ok
    }

    pub(crate) fn mark_solved(&mut self) {
        // Cell is server-authoritative; this runs only on the authority.
        let _ = self.solved.try_set(WriteSource::Authority, true);
    }
}

/// Apply a validated signal to a puzzle on the authority.
///
/// Signals against solved or unknown puzzles are safe no-ops; nothing
/// ever propagates back to the sender as a fault.
pub fn apply_puzzle_signal(
    state: &mut WorldState,
    id: PuzzleId,
    signal: &PuzzleSignal,
) -> ApplyOutcome {
    let tick = state.tick;

    let Some(puzzle) = state.puzzles.get_mut(&id) else {
        return ApplyOutcome::NoOp(NoOpReason::StalePuzzle);
    };

    if puzzle.is_solved() {
        return ApplyOutcome::NoOp(NoOpReason::PuzzleAlreadySolved);
    }

    let mut solved_now = false;

    match signal {
        PuzzleSignal::ButtonPress => {
            if puzzle.code_mode() {
                return ApplyOutcome::NoOp(NoOpReason::SignalIgnoredInCodeMode);
            }
            puzzle.button_press_count += 1;
            debug!(
                "puzzle {:?} button pressed, count {}",
                id, puzzle.button_press_count
            );
            solved_now = puzzle.requirements_met();
        }
        PuzzleSignal::PlateChange { added } => {
            if puzzle.code_mode() {
                return ApplyOutcome::NoOp(NoOpReason::SignalIgnoredInCodeMode);
            }
            if *added {
                puzzle.plate_count += 1;
            } else {
                puzzle.plate_count = puzzle.plate_count.saturating_sub(1);
            }
            debug!("puzzle {:?} plate change, count {}", id, puzzle.plate_count);
            solved_now = puzzle.requirements_met();
        }
        PuzzleSignal::CodeAppend { symbol } => {
            if !puzzle.code_mode() {
                return ApplyOutcome::NoOp(NoOpReason::NotACodePuzzle);
            }
            puzzle.current_code.push_str(symbol);
            debug!("puzzle {:?} code append, len {}", id, puzzle.current_code.len());
        }
        PuzzleSignal::CodeSubmit => {
            if !puzzle.code_mode() {
                return ApplyOutcome::NoOp(NoOpReason::NotACodePuzzle);
            }
            if puzzle.current_code == puzzle.required_code {
                solved_now = true;
            } else {
                debug!("puzzle {:?} wrong code, resetting entry", id);
                puzzle.current_code.clear();
            }
        }
    }

    if solved_now {
        puzzle.mark_solved();
        let linked_door = puzzle.linked_door;
        info!("puzzle {:?} solved at tick {}", id, tick);

        // Side effect first, then the solved broadcast: observers that see
        // Solved can rely on the door state already being visible.
        if let Some(door) = linked_door {
            state.set_door(door, true);
        }
        state.push_event(StateEvent::puzzle_solved(tick, id));
    }

    ApplyOutcome::Applied
}
