//! Observable events emitted while a session runs.

use serde::{Deserialize, Serialize};
use strata_grid::Cell;
use strata_protocol::ControlState;

/// Capacity of a node's event stream. Slow subscribers lag and skip events.
pub const EVENT_CAPACITY: usize = 4096;

/// One thing that happened on this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GameEvent {
    /// A cell changed state while computing `turn`.
    /// Only emitted while someone subscribes.
    CellFlipped { turn: u64, cell: Cell },
    /// Every worker on this node finished `turn`
    TurnComplete { turn: u64 },
    /// Periodic tick with the node's live cell count
    AliveCellsCount { turn: u64, count: usize },
    /// A key press changed the control state
    StateChange { turn: u64, state: ControlState },
    /// The session ran all its turns
    FinalTurnComplete { turn: u64, alive: Vec<Cell> },
}

impl GameEvent {
    /// The turn this event refers to.
    pub fn turn(&self) -> u64 {
        match self {
            GameEvent::CellFlipped { turn, .. }
            | GameEvent::TurnComplete { turn }
            | GameEvent::AliveCellsCount { turn, .. }
            | GameEvent::StateChange { turn, .. }
            | GameEvent::FinalTurnComplete { turn, .. } => *turn,
        }
    }
}
