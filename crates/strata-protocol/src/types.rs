//! Value types shared by requests and replies.

use std::fmt;

use serde::{Deserialize, Serialize};
use strata_grid::Cell;
use thiserror::Error;

/// Control state of a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlState {
    Executing,
    Paused,
    Saving,
    Quitting,
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Executing => write!(f, "Executing"),
            Self::Paused => write!(f, "Paused"),
            Self::Saving => write!(f, "Saving"),
            Self::Quitting => write!(f, "Quitting"),
        }
    }
}

/// Whether a report is a progress tick or the final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    Ticking,
    Finished,
}

/// A user key press forwarded from the client.
///
/// Travels on the wire as the single character the user typed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "char", into = "char")]
pub enum Key {
    /// `p`: toggle between executing and paused
    Pause,
    /// `s`: take a snapshot without stopping
    Snapshot,
    /// `q`: snapshot and stop (soft; the session stays resumable)
    Quit,
    /// `k`: snapshot, then tear the session down
    Kill,
    /// `r`: resume a paused or quit session
    Resume,
}

/// A character that is not one of the recognised keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unrecognised key {0:?}")]
pub struct InvalidKey(pub char);

impl TryFrom<char> for Key {
    type Error = InvalidKey;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c {
            'p' => Ok(Key::Pause),
            's' => Ok(Key::Snapshot),
            'q' => Ok(Key::Quit),
            'k' => Ok(Key::Kill),
            'r' => Ok(Key::Resume),
            other => Err(InvalidKey(other)),
        }
    }
}

impl From<Key> for char {
    fn from(key: Key) -> char {
        match key {
            Key::Pause => 'p',
            Key::Snapshot => 's',
            Key::Quit => 'q',
            Key::Kill => 'k',
            Key::Resume => 'r',
        }
    }
}

/// Which boundary row of a node a neighbour asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    /// The node's first row
    Top,
    /// The node's last row
    Bottom,
}

/// Progress of a session, or its final result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// Completed turns
    pub turn: u64,
    /// Live cells after `turn`, in global coordinates
    pub alive: Vec<Cell>,
    pub cell_count: usize,
    pub status: ReportStatus,
}

/// Answer to a key press.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPressReport {
    /// Completed turns at the moment of the state change
    pub turn: u64,
    /// Live cells after `turn`, in global coordinates
    pub alive: Vec<Cell>,
    pub state: ControlState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_travel_as_characters() {
        let json = serde_json::to_string(&Key::Pause).unwrap();
        assert_eq!(json, "\"p\"");

        let parsed: Key = serde_json::from_str("\"k\"").unwrap();
        assert_eq!(parsed, Key::Kill);
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert_eq!(Key::try_from('x'), Err(InvalidKey('x')));
        assert!(serde_json::from_str::<Key>("\"x\"").is_err());
    }
}
