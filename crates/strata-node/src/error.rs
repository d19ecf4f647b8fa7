//! Error types for strata-node.

use strata_grid::GridError;
use strata_protocol::{Edge, ErrorKind, RemoteError};
use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in node operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Report or key press with no session running
    #[error("no session is running on this node")]
    Idle,

    /// The session stopped while the call was in flight
    #[error("session stopped before answering")]
    PoolStopped,

    /// A neighbour from an older session asked for a row
    #[error("fetch for epoch {requested} but this node runs epoch {current}")]
    StaleEpoch { requested: u64, current: u64 },

    /// A boundary row was asked for after it was already handed out
    #[error("{edge:?} row of generation {generation} was already handed out")]
    RowGone { edge: Edge, generation: u64 },

    /// A report was asked for a turn this node no longer remembers, or has
    /// not reached
    #[error("turn {requested} is not available, latest completed turn is {latest}")]
    TurnUnavailable { requested: u64, latest: u64 },

    /// The assignment does not describe a valid band
    #[error("Invalid assignment: {0}")]
    Grid(#[from] GridError),

    /// Fetching a halo row from a neighbour failed
    #[error("neighbour fetch failed: {0}")]
    NeighbourFetch(RemoteError),

    /// Talking to the broker failed
    #[error("Protocol error: {0}")]
    Protocol(#[from] strata_protocol::Error),

    /// Bad environment configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Idle
            | Error::PoolStopped
            | Error::StaleEpoch { .. }
            | Error::RowGone { .. }
            | Error::TurnUnavailable { .. } => ErrorKind::Sequencing,
            Error::Grid(_) | Error::Config(_) => ErrorKind::Invalid,
            Error::NeighbourFetch(remote) => remote.kind,
            Error::Protocol(e) => e.kind(),
            Error::Io(_) => ErrorKind::Transport,
        }
    }
}

impl From<Error> for RemoteError {
    fn from(e: Error) -> Self {
        RemoteError::new(e.kind(), e.to_string())
    }
}
