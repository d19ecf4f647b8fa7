//! Error types for strata-broker.

use strata_grid::GridError;
use strata_protocol::{ErrorKind, RemoteError};
use thiserror::Error;

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in broker operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Every subscribed node is busy, or none subscribed
    #[error("no free node to run the session on")]
    NoFreeCapacity,

    /// Report or key press for a session that does not exist
    #[error("unknown session {0:?}")]
    UnknownSession(String),

    /// The node's dispatch loop has ended
    #[error("node {0} is unavailable")]
    NodeUnavailable(String),

    /// A node answered with an error or could not be reached
    #[error("node {node}: {source}")]
    Node { node: String, source: RemoteError },

    /// The session request does not describe a valid grid
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] GridError),

    /// Bad environment configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Talking to a peer failed
    #[error("Protocol error: {0}")]
    Protocol(#[from] strata_protocol::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoFreeCapacity => ErrorKind::Capacity,
            Error::UnknownSession(_) => ErrorKind::Sequencing,
            Error::NodeUnavailable(_) | Error::Io(_) => ErrorKind::Transport,
            Error::Node { source, .. } => source.kind,
            Error::InvalidRequest(_) | Error::Config(_) => ErrorKind::Invalid,
            Error::Protocol(e) => e.kind(),
        }
    }
}

impl From<Error> for RemoteError {
    fn from(e: Error) -> Self {
        RemoteError::new(e.kind(), e.to_string())
    }
}
