//! Error types for strata-protocol.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad class of a failure, carried across process boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No free node could be allocated.
    Capacity,
    /// A call arrived in a state that cannot serve it.
    Sequencing,
    /// A peer could not be reached or hung up.
    Transport,
    /// The request itself was malformed.
    Invalid,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capacity => write!(f, "capacity"),
            Self::Sequencing => write!(f, "sequencing"),
            Self::Transport => write!(f, "transport"),
            Self::Invalid => write!(f, "invalid"),
        }
    }
}

/// An error as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Errors that can occur while talking to a remote process.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error on the underlying socket
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A line could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The peer closed the connection before answering
    #[error("connection to {0} closed")]
    ConnectionClosed(String),

    /// The peer answered with an error
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}

impl Error {
    /// Classify this error for forwarding to the next caller up the chain.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Remote(remote) => remote.kind,
            Error::Serialization(_) => ErrorKind::Invalid,
            Error::Io(_) | Error::ConnectionClosed(_) => ErrorKind::Transport,
        }
    }
}

impl From<Error> for RemoteError {
    fn from(e: Error) -> Self {
        match e {
            Error::Remote(remote) => remote,
            other => RemoteError::new(other.kind(), other.to_string()),
        }
    }
}
