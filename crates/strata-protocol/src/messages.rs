//! Request messages.

use serde::{Deserialize, Serialize};
use strata_grid::Cell;

use crate::types::{Edge, Key};

/// A client's request to start (or continue) a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    /// Session key, conventionally the client's address
    pub session: String,
    pub width: usize,
    pub height: usize,
    pub turns: u64,
    /// Workers per node
    pub threads: usize,
    /// Initially live cells, in global coordinates
    pub alive: Vec<Cell>,
    /// Resume the session already running instead of starting over
    #[serde(rename = "continue")]
    pub continue_existing: bool,
    /// How many nodes to spread the grid over
    pub nodes: usize,
}

/// The two ring neighbours of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Neighbours {
    /// Node owning the rows just above this node's band
    pub lower: String,
    /// Node owning the rows just below this node's band
    pub upper: String,
}

/// The broker's instructions for one node of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAssignment {
    pub session: String,
    /// Numbers fresh sessions so neighbours never mix rows across them
    pub epoch: u64,
    pub width: usize,
    /// Rows owned by this node
    pub height: usize,
    /// Global row of this node's first row
    pub row_offset: usize,
    pub turns: u64,
    pub threads: usize,
    /// Initially live cells, in node-local rows
    pub alive: Vec<Cell>,
    #[serde(rename = "continue")]
    pub continue_existing: bool,
    /// `None` when this node is the whole ring
    pub neighbours: Option<Neighbours>,
}

/// A neighbour's request for one boundary row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchRequest {
    pub edge: Edge,
    /// The generation (completed turns) the row must belong to
    pub generation: u64,
    pub epoch: u64,
}

/// Calls served by the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum BrokerRequest {
    /// A node announces itself. Reply: `()`
    Subscribe { node: String },
    /// Reply: the session's node addresses in partition order
    Initialise(SessionRequest),
    /// Reply: [`crate::TickReport`]
    Report { session: String },
    /// Reply: [`crate::KeyPressReport`]
    KeyPress { session: String, key: Key },
}

/// Calls served by a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum NodeRequest {
    /// Reply: `()`
    Initialise(NodeAssignment),
    /// Reply: [`crate::TickReport`], as of `turn` when given, else the
    /// latest completed turn
    Report {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        turn: Option<u64>,
    },
    /// Reply: [`crate::KeyPressReport`]
    KeyPress { key: Key },
    /// Reply: `()`
    Kill { shutdown: bool },
    /// Reply: the requested row
    Fetch(FetchRequest),
}
