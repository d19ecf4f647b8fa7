//! Strata Protocol - the request/response contract of a Strata cluster
//!
//! Three kinds of process talk to each other:
//!
//! - **Clients** call the broker: `Initialise`, `Report`, `KeyPress`.
//! - **The broker** calls nodes: `Initialise`, `Report`, `KeyPress`, `Kill`;
//!   nodes call the broker once at startup: `Subscribe`.
//! - **Nodes** call their ring neighbours: `Fetch`, once per boundary per
//!   generation.
//!
//! # Wire format
//!
//! Plain TCP, one JSON document per line. A request line is answered by
//! exactly one response line, `{"Ok": ...}` or `{"Err": {"kind": ..., "message": ...}}`.
//! Requests are tagged enums (`{"method": "report", ...}`).
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_protocol::{BrokerClient, SessionRequest};
//!
//! let broker = BrokerClient::connect("127.0.0.1:8030").await?;
//! let nodes = broker.initialise(request).await?;
//! let report = broker.report("client-1").await?;
//! ```

pub mod client;
pub mod error;
pub mod messages;
pub mod rpc;
pub mod types;

pub use client::{BrokerClient, NodeClient};
pub use error::{Error, ErrorKind, RemoteError, Result};
pub use messages::{
    BrokerRequest, FetchRequest, Neighbours, NodeAssignment, NodeRequest, SessionRequest,
};
pub use rpc::{reply, serve, RpcClient, Service};
pub use types::{ControlState, Edge, InvalidKey, Key, KeyPressReport, ReportStatus, TickReport};

pub use strata_grid::Cell;
