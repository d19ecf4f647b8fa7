//! Strata Node - one compute node of a Strata cluster
//!
//! A node owns a contiguous band of grid rows for the session the broker
//! assigned it, and splits that band again across local workers.
//!
//! # Architecture
//!
//! - **Worker**: one task per row band, advancing one generation per cycle
//! - **Distributor**: the turn barrier, halo routing between workers and to
//!   neighbouring nodes, the pre-aggregated snapshot and control state
//! - **Node**: session lifecycle (initialise, continue, kill) and the fetch
//!   backlog
//! - **Server**: serves broker and neighbour calls over line-delimited JSON
//!
//! # Example
//!
//! ```no_run
//! use strata_node::{NodeConfig, NodeServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::from_env()?;
//!     let server = NodeServer::bind(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod node;
pub mod server;

mod distributor;
mod worker;

pub use config::NodeConfig;
pub use error::{Error, Result};
pub use events::GameEvent;
pub use node::Node;
pub use server::NodeServer;
