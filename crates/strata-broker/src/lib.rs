//! Strata Broker - the entry point of a Strata cluster
//!
//! Nodes subscribe to the broker when they start. Clients ask the broker
//! for a session; the broker picks free nodes, cuts the grid into one row
//! band per node, wires the nodes into a ring and fans later `Report` and
//! `KeyPress` calls out to them, merging their answers.
//!
//! # Architecture
//!
//! - **Pool**: subscribed nodes with busy flags, in subscription order
//! - **Dispatch**: one loop per node owning the connection to it
//! - **Session**: assignment planning and reply merging
//! - **Broker**: allocation and fan-out
//!
//! # Example
//!
//! ```no_run
//! use strata_broker::{BrokerConfig, BrokerServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = BrokerServer::bind(BrokerConfig::from_env()?).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod server;
pub mod session;

mod dispatch;
mod pool;

pub use broker::Broker;
pub use config::BrokerConfig;
pub use error::{Error, Result};
pub use server::BrokerServer;
pub use session::Session;
