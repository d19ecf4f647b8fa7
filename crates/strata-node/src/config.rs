//! Node configuration.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Address to listen on for broker and neighbour calls
    pub listen_addr: SocketAddr,

    /// Address handed to the broker; defaults to the bound listen address
    pub advertise_addr: Option<String>,

    /// Broker to subscribe to on startup
    pub broker_addr: String,

    /// Period of the alive-cell-count tick
    pub tick: Duration,

    /// Delay between a shutdown kill and the server stopping
    pub shutdown_grace: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8050)),
            advertise_addr: None,
            broker_addr: "127.0.0.1:8030".to_string(),
            tick: Duration::from_millis(2000),
            shutdown_grace: Duration::from_millis(1000),
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let listen_addr = match std::env::var("STRATA_NODE_ADDR") {
            Ok(addr) => addr
                .parse()
                .map_err(|e| Error::Config(format!("STRATA_NODE_ADDR {:?}: {}", addr, e)))?,
            Err(_) => defaults.listen_addr,
        };

        let advertise_addr = std::env::var("STRATA_NODE_ADVERTISE")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let broker_addr =
            std::env::var("STRATA_BROKER_ADDR").unwrap_or(defaults.broker_addr);

        Ok(Self {
            listen_addr,
            advertise_addr,
            broker_addr,
            tick: millis_from_env("STRATA_TICK_MS")?.unwrap_or(defaults.tick),
            shutdown_grace: millis_from_env("STRATA_SHUTDOWN_GRACE_MS")?
                .unwrap_or(defaults.shutdown_grace),
        })
    }
}

fn millis_from_env(name: &str) -> Result<Option<Duration>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| Error::Config(format!("{} {:?}: {}", name, value, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = NodeConfig::default();
        assert_eq!(config.listen_addr.port(), 8050);
        assert_eq!(config.broker_addr, "127.0.0.1:8030");
        assert_eq!(config.tick, Duration::from_secs(2));
        assert!(config.advertise_addr.is_none());
    }
}
