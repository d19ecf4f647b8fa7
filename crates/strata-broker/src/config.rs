//! Broker configuration.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Broker configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Address to listen on for clients and nodes
    pub listen_addr: SocketAddr,

    /// After a `k` key, stop nodes and broker instead of releasing the nodes
    pub shutdown_on_kill: bool,

    /// Delay between a shutdown kill and the server stopping
    pub shutdown_grace: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8030)),
            shutdown_on_kill: false,
            shutdown_grace: Duration::from_millis(1000),
        }
    }
}

impl BrokerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("STRATA_BROKER_ADDR") {
            config.listen_addr = addr
                .parse()
                .map_err(|e| Error::Config(format!("STRATA_BROKER_ADDR {:?}: {}", addr, e)))?;
        }

        if let Ok(flag) = std::env::var("STRATA_SHUTDOWN_ON_KILL") {
            config.shutdown_on_kill = match flag.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                other => {
                    return Err(Error::Config(format!(
                        "STRATA_SHUTDOWN_ON_KILL {:?} is not a boolean",
                        other
                    )))
                }
            };
        }

        if let Ok(ms) = std::env::var("STRATA_SHUTDOWN_GRACE_MS") {
            let ms: u64 = ms
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("STRATA_SHUTDOWN_GRACE_MS {:?}: {}", ms, e)))?;
            config.shutdown_grace = Duration::from_millis(ms);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_release_nodes_on_kill() {
        let config = BrokerConfig::default();
        assert_eq!(config.listen_addr.port(), 8030);
        assert!(!config.shutdown_on_kill);
        assert_eq!(config.shutdown_grace, Duration::from_secs(1));
    }
}
