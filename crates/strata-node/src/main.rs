//! Strata node binary
//!
//! Subscribes to the broker and serves sessions until killed with shutdown.

use strata_node::{NodeConfig, NodeServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strata_node=info,strata_protocol=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = NodeConfig::from_env()?;
    tracing::info!("Starting Strata node on {}", config.listen_addr);

    let server = NodeServer::bind(config).await?;
    server.run().await?;

    Ok(())
}
