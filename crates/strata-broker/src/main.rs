//! Strata broker binary
//!
//! Accepts node subscriptions and client sessions.

use strata_broker::{BrokerConfig, BrokerServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strata_broker=info,strata_protocol=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BrokerConfig::from_env()?;
    tracing::info!("Starting Strata broker on {}", config.listen_addr);

    let server = BrokerServer::bind(config).await?;
    server.run().await?;

    Ok(())
}
