//! The broker's RPC server.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use strata_protocol::{reply, serve, BrokerRequest, RemoteError, Service};
use tokio::net::TcpListener;
use tracing::info;

use crate::broker::Broker;
use crate::config::BrokerConfig;
use crate::error::Result;

impl Service for Broker {
    type Request = BrokerRequest;

    async fn handle(self: Arc<Self>, request: BrokerRequest) -> Value {
        match request {
            BrokerRequest::Subscribe { node } => {
                reply(self.subscribe(node).await.map_err(RemoteError::from))
            }
            BrokerRequest::Initialise(session) => {
                reply(self.initialise(session).await.map_err(RemoteError::from))
            }
            BrokerRequest::Report { session } => {
                reply(self.report(&session).await.map_err(RemoteError::from))
            }
            BrokerRequest::KeyPress { session, key } => {
                reply(self.key_press(&session, key).await.map_err(RemoteError::from))
            }
        }
    }
}

/// A bound broker, ready to serve.
pub struct BrokerServer {
    broker: Arc<Broker>,
    listener: TcpListener,
}

impl BrokerServer {
    pub async fn bind(config: BrokerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        Ok(Self {
            broker: Arc::new(Broker::new(config)),
            listener,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn broker(&self) -> Arc<Broker> {
        Arc::clone(&self.broker)
    }

    /// Serve until a shutdown kill.
    pub async fn run(self) -> Result<()> {
        let shutdown = self.broker.shutdown_signal();
        serve(self.listener, self.broker, shutdown).await;
        info!("Broker stopped");
        Ok(())
    }
}
