//! The node's RPC server.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use strata_protocol::{reply, serve, BrokerClient, NodeRequest, RemoteError, Service};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::NodeConfig;
use crate::error::Result;
use crate::node::Node;

impl Service for Node {
    type Request = NodeRequest;

    async fn handle(self: Arc<Self>, request: NodeRequest) -> Value {
        match request {
            NodeRequest::Initialise(assignment) => {
                reply(self.initialise(assignment).await.map_err(RemoteError::from))
            }
            NodeRequest::Report { turn } => {
                reply(self.report(turn).await.map_err(RemoteError::from))
            }
            NodeRequest::KeyPress { key } => {
                reply(self.key_press(key).await.map_err(RemoteError::from))
            }
            NodeRequest::Kill { shutdown } => {
                reply(self.kill(shutdown).await.map_err(RemoteError::from))
            }
            NodeRequest::Fetch(fetch) => reply(self.fetch(fetch).await.map_err(RemoteError::from)),
        }
    }
}

/// A bound node, ready to subscribe and serve.
pub struct NodeServer {
    node: Arc<Node>,
    listener: TcpListener,
    advertise: String,
    broker_addr: String,
}

impl NodeServer {
    pub async fn bind(config: NodeConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        let advertise = match &config.advertise_addr {
            Some(addr) => addr.clone(),
            None => listener.local_addr()?.to_string(),
        };
        Ok(Self {
            node: Arc::new(Node::new(&config)),
            listener,
            advertise,
            broker_addr: config.broker_addr,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// The address the broker is told to use.
    pub fn advertise_addr(&self) -> &str {
        &self.advertise
    }

    pub fn node(&self) -> Arc<Node> {
        Arc::clone(&self.node)
    }

    /// Subscribe to the broker, then serve until a shutdown kill.
    pub async fn run(self) -> Result<()> {
        let broker = BrokerClient::connect(self.broker_addr.as_str()).await?;
        broker.subscribe(self.advertise.as_str()).await?;
        info!(broker = %self.broker_addr, node = %self.advertise, "Subscribed to broker");

        let shutdown = self.node.shutdown_signal();
        serve(self.listener, self.node, shutdown).await;
        info!("Node stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_protocol::{ErrorKind, NodeClient};
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn idle_report_is_a_sequencing_error() {
        let server = NodeServer::bind(NodeConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            ..NodeConfig::default()
        })
        .await
        .unwrap();
        let addr = server.local_addr().unwrap().to_string();
        let node = server.node();
        tokio::spawn(serve(server.listener, node.clone(), node.shutdown_signal()));

        let client = NodeClient::connect(addr).await.unwrap();
        let err = assert_err!(client.report(None).await);
        assert_eq!(err.kind(), ErrorKind::Sequencing);
        assert_ok!(client.kill(false).await);
    }
}
