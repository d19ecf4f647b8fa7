//! Typed clients for the broker and for nodes.

use crate::error::Result;
use crate::messages::{BrokerRequest, FetchRequest, NodeAssignment, NodeRequest, SessionRequest};
use crate::rpc::RpcClient;
use crate::types::{Edge, Key, KeyPressReport, TickReport};

/// Client for the broker's public calls.
pub struct BrokerClient {
    rpc: RpcClient,
}

impl BrokerClient {
    pub async fn connect(addr: impl Into<String>) -> Result<Self> {
        Ok(Self {
            rpc: RpcClient::connect(addr).await?,
        })
    }

    pub fn addr(&self) -> &str {
        self.rpc.addr()
    }

    /// Announce a node listening at `node`.
    pub async fn subscribe(&self, node: impl Into<String>) -> Result<()> {
        self.rpc
            .call(&BrokerRequest::Subscribe { node: node.into() })
            .await
    }

    /// Start or continue a session. Returns the node addresses in partition order.
    pub async fn initialise(&self, request: SessionRequest) -> Result<Vec<String>> {
        self.rpc.call(&BrokerRequest::Initialise(request)).await
    }

    pub async fn report(&self, session: impl Into<String>) -> Result<TickReport> {
        self.rpc
            .call(&BrokerRequest::Report {
                session: session.into(),
            })
            .await
    }

    pub async fn key_press(&self, session: impl Into<String>, key: Key) -> Result<KeyPressReport> {
        self.rpc
            .call(&BrokerRequest::KeyPress {
                session: session.into(),
                key,
            })
            .await
    }
}

/// Client for one node.
pub struct NodeClient {
    rpc: RpcClient,
}

impl NodeClient {
    pub async fn connect(addr: impl Into<String>) -> Result<Self> {
        Ok(Self {
            rpc: RpcClient::connect(addr).await?,
        })
    }

    /// Create a client that dials on its first call.
    pub fn lazy(addr: impl Into<String>) -> Self {
        Self {
            rpc: RpcClient::lazy(addr),
        }
    }

    pub fn addr(&self) -> &str {
        self.rpc.addr()
    }

    pub async fn initialise(&self, assignment: NodeAssignment) -> Result<()> {
        self.rpc.call(&NodeRequest::Initialise(assignment)).await
    }

    /// The node's latest report, or its report as of an earlier `turn`
    /// it still remembers.
    pub async fn report(&self, turn: Option<u64>) -> Result<TickReport> {
        self.rpc.call(&NodeRequest::Report { turn }).await
    }

    pub async fn key_press(&self, key: Key) -> Result<KeyPressReport> {
        self.rpc.call(&NodeRequest::KeyPress { key }).await
    }

    /// Stop the node's session; with `shutdown` the node process exits too.
    pub async fn kill(&self, shutdown: bool) -> Result<()> {
        self.rpc.call(&NodeRequest::Kill { shutdown }).await
    }

    /// Fetch the node's `edge` row as of `generation`.
    ///
    /// Blocks on the remote side until that generation is published.
    pub async fn fetch(&self, edge: Edge, generation: u64, epoch: u64) -> Result<Vec<u8>> {
        self.rpc
            .call(&NodeRequest::Fetch(FetchRequest {
                edge,
                generation,
                epoch,
            }))
            .await
    }
}
