//! Test harness: an in-process Strata cluster on loopback sockets.

use std::sync::Arc;
use std::time::Duration;

use strata_broker::{Broker, BrokerConfig, BrokerServer};
use strata_grid::{step, Cell, Grid};
use strata_node::{Node, NodeConfig, NodeServer};
use strata_protocol::{BrokerClient, ReportStatus, SessionRequest, TickReport};
use tokio::time::{sleep, timeout, Instant};
use tracing::error;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// How long a scenario may wait for the cluster to settle.
pub const SETTLE: Duration = Duration::from_secs(20);

/// A broker plus nodes, each serving on its own loopback port.
pub struct Cluster {
    pub broker_addr: String,
    pub broker: Arc<Broker>,
    pub nodes: Vec<Arc<Node>>,
}

impl Cluster {
    /// Start a broker and `nodes` nodes, subscribed one after another so
    /// the pool order matches `self.nodes`.
    pub async fn start(nodes: usize) -> Result<Self> {
        Self::start_with(nodes, BrokerConfig::default()).await
    }

    /// Like [`Cluster::start`], with the broker's settings apart from its
    /// listen address taken from `config`.
    pub async fn start_with(nodes: usize, config: BrokerConfig) -> Result<Self> {
        let server = BrokerServer::bind(BrokerConfig {
            listen_addr: "127.0.0.1:0".parse()?,
            ..config
        })
        .await?;
        let broker_addr = server.local_addr()?.to_string();
        let broker = server.broker();
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Broker failed: {}", e);
            }
        });

        let mut cluster = Self {
            broker_addr,
            broker,
            nodes: Vec::new(),
        };
        for _ in 0..nodes {
            cluster.add_node().await?;
        }
        Ok(cluster)
    }

    /// Start one more node and wait until the broker has it.
    pub async fn add_node(&mut self) -> Result<Arc<Node>> {
        let server = NodeServer::bind(NodeConfig {
            listen_addr: "127.0.0.1:0".parse()?,
            broker_addr: self.broker_addr.clone(),
            tick: Duration::from_millis(100),
            shutdown_grace: Duration::from_millis(50),
            ..NodeConfig::default()
        })
        .await?;
        let node = server.node();
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Node failed: {}", e);
            }
        });

        let expected = self.nodes.len() + 1;
        let deadline = Instant::now() + SETTLE;
        while self.broker.capacity().await.0 < expected {
            if Instant::now() > deadline {
                return Err("node never subscribed".into());
            }
            sleep(Duration::from_millis(5)).await;
        }

        self.nodes.push(Arc::clone(&node));
        Ok(node)
    }

    pub async fn client(&self) -> Result<BrokerClient> {
        Ok(BrokerClient::connect(self.broker_addr.as_str()).await?)
    }
}

/// A session request with sensible defaults.
pub fn session(
    id: &str,
    size: usize,
    turns: u64,
    threads: usize,
    nodes: usize,
    alive: Vec<Cell>,
) -> SessionRequest {
    SessionRequest {
        session: id.to_string(),
        width: size,
        height: size,
        turns,
        threads,
        alive,
        continue_existing: false,
        nodes,
    }
}

/// The standard south-east glider, with its corner at `(x, y)`.
pub fn glider(x: usize, y: usize) -> Vec<Cell> {
    [(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)]
        .into_iter()
        .map(|(dx, dy)| Cell::new(x + dx, y + dy))
        .collect()
}

/// A glider on a 16x16 torus is back where it started every 64 turns.
pub const GLIDER_PERIOD_16: u64 = 64;

/// Run `turns` generations on one torus grid, as a reference.
pub fn simulate(width: usize, height: usize, alive: &[Cell], turns: u64) -> Vec<Cell> {
    let Ok(mut current) = Grid::from_cells(width, height, alive) else {
        return Vec::new();
    };
    let mut next = Grid::new(width, height);
    for _ in 0..turns {
        let above = current.row(height - 1).to_vec();
        let below = current.row(0).to_vec();
        step(&current, &above, &below, &mut next);
        std::mem::swap(&mut current, &mut next);
    }
    current.alive_cells(0)
}

/// Poll until the session reports `Finished`.
pub async fn wait_finished(client: &BrokerClient, id: &str) -> Result<TickReport> {
    let finished = timeout(SETTLE, async {
        loop {
            let report = client.report(id).await?;
            if report.status == ReportStatus::Finished {
                return Ok::<_, strata_protocol::Error>(report);
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await??;
    Ok(finished)
}

/// Poll until the session has completed at least `turn` turns.
pub async fn wait_turn(client: &BrokerClient, id: &str, turn: u64) -> Result<TickReport> {
    let reached = timeout(SETTLE, async {
        loop {
            let report = client.report(id).await?;
            if report.turn >= turn {
                return Ok::<_, strata_protocol::Error>(report);
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await??;
    Ok(reached)
}
