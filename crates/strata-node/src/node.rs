//! Node-level session management.
//!
//! A node runs at most one session at a time. The node owns the handle on
//! that session's distributor and a backlog of neighbour fetches that
//! arrived before the matching session was started here.

use std::sync::Arc;
use std::time::Duration;

use strata_protocol::{FetchRequest, Key, KeyPressReport, NodeAssignment, TickReport};
use tokio::sync::{broadcast, oneshot, Mutex, Notify};
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::distributor::{request, Command, Distributor, FetchReply, PoolHandle};
use crate::error::{Error, Result};
use crate::events::{GameEvent, EVENT_CAPACITY};

#[derive(Default)]
struct NodeState {
    pool: Option<PoolHandle>,
    /// Fetches for an epoch this node has not started yet
    backlog: Vec<(FetchRequest, FetchReply)>,
}

/// A compute node.
pub struct Node {
    tick: Duration,
    shutdown_grace: Duration,
    state: Mutex<NodeState>,
    events: broadcast::Sender<GameEvent>,
    shutdown: Arc<Notify>,
}

impl Node {
    pub fn new(config: &NodeConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tick: config.tick,
            shutdown_grace: config.shutdown_grace,
            state: Mutex::new(NodeState::default()),
            events,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Subscribe to this node's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.events.subscribe()
    }

    /// Notified once a shutdown kill's grace period has passed.
    pub fn shutdown_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Start the assigned session, or resume the running one.
    pub async fn initialise(&self, assignment: NodeAssignment) -> Result<()> {
        let mut state = self.state.lock().await;

        if assignment.continue_existing {
            let resumable = state
                .pool
                .as_ref()
                .filter(|pool| pool.epoch() == assignment.epoch)
                .map(PoolHandle::commands);
            if let Some(commands) = resumable {
                drop(state);
                info!(session = %assignment.session, "Continuing running session");
                request(&commands, |tx| Command::KeyPress(Key::Resume, tx)).await?;
                return Ok(());
            }
            warn!(
                session = %assignment.session,
                "Continue requested with no matching session running, starting fresh"
            );
        }

        if let Some(pool) = state.pool.take() {
            info!(session = %pool.session(), "Replacing running session");
            pool.shutdown().await;
        }

        let pool = Distributor::start(assignment, self.tick, self.events.clone())?;
        let epoch = pool.epoch();
        let commands = pool.commands();
        state.pool = Some(pool);

        // Hand over fetches that were waiting for this epoch
        let backlog = std::mem::take(&mut state.backlog);
        for (fetch, reply) in backlog {
            if fetch.epoch == epoch {
                debug!(edge = ?fetch.edge, generation = fetch.generation, "Releasing backlogged fetch");
                let _ = commands.send(Command::Fetch(fetch, reply)).await;
            } else if fetch.epoch < epoch {
                let _ = reply.send(Err(Error::StaleEpoch {
                    requested: fetch.epoch,
                    current: epoch,
                }));
            } else {
                state.backlog.push((fetch, reply));
            }
        }

        Ok(())
    }

    /// The session's latest report, or its report as of an earlier `turn`.
    pub async fn report(&self, turn: Option<u64>) -> Result<TickReport> {
        let commands = self.running().await?;
        request(&commands, |tx| Command::Report(turn, tx)).await?
    }

    pub async fn key_press(&self, key: Key) -> Result<KeyPressReport> {
        let commands = self.running().await?;
        request(&commands, |tx| Command::KeyPress(key, tx)).await
    }

    /// Stop the running session, if any. With `shutdown` the node's server
    /// stops after the grace period.
    pub async fn kill(&self, shutdown: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        state.backlog.clear();
        if let Some(pool) = state.pool.take() {
            info!(session = %pool.session(), "Killing session");
            pool.shutdown().await;
        }
        drop(state);

        if shutdown {
            info!("Shutting down in {:?}", self.shutdown_grace);
            let grace = self.shutdown_grace;
            let signal = Arc::clone(&self.shutdown);
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                signal.notify_one();
            });
        }
        Ok(())
    }

    /// Hand out one boundary row, waiting until it is published.
    pub async fn fetch(&self, fetch: FetchRequest) -> Result<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock().await;
        let running = state
            .pool
            .as_ref()
            .map(|pool| (pool.epoch(), pool.commands()));

        match running {
            Some((epoch, commands)) if epoch == fetch.epoch => {
                drop(state);
                commands
                    .send(Command::Fetch(fetch, tx))
                    .await
                    .map_err(|_| Error::PoolStopped)?;
            }
            Some((epoch, _)) if epoch > fetch.epoch => {
                return Err(Error::StaleEpoch {
                    requested: fetch.epoch,
                    current: epoch,
                });
            }
            _ => {
                debug!(epoch = fetch.epoch, generation = fetch.generation, "Backlogging fetch");
                state.backlog.push((fetch, tx));
                drop(state);
            }
        }
        rx.await.map_err(|_| Error::PoolStopped)?
    }

    async fn running(&self) -> Result<tokio::sync::mpsc::Sender<Command>> {
        let state = self.state.lock().await;
        state.pool.as_ref().map(PoolHandle::commands).ok_or(Error::Idle)
    }
}
