//! The broker: node pool, session allocation, and fan-out of client calls.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use strata_protocol::{ErrorKind, Key, KeyPressReport, SessionRequest, TickReport};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, error, info, warn};

use crate::config::BrokerConfig;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::pool::Pool;
use crate::session::{self, Session};

/// Rounds of reading a session's nodes before giving up on lining them up
/// on one turn.
const ALIGN_ATTEMPTS: usize = 8;

struct BrokerState {
    pool: Pool,
    sessions: HashMap<String, Session>,
    next_epoch: u64,
}

impl BrokerState {
    /// Drop a session if it is still the given epoch. Its nodes stay busy.
    fn take_session(&mut self, id: &str, epoch: u64) -> Option<Session> {
        match self.sessions.get(id) {
            Some(session) if session.epoch == epoch => self.sessions.remove(id),
            _ => None,
        }
    }

    /// Drop a session and free its nodes, if it is still the given epoch.
    fn end_session(&mut self, id: &str, epoch: u64) -> bool {
        match self.take_session(id, epoch) {
            Some(session) => {
                self.pool.release(&session.nodes);
                true
            }
            None => false,
        }
    }

    fn dispatchers(&self, nodes: &[String]) -> Result<Vec<Dispatcher>> {
        nodes
            .iter()
            .map(|addr| {
                self.pool
                    .dispatcher(addr)
                    .ok_or_else(|| Error::NodeUnavailable(addr.clone()))
            })
            .collect()
    }
}

/// Cluster broker.
pub struct Broker {
    config: BrokerConfig,
    state: Mutex<BrokerState>,
    shutdown: Arc<Notify>,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BrokerState {
                pool: Pool::new(),
                sessions: HashMap::new(),
                next_epoch: 1,
            }),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Notified once a shutdown kill's grace period has passed.
    pub fn shutdown_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Register a node, dialing back to it.
    pub async fn subscribe(&self, node: String) -> Result<()> {
        let dispatcher = Dispatcher::connect(node).await?;
        self.state.lock().await.pool.subscribe(dispatcher);
        Ok(())
    }

    /// Number of subscribed and free nodes.
    pub async fn capacity(&self) -> (usize, usize) {
        let state = self.state.lock().await;
        (state.pool.len(), state.pool.free())
    }

    /// Start a session, or continue the client's running one.
    ///
    /// Returns the session's node addresses in partition order.
    pub async fn initialise(&self, mut request: SessionRequest) -> Result<Vec<String>> {
        session::validate(&request)?;
        let wanted = session::clamp_nodes(&request);

        let (nodes, epoch) = {
            let mut state = self.state.lock().await;
            let existing = state.sessions.get(&request.session).cloned();

            match existing {
                Some(running) if request.continue_existing => {
                    info!(session = %request.session, nodes = running.nodes.len(), "Continuing session");
                    (running.nodes, running.epoch)
                }
                existing => {
                    if request.continue_existing {
                        warn!(session = %request.session, "Continue requested for an unknown session, starting fresh");
                        request.continue_existing = false;
                    }

                    let (nodes, retired) = match existing {
                        Some(running) if running.nodes.len() >= wanted => {
                            let mut nodes = running.nodes;
                            let retired = nodes.split_off(wanted);
                            (nodes, retired)
                        }
                        Some(running) => {
                            state.pool.release(&running.nodes);
                            let nodes = state.pool.allocate(wanted);
                            let retired = running
                                .nodes
                                .into_iter()
                                .filter(|addr| !nodes.contains(addr))
                                .collect();
                            (nodes, retired)
                        }
                        None => (state.pool.allocate(wanted), Vec::new()),
                    };

                    // Nodes dropped from the client's old session still run it.
                    // The kill is queued before anyone else can allocate them.
                    for dispatcher in retired.iter().filter_map(|a| state.pool.dispatcher(a)) {
                        dispatcher.kill_later(false).await;
                    }
                    state.pool.release(&retired);

                    if nodes.is_empty() {
                        state.sessions.remove(&request.session);
                        warn!(session = %request.session, "No free node for session");
                        return Err(Error::NoFreeCapacity);
                    }

                    let epoch = state.next_epoch;
                    state.next_epoch += 1;
                    state.sessions.insert(
                        request.session.clone(),
                        Session {
                            nodes: nodes.clone(),
                            epoch,
                        },
                    );
                    (nodes, epoch)
                }
            }
        };

        let assignments = session::plan_assignments(&request, &nodes, epoch)?;
        let dispatchers = self.state.lock().await.dispatchers(&nodes);
        let outcome = match dispatchers {
            Ok(dispatchers) => try_join_all(
                dispatchers
                    .iter()
                    .zip(assignments)
                    .map(|(dispatcher, assignment)| dispatcher.initialise(assignment)),
            )
            .await
            .map(|_| ()),
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            error!(session = %request.session, "Initialise failed: {}", e);
            self.abandon(&request.session, epoch).await;
            return Err(e);
        }

        info!(
            session = %request.session,
            epoch,
            nodes = nodes.len(),
            width = request.width,
            height = request.height,
            turns = request.turns,
            "Session running"
        );
        Ok(nodes)
    }

    /// Merged progress of a session, as of its slowest node's turn. A
    /// finished session is ended and its nodes released.
    pub async fn report(&self, id: &str) -> Result<TickReport> {
        let (session, dispatchers) = self.lookup(id).await?;

        let reports = aligned_reports(&dispatchers).await?;
        let merged = session::merge_reports(reports);

        if merged.status == strata_protocol::ReportStatus::Finished
            && self.state.lock().await.end_session(id, session.epoch)
        {
            info!(session = %id, turn = merged.turn, alive = merged.cell_count, "Session finished, nodes released");
        }
        Ok(merged)
    }

    /// Forward a key to every node of a session.
    pub async fn key_press(&self, id: &str, key: Key) -> Result<KeyPressReport> {
        let (session, dispatchers) = self.lookup(id).await?;

        let replies = try_join_all(dispatchers.iter().map(|d| d.key_press(key))).await?;
        let states: Vec<_> = replies.iter().map(|r| r.state).collect();
        let replies = match align_key_presses(&dispatchers, replies).await {
            Err(e) if e.kind() == ErrorKind::Sequencing => {
                warn!(session = %id, "Key press snapshots moved on, answering with the current turn: {}", e);
                aligned_reports(&dispatchers)
                    .await?
                    .into_iter()
                    .zip(states)
                    .map(|(report, state)| KeyPressReport {
                        turn: report.turn,
                        alive: report.alive,
                        state,
                    })
                    .collect()
            }
            aligned => aligned?,
        };
        let merged = session::merge_key_presses(replies)
            .ok_or_else(|| Error::UnknownSession(id.to_string()))?;
        info!(session = %id, key = %char::from(key), state = %merged.state, turn = merged.turn, "Key press");

        if key == Key::Kill {
            let shutdown = self.config.shutdown_on_kill;
            self.kill_quietly(&session.nodes, shutdown).await;

            let mut state = self.state.lock().await;
            if shutdown {
                // The nodes are about to exit, so they are never handed out again
                state.take_session(id, session.epoch);
            } else {
                state.end_session(id, session.epoch);
            }
            drop(state);

            if shutdown {
                info!("Shutting down in {:?}", self.config.shutdown_grace);
                let grace = self.config.shutdown_grace;
                let signal = Arc::clone(&self.shutdown);
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    signal.notify_one();
                });
            }
        }
        Ok(merged)
    }

    async fn lookup(&self, id: &str) -> Result<(Session, Vec<Dispatcher>)> {
        let state = self.state.lock().await;
        let session = state
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownSession(id.to_string()))?;
        let dispatchers = state.dispatchers(&session.nodes)?;
        Ok((session, dispatchers))
    }

    /// Stop a half-started session's nodes and release them.
    async fn abandon(&self, id: &str, epoch: u64) {
        let mut state = self.state.lock().await;
        let nodes = match state.sessions.get(id) {
            Some(session) if session.epoch == epoch => session.nodes.clone(),
            _ => return,
        };
        for dispatcher in nodes.iter().filter_map(|a| state.pool.dispatcher(a)) {
            dispatcher.kill_later(false).await;
        }
        state.end_session(id, epoch);
    }

    /// Kill the given nodes, logging failures instead of returning them.
    async fn kill_quietly(&self, nodes: &[String], shutdown: bool) {
        if nodes.is_empty() {
            return;
        }
        let dispatchers: Vec<_> = {
            let state = self.state.lock().await;
            nodes.iter().filter_map(|a| state.pool.dispatcher(a)).collect()
        };
        for (dispatcher, outcome) in dispatchers
            .iter()
            .zip(join_all(dispatchers.iter().map(|d| d.kill(shutdown))).await)
        {
            if let Err(e) = outcome {
                error!(node = %dispatcher.addr(), "Kill failed: {}", e);
            }
        }
    }
}

/// Every node's report as of the slowest node's turn.
///
/// Nodes keep a short history of completed turns. If a node has already
/// dropped the common turn by the time it is asked, the nodes are read again.
async fn aligned_reports(dispatchers: &[Dispatcher]) -> Result<Vec<TickReport>> {
    let mut attempt = 1;
    loop {
        let reports = try_join_all(dispatchers.iter().map(|d| d.report(None))).await?;
        match align_reports(dispatchers, reports).await {
            Err(e) if e.kind() == ErrorKind::Sequencing && attempt < ALIGN_ATTEMPTS => {
                debug!(attempt, "Nodes moved past the common turn, reading again: {}", e);
                attempt += 1;
            }
            aligned => return aligned,
        }
    }
}

async fn align_reports(dispatchers: &[Dispatcher], reports: Vec<TickReport>) -> Result<Vec<TickReport>> {
    let Some(turn) = session::common_turn(reports.iter().map(|r| r.turn)) else {
        return Ok(reports);
    };
    try_join_all(
        dispatchers
            .iter()
            .zip(reports)
            .map(|(dispatcher, report)| async move {
                if report.turn == turn {
                    Ok(report)
                } else {
                    dispatcher.report(Some(turn)).await
                }
            }),
    )
    .await
}

/// Swap the snapshot of every reply ahead of the slowest one for the
/// node's snapshot as of that turn.
async fn align_key_presses(
    dispatchers: &[Dispatcher],
    replies: Vec<KeyPressReport>,
) -> Result<Vec<KeyPressReport>> {
    let Some(turn) = session::common_turn(replies.iter().map(|r| r.turn)) else {
        return Ok(replies);
    };
    try_join_all(
        dispatchers
            .iter()
            .zip(replies)
            .map(|(dispatcher, reply)| async move {
                if reply.turn == turn {
                    return Ok::<_, Error>(reply);
                }
                let report = dispatcher.report(Some(turn)).await?;
                Ok(KeyPressReport {
                    turn,
                    alive: report.alive,
                    state: reply.state,
                })
            }),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_protocol::{Cell, ControlState, RemoteError, ReportStatus};
    use tokio_test::{assert_err, assert_ok};

    use crate::dispatch::Job;

    /// A node that only answers reports, from the turns in `history`.
    fn scripted_node(latest: u64, history: Vec<(u64, Vec<Cell>)>) -> Dispatcher {
        let (dispatcher, mut jobs) = Dispatcher::detached("scripted:1");
        tokio::spawn(async move {
            while let Some(job) = jobs.recv().await {
                if let Job::Report(turn, reply) = job {
                    let turn = turn.unwrap_or(latest);
                    let outcome = history
                        .iter()
                        .find(|(t, _)| *t == turn)
                        .map(|(t, alive)| TickReport {
                            turn: *t,
                            alive: alive.clone(),
                            cell_count: alive.len(),
                            status: ReportStatus::Ticking,
                        })
                        .ok_or_else(|| {
                            strata_protocol::Error::from(RemoteError::new(
                                ErrorKind::Sequencing,
                                format!("turn {} is gone", turn),
                            ))
                        });
                    let _ = reply.send(outcome);
                }
            }
        });
        dispatcher
    }

    fn request(session: &str) -> SessionRequest {
        SessionRequest {
            session: session.into(),
            width: 8,
            height: 8,
            turns: 1,
            threads: 1,
            alive: vec![Cell::new(0, 0)],
            continue_existing: false,
            nodes: 1,
        }
    }

    #[tokio::test]
    async fn empty_pool_is_a_capacity_error() {
        let broker = Broker::new(BrokerConfig::default());
        let err = assert_err!(broker.initialise(request("a")).await);
        assert_eq!(RemoteError::from(err).kind, ErrorKind::Capacity);
        assert_eq!(broker.capacity().await, (0, 0));
    }

    #[tokio::test]
    async fn unknown_session_is_a_sequencing_error() {
        let broker = Broker::new(BrokerConfig::default());
        let err = assert_err!(broker.report("nobody").await);
        assert_eq!(err.kind(), ErrorKind::Sequencing);
        let err = assert_err!(broker.key_press("nobody", Key::Pause).await);
        assert_eq!(err.kind(), ErrorKind::Sequencing);
    }

    #[tokio::test]
    async fn invalid_grid_is_rejected_before_allocation() {
        let broker = Broker::new(BrokerConfig::default());
        let mut bad = request("a");
        bad.alive = vec![Cell::new(99, 0)];
        let err = assert_err!(broker.initialise(bad).await);
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }

    #[tokio::test]
    async fn subscribing_an_unreachable_node_fails() {
        let broker = Broker::new(BrokerConfig::default());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = assert_err!(broker.subscribe(addr).await);
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(broker.capacity().await, (0, 0));
    }

    #[tokio::test]
    async fn reports_line_up_on_the_slowest_turn() {
        let nodes = vec![
            scripted_node(5, vec![(5, vec![Cell::new(0, 0)])]),
            scripted_node(
                6,
                vec![(5, vec![Cell::new(0, 5)]), (6, vec![Cell::new(1, 5), Cell::new(2, 5)])],
            ),
        ];

        let reports = assert_ok!(aligned_reports(&nodes).await);
        assert!(reports.iter().all(|r| r.turn == 5));
        let merged = session::merge_reports(reports);
        assert_eq!(merged.turn, 5);
        assert_eq!(merged.alive, vec![Cell::new(0, 0), Cell::new(0, 5)]);
        assert_eq!(merged.cell_count, 2);
    }

    #[tokio::test]
    async fn a_forgotten_common_turn_is_an_error() {
        let nodes = vec![
            scripted_node(5, vec![(5, vec![Cell::new(0, 0)])]),
            scripted_node(9, vec![(9, vec![Cell::new(1, 5)])]),
        ];

        let err = assert_err!(aligned_reports(&nodes).await);
        assert_eq!(err.kind(), ErrorKind::Sequencing);
    }

    #[tokio::test]
    async fn key_press_snapshots_line_up_on_the_slowest_turn() {
        let nodes = vec![
            scripted_node(3, vec![(3, vec![Cell::new(4, 1)])]),
            scripted_node(4, vec![(3, vec![Cell::new(4, 6)]), (4, vec![Cell::new(5, 6)])]),
        ];
        let replies = vec![
            KeyPressReport {
                turn: 3,
                alive: vec![Cell::new(4, 1)],
                state: ControlState::Paused,
            },
            KeyPressReport {
                turn: 4,
                alive: vec![Cell::new(5, 6)],
                state: ControlState::Paused,
            },
        ];

        let aligned = assert_ok!(align_key_presses(&nodes, replies).await);
        let merged = session::merge_key_presses(aligned).unwrap();
        assert_eq!(merged.turn, 3);
        assert_eq!(merged.alive, vec![Cell::new(4, 1), Cell::new(4, 6)]);
        assert_eq!(merged.state, ControlState::Paused);
    }
}
