//! The distributor owns a node's workers for one session.
//!
//! It is a single task looping over a `select!` of worker events, commands
//! from the node, completed neighbour fetches and the tick timer. All of the
//! session's mutable state (turn, snapshot, control state, the boundary row
//! board) lives in this task.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use strata_grid::{split_rows, Cell, Grid};
use strata_protocol::{
    ControlState, Edge, FetchRequest, Key, KeyPressReport, NodeAssignment, NodeClient,
    RemoteError, ReportStatus, TickReport,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::events::GameEvent;
use crate::worker::{Control, Halo, Side, Worker, WorkerChannels, WorkerEvent};

const COMMAND_CAPACITY: usize = 64;

/// Completed turns kept behind the latest one, so the broker can line up
/// nodes that are a few turns apart.
pub(crate) const SNAPSHOT_HISTORY: usize = 32;

pub(crate) type FetchReply = oneshot::Sender<Result<Vec<u8>>>;

/// Requests the node forwards to its running session.
pub(crate) enum Command {
    Report(Option<u64>, oneshot::Sender<Result<TickReport>>),
    KeyPress(Key, oneshot::Sender<KeyPressReport>),
    Fetch(FetchRequest, FetchReply),
    Kill(oneshot::Sender<()>),
}

/// The node's handle on a running distributor.
pub(crate) struct PoolHandle {
    session: String,
    epoch: u64,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl PoolHandle {
    pub(crate) fn session(&self) -> &str {
        &self.session
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    pub(crate) fn commands(&self) -> mpsc::Sender<Command> {
        self.commands.clone()
    }

    /// Kill the session and wait until every worker has exited.
    pub(crate) async fn shutdown(self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Kill(tx)).await.is_ok() {
            let _ = rx.await;
        }
        if let Err(e) = self.task.await {
            error!(session = %self.session, "Distributor task failed: {}", e);
        }
    }
}

/// Send a command and wait for its reply.
pub(crate) async fn request<T>(
    commands: &mpsc::Sender<Command>,
    make: impl FnOnce(oneshot::Sender<T>) -> Command,
) -> Result<T> {
    let (tx, rx) = oneshot::channel();
    commands
        .send(make(tx))
        .await
        .map_err(|_| Error::PoolStopped)?;
    rx.await.map_err(|_| Error::PoolStopped)
}

struct WorkerLink {
    halos: mpsc::UnboundedSender<Halo>,
    controls: mpsc::UnboundedSender<Control>,
    handle: JoinHandle<()>,
}

/// A halo row fetched from a neighbouring node.
struct RemoteHalo {
    worker: usize,
    side: Side,
    generation: u64,
    result: strata_protocol::Result<Vec<u8>>,
}

/// The two neighbouring nodes, each with its own connection.
struct Ring {
    lower: Arc<NodeClient>,
    upper: Arc<NodeClient>,
}

pub(crate) struct Distributor {
    session: String,
    epoch: u64,
    ring: Option<Ring>,
    workers: Vec<WorkerLink>,
    worker_events: mpsc::UnboundedReceiver<WorkerEvent>,
    commands: mpsc::Receiver<Command>,
    all_clear: watch::Sender<u64>,
    kill: watch::Sender<bool>,
    events: broadcast::Sender<GameEvent>,
    fetches: JoinSet<RemoteHalo>,
    tick: Duration,

    state: ControlState,
    turn: u64,
    snapshot: Vec<Cell>,
    /// Snapshots of the turns before `turn`, oldest first
    history: VecDeque<(u64, Vec<Cell>)>,
    status: ReportStatus,
    pending: Vec<Option<Vec<Cell>>>,
    finished: Vec<Option<Vec<Cell>>>,
    fetch_error: Option<RemoteError>,

    /// Boundary rows published for neighbours and not yet handed out
    board: HashMap<(Edge, u64), Vec<u8>>,
    /// Fetches waiting for a row that is not published yet
    parked: HashMap<(Edge, u64), Vec<FetchReply>>,
    /// Latest generation published per edge
    published: HashMap<Edge, u64>,
}

impl Distributor {
    /// Build the band, spawn its workers and the distributor loop.
    pub(crate) fn start(
        assignment: NodeAssignment,
        tick: Duration,
        events: broadcast::Sender<GameEvent>,
    ) -> Result<PoolHandle> {
        let grid = Grid::from_cells(assignment.width, assignment.height, &assignment.alive)?;
        let threads = assignment.threads.clamp(1, assignment.height);
        let bands = split_rows(assignment.height, threads)?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (all_clear, _) = watch::channel(0);
        let (kill, _) = watch::channel(false);

        let workers = bands
            .iter()
            .enumerate()
            .map(|(index, band)| {
                let (halo_tx, halo_rx) = mpsc::unbounded_channel();
                let (control_tx, control_rx) = mpsc::unbounded_channel();
                let worker = Worker::new(
                    index,
                    assignment.row_offset + band.start,
                    grid.band(*band),
                    assignment.turns,
                    WorkerChannels {
                        halos: halo_rx,
                        controls: control_rx,
                        all_clear: all_clear.subscribe(),
                        kill: kill.subscribe(),
                        events: event_tx.clone(),
                        flips: events.clone(),
                    },
                );
                WorkerLink {
                    halos: halo_tx,
                    controls: control_tx,
                    handle: tokio::spawn(worker.run()),
                }
            })
            .collect::<Vec<_>>();

        let ring = assignment.neighbours.map(|n| Ring {
            lower: Arc::new(NodeClient::lazy(n.lower)),
            upper: Arc::new(NodeClient::lazy(n.upper)),
        });

        info!(
            session = %assignment.session,
            epoch = assignment.epoch,
            rows = assignment.height,
            row_offset = assignment.row_offset,
            workers = workers.len(),
            turns = assignment.turns,
            ring = ring.is_some(),
            "Starting session"
        );

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let count = workers.len();
        let distributor = Distributor {
            session: assignment.session.clone(),
            epoch: assignment.epoch,
            ring,
            workers,
            worker_events: event_rx,
            commands: command_rx,
            all_clear,
            kill,
            events,
            fetches: JoinSet::new(),
            tick,
            state: ControlState::Executing,
            turn: 0,
            snapshot: grid.alive_cells(assignment.row_offset),
            history: VecDeque::with_capacity(SNAPSHOT_HISTORY),
            status: ReportStatus::Ticking,
            pending: vec![None; count],
            finished: vec![None; count],
            fetch_error: None,
            board: HashMap::new(),
            parked: HashMap::new(),
            published: HashMap::new(),
        };

        Ok(PoolHandle {
            session: assignment.session,
            epoch: assignment.epoch,
            commands: command_tx,
            task: tokio::spawn(distributor.run()),
        })
    }

    async fn run(mut self) {
        let mut ticker = interval_at(Instant::now() + self.tick, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(event) = self.worker_events.recv() => self.on_worker_event(event),
                Some(done) = self.fetches.join_next() => match done {
                    Ok(halo) => self.on_remote_halo(halo),
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => error!(session = %self.session, "Fetch task failed: {}", e),
                },
                command = self.commands.recv() => match command {
                    Some(Command::Report(turn, reply)) => {
                        let _ = reply.send(self.report(turn));
                    }
                    Some(Command::KeyPress(key, reply)) => {
                        let state = self.press(key);
                        let _ = reply.send(KeyPressReport {
                            turn: self.turn,
                            alive: self.snapshot.clone(),
                            state,
                        });
                    }
                    Some(Command::Fetch(request, reply)) => self.serve_fetch(request, reply),
                    Some(Command::Kill(ack)) => {
                        self.stop().await;
                        let _ = ack.send(());
                        return;
                    }
                    None => {
                        self.stop().await;
                        return;
                    }
                },
                _ = ticker.tick() => {
                    let _ = self.events.send(GameEvent::AliveCellsCount {
                        turn: self.turn,
                        count: self.snapshot.len(),
                    });
                    debug!(session = %self.session, turn = self.turn, alive = self.snapshot.len(), "Tick");
                }
            }
        }
    }

    fn on_worker_event(&mut self, event: WorkerEvent) {
        match event {
            WorkerEvent::Boundary {
                worker,
                generation,
                top,
                bottom,
            } => self.route(worker, generation, top, bottom),

            WorkerEvent::TurnComplete {
                worker,
                turn,
                alive,
            } => {
                debug_assert_eq!(turn, self.turn + 1, "worker {} ran ahead", worker);
                self.pending[worker] = Some(alive);
                if self.pending.iter().all(Option::is_some) {
                    let snapshot = self
                        .pending
                        .iter_mut()
                        .flat_map(|alive| alive.take().unwrap_or_default())
                        .collect();
                    self.advance(turn, snapshot);
                    let _ = self.all_clear.send(turn);
                    let _ = self.events.send(GameEvent::TurnComplete { turn });
                    debug!(session = %self.session, turn, alive = self.snapshot.len(), "Turn complete");
                }
            }

            WorkerEvent::Finished {
                worker,
                turn,
                alive,
            } => {
                self.finished[worker] = Some(alive);
                if self.finished.iter().all(Option::is_some) {
                    let snapshot = self
                        .finished
                        .iter_mut()
                        .flat_map(|alive| alive.take().unwrap_or_default())
                        .collect();
                    self.advance(turn, snapshot);
                    self.status = ReportStatus::Finished;
                    let _ = self.events.send(GameEvent::FinalTurnComplete {
                        turn,
                        alive: self.snapshot.clone(),
                    });
                    info!(session = %self.session, turn, alive = self.snapshot.len(), "Session finished");
                }
            }
        }
    }

    /// Make `snapshot` the latest completed turn, keeping the one it
    /// replaces in the history.
    fn advance(&mut self, turn: u64, snapshot: Vec<Cell>) {
        let previous = std::mem::replace(&mut self.snapshot, snapshot);
        if turn != self.turn {
            if self.history.len() == SNAPSHOT_HISTORY {
                self.history.pop_front();
            }
            self.history.push_back((self.turn, previous));
            self.turn = turn;
        }
    }

    /// Hand worker `i`'s top row to worker `i-1` and its bottom row to
    /// worker `i+1`. Rows crossing the node's edge go to the board for the
    /// neighbours, and the missing halos are fetched from them.
    fn route(&mut self, worker: usize, generation: u64, top: Vec<u8>, bottom: Vec<u8>) {
        let last = self.workers.len() - 1;

        if worker > 0 {
            self.deliver(worker - 1, Side::Below, generation, top);
        } else if self.ring.is_none() {
            self.deliver(last, Side::Below, generation, top);
        } else {
            self.publish(Edge::Top, generation, top);
            self.fetch_remote(worker, Side::Above, generation);
        }

        if worker < last {
            self.deliver(worker + 1, Side::Above, generation, bottom);
        } else if self.ring.is_none() {
            self.deliver(0, Side::Above, generation, bottom);
        } else {
            self.publish(Edge::Bottom, generation, bottom);
            self.fetch_remote(worker, Side::Below, generation);
        }
    }

    fn deliver(&self, worker: usize, side: Side, generation: u64, row: Vec<u8>) {
        // A closed channel means the worker was killed
        let _ = self.workers[worker].halos.send(Halo {
            side,
            generation,
            row,
        });
    }

    fn publish(&mut self, edge: Edge, generation: u64, row: Vec<u8>) {
        self.published.insert(edge, generation);
        match self.parked.remove(&(edge, generation)) {
            Some(waiters) => {
                for waiter in waiters {
                    let _ = waiter.send(Ok(row.clone()));
                }
            }
            None => {
                self.board.insert((edge, generation), row);
            }
        }
    }

    /// The row above comes from the lower neighbour's bottom edge, the row
    /// below from the upper neighbour's top edge.
    fn fetch_remote(&mut self, worker: usize, side: Side, generation: u64) {
        let Some(ring) = &self.ring else {
            return;
        };
        let (client, edge) = match side {
            Side::Above => (Arc::clone(&ring.lower), Edge::Bottom),
            Side::Below => (Arc::clone(&ring.upper), Edge::Top),
        };
        let epoch = self.epoch;

        self.fetches.spawn(async move {
            let result = client.fetch(edge, generation, epoch).await;
            RemoteHalo {
                worker,
                side,
                generation,
                result,
            }
        });
    }

    fn on_remote_halo(&mut self, halo: RemoteHalo) {
        match halo.result {
            Ok(row) => self.deliver(halo.worker, halo.side, halo.generation, row),
            Err(e) => {
                error!(
                    session = %self.session,
                    generation = halo.generation,
                    "Neighbour fetch failed: {}",
                    e
                );
                self.fetch_error = Some(e.into());
            }
        }
    }

    /// The latest completed turn, or an earlier one still in the history.
    fn report(&self, at: Option<u64>) -> Result<TickReport> {
        if let Some(e) = &self.fetch_error {
            return Err(Error::NeighbourFetch(e.clone()));
        }

        let (turn, alive, status) = match at {
            None => (self.turn, &self.snapshot, self.status),
            Some(turn) if turn == self.turn => (turn, &self.snapshot, self.status),
            Some(turn) => match self.history.iter().find(|(t, _)| *t == turn) {
                Some((_, alive)) => (turn, alive, ReportStatus::Ticking),
                None => {
                    return Err(Error::TurnUnavailable {
                        requested: turn,
                        latest: self.turn,
                    })
                }
            },
        };
        Ok(TickReport {
            turn,
            alive: alive.clone(),
            cell_count: alive.len(),
            status,
        })
    }

    /// Apply a key and return the state to answer with.
    fn press(&mut self, key: Key) -> ControlState {
        let (state, control) = match key {
            Key::Pause if self.state == ControlState::Paused => {
                (ControlState::Executing, Some(Control::Resume))
            }
            Key::Pause => (ControlState::Paused, Some(Control::Pause)),
            Key::Snapshot => return ControlState::Saving,
            Key::Quit | Key::Kill => (ControlState::Quitting, Some(Control::Quit)),
            Key::Resume => (ControlState::Executing, Some(Control::Resume)),
        };

        if let Some(control) = control {
            for worker in &self.workers {
                let _ = worker.controls.send(control);
            }
        }
        if state != self.state {
            info!(session = %self.session, turn = self.turn, "{} -> {}", self.state, state);
            self.state = state;
            let _ = self.events.send(GameEvent::StateChange {
                turn: self.turn,
                state,
            });
        }
        state
    }

    fn serve_fetch(&mut self, request: FetchRequest, reply: FetchReply) {
        if request.epoch != self.epoch {
            warn!(
                session = %self.session,
                requested = request.epoch,
                current = self.epoch,
                "Fetch for another epoch"
            );
            let _ = reply.send(Err(Error::StaleEpoch {
                requested: request.epoch,
                current: self.epoch,
            }));
            return;
        }

        let key = (request.edge, request.generation);
        if let Some(row) = self.board.remove(&key) {
            let _ = reply.send(Ok(row));
        } else if self
            .published
            .get(&request.edge)
            .is_some_and(|&latest| request.generation <= latest)
        {
            let _ = reply.send(Err(Error::RowGone {
                edge: request.edge,
                generation: request.generation,
            }));
        } else {
            debug!(session = %self.session, edge = ?request.edge, generation = request.generation, "Parking fetch");
            self.parked.entry(key).or_default().push(reply);
        }
    }

    /// Interrupt every wait and join all workers.
    async fn stop(&mut self) {
        let _ = self.kill.send(true);
        self.fetches.abort_all();
        self.parked.clear();
        self.worker_events.close();

        let handles = self.workers.drain(..).map(|w| w.handle);
        for result in join_all(handles).await {
            if let Err(e) = result {
                error!(session = %self.session, "Worker failed: {}", e);
            }
        }
        info!(session = %self.session, turn = self.turn, "Session stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio_test::{assert_err, assert_ok};
    use tokio::time::{sleep, timeout};

    fn assignment(width: usize, height: usize, turns: u64, threads: usize, alive: Vec<Cell>) -> NodeAssignment {
        NodeAssignment {
            session: "test".into(),
            epoch: 1,
            width,
            height,
            row_offset: 0,
            turns,
            threads,
            alive,
            continue_existing: false,
            neighbours: None,
        }
    }

    fn glider() -> Vec<Cell> {
        vec![
            Cell::new(1, 0),
            Cell::new(2, 1),
            Cell::new(0, 2),
            Cell::new(1, 2),
            Cell::new(2, 2),
        ]
    }

    async fn wait_finished(commands: &mpsc::Sender<Command>) -> TickReport {
        timeout(Duration::from_secs(10), async {
            loop {
                let report = request(commands, |tx| Command::Report(None, tx)).await.unwrap().unwrap();
                if report.status == ReportStatus::Finished {
                    return report;
                }
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("session did not finish")
    }

    #[tokio::test]
    async fn glider_moves_diagonally_with_any_worker_count() {
        let expected: Vec<Cell> = glider().into_iter().map(|c| Cell::new(c.x + 1, c.y + 1)).collect();
        let mut expected = expected;
        expected.sort();

        for threads in 1..=8 {
            let (events, _) = broadcast::channel(64);
            let pool = Distributor::start(
                assignment(16, 16, 4, threads, glider()),
                Duration::from_secs(60),
                events,
            )
            .unwrap();

            let report = wait_finished(&pool.commands()).await;
            assert_eq!(report.turn, 4, "threads = {}", threads);
            assert_eq!(report.cell_count, 5);
            assert_eq!(report.alive, expected, "threads = {}", threads);
            pool.shutdown().await;
        }
    }

    #[tokio::test]
    async fn report_before_any_turn_returns_the_input() {
        let (events, _) = broadcast::channel(64);
        let pool = Distributor::start(assignment(8, 8, 0, 2, glider()), Duration::from_secs(60), events).unwrap();

        let report = wait_finished(&pool.commands()).await;
        assert_eq!(report.turn, 0);
        let mut input = glider();
        input.sort();
        assert_eq!(report.alive, input);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn earlier_turns_are_reported_from_history() {
        let horizontal = vec![Cell::new(1, 1), Cell::new(2, 1), Cell::new(3, 1)];
        let vertical = vec![Cell::new(2, 0), Cell::new(2, 1), Cell::new(2, 2)];
        let (events, _) = broadcast::channel(64);
        let pool = Distributor::start(
            assignment(8, 8, 6, 2, horizontal.clone()),
            Duration::from_secs(60),
            events,
        )
        .unwrap();
        let commands = pool.commands();
        wait_finished(&commands).await;

        for turn in 0..6 {
            let report = assert_ok!(request(&commands, |tx| Command::Report(Some(turn), tx)).await.unwrap());
            assert_eq!(report.turn, turn);
            assert_eq!(report.status, ReportStatus::Ticking);
            let expected = if turn % 2 == 0 { &horizontal } else { &vertical };
            assert_eq!(&report.alive, expected, "turn = {}", turn);
        }

        let last = assert_ok!(request(&commands, |tx| Command::Report(Some(6), tx)).await.unwrap());
        assert_eq!(last.status, ReportStatus::Finished);

        let ahead = assert_err!(request(&commands, |tx| Command::Report(Some(7), tx)).await.unwrap());
        assert!(matches!(ahead, Error::TurnUnavailable { requested: 7, latest: 6 }));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let turns = SNAPSHOT_HISTORY as u64 + 4;
        let (events, _) = broadcast::channel(64);
        let pool = Distributor::start(
            assignment(8, 8, turns, 1, glider()),
            Duration::from_secs(60),
            events,
        )
        .unwrap();
        let commands = pool.commands();
        wait_finished(&commands).await;

        let oldest = turns - SNAPSHOT_HISTORY as u64;
        assert_ok!(request(&commands, |tx| Command::Report(Some(oldest), tx)).await.unwrap());
        let gone = assert_err!(request(&commands, |tx| Command::Report(Some(oldest - 1), tx)).await.unwrap());
        assert_eq!(gone.kind(), strata_protocol::ErrorKind::Sequencing);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn keys_drive_the_control_state() {
        let (events, mut rx) = broadcast::channel(1024);
        let pool = Distributor::start(
            assignment(16, 16, 1_000_000, 4, glider()),
            Duration::from_secs(60),
            events,
        )
        .unwrap();
        let commands = pool.commands();

        let paused = request(&commands, |tx| Command::KeyPress(Key::Pause, tx)).await.unwrap();
        assert_eq!(paused.state, ControlState::Paused);
        assert_eq!(paused.alive.len(), 5);

        // Once paused, reports stop moving
        sleep(Duration::from_millis(50)).await;
        let first = request(&commands, |tx| Command::Report(None, tx)).await.unwrap().unwrap();
        sleep(Duration::from_millis(50)).await;
        let second = request(&commands, |tx| Command::Report(None, tx)).await.unwrap().unwrap();
        assert_eq!(first, second);

        let saving = request(&commands, |tx| Command::KeyPress(Key::Snapshot, tx)).await.unwrap();
        assert_eq!(saving.state, ControlState::Saving);
        assert_eq!(saving.turn, second.turn);

        let resumed = request(&commands, |tx| Command::KeyPress(Key::Pause, tx)).await.unwrap();
        assert_eq!(resumed.state, ControlState::Executing);

        let quitting = request(&commands, |tx| Command::KeyPress(Key::Quit, tx)).await.unwrap();
        assert_eq!(quitting.state, ControlState::Quitting);

        let executing = request(&commands, |tx| Command::KeyPress(Key::Resume, tx)).await.unwrap();
        assert_eq!(executing.state, ControlState::Executing);

        let mut changes = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(GameEvent::StateChange { state, .. }) => changes.push(state),
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        assert_eq!(
            changes,
            vec![
                ControlState::Paused,
                ControlState::Executing,
                ControlState::Quitting,
                ControlState::Executing,
            ]
        );

        timeout(Duration::from_secs(5), pool.shutdown()).await.expect("kill did not return");
    }

    #[tokio::test]
    async fn edge_rows_wait_for_their_generation() {
        // A two-node ring whose neighbours never answer: the edge rows of
        // generation 0 are still published for them.
        let mut assignment = assignment(4, 4, 3, 2, vec![Cell::new(0, 0), Cell::new(1, 3)]);
        assignment.neighbours = Some(strata_protocol::Neighbours {
            lower: "127.0.0.1:1".into(),
            upper: "127.0.0.1:1".into(),
        });
        let (events, _) = broadcast::channel(64);
        let pool = Distributor::start(assignment, Duration::from_secs(60), events).unwrap();
        let commands = pool.commands();

        let fetch = |edge, generation| {
            let commands = commands.clone();
            async move {
                request(&commands, |tx| {
                    Command::Fetch(FetchRequest { edge, generation, epoch: 1 }, tx)
                })
                .await
                .and_then(|row| row)
            }
        };

        let top = fetch(Edge::Top, 0).await.unwrap();
        assert_eq!(top, vec![255, 0, 0, 0]);
        let bottom = fetch(Edge::Bottom, 0).await.unwrap();
        assert_eq!(bottom, vec![0, 255, 0, 0]);

        // Handed out once
        assert!(matches!(fetch(Edge::Top, 0).await, Err(Error::RowGone { .. })));

        // Another epoch is refused
        let stale = request(&commands, |tx| {
            Command::Fetch(FetchRequest { edge: Edge::Top, generation: 0, epoch: 0 }, tx)
        })
        .await
        .unwrap();
        assert!(matches!(stale, Err(Error::StaleEpoch { requested: 0, current: 1 })));

        // Generation 1 never comes: the fetch parks until the session dies
        let parked = tokio::spawn(fetch(Edge::Top, 1));
        sleep(Duration::from_millis(50)).await;
        assert!(!parked.is_finished());

        pool.shutdown().await;
        // The parked reply is dropped, which the caller sees as a stopped pool
        assert!(matches!(parked.await.unwrap(), Err(Error::PoolStopped)));
    }
}
