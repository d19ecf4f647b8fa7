//! A worker owns one row band and advances it one generation per cycle.
//!
//! Each cycle:
//! 1. apply pending controls, parking while paused
//! 2. publish copies of its top and bottom rows
//! 3. wait for the halo rows above and below, tagged with this generation
//! 4. compute the next generation and report its live cells
//! 5. wait for the all-clear of the turn it just finished
//!
//! Every wait is raced against the kill flag.

use strata_grid::{step, Cell, Grid};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::debug;

use crate::events::GameEvent;

/// Which halo a row fills in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Above,
    Below,
}

/// A neighbour's boundary row, owned by the receiving worker.
#[derive(Debug)]
pub(crate) struct Halo {
    pub side: Side,
    pub generation: u64,
    pub row: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    Pause,
    Resume,
    /// Soft stop, handled like a pause
    Quit,
}

impl Control {
    fn pauses(self) -> bool {
        !matches!(self, Control::Resume)
    }
}

/// What a worker tells its distributor.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    Boundary {
        worker: usize,
        generation: u64,
        top: Vec<u8>,
        bottom: Vec<u8>,
    },
    TurnComplete {
        worker: usize,
        turn: u64,
        alive: Vec<Cell>,
    },
    Finished {
        worker: usize,
        turn: u64,
        alive: Vec<Cell>,
    },
}

/// The channels a worker is driven through.
pub(crate) struct WorkerChannels {
    pub halos: mpsc::UnboundedReceiver<Halo>,
    pub controls: mpsc::UnboundedReceiver<Control>,
    pub all_clear: watch::Receiver<u64>,
    pub kill: watch::Receiver<bool>,
    pub events: mpsc::UnboundedSender<WorkerEvent>,
    pub flips: broadcast::Sender<GameEvent>,
}

pub(crate) struct Worker {
    index: usize,
    /// Global row of the band's first row
    row_offset: usize,
    turn: u64,
    turns: u64,
    paused: bool,
    current: Grid,
    next: Grid,
    halos: mpsc::UnboundedReceiver<Halo>,
    controls: mpsc::UnboundedReceiver<Control>,
    all_clear: watch::Receiver<u64>,
    kill: watch::Receiver<bool>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    flips: broadcast::Sender<GameEvent>,
}

impl Worker {
    pub(crate) fn new(
        index: usize,
        row_offset: usize,
        band: Grid,
        turns: u64,
        channels: WorkerChannels,
    ) -> Self {
        let next = Grid::new(band.width(), band.height());
        Self {
            index,
            row_offset,
            turn: 0,
            turns,
            paused: false,
            current: band,
            next,
            halos: channels.halos,
            controls: channels.controls,
            all_clear: channels.all_clear,
            kill: channels.kill,
            events: channels.events,
            flips: channels.flips,
        }
    }

    pub(crate) async fn run(mut self) {
        while self.turn < self.turns {
            if !self.wait_until_running().await {
                debug!(worker = self.index, turn = self.turn, "Worker killed while paused");
                return;
            }

            let generation = self.turn;
            let boundary = WorkerEvent::Boundary {
                worker: self.index,
                generation,
                top: self.current.row(0).to_vec(),
                bottom: self.current.row(self.current.height() - 1).to_vec(),
            };
            if self.events.send(boundary).is_err() {
                return;
            }

            let Some((above, below)) = self.collect_halos(generation).await else {
                debug!(worker = self.index, generation, "Worker killed waiting for halos");
                return;
            };

            step(&self.current, &above, &below, &mut self.next);
            self.turn += 1;

            if self.flips.receiver_count() > 0 {
                for cell in self.current.flips(&self.next, self.row_offset) {
                    let _ = self.flips.send(GameEvent::CellFlipped {
                        turn: self.turn,
                        cell,
                    });
                }
            }
            std::mem::swap(&mut self.current, &mut self.next);

            let complete = WorkerEvent::TurnComplete {
                worker: self.index,
                turn: self.turn,
                alive: self.current.alive_cells(self.row_offset),
            };
            if self.events.send(complete).is_err() {
                return;
            }

            let turn = self.turn;
            tokio::select! {
                biased;
                _ = killed(&mut self.kill) => {
                    debug!(worker = self.index, turn, "Worker killed at the barrier");
                    return;
                }
                cleared = cleared(&mut self.all_clear, turn) => {
                    if !cleared {
                        return;
                    }
                }
            }
        }

        let _ = self.events.send(WorkerEvent::Finished {
            worker: self.index,
            turn: self.turn,
            alive: self.current.alive_cells(self.row_offset),
        });
    }

    /// Apply queued controls and park while paused. False once killed.
    async fn wait_until_running(&mut self) -> bool {
        loop {
            if *self.kill.borrow() {
                return false;
            }
            while let Ok(control) = self.controls.try_recv() {
                self.paused = control.pauses();
            }
            if !self.paused {
                return true;
            }

            tokio::select! {
                biased;
                _ = killed(&mut self.kill) => return false,
                control = self.controls.recv() => match control {
                    Some(control) => self.paused = control.pauses(),
                    None => return false,
                },
            }
        }
    }

    /// Wait for both halo rows of `generation`. None once killed.
    async fn collect_halos(&mut self, generation: u64) -> Option<(Vec<u8>, Vec<u8>)> {
        let mut above = None;
        let mut below = None;

        while above.is_none() || below.is_none() {
            let halo = tokio::select! {
                biased;
                _ = killed(&mut self.kill) => return None,
                halo = self.halos.recv() => halo?,
            };

            assert_eq!(
                halo.generation, generation,
                "worker {} received a halo row from the wrong generation",
                self.index
            );
            match halo.side {
                Side::Above => above = Some(halo.row),
                Side::Below => below = Some(halo.row),
            }
        }

        Some((above?, below?))
    }
}

async fn killed(kill: &mut watch::Receiver<bool>) {
    let _ = kill.wait_for(|killed| *killed).await;
}

async fn cleared(all_clear: &mut watch::Receiver<u64>, turn: u64) -> bool {
    all_clear.wait_for(|cleared| *cleared >= turn).await.is_ok()
}
