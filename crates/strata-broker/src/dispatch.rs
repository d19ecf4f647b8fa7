//! One dispatch loop per subscribed node.
//!
//! The loop owns the only connection the broker has to its node and runs
//! jobs one after another. A transport failure ends the loop; every later
//! job for that node fails with [`Error::NodeUnavailable`].

use strata_protocol::{KeyPressReport, NodeAssignment, NodeClient, RemoteError, TickReport};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::error::{Error, Result};

const JOB_CAPACITY: usize = 32;

type Reply<T> = oneshot::Sender<strata_protocol::Result<T>>;

pub(crate) enum Job {
    Initialise(NodeAssignment, Reply<()>),
    Report(Option<u64>, Reply<TickReport>),
    KeyPress(strata_protocol::Key, Reply<KeyPressReport>),
    Kill(bool, Reply<()>),
}

/// Handle for queueing jobs on a node's dispatch loop.
#[derive(Clone)]
pub struct Dispatcher {
    addr: String,
    jobs: mpsc::Sender<Job>,
}

impl Dispatcher {
    /// Dial the node and start its loop.
    pub async fn connect(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        let client = NodeClient::connect(addr.as_str()).await?;
        let (jobs, rx) = mpsc::channel(JOB_CAPACITY);
        tokio::spawn(run(client, rx));
        Ok(Self { addr, jobs })
    }

    /// A dispatcher with no node behind it, for exercising the pool.
    #[cfg(test)]
    pub(crate) fn detached(addr: &str) -> (Self, mpsc::Receiver<Job>) {
        let (jobs, rx) = mpsc::channel(JOB_CAPACITY);
        (
            Self {
                addr: addr.to_string(),
                jobs,
            },
            rx,
        )
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// True once the loop has ended.
    pub fn is_closed(&self) -> bool {
        self.jobs.is_closed()
    }

    pub async fn initialise(&self, assignment: NodeAssignment) -> Result<()> {
        self.call(|tx| Job::Initialise(assignment, tx)).await
    }

    pub async fn report(&self, turn: Option<u64>) -> Result<TickReport> {
        self.call(|tx| Job::Report(turn, tx)).await
    }

    pub async fn key_press(&self, key: strata_protocol::Key) -> Result<KeyPressReport> {
        self.call(|tx| Job::KeyPress(key, tx)).await
    }

    pub async fn kill(&self, shutdown: bool) -> Result<()> {
        self.call(|tx| Job::Kill(shutdown, tx)).await
    }

    /// Queue a kill behind the jobs already waiting, without waiting for it to run.
    pub async fn kill_later(&self, shutdown: bool) {
        let (tx, rx) = oneshot::channel();
        if self.jobs.send(Job::Kill(shutdown, tx)).await.is_err() {
            return;
        }
        let addr = self.addr.clone();
        tokio::spawn(async move {
            if let Ok(Err(e)) = rx.await {
                error!(node = %addr, "Kill failed: {}", e);
            }
        });
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Job) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.jobs
            .send(make(tx))
            .await
            .map_err(|_| Error::NodeUnavailable(self.addr.clone()))?;
        let outcome = rx
            .await
            .map_err(|_| Error::NodeUnavailable(self.addr.clone()))?;
        outcome.map_err(|e| Error::Node {
            node: self.addr.clone(),
            source: RemoteError::from(e),
        })
    }
}

async fn run(client: NodeClient, mut jobs: mpsc::Receiver<Job>) {
    debug!(node = %client.addr(), "Dispatch loop started");

    while let Some(job) = jobs.recv().await {
        let lost = match job {
            Job::Initialise(assignment, reply) => finish(reply, client.initialise(assignment).await),
            Job::Report(turn, reply) => finish(reply, client.report(turn).await),
            Job::KeyPress(key, reply) => finish(reply, client.key_press(key).await),
            Job::Kill(shutdown, reply) => finish(reply, client.kill(shutdown).await),
        };

        if let Some(reason) = lost {
            error!(node = %client.addr(), "Lost node, stopping its dispatch loop: {}", reason);
            return;
        }
    }
}

/// Pass the outcome on. Returns the reason if the connection is lost.
fn finish<T>(reply: Reply<T>, outcome: strata_protocol::Result<T>) -> Option<String> {
    let lost = match &outcome {
        Err(strata_protocol::Error::Remote(_)) | Ok(_) => None,
        Err(e) => Some(e.to_string()),
    };
    let _ = reply.send(outcome);
    lost
}
