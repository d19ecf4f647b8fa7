//! Registry of subscribed nodes.

use tracing::info;

use crate::dispatch::Dispatcher;

struct NodeEntry {
    dispatcher: Dispatcher,
    busy: bool,
}

/// Subscribed nodes in subscription order, with their busy flags.
#[derive(Default)]
pub struct Pool {
    nodes: Vec<NodeEntry>,
}

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. A node subscribing again under the same address (after a
    /// restart) replaces its old entry and comes back free.
    pub fn subscribe(&mut self, dispatcher: Dispatcher) {
        let entry = NodeEntry {
            dispatcher,
            busy: false,
        };
        match self
            .nodes
            .iter_mut()
            .find(|e| e.dispatcher.addr() == entry.dispatcher.addr())
        {
            Some(existing) => {
                info!(node = %entry.dispatcher.addr(), "Node subscribed again");
                *existing = entry;
            }
            None => {
                info!(node = %entry.dispatcher.addr(), nodes = self.nodes.len() + 1, "Node subscribed");
                self.nodes.push(entry);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Free nodes whose dispatch loop is still running.
    pub fn free(&self) -> usize {
        self.nodes.iter().filter(|e| Self::available(e)).count()
    }

    /// Mark up to `count` free nodes busy, in subscription order.
    pub fn allocate(&mut self, count: usize) -> Vec<String> {
        self.nodes
            .iter_mut()
            .filter(|e| Self::available(e))
            .take(count)
            .map(|e| {
                e.busy = true;
                e.dispatcher.addr().to_string()
            })
            .collect()
    }

    pub fn release(&mut self, addrs: &[String]) {
        for entry in &mut self.nodes {
            if addrs.iter().any(|a| a == entry.dispatcher.addr()) {
                entry.busy = false;
            }
        }
    }

    pub fn dispatcher(&self, addr: &str) -> Option<Dispatcher> {
        self.nodes
            .iter()
            .find(|e| e.dispatcher.addr() == addr)
            .map(|e| e.dispatcher.clone())
    }

    fn available(entry: &NodeEntry) -> bool {
        !entry.busy && !entry.dispatcher.is_closed()
    }
}
