//! Per-runtime transaction state.

use std::collections::VecDeque;
use std::mem;

use indexmap::IndexSet;

use crate::NodeId;

pub(crate) type NodeSet = IndexSet<NodeId, ahash::RandomState>;

/// A mutation scheduled to run after the current commit phase.
pub(crate) type DeferredMutation = Box<dyn FnOnce()>;

/// Phase of the transaction state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// No transaction is open.
    Idle,
    /// A `mutate` block is running; writes are recorded and invalidation is pushed.
    Writing,
    /// Dirty nodes are being recomputed and observers notified; writes are rejected.
    Committing,
}

pub(crate) struct Transaction {
    pub phase: Phase,
    /// Nesting depth of `mutate` calls in the current batch.
    pub depth: usize,
    /// Batch id, incremented every time a batch opens. Never reset.
    pub batch: u64,
    /// Source nodes written in the current batch, in write order.
    pub changed_roots: NodeSet,
    /// Dependents that asked to be pulled during the commit phase.
    pub leaves: NodeSet,
    pub deferred: VecDeque<DeferredMutation>,
}

impl Default for Transaction {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            depth: 0,
            batch: 0,
            changed_roots: NodeSet::default(),
            leaves: NodeSet::default(),
            deferred: VecDeque::new(),
        }
    }
}

impl Transaction {
    /// Open a new batch and return its id. Called from idle, or after a commit phase to
    /// run a deferred mutation.
    pub fn open(&mut self) -> u64 {
        self.phase = Phase::Writing;
        self.depth = 1;
        self.batch += 1;
        self.changed_roots.clear();
        self.leaves.clear();
        self.batch
    }

    /// Switch to the commit phase, handing out the roots and leaves recorded so far.
    pub fn begin_commit(&mut self) -> (NodeSet, NodeSet) {
        self.phase = Phase::Committing;
        (
            mem::take(&mut self.changed_roots),
            mem::take(&mut self.leaves),
        )
    }

    /// Returns true if `node` was not written before in this batch.
    pub fn record_write(&mut self, node: NodeId) -> bool {
        self.changed_roots.insert(node)
    }

    /// Returns true if `node` was not scheduled before in this batch.
    pub fn schedule(&mut self, node: NodeId) -> bool {
        self.leaves.insert(node)
    }

    /// Queue a deferred mutation and return the number of pending ones.
    pub fn enqueue(&mut self, mutation: DeferredMutation) -> usize {
        self.deferred.push_back(mutation);
        self.deferred.len()
    }

    pub fn next_deferred(&mut self) -> Option<DeferredMutation> {
        self.deferred.pop_front()
    }

    /// Close the transaction. The batch counter keeps counting.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.depth = 0;
        self.changed_roots.clear();
        self.leaves.clear();
        self.deferred.clear();
    }
}
