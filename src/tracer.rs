//! Tracer trait for observing the propagation engine.
//!
//! This module defines the [`Tracer`] trait and related types for observing
//! transactions, invalidation and recomputation. The default [`NoopTracer`]
//! has zero cost when tracing is not needed.
//!
//! # Example
//!
//! ```
//! use cell_flow::{NodeId, Revision, Runtime, Tracer};
//!
//! struct PrintTracer;
//!
//! impl Tracer for PrintTracer {
//!     fn on_write(&self, node: NodeId, revision: Revision) {
//!         println!("{node} written at {revision:?}");
//!     }
//! }
//!
//! let runtime = Runtime::builder().tracer(PrintTracer).build();
//! let cell = runtime.mutable_cell(1);
//! cell.set(2);
//! ```

use std::rc::Rc;

use crate::{NodeId, Revision};

/// Outcome of bringing a derived cell up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RecomputeResult {
    /// The cell computed a new value and cached it.
    Changed,
    /// The cell recomputed but the value is equal to the cached one (early cutoff).
    Unchanged,
    /// The cell computed a value without caching it, because it is unobserved or the
    /// write phase is still running.
    Uncached,
}

/// Tracer trait for observing cell-flow execution.
///
/// All methods have default empty implementations, so you only need to override
/// the events you're interested in.
pub trait Tracer: 'static {
    /// Called when the outermost `mutate` opens a transaction, or a deferred
    /// mutation starts a new batch.
    #[inline]
    fn on_transaction_start(&self, _batch: u64) {}

    /// Called when a source cell records a write.
    #[inline]
    fn on_write(&self, _node: NodeId, _revision: Revision) {}

    /// Called when a derived node is marked dirty for the first time in a batch.
    #[inline]
    fn on_invalidated(&self, _node: NodeId, _dependency: NodeId) {}

    /// Called after a derived cell evaluated its compute function.
    #[inline]
    fn on_recompute(&self, _node: NodeId, _kind: &'static str, _result: RecomputeResult) {}

    /// Called when a flattening cell switches to a different inner cell.
    #[inline]
    fn on_redirect(&self, _node: NodeId, _transitive: Option<NodeId>) {}

    /// Called when the commit phase starts.
    #[inline]
    fn on_commit(&self, _batch: u64, _changed_roots: usize, _leaves: usize) {}

    /// Called right before an observer callback runs.
    #[inline]
    fn on_observer_notified(&self, _observer: NodeId, _cell: Option<NodeId>) {}

    /// Called when an observer panicked during the commit phase.
    #[inline]
    fn on_observer_panicked(&self, _observer: NodeId, _message: &str) {}

    /// Called when a deferred mutation is queued.
    #[inline]
    fn on_deferred_enqueued(&self, _pending: usize) {}

    /// Called when the transaction is closed and all deferred mutations are drained.
    #[inline]
    fn on_transaction_end(&self, _batch: u64) {}
}

/// Zero-cost tracer that discards all events.
///
/// This is the default tracer for [`Runtime`](crate::Runtime).
pub struct NoopTracer;

impl Tracer for NoopTracer {}

impl<T: Tracer + ?Sized> Tracer for Rc<T> {
    fn on_transaction_start(&self, batch: u64) {
        (**self).on_transaction_start(batch)
    }

    fn on_write(&self, node: NodeId, revision: Revision) {
        (**self).on_write(node, revision)
    }

    fn on_invalidated(&self, node: NodeId, dependency: NodeId) {
        (**self).on_invalidated(node, dependency)
    }

    fn on_recompute(&self, node: NodeId, kind: &'static str, result: RecomputeResult) {
        (**self).on_recompute(node, kind, result)
    }

    fn on_redirect(&self, node: NodeId, transitive: Option<NodeId>) {
        (**self).on_redirect(node, transitive)
    }

    fn on_commit(&self, batch: u64, changed_roots: usize, leaves: usize) {
        (**self).on_commit(batch, changed_roots, leaves)
    }

    fn on_observer_notified(&self, observer: NodeId, cell: Option<NodeId>) {
        (**self).on_observer_notified(observer, cell)
    }

    fn on_observer_panicked(&self, observer: NodeId, message: &str) {
        (**self).on_observer_panicked(observer, message)
    }

    fn on_deferred_enqueued(&self, pending: usize) {
        (**self).on_deferred_enqueued(pending)
    }

    fn on_transaction_end(&self, batch: u64) {
        (**self).on_transaction_end(batch)
    }
}

/// Tracer that forwards every event to the `tracing` crate.
///
/// Engine internals are emitted at `trace` level, transaction boundaries at `debug`
/// and observer panics at `warn`.
#[cfg(feature = "tracing")]
pub struct TracingTracer;

#[cfg(feature = "tracing")]
impl Tracer for TracingTracer {
    fn on_transaction_start(&self, batch: u64) {
        tracing::debug!(batch, "transaction started");
    }

    fn on_write(&self, node: NodeId, revision: Revision) {
        tracing::trace!(%node, revision = revision.0, "write recorded");
    }

    fn on_invalidated(&self, node: NodeId, dependency: NodeId) {
        tracing::trace!(%node, %dependency, "node invalidated");
    }

    fn on_recompute(&self, node: NodeId, kind: &'static str, result: RecomputeResult) {
        tracing::trace!(%node, kind, ?result, "node recomputed");
    }

    fn on_redirect(&self, node: NodeId, transitive: Option<NodeId>) {
        tracing::trace!(%node, ?transitive, "flattening cell redirected");
    }

    fn on_commit(&self, batch: u64, changed_roots: usize, leaves: usize) {
        tracing::debug!(batch, changed_roots, leaves, "commit phase started");
    }

    fn on_observer_notified(&self, observer: NodeId, cell: Option<NodeId>) {
        tracing::trace!(%observer, ?cell, "observer notified");
    }

    fn on_observer_panicked(&self, observer: NodeId, message: &str) {
        tracing::warn!(%observer, panic = message, "observer panicked during commit");
    }

    fn on_deferred_enqueued(&self, pending: usize) {
        tracing::trace!(pending, "deferred mutation enqueued");
    }

    fn on_transaction_end(&self, batch: u64) {
        tracing::debug!(batch, "transaction finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell as StdCell;

    struct CountingTracer {
        writes: StdCell<usize>,
        commits: StdCell<usize>,
    }

    impl CountingTracer {
        fn new() -> Self {
            Self {
                writes: StdCell::new(0),
                commits: StdCell::new(0),
            }
        }
    }

    impl Tracer for CountingTracer {
        fn on_write(&self, _node: NodeId, _revision: Revision) {
            self.writes.set(self.writes.get() + 1);
        }

        fn on_commit(&self, _batch: u64, _changed_roots: usize, _leaves: usize) {
            self.commits.set(self.commits.get() + 1);
        }
    }

    #[test]
    fn test_counting_tracer_through_rc() {
        let tracer = Rc::new(CountingTracer::new());
        let shared: Rc<CountingTracer> = tracer.clone();
        let node = NodeId {
            index: 0,
            generation: 0,
        };

        shared.on_write(node, Revision(1));
        shared.on_write(node, Revision(2));
        shared.on_commit(1, 1, 0);
        shared.on_invalidated(node, node);

        assert_eq!(tracer.writes.get(), 2);
        assert_eq!(tracer.commits.get(), 1);
    }

    #[test]
    fn test_noop_tracer_accepts_everything() {
        let tracer = NoopTracer;
        let node = NodeId {
            index: 0,
            generation: 0,
        };
        tracer.on_transaction_start(1);
        tracer.on_recompute(node, "DependentCell", RecomputeResult::Changed);
        tracer.on_observer_panicked(node, "boom");
        tracer.on_transaction_end(1);
    }
}
