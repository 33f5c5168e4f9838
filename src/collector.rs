//! Event collector for testing.
//!
//! `EventCollector` accumulates engine events for later inspection and assertion.

use std::cell::RefCell;

use crate::tracer::{RecomputeResult, Tracer};
use crate::{NodeId, Revision};

/// An engine event recorded by [`EventCollector`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CellEvent {
    /// A transaction (or a deferred batch) started.
    TransactionStart { batch: u64 },
    /// A source cell recorded a write.
    Write { node: NodeId, revision: Revision },
    /// A derived node was marked dirty.
    Invalidated { node: NodeId, dependency: NodeId },
    /// A derived cell evaluated its compute function.
    Recompute {
        node: NodeId,
        kind: String,
        result: RecomputeResult,
    },
    /// A flattening cell switched its inner cell.
    Redirect {
        node: NodeId,
        transitive: Option<NodeId>,
    },
    /// The commit phase started.
    Commit {
        batch: u64,
        changed_roots: usize,
        leaves: usize,
    },
    /// An observer callback ran.
    ObserverNotified {
        observer: NodeId,
        cell: Option<NodeId>,
    },
    /// An observer callback panicked.
    ObserverPanicked { observer: NodeId, message: String },
    /// A deferred mutation was queued.
    DeferredEnqueued { pending: usize },
    /// The transaction closed.
    TransactionEnd { batch: u64 },
}

/// Event collector for testing - accumulates events for assertions.
///
/// # Example
///
/// ```
/// use cell_flow::{CellEvent, EventCollector, Runtime};
/// use std::rc::Rc;
///
/// let collector = Rc::new(EventCollector::new());
/// let runtime = Runtime::builder().tracer(collector.clone()).build();
///
/// let cell = runtime.mutable_cell(1);
/// cell.set(2);
///
/// assert!(collector
///     .events()
///     .iter()
///     .any(|e| matches!(e, CellEvent::Write { .. })));
/// ```
#[derive(Debug, Default)]
pub struct EventCollector {
    events: RefCell<Vec<CellEvent>>,
}

impl EventCollector {
    /// Create a new empty event collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get collected events as a vector.
    pub fn events(&self) -> Vec<CellEvent> {
        self.events.borrow().clone()
    }

    /// Count collected events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&CellEvent) -> bool) -> usize {
        self.events.borrow().iter().filter(|e| predicate(e)).count()
    }

    /// Clear all collected events.
    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    /// Take collected events, clearing the collector.
    pub fn take(&self) -> Vec<CellEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    /// Get the number of collected events.
    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    /// Check if no events have been collected.
    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    fn push(&self, event: CellEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl Tracer for EventCollector {
    fn on_transaction_start(&self, batch: u64) {
        self.push(CellEvent::TransactionStart { batch });
    }

    fn on_write(&self, node: NodeId, revision: Revision) {
        self.push(CellEvent::Write { node, revision });
    }

    fn on_invalidated(&self, node: NodeId, dependency: NodeId) {
        self.push(CellEvent::Invalidated { node, dependency });
    }

    fn on_recompute(&self, node: NodeId, kind: &'static str, result: RecomputeResult) {
        self.push(CellEvent::Recompute {
            node,
            kind: kind.to_string(),
            result,
        });
    }

    fn on_redirect(&self, node: NodeId, transitive: Option<NodeId>) {
        self.push(CellEvent::Redirect { node, transitive });
    }

    fn on_commit(&self, batch: u64, changed_roots: usize, leaves: usize) {
        self.push(CellEvent::Commit {
            batch,
            changed_roots,
            leaves,
        });
    }

    fn on_observer_notified(&self, observer: NodeId, cell: Option<NodeId>) {
        self.push(CellEvent::ObserverNotified { observer, cell });
    }

    fn on_observer_panicked(&self, observer: NodeId, message: &str) {
        self.push(CellEvent::ObserverPanicked {
            observer,
            message: message.to_string(),
        });
    }

    fn on_deferred_enqueued(&self, pending: usize) {
        self.push(CellEvent::DeferredEnqueued { pending });
    }

    fn on_transaction_end(&self, batch: u64) {
        self.push(CellEvent::TransactionEnd { batch });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_basic() {
        let collector = EventCollector::new();
        assert!(collector.is_empty());

        collector.on_transaction_start(1);

        assert_eq!(collector.len(), 1);
        assert!(!collector.is_empty());
        assert_eq!(
            collector.events()[0],
            CellEvent::TransactionStart { batch: 1 }
        );
    }

    #[test]
    fn test_collector_count() {
        let collector = EventCollector::new();

        collector.on_transaction_start(1);
        collector.on_deferred_enqueued(1);
        collector.on_deferred_enqueued(2);
        collector.on_transaction_end(1);

        assert_eq!(
            collector.count(|e| matches!(e, CellEvent::DeferredEnqueued { .. })),
            2
        );
    }

    #[test]
    fn test_collector_take() {
        let collector = EventCollector::new();

        collector.on_transaction_start(1);

        let events = collector.take();
        assert_eq!(events.len(), 1);
        assert!(collector.is_empty());
    }
}
