//! Derived cells computed from a fixed set of dependencies.

use std::cell::{Cell as StdCell, RefCell};
use std::rc::{Rc, Weak};

use super::{shared_runtime, Cell, CellNode, CellValue};
use crate::tracer::RecomputeResult;
use crate::{Dependency, Dependent, NodeId, Revision, Runtime};

const KIND: &str = "DependentCell";

/// Memoization state shared by the derived cell kinds.
///
/// The cache is only trusted while the cell is subscribed (`active`): an unsubscribed
/// cell receives no invalidation, so it recomputes on every read.
pub(super) struct Cache<T> {
    value: RefCell<Option<T>>,
    previous: RefCell<Option<T>>,
    dirty: StdCell<bool>,
    /// Last batch in which invalidation went through this node.
    invalidated_batch: StdCell<u64>,
    changed_at: StdCell<Revision>,
    active: StdCell<bool>,
}

impl<T: CellValue> Cache<T> {
    pub fn new() -> Self {
        Self {
            value: RefCell::new(None),
            previous: RefCell::new(None),
            dirty: StdCell::new(true),
            invalidated_batch: StdCell::new(0),
            changed_at: StdCell::new(Revision::default()),
            active: StdCell::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    /// The cached value if it can be served as is.
    pub fn fresh(&self) -> Option<T> {
        if self.active.get() && !self.dirty.get() {
            self.value.borrow().clone()
        } else {
            None
        }
    }

    /// Store a recomputed value. `previous` and `changed_at` only move when the value
    /// differs from the cached one.
    pub fn store(&self, value: T, revision: Revision) -> RecomputeResult {
        let result = {
            let mut cached = self.value.borrow_mut();
            if cached.as_ref() == Some(&value) {
                RecomputeResult::Unchanged
            } else {
                *self.previous.borrow_mut() = cached.replace(value);
                self.changed_at.set(revision);
                RecomputeResult::Changed
            }
        };
        self.dirty.set(false);
        result
    }

    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }

    pub fn invalidated_batch(&self) -> &StdCell<u64> {
        &self.invalidated_batch
    }

    pub fn changed_at(&self) -> Revision {
        self.changed_at.get()
    }

    pub fn previous(&self) -> Option<T> {
        self.previous.borrow().clone()
    }

    /// Start trusting the cache. Nothing is computed until the next read.
    ///
    /// Activated during a write phase, the node counts as already invalidated in that
    /// batch: it is dirty, and whoever subscribed it reads it at commit.
    pub fn activate(&self, writing_batch: Option<u64>) {
        self.active.set(true);
        self.dirty.set(true);
        self.invalidated_batch.set(writing_batch.unwrap_or(0));
    }

    /// Remember the value read when activated inside a write phase, so the commit
    /// only reports a change if later writes moved it.
    pub fn seed(&self, value: T) {
        *self.value.borrow_mut() = Some(value);
    }

    pub fn deactivate(&self) {
        self.active.set(false);
        self.dirty.set(true);
        self.invalidated_batch.set(0);
        self.value.borrow_mut().take();
        self.previous.borrow_mut().take();
    }
}

pub(crate) struct DependentCore<T> {
    id: NodeId,
    runtime: Runtime,
    dependencies: Vec<Rc<dyn Dependency>>,
    compute: Box<dyn Fn() -> T>,
    cache: Cache<T>,
}

impl<T: CellValue> DependentCore<T> {
    /// Create a derived cell recomputed with `compute` whenever one of `dependencies`
    /// changes.
    ///
    /// `compute` must only read cells listed in `dependencies`.
    pub(crate) fn create(
        dependencies: Vec<Rc<dyn Dependency>>,
        compute: impl Fn() -> T + 'static,
    ) -> Cell<T> {
        let runtime = shared_runtime(&dependencies);
        let core = Rc::new_cyclic(|weak: &Weak<Self>| {
            let handler: Weak<dyn Dependent> = weak.clone();
            Self {
                id: runtime.register(KIND, Some(handler)),
                runtime: runtime.clone(),
                dependencies,
                compute: Box::new(compute),
                cache: Cache::new(),
            }
        });
        Cell::from_node(core)
    }
}

impl<T: CellValue> CellNode<T> for DependentCore<T> {
    fn value(&self) -> T {
        if let Some(value) = self.cache.fresh() {
            return value;
        }
        let value = (self.compute)();
        let result = if self.cache.is_active() && !self.runtime.is_writing() {
            self.cache.store(value.clone(), self.runtime.revision())
        } else {
            RecomputeResult::Uncached
        };
        self.runtime.tracer().on_recompute(self.id, KIND, result);
        value
    }

    fn changed_at(&self) -> Revision {
        self.cache.changed_at()
    }

    fn previous(&self) -> Option<T> {
        self.cache.previous()
    }

    fn kind(&self) -> &'static str {
        KIND
    }
}

impl<T: CellValue> Dependency for DependentCore<T> {
    fn node_id(&self) -> Option<NodeId> {
        Some(self.id)
    }

    fn runtime(&self) -> Option<&Runtime> {
        Some(&self.runtime)
    }

    fn add_dependent(&self, dependent: NodeId) {
        if self.runtime.add_dependent(self.id, dependent) {
            for dependency in &self.dependencies {
                dependency.add_dependent(self.id);
            }
            self.cache.activate(self.runtime.writing_batch());
            if self.runtime.is_writing() {
                self.cache.seed(self.value());
            }
        }
    }

    fn remove_dependent(&self, dependent: NodeId) {
        if self.runtime.remove_dependent(self.id, dependent) {
            self.cache.deactivate();
            for dependency in &self.dependencies {
                dependency.remove_dependent(self.id);
            }
        }
    }
}

impl<T: CellValue> Dependent for DependentCore<T> {
    fn dependency_invalidated(&self, dependency: NodeId) {
        self.cache.mark_dirty();
        if self
            .runtime
            .first_invalidation(self.id, dependency, self.cache.invalidated_batch())
        {
            self.runtime.invalidate_dependents(self.id);
        }
    }
}

impl<T> Drop for DependentCore<T> {
    fn drop(&mut self) {
        self.runtime.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unobserved_cell_recomputes_on_every_read() {
        let runtime = Runtime::new();
        let source = runtime.mutable_cell(2);
        let calls = Rc::new(StdCell::new(0));
        let squared = {
            let source = source.clone();
            let calls = calls.clone();
            DependentCore::create(vec![source.as_dependency()], move || {
                calls.set(calls.get() + 1);
                source.value() * source.value()
            })
        };

        assert_eq!(squared.value(), 4);
        assert_eq!(squared.value(), 4);
        assert_eq!(calls.get(), 2);
        assert_eq!(source.dependent_count(), 0);
    }

    #[test]
    fn test_observed_cell_is_cached() {
        let runtime = Runtime::new();
        let source = runtime.mutable_cell(2);
        let calls = Rc::new(StdCell::new(0));
        let squared = {
            let source = source.clone();
            let calls = calls.clone();
            DependentCore::create(vec![source.as_dependency()], move || {
                calls.set(calls.get() + 1);
                source.value() * source.value()
            })
        };

        let _observer = squared.observe(|_| {});
        let primed = calls.get();
        assert_eq!(squared.value(), 4);
        assert_eq!(squared.value(), 4);
        assert_eq!(calls.get(), primed);

        source.set(3);
        assert_eq!(calls.get(), primed + 1);
        assert_eq!(squared.value(), 9);
        assert_eq!(squared.previous(), Some(4));
    }

    #[test]
    fn test_dropping_last_observer_unsubscribes() {
        let runtime = Runtime::new();
        let source = runtime.mutable_cell(1);
        let plus_one = source.map(|v| v + 1);

        let observer = plus_one.observe(|_| {});
        assert_eq!(source.dependent_count(), 1);
        assert_eq!(plus_one.dependent_count(), 1);

        drop(observer);
        assert_eq!(source.dependent_count(), 0);
        assert_eq!(plus_one.dependent_count(), 0);
    }
}
