//! Derived cells whose value lives in another cell picked at runtime.

use std::cell::{Cell as StdCell, RefCell};
use std::rc::{Rc, Weak};

use super::dependent::Cache;
use super::{shared_runtime, Cell, CellNode, CellValue};
use crate::tracer::RecomputeResult;
use crate::{CellError, Dependency, Dependent, NodeId, Revision, Runtime};

const KIND: &str = "FlatteningDependentCell";

/// A cell that computes *which* cell holds its value.
///
/// While subscribed, it is registered on its direct dependencies and on the current
/// inner ("transitive") cell. A change of a direct dependency re-selects the inner cell
/// at the next read; a change of the inner cell only re-reads it.
pub(crate) struct FlatteningCore<T> {
    id: NodeId,
    runtime: Runtime,
    dependencies: Vec<Rc<dyn Dependency>>,
    compute: Box<dyn Fn() -> Cell<T>>,
    transitive: RefCell<Option<Cell<T>>>,
    /// Set when a direct dependency changed since the inner cell was selected.
    redirect: StdCell<bool>,
    cache: Cache<T>,
}

impl<T: CellValue> FlatteningCore<T> {
    pub(crate) fn create(
        dependencies: Vec<Rc<dyn Dependency>>,
        compute: impl Fn() -> Cell<T> + 'static,
    ) -> Cell<T> {
        let runtime = shared_runtime(&dependencies);
        let core = Rc::new_cyclic(|weak: &Weak<Self>| {
            let handler: Weak<dyn Dependent> = weak.clone();
            Self {
                id: runtime.register(KIND, Some(handler)),
                runtime: runtime.clone(),
                dependencies,
                compute: Box::new(compute),
                transitive: RefCell::new(None),
                redirect: StdCell::new(true),
                cache: Cache::new(),
            }
        });
        Cell::from_node(core)
    }

    /// The inner cell, re-selected and re-subscribed if a direct dependency changed.
    fn transitive(&self) -> Cell<T> {
        if !self.redirect.get() {
            if let Some(current) = self.transitive.borrow().as_ref() {
                return current.clone();
            }
        }

        let next = (self.compute)();
        self.redirect.set(false);
        if let Some(runtime) = next.runtime() {
            if *runtime != self.runtime {
                panic!("{}", CellError::RuntimeMismatch);
            }
        }

        let previous = self.transitive.replace(Some(next.clone()));
        match previous {
            Some(previous) if previous.ptr_eq(&next) => {}
            previous => {
                next.add_dependent(self.id);
                if let Some(previous) = previous {
                    previous.remove_dependent(self.id);
                }
                self.runtime.tracer().on_redirect(self.id, next.node_id());
            }
        }
        next
    }

    fn unsubscribe_transitive(&self) {
        let previous = self.transitive.borrow_mut().take();
        if let Some(previous) = previous {
            previous.remove_dependent(self.id);
        }
        self.redirect.set(true);
    }
}

impl<T: CellValue> CellNode<T> for FlatteningCore<T> {
    fn value(&self) -> T {
        if let Some(value) = self.cache.fresh() {
            return value;
        }
        if !self.cache.is_active() || self.runtime.is_writing() {
            let value = (self.compute)().value();
            self.runtime
                .tracer()
                .on_recompute(self.id, KIND, RecomputeResult::Uncached);
            return value;
        }

        let value = self.transitive().value();
        let result = self.cache.store(value.clone(), self.runtime.revision());
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

impl<T: CellValue> Dependency for FlatteningCore<T> {
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
            // Subscribe the inner cell right away so its changes reach our dependents
            // even before the first read.
            self.redirect.set(true);
            let inner = self.transitive();
            if self.runtime.is_writing() {
                self.cache.seed(inner.value());
            }
        }
    }

    fn remove_dependent(&self, dependent: NodeId) {
        if self.runtime.remove_dependent(self.id, dependent) {
            self.cache.deactivate();
            self.unsubscribe_transitive();
            for dependency in &self.dependencies {
                dependency.remove_dependent(self.id);
            }
        }
    }
}

impl<T: CellValue> Dependent for FlatteningCore<T> {
    fn dependency_invalidated(&self, dependency: NodeId) {
        if self
            .dependencies
            .iter()
            .any(|direct| direct.node_id() == Some(dependency))
        {
            self.redirect.set(true);
        }
        self.cache.mark_dirty();
        if self
            .runtime
            .first_invalidation(self.id, dependency, self.cache.invalidated_batch())
        {
            self.runtime.invalidate_dependents(self.id);
        }
    }
}

impl<T> Drop for FlatteningCore<T> {
    fn drop(&mut self) {
        self.runtime.unregister(self.id);
    }
}
