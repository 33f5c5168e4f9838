//! Cells: the read-only [`Cell`] handle and the node kinds behind it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::disposable::Disposable;
use crate::{CellError, Dependency, NodeId, Revision, Runtime};

mod dependent;
mod flattening;
mod immutable;
mod observer;
mod source;

pub(crate) use dependent::DependentCore;
pub(crate) use flattening::FlatteningCore;
pub use immutable::cell;
pub use source::MutableCell;

use observer::ObserverNode;

/// Values that can be stored in a cell.
///
/// Equality is used to skip writes that do not change anything and to stop
/// propagation at derived cells whose value did not change.
pub trait CellValue: Clone + PartialEq + 'static {}

impl<T: Clone + PartialEq + 'static> CellValue for T {}

/// The node behind a [`Cell`].
///
/// Implemented by every cell kind of this crate. Implement it to plug a custom node
/// (e.g. a list-structured cell) into [`Cell::from_node`].
pub trait CellNode<T>: Dependency {
    /// Current value. Always reflects all writes made so far.
    fn value(&self) -> T;

    /// Revision at which the value last changed, as seen by observers.
    fn changed_at(&self) -> Revision;

    /// Value before the last change, if known.
    fn previous(&self) -> Option<T>;

    /// Short name of the node kind, used by `Debug` and `Display`.
    fn kind(&self) -> &'static str;
}

/// Delivered to [`Cell::observe_change`] observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent<T> {
    /// The new value.
    pub value: T,
    /// The value before the change, if known.
    pub previous: Option<T>,
}

/// A read-only, observable value.
///
/// Cells compare by identity: two handles are equal when they point at the same node.
/// This makes `Cell<Cell<T>>` a valid cell value.
pub struct Cell<T> {
    node: Rc<dyn CellNode<T>>,
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
        }
    }
}

impl<T> PartialEq for Cell<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> Eq for Cell<T> {}

impl<T> Cell<T> {
    /// Wrap a custom node.
    pub fn from_node(node: Rc<dyn CellNode<T>>) -> Self {
        Self { node }
    }

    /// Returns true if both handles point at the same node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.node), Rc::as_ptr(&other.node))
    }

    /// Identity of the underlying node, `None` for immutable cells.
    pub fn node_id(&self) -> Option<NodeId> {
        self.node.node_id()
    }

    /// Short name of the node kind, e.g. `SimpleCell` or `DependentCell`.
    pub fn kind(&self) -> &'static str {
        self.node.kind()
    }

    /// Number of distinct dependents currently subscribed to this cell.
    pub fn dependent_count(&self) -> usize {
        match (self.node.node_id(), self.node.runtime()) {
            (Some(id), Some(runtime)) => runtime.dependent_count(id),
            _ => 0,
        }
    }

    pub(crate) fn changed_at(&self) -> Revision {
        self.node.changed_at()
    }

    pub(crate) fn previous(&self) -> Option<T> {
        self.node.previous()
    }
}

impl<T: CellValue> Cell<T> {
    /// Current value of the cell.
    ///
    /// Reading inside a `mutate` block sees every write made so far.
    pub fn value(&self) -> T {
        self.node.value()
    }

    /// This cell as a type-erased dependency, for
    /// [`dependent_cell`](crate::dependent_cell) and friends.
    pub fn as_dependency(&self) -> Rc<dyn Dependency> {
        Rc::new(self.clone())
    }

    /// Call `observer` with the new value and the previous one after every committed
    /// change.
    ///
    /// Observing subscribes the cell (and, for derived cells, everything it depends on)
    /// until the returned [`Disposable`] is disposed or dropped. Immutable cells never
    /// change, so observing them returns a no-op disposable.
    ///
    /// Observers run during the commit phase: they may read any cell, but may only
    /// write through [`mutate_deferred`](crate::mutate_deferred).
    pub fn observe_change(&self, observer: impl FnMut(&ChangeEvent<T>) + 'static) -> Disposable {
        match self.node.runtime() {
            Some(runtime) => {
                let runtime = runtime.clone();
                ObserverNode::observe(self, &runtime, Box::new(observer))
            }
            None => Disposable::noop(),
        }
    }

    /// Call `observer` with the new value after every committed change.
    pub fn observe(&self, mut observer: impl FnMut(&T) + 'static) -> Disposable {
        self.observe_change(move |event| observer(&event.value))
    }

    /// Like [`Cell::observe`], but also calls `observer` once right away with the
    /// current value.
    ///
    /// The immediate call must not commit a change to this cell, or it would have to
    /// re-enter `observer`.
    pub fn observe_now(&self, observer: impl FnMut(&T) + 'static) -> Disposable {
        let observer = Rc::new(RefCell::new(observer));
        let disposable = {
            let observer = observer.clone();
            self.observe(move |value| (*observer.borrow_mut())(value))
        };
        let value = self.value();
        (*observer.borrow_mut())(&value);
        disposable
    }

    /// A derived cell holding `transform` applied to this cell's value.
    pub fn map<U: CellValue>(&self, transform: impl Fn(&T) -> U + 'static) -> Cell<U> {
        let source = self.clone();
        DependentCore::create(vec![self.as_dependency()], move || {
            transform(&source.value())
        })
    }

    /// A cell holding the value of the cell returned by `transform`.
    ///
    /// Changes of this cell pick a new inner cell; changes of the inner cell are
    /// forwarded.
    pub fn flat_map<U: CellValue>(&self, transform: impl Fn(&T) -> Cell<U> + 'static) -> Cell<U> {
        let source = self.clone();
        FlatteningCore::create(vec![self.as_dependency()], move || {
            transform(&source.value())
        })
    }

    /// Like [`Cell::flat_map`], with `None` standing for an absent inner cell.
    pub fn flat_map_option<U: CellValue>(
        &self,
        transform: impl Fn(&T) -> Option<Cell<U>> + 'static,
    ) -> Cell<Option<U>> {
        self.flat_map(move |value| match transform(value) {
            Some(inner) => inner.map(|value| Some(value.clone())),
            None => crate::utils::none_cell(),
        })
    }
}

impl<T: CellValue> Cell<Cell<T>> {
    /// Collapse a cell of cells into a cell holding the inner value.
    pub fn flatten(&self) -> Cell<T> {
        self.flat_map(Cell::clone)
    }
}

impl<T: 'static> Dependency for Cell<T> {
    fn node_id(&self) -> Option<NodeId> {
        self.node.node_id()
    }

    fn runtime(&self) -> Option<&Runtime> {
        self.node.runtime()
    }

    fn add_dependent(&self, dependent: NodeId) {
        self.node.add_dependent(dependent)
    }

    fn remove_dependent(&self, dependent: NodeId) {
        self.node.remove_dependent(dependent)
    }
}

impl<T: CellValue + fmt::Debug> fmt::Debug for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{{:?}}}", self.kind(), self.value())
    }
}

impl<T: CellValue + fmt::Display> fmt::Display for Cell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{{}}}", self.kind(), self.value())
    }
}

/// Runtime shared by `dependencies`: the first one found, or the current thread's
/// default when every dependency is immutable.
///
/// # Panics
///
/// Panics with `CellError::RuntimeMismatch` when dependencies come from different
/// runtimes.
pub(crate) fn shared_runtime(dependencies: &[Rc<dyn Dependency>]) -> Runtime {
    let mut found: Option<&Runtime> = None;
    for runtime in dependencies.iter().filter_map(|d| d.runtime()) {
        match found {
            Some(existing) if existing != runtime => panic!("{}", CellError::RuntimeMismatch),
            Some(_) => {}
            None => found = Some(runtime),
        }
    }
    found.cloned().unwrap_or_else(Runtime::current)
}
