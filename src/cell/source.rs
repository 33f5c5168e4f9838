//! Source cells: the only cells that can be written.

use std::cell::{Cell as StdCell, RefCell};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use super::{Cell, CellNode, CellValue};
use crate::transaction::Phase;
use crate::{CellError, Dependency, NodeId, Revision, Runtime};

const SIMPLE: &str = "SimpleCell";
const DELEGATING: &str = "DelegatingCell";

enum Storage<T> {
    Inline(RefCell<T>),
    Delegated {
        getter: Box<dyn Fn() -> T>,
        setter: Box<dyn Fn(T)>,
    },
}

pub(crate) struct SourceCore<T> {
    id: NodeId,
    runtime: Runtime,
    storage: Storage<T>,
    previous: RefCell<Option<T>>,
    changed_at: StdCell<Revision>,
}

impl<T: CellValue> SourceCore<T> {
    fn new(runtime: &Runtime, kind: &'static str, storage: Storage<T>) -> Rc<Self> {
        Rc::new(Self {
            id: runtime.register(kind, None),
            runtime: runtime.clone(),
            storage,
            previous: RefCell::new(None),
            changed_at: StdCell::new(Revision::default()),
        })
    }

    fn get(&self) -> T {
        match &self.storage {
            Storage::Inline(value) => value.borrow().clone(),
            Storage::Delegated { getter, .. } => getter(),
        }
    }

    fn holds(&self, value: &T) -> bool {
        match &self.storage {
            Storage::Inline(current) => *current.borrow() == *value,
            Storage::Delegated { getter, .. } => getter() == *value,
        }
    }

    /// Store `value` inside the open write phase.
    fn write(&self, value: T) -> Result<(), CellError> {
        if self.holds(&value) {
            return Ok(());
        }
        let first = self.runtime.record_write(self.id)?;
        let old = match &self.storage {
            Storage::Inline(current) => current.replace(value),
            Storage::Delegated { getter, setter } => {
                let old = getter();
                setter(value);
                old
            }
        };
        self.changed_at.set(self.runtime.revision());
        if first {
            *self.previous.borrow_mut() = Some(old);
            self.runtime.invalidate_dependents(self.id);
        }
        Ok(())
    }
}

impl<T: CellValue> CellNode<T> for SourceCore<T> {
    fn value(&self) -> T {
        self.get()
    }

    fn changed_at(&self) -> Revision {
        self.changed_at.get()
    }

    fn previous(&self) -> Option<T> {
        self.previous.borrow().clone()
    }

    fn kind(&self) -> &'static str {
        match self.storage {
            Storage::Inline(_) => SIMPLE,
            Storage::Delegated { .. } => DELEGATING,
        }
    }
}

impl<T> Dependency for SourceCore<T> {
    fn node_id(&self) -> Option<NodeId> {
        Some(self.id)
    }

    fn runtime(&self) -> Option<&Runtime> {
        Some(&self.runtime)
    }

    fn add_dependent(&self, dependent: NodeId) {
        self.runtime.add_dependent(self.id, dependent);
    }

    fn remove_dependent(&self, dependent: NodeId) {
        self.runtime.remove_dependent(self.id, dependent);
    }
}

impl<T> Drop for SourceCore<T> {
    fn drop(&mut self) {
        self.runtime.unregister(self.id);
    }
}

/// A writable cell.
///
/// Dereferences to the read-only [`Cell`] view, so every reading and deriving
/// operation is available on it too.
///
/// # Example
///
/// ```
/// use cell_flow::Runtime;
///
/// let runtime = Runtime::new();
/// let name = runtime.mutable_cell(String::from("a"));
/// let length = name.map(|name| name.len());
///
/// name.set("abc".to_string());
/// assert_eq!(length.value(), 3);
/// ```
pub struct MutableCell<T> {
    cell: Cell<T>,
    core: Rc<SourceCore<T>>,
}

impl<T> Clone for MutableCell<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            core: self.core.clone(),
        }
    }
}

impl<T: CellValue> MutableCell<T> {
    fn from_core(core: Rc<SourceCore<T>>) -> Self {
        let node: Rc<dyn CellNode<T>> = core.clone();
        Self {
            cell: Cell::from_node(node),
            core,
        }
    }

    /// Set the value.
    ///
    /// Outside of a mutation this opens and commits one on its own. Writing a value equal
    /// to the current one does nothing. Writes that restore the value the cell had when
    /// the mutation started notify no observer, though derived cells still recompute.
    ///
    /// # Panics
    ///
    /// Panics when called during the commit phase, i.e. from an observer. Use
    /// [`mutate_deferred`](crate::mutate_deferred) there.
    pub fn set(&self, value: T) {
        if let Err(err) = self.try_set(value) {
            panic!("{err}");
        }
    }

    /// Like [`MutableCell::set`], but reports a write during the commit phase as
    /// `CellError::WriteDuringCommit`.
    pub fn try_set(&self, value: T) -> Result<(), CellError> {
        let runtime = &self.core.runtime;
        match runtime.phase() {
            Phase::Committing => Err(CellError::WriteDuringCommit { node: self.core.id }),
            Phase::Writing => self.core.write(value),
            Phase::Idle => runtime.try_mutate(|| self.core.write(value))?,
        }
    }

    /// Set the value to `f` applied to the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.core.get());
        self.set(next);
    }

    /// Read-only view of this cell.
    pub fn as_cell(&self) -> Cell<T> {
        self.cell.clone()
    }

    /// Read-only view of this cell, consuming the writable handle.
    pub fn into_cell(self) -> Cell<T> {
        self.cell
    }
}

impl<T> Deref for MutableCell<T> {
    type Target = Cell<T>;

    fn deref(&self) -> &Cell<T> {
        &self.cell
    }
}

impl<T> From<MutableCell<T>> for Cell<T> {
    fn from(cell: MutableCell<T>) -> Self {
        cell.cell
    }
}

impl<T> PartialEq for MutableCell<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }
}

impl<T> Eq for MutableCell<T> {}

impl<T: CellValue + fmt::Debug> fmt::Debug for MutableCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.cell, f)
    }
}

impl Runtime {
    /// Create a writable cell holding `value`.
    pub fn mutable_cell<T: CellValue>(&self, value: T) -> MutableCell<T> {
        MutableCell::from_core(SourceCore::new(
            self,
            SIMPLE,
            Storage::Inline(RefCell::new(value)),
        ))
    }

    /// Create a writable cell whose storage lives elsewhere.
    ///
    /// Reads call `getter`; writes call `setter` with the new value. The cell only
    /// notifies its dependents about writes made through it.
    pub fn delegating_cell<T: CellValue>(
        &self,
        getter: impl Fn() -> T + 'static,
        setter: impl Fn(T) + 'static,
    ) -> MutableCell<T> {
        MutableCell::from_core(SourceCore::new(
            self,
            DELEGATING,
            Storage::Delegated {
                getter: Box::new(getter),
                setter: Box::new(setter),
            },
        ))
    }
}
