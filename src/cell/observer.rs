use std::cell::{Cell as StdCell, RefCell};
use std::rc::{Rc, Weak};

use super::{Cell, CellValue, ChangeEvent};
use crate::disposable::Disposable;
use crate::transaction::Phase;
use crate::{Dependency, Dependent, NodeId, Revision, Runtime};

const KIND: &str = "Observer";

type Callback<T> = Box<dyn FnMut(&ChangeEvent<T>)>;

/// Leaf of the graph: pulls its cell during the commit phase and calls back when the
/// cell changed since the last delivery.
pub(super) struct ObserverNode<T> {
    id: NodeId,
    runtime: Runtime,
    cell: Cell<T>,
    /// Revision of the last change delivered, or of the subscription.
    last_seen: StdCell<Revision>,
    /// Value read when subscribing inside a write phase, compared at the first pull.
    baseline: RefCell<Option<T>>,
    callback: RefCell<Callback<T>>,
}

impl<T: CellValue> ObserverNode<T> {
    pub fn observe(cell: &Cell<T>, runtime: &Runtime, callback: Callback<T>) -> Disposable {
        let observer = Rc::new_cyclic(|weak: &Weak<Self>| {
            let handler: Weak<dyn Dependent> = weak.clone();
            Self {
                id: runtime.register(KIND, Some(handler)),
                runtime: runtime.clone(),
                cell: cell.clone(),
                last_seen: StdCell::new(runtime.revision()),
                baseline: RefCell::new(None),
                callback: RefCell::new(callback),
            }
        });

        // Created before subscribing so a panicking cell still gets unsubscribed.
        let disposable = {
            let observer = observer.clone();
            Disposable::new(move || observer.detach())
        };

        observer.cell.add_dependent(observer.id);
        if runtime.phase() == Phase::Writing {
            let baseline = observer.cell.value();
            *observer.baseline.borrow_mut() = Some(baseline);
            runtime.schedule_pull(observer.id);
        } else {
            // Prime the cache so the first event carries the previous value.
            observer.cell.value();
        }
        disposable
    }

    fn detach(&self) {
        self.cell.remove_dependent(self.id);
        self.runtime.unregister(self.id);
    }
}

impl<T: CellValue> Dependent for ObserverNode<T> {
    fn dependency_invalidated(&self, _dependency: NodeId) {
        self.runtime.schedule_pull(self.id);
    }

    fn pull(&self) {
        let value = self.cell.value();
        let changed_at = self.cell.changed_at();
        let baseline = self.baseline.take();
        if changed_at <= self.last_seen.get() {
            return;
        }
        self.last_seen.set(changed_at);

        // Writes that cancel out within the batch (or since a mid-batch
        // subscription) are not a change.
        let previous = baseline.or_else(|| self.cell.previous());
        if previous.as_ref() == Some(&value) {
            return;
        }

        let event = ChangeEvent { value, previous };
        self.runtime
            .tracer()
            .on_observer_notified(self.id, self.cell.node_id());
        (*self.callback.borrow_mut())(&event);
    }
}
