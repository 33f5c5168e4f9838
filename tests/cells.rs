//! Tests for reading, deriving and observing cells.

use std::cell::{Cell as StdCell, RefCell};
use std::rc::Rc;

use cell_flow::{
    cell, dependent_cell, map2, Cell, CellValue, ChangeEvent, Dependency, Dependent, Disposable,
    NodeId, Runtime,
};

fn record<T: CellValue>(cell: &Cell<T>) -> (Rc<RefCell<Vec<T>>>, Disposable) {
    let log = Rc::new(RefCell::new(Vec::new()));
    let disposable = {
        let log = log.clone();
        cell.observe(move |value| log.borrow_mut().push(value.clone()))
    };
    (log, disposable)
}

fn counted<T: CellValue>(
    counter: &Rc<StdCell<usize>>,
    compute: impl Fn() -> T + 'static,
) -> impl Fn() -> T + 'static {
    let counter = counter.clone();
    move || {
        counter.set(counter.get() + 1);
        compute()
    }
}

// =============================================================================
// Source and Immutable Cells
// =============================================================================

#[test]
fn test_immutable_cell() {
    let constant = cell(vec![1, 2, 3]);
    assert_eq!(constant.value(), vec![1, 2, 3]);
    assert_eq!(constant.node_id(), None);
    assert_eq!(constant.kind(), "ImmutableCell");
}

#[test]
fn test_mutable_cell_notifies_observer() {
    let runtime = Runtime::new();
    let source = runtime.mutable_cell(1);
    let (log, _observer) = record(&source);

    source.set(2);
    source.set(3);

    assert_eq!(*log.borrow(), vec![2, 3]);
}

#[test]
fn test_equal_write_does_not_notify() {
    let runtime = Runtime::new();
    let source = runtime.mutable_cell("a".to_string());
    let (log, _observer) = record(&source);

    source.set("a".to_string());

    assert!(log.borrow().is_empty());
}

#[test]
fn test_write_restoring_batch_start_value_does_not_notify() {
    let runtime = Runtime::new();
    let source = runtime.mutable_cell(1);
    let doubled = source.map(|v| v * 2);
    let (source_log, _source_observer) = record(&source);
    let (doubled_log, _doubled_observer) = record(&doubled);

    runtime.mutate(|| {
        source.set(2);
        source.set(1);
    });

    assert!(source_log.borrow().is_empty());
    assert!(doubled_log.borrow().is_empty());

    source.set(3);
    assert_eq!(*source_log.borrow(), vec![3]);
    assert_eq!(*doubled_log.borrow(), vec![6]);
}

#[test]
fn test_change_event_carries_previous_value() {
    let runtime = Runtime::new();
    let source = runtime.mutable_cell(1);
    let doubled = source.map(|v| v * 2);
    let events = Rc::new(RefCell::new(Vec::new()));
    let _observer = {
        let events = events.clone();
        doubled.observe_change(move |event: &ChangeEvent<i32>| {
            events.borrow_mut().push(event.clone())
        })
    };

    source.set(5);

    assert_eq!(
        *events.borrow(),
        vec![ChangeEvent {
            value: 10,
            previous: Some(2)
        }]
    );
}

#[test]
fn test_observe_now_calls_immediately() {
    let runtime = Runtime::new();
    let source = runtime.mutable_cell(1);
    let log = Rc::new(RefCell::new(Vec::new()));
    let _observer = {
        let log = log.clone();
        source.observe_now(move |value| log.borrow_mut().push(*value))
    };

    source.set(2);

    assert_eq!(*log.borrow(), vec![1, 2]);
}

#[test]
fn test_disposed_observer_is_not_called() {
    let runtime = Runtime::new();
    let source = runtime.mutable_cell(1);
    let (log, observer) = record(&source);

    source.set(2);
    observer.dispose();
    source.set(3);

    assert_eq!(*log.borrow(), vec![2]);
    assert_eq!(source.dependent_count(), 0);
}

// =============================================================================
// Derived Cells
// =============================================================================

#[test]
fn test_unobserved_derived_cell_is_always_current() {
    let runtime = Runtime::new();
    let source = runtime.mutable_cell(1);
    let plus_one = source.map(|v| v + 1);

    assert_eq!(plus_one.value(), 2);
    source.set(10);
    assert_eq!(plus_one.value(), 11);
}

#[test]
fn test_diamond_notifies_once() {
    let runtime = Runtime::new();
    let root = runtime.mutable_cell(1);
    let left = root.map(|v| v + 1);
    let right = root.map(|v| v * 2);
    let computations = Rc::new(StdCell::new(0));
    let bottom = {
        let (left, right) = (left.clone(), right.clone());
        dependent_cell(
            vec![left.as_dependency(), right.as_dependency()],
            counted(&computations, move || left.value() + right.value()),
        )
    };
    let (log, _observer) = record(&bottom);
    assert_eq!(computations.get(), 1);

    root.set(5);

    assert_eq!(*log.borrow(), vec![16]);
    assert_eq!(computations.get(), 2);
}

#[test]
fn test_three_branch_diamond_notifies_once() {
    let runtime = Runtime::new();
    let root = runtime.mutable_cell(5);
    let branch1 = root.map(|v| v * 2);
    let branch2 = root.map(|v| v * 3);
    let branch3 = root.map(|v| v * 4);
    let leaf = {
        let (b1, b2, b3) = (branch1.clone(), branch2.clone(), branch3.clone());
        dependent_cell(
            vec![
                branch1.as_dependency(),
                branch2.as_dependency(),
                branch3.as_dependency(),
            ],
            move || b1.value() + b2.value() + b3.value(),
        )
    };
    for branch in [&branch1, &branch2, &branch3] {
        assert_eq!(branch.dependent_count(), 0);
    }

    let (log, _observer) = record(&leaf);
    for branch in [&branch1, &branch2, &branch3] {
        assert_eq!(branch.dependent_count(), 1);
    }

    root.update(|v| v + 1);

    assert_eq!(*log.borrow(), vec![54]);
}

#[test]
fn test_unchanged_value_does_not_notify() {
    let runtime = Runtime::new();
    let source = runtime.mutable_cell(1);
    let parity = source.map(|v| v % 2);
    let computations = Rc::new(StdCell::new(0));
    let label = {
        let parity = parity.clone();
        dependent_cell(
            vec![parity.as_dependency()],
            counted(&computations, move || {
                let label = if parity.value() == 0 { "even" } else { "odd" };
                label.to_string()
            }),
        )
    };
    let (log, _observer) = record(&label);

    source.set(3);
    assert!(log.borrow().is_empty());
    assert_eq!(computations.get(), 2);

    source.set(4);
    assert_eq!(*log.borrow(), vec!["even".to_string()]);
}

#[test]
fn test_lazy_subscription() {
    let runtime = Runtime::new();
    let root = runtime.mutable_cell(1);
    let branch1 = root.map(|v| v + 1);
    let branch2 = root.map(|v| v + 2);
    let leaf = map2(&branch1, &branch2, |a, b| a * b);

    assert_eq!(root.dependent_count(), 0);
    assert_eq!(branch1.dependent_count(), 0);
    assert_eq!(branch2.dependent_count(), 0);
    assert_eq!(leaf.dependent_count(), 0);

    let observer = leaf.observe(|_| {});

    assert_eq!(root.dependent_count(), 2);
    assert_eq!(branch1.dependent_count(), 1);
    assert_eq!(branch2.dependent_count(), 1);
    assert_eq!(leaf.dependent_count(), 1);

    observer.dispose();

    assert_eq!(root.dependent_count(), 0);
    assert_eq!(branch1.dependent_count(), 0);
    assert_eq!(branch2.dependent_count(), 0);
    assert_eq!(leaf.dependent_count(), 0);
}

#[test]
fn test_two_observers_on_one_cell() {
    let runtime = Runtime::new();
    let source = runtime.mutable_cell(0);
    let squared = source.map(|v| v * v);
    let (first, first_observer) = record(&squared);
    let (second, _second_observer) = record(&squared);
    assert_eq!(squared.dependent_count(), 2);

    source.set(2);
    first_observer.dispose();
    source.set(3);

    assert_eq!(*first.borrow(), vec![4]);
    assert_eq!(*second.borrow(), vec![4, 9]);
    assert_eq!(squared.dependent_count(), 1);
    assert_eq!(source.dependent_count(), 1);
}

#[test]
fn test_derived_from_immutable_cells() {
    let total = map2(&cell(2), &cell(3), |a, b| a + b);
    assert_eq!(total.value(), 5);
    let _observer = total.observe(|_| {});
    assert_eq!(total.dependent_count(), 1);
}

#[test]
fn test_nodes_are_freed() {
    let runtime = Runtime::new();
    {
        let source = runtime.mutable_cell(1);
        let derived = source.map(|v| v + 1);
        let _observer = derived.observe(|_| {});
        assert_eq!(runtime.node_count(), 3);
    }
    assert_eq!(runtime.node_count(), 0);
}

// =============================================================================
// Observers Created During a Mutation
// =============================================================================

#[test]
fn test_observer_created_mid_mutation_sees_later_writes() {
    let runtime = Runtime::new();
    let source = runtime.mutable_cell(0);
    let log = Rc::new(RefCell::new(Vec::new()));

    let _observer = runtime.mutate(|| {
        source.set(1);
        let log = log.clone();
        let observer = source.observe(move |value| log.borrow_mut().push(*value));
        source.set(2);
        observer
    });

    assert_eq!(*log.borrow(), vec![2]);
}

#[test]
fn test_observer_created_mid_mutation_ignores_earlier_writes() {
    let runtime = Runtime::new();
    let source = runtime.mutable_cell(0);
    let doubled = source.map(|v| v * 2);
    let log = Rc::new(RefCell::new(Vec::new()));

    let _observer = runtime.mutate(|| {
        source.set(1);
        let log = log.clone();
        doubled.observe(move |value| log.borrow_mut().push(*value))
    });

    assert!(log.borrow().is_empty());
    assert_eq!(doubled.value(), 2);

    source.set(2);
    assert_eq!(*log.borrow(), vec![4]);
}

#[test]
fn test_derived_observer_created_mid_mutation_ignores_unrelated_writes() {
    let runtime = Runtime::new();
    let source = runtime.mutable_cell(1);
    let unrelated = runtime.mutable_cell(0);
    let doubled = source.map(|v| v * 2);
    let log = Rc::new(RefCell::new(Vec::new()));

    let _observer = runtime.mutate(|| {
        let log = log.clone();
        let observer = doubled.observe(move |value| log.borrow_mut().push(*value));
        unrelated.set(5);
        observer
    });

    assert!(log.borrow().is_empty());

    source.set(4);
    assert_eq!(*log.borrow(), vec![8]);
}

#[test]
fn test_flattened_observer_created_mid_mutation_ignores_unrelated_writes() {
    let runtime = Runtime::new();
    let inner = runtime.mutable_cell(1);
    let outer = runtime.mutable_cell(inner.as_cell());
    let unrelated = runtime.mutable_cell(0);
    let flat = outer.flatten();
    let log = Rc::new(RefCell::new(Vec::new()));

    let _observer = runtime.mutate(|| {
        let log = log.clone();
        let observer = flat.observe(move |value| log.borrow_mut().push(*value));
        unrelated.set(5);
        observer
    });

    assert!(log.borrow().is_empty());

    inner.set(2);
    assert_eq!(*log.borrow(), vec![2]);
}

#[test]
fn test_observer_created_mid_mutation_on_observed_cell() {
    let runtime = Runtime::new();
    let source = runtime.mutable_cell(1);
    let doubled = source.map(|v| v * 2);
    let (first, _first_observer) = record(&doubled);
    let second = Rc::new(RefCell::new(Vec::new()));

    let _second_observer = runtime.mutate(|| {
        source.set(2);
        let second = second.clone();
        doubled.observe(move |value| second.borrow_mut().push(*value))
    });

    assert_eq!(*first.borrow(), vec![4]);
    assert!(second.borrow().is_empty());
}

// =============================================================================
// Custom Dependents
// =============================================================================

struct InvalidationCounter {
    count: StdCell<usize>,
}

impl Dependent for InvalidationCounter {
    fn dependency_invalidated(&self, _dependency: NodeId) {
        self.count.set(self.count.get() + 1);
    }
}

#[test]
fn test_custom_dependent_is_invalidated_once_per_mutation() {
    let runtime = Runtime::new();
    let source = runtime.mutable_cell(0);
    let derived = source.map(|v| v + 1);
    let counter = Rc::new(InvalidationCounter {
        count: StdCell::new(0),
    });
    let handle = runtime.register_dependent("Counter", &counter);
    derived.add_dependent(handle.id());

    runtime.mutate(|| {
        source.set(1);
        source.set(2);
    });
    assert_eq!(counter.count.get(), 1);

    source.set(3);
    assert_eq!(counter.count.get(), 2);

    derived.remove_dependent(handle.id());
    source.set(4);
    assert_eq!(counter.count.get(), 2);
    assert_eq!(source.dependent_count(), 0);
}
