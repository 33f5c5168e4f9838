//! Tests for the free constructors and cell combinators.

use std::cell::RefCell;
use std::rc::Rc;

use cell_flow::{
    cell, delegating_cell, false_cell, map3, mutable_cell, mutate, mutate_deferred, none_cell,
    observe_now2, observe_now3, observe_now4, observe_now5, true_cell, Disposer, Runtime,
};

#[test]
fn test_free_functions_use_current_runtime() {
    let a = mutable_cell(1);
    let runtime = Runtime::current();

    mutate(|| {
        a.set(2);
        assert!(runtime.in_transaction());
    });

    assert_eq!(a.value(), 2);
    assert!(!runtime.in_transaction());
}

#[test]
fn test_delegating_cell() {
    let storage = Rc::new(RefCell::new(vec![1]));
    let items = {
        let (get, set) = (storage.clone(), storage.clone());
        delegating_cell(move || get.borrow().clone(), move |v| *set.borrow_mut() = v)
    };
    let count = items.map(Vec::len);
    let log = Rc::new(RefCell::new(Vec::new()));
    let _observer = {
        let log = log.clone();
        count.observe(move |count| log.borrow_mut().push(*count))
    };

    items.set(vec![1, 2, 3]);

    assert_eq!(*storage.borrow(), vec![1, 2, 3]);
    assert_eq!(*log.borrow(), vec![3]);
}

#[test]
fn test_observe_now2_calls_once_per_mutation() {
    let a = mutable_cell(1);
    let b = mutable_cell("x".to_string());
    let log = Rc::new(RefCell::new(Vec::new()));
    let _observer = {
        let log = log.clone();
        observe_now2(&a, &b, move |a, b| log.borrow_mut().push(format!("{a}{b}")))
    };

    mutate(|| {
        a.set(2);
        b.set("y".to_string());
    });

    assert_eq!(*log.borrow(), vec!["1x".to_string(), "2y".to_string()]);
}

#[test]
fn test_observe_now3() {
    let a = mutable_cell(1);
    let b = mutable_cell(2);
    let c = mutable_cell(3);
    let sums = Rc::new(RefCell::new(Vec::new()));
    let _observer = {
        let sums = sums.clone();
        observe_now3(&a, &b, &c, move |a, b, c| sums.borrow_mut().push(a + b + c))
    };

    c.set(10);

    assert_eq!(*sums.borrow(), vec![6, 13]);
}

#[test]
fn test_observe_now4() {
    let cells: Vec<_> = (1..=4).map(mutable_cell).collect();
    let products = Rc::new(RefCell::new(Vec::new()));
    let _observer = {
        let products = products.clone();
        observe_now4(&cells[0], &cells[1], &cells[2], &cells[3], move |a, b, c, d| {
            products.borrow_mut().push(a * b * c * d)
        })
    };

    cells[3].set(5);

    assert_eq!(*products.borrow(), vec![24, 30]);
}

#[test]
fn test_observe_now5_calls_once_per_mutation() {
    let cells: Vec<_> = (1..=5).map(mutable_cell).collect();
    let sums = Rc::new(RefCell::new(Vec::new()));
    let _observer = {
        let sums = sums.clone();
        observe_now5(
            &cells[0],
            &cells[1],
            &cells[2],
            &cells[3],
            &cells[4],
            move |a, b, c, d, e| sums.borrow_mut().push(a + b + c + d + e),
        )
    };

    mutate(|| {
        cells[0].set(10);
        cells[4].set(50);
    });

    assert_eq!(*sums.borrow(), vec![15, 69]);
}

#[test]
fn test_map3() {
    let a = mutable_cell(1);
    let b = mutable_cell(2);
    let c = mutable_cell(3);
    let product = map3(&a, &b, &c, |a, b, c| a * b * c);

    assert_eq!(product.value(), 6);
    b.set(5);
    assert_eq!(product.value(), 15);
}

#[test]
fn test_option_combinators() {
    let maybe = mutable_cell(None::<i32>);
    let is_none = maybe.is_none();
    let is_some = maybe.is_some();
    let or_zero = maybe.or_else(|| 0);

    assert!(is_none.value());
    assert!(!is_some.value());
    assert_eq!(or_zero.value(), 0);

    maybe.set(Some(7));
    assert!(!is_none.value());
    assert!(is_some.value());
    assert_eq!(or_zero.value(), 7);
    assert_eq!(none_cell::<i32>().value(), None);
}

#[test]
fn test_comparisons() {
    let a = mutable_cell(3);
    let b = mutable_cell(5);

    assert!(a.eq_value(3).value());
    assert!(a.ne_cell(&b).value());
    assert!(a.lt_cell(&b).value());
    assert!(!a.gt_value(3).value());

    a.set(5);
    assert!(a.eq_cell(&b).value());
    assert!(!a.ne_value(5).value());
    assert!(a.gt_value(4).value());
    assert!(!a.lt_value(5).value());
    assert!(!a.gt_cell(&b).value());
}

#[test]
fn test_bool_combinators() {
    let a = mutable_cell(true);
    let b = mutable_cell(false);

    assert!(!a.and(&b).value());
    assert!(a.or(&b).value());
    assert!(a.xor(&b).value());
    assert!(!(!&*a).value());

    assert!(b.or_value(true).ptr_eq(&true_cell()));
    assert!(a.and_value(false).ptr_eq(&false_cell()));

    b.set(true);
    assert!(a.and(&b).value());
    assert!(!a.xor(&b).value());
}

#[test]
fn test_int_operators() {
    let a = mutable_cell(10);
    let plus = &*a + 5;
    let minus = a.as_cell() - 3;

    assert_eq!(plus.value(), 15);
    assert_eq!(minus.value(), 7);
    a.set(0);
    assert_eq!(plus.value(), 5);
    assert_eq!(minus.value(), -3);
}

#[test]
fn test_string_predicates() {
    let text = mutable_cell(String::new());
    let empty = text.is_empty();
    let not_empty = text.is_not_empty();
    let blank = text.is_blank();
    let not_blank = text.is_not_blank();

    assert!(empty.value() && blank.value());

    text.set("   ".to_string());
    assert!(not_empty.value());
    assert!(blank.value());

    text.set(" a ".to_string());
    assert!(not_blank.value());
    assert!(!empty.value());
}

#[test]
fn test_disposer_ends_all_subscriptions() {
    let a = mutable_cell(0);
    let b = mutable_cell(0);
    let mut disposer = Disposer::new();
    disposer.add(a.observe(|_| {}));
    disposer.add(b.observe(|_| {}));
    disposer.add(cell(1).observe(|_| {}));
    assert_eq!(a.dependent_count(), 1);

    disposer.dispose();

    assert_eq!(a.dependent_count(), 0);
    assert_eq!(b.dependent_count(), 0);
    assert!(disposer.is_disposed());
}

#[test]
fn test_free_mutate_deferred() {
    let a = mutable_cell(0);
    let b = mutable_cell(0);
    let _observer = {
        let b = b.clone();
        a.observe(move |value| {
            let (b, value) = (b.clone(), *value);
            mutate_deferred(move || b.set(value + 1));
        })
    };

    a.set(1);

    assert_eq!(b.value(), 2);
}
