//! Free constructors and combinators working on the current thread's default runtime.

use std::ops::{Add, Not, Sub};
use std::rc::Rc;

use crate::cell::{cell, Cell, CellValue, DependentCore, FlatteningCore, MutableCell};
use crate::{Dependency, Disposable, Runtime};

thread_local! {
    static TRUE_CELL: Cell<bool> = cell(true);
    static FALSE_CELL: Cell<bool> = cell(false);
    static ZERO_INT_CELL: Cell<i32> = cell(0);
    static EMPTY_STRING_CELL: Cell<String> = cell(String::new());
}

/// Shared immutable `true` cell.
pub fn true_cell() -> Cell<bool> {
    TRUE_CELL.with(Cell::clone)
}

/// Shared immutable `false` cell.
pub fn false_cell() -> Cell<bool> {
    FALSE_CELL.with(Cell::clone)
}

/// Shared immutable `0` cell.
pub fn zero_int_cell() -> Cell<i32> {
    ZERO_INT_CELL.with(Cell::clone)
}

/// Shared immutable empty string cell.
pub fn empty_string_cell() -> Cell<String> {
    EMPTY_STRING_CELL.with(Cell::clone)
}

/// Immutable cell holding `None`.
pub fn none_cell<T: CellValue>() -> Cell<Option<T>> {
    cell(None)
}

/// Writable cell in the default runtime. See [`Runtime::mutable_cell`].
pub fn mutable_cell<T: CellValue>(value: T) -> MutableCell<T> {
    Runtime::current().mutable_cell(value)
}

/// Writable cell backed by external storage, in the default runtime.
/// See [`Runtime::delegating_cell`].
pub fn delegating_cell<T: CellValue>(
    getter: impl Fn() -> T + 'static,
    setter: impl Fn(T) + 'static,
) -> MutableCell<T> {
    Runtime::current().delegating_cell(getter, setter)
}

/// Derived cell recomputed with `compute` when any of `dependencies` changes.
///
/// `compute` must only read the cells listed in `dependencies`. The cell lives in the
/// runtime of its dependencies.
///
/// # Example
///
/// ```
/// use cell_flow::{dependent_cell, mutable_cell};
///
/// let width = mutable_cell(2);
/// let height = mutable_cell(3);
/// let area = {
///     let (w, h) = (width.as_cell(), height.as_cell());
///     dependent_cell(vec![width.as_dependency(), height.as_dependency()], move || {
///         w.value() * h.value()
///     })
/// };
///
/// width.set(4);
/// assert_eq!(area.value(), 12);
/// ```
pub fn dependent_cell<T: CellValue>(
    dependencies: Vec<Rc<dyn Dependency>>,
    compute: impl Fn() -> T + 'static,
) -> Cell<T> {
    DependentCore::create(dependencies, compute)
}

/// Cell holding the value of the cell `compute` returns. `compute` must only read the
/// cells listed in `dependencies`.
pub fn flattening_cell<T: CellValue>(
    dependencies: Vec<Rc<dyn Dependency>>,
    compute: impl Fn() -> Cell<T> + 'static,
) -> Cell<T> {
    FlatteningCore::create(dependencies, compute)
}

pub fn map2<A: CellValue, B: CellValue, R: CellValue>(
    a: &Cell<A>,
    b: &Cell<B>,
    transform: impl Fn(&A, &B) -> R + 'static,
) -> Cell<R> {
    let (ca, cb) = (a.clone(), b.clone());
    DependentCore::create(vec![a.as_dependency(), b.as_dependency()], move || {
        transform(&ca.value(), &cb.value())
    })
}

pub fn map3<A: CellValue, B: CellValue, C: CellValue, R: CellValue>(
    a: &Cell<A>,
    b: &Cell<B>,
    c: &Cell<C>,
    transform: impl Fn(&A, &B, &C) -> R + 'static,
) -> Cell<R> {
    let (ca, cb, cc) = (a.clone(), b.clone(), c.clone());
    DependentCore::create(
        vec![a.as_dependency(), b.as_dependency(), c.as_dependency()],
        move || transform(&ca.value(), &cb.value(), &cc.value()),
    )
}

pub fn flat_map2<A: CellValue, B: CellValue, R: CellValue>(
    a: &Cell<A>,
    b: &Cell<B>,
    transform: impl Fn(&A, &B) -> Cell<R> + 'static,
) -> Cell<R> {
    let (ca, cb) = (a.clone(), b.clone());
    FlatteningCore::create(vec![a.as_dependency(), b.as_dependency()], move || {
        transform(&ca.value(), &cb.value())
    })
}

/// Call `observer` now and after every committed change of `a` or `b`.
///
/// A mutation changing both cells results in one call.
pub fn observe_now2<A: CellValue, B: CellValue>(
    a: &Cell<A>,
    b: &Cell<B>,
    mut observer: impl FnMut(&A, &B) + 'static,
) -> Disposable {
    map2(a, b, |a, b| (a.clone(), b.clone())).observe_now(move |(a, b)| observer(a, b))
}

pub fn observe_now3<A: CellValue, B: CellValue, C: CellValue>(
    a: &Cell<A>,
    b: &Cell<B>,
    c: &Cell<C>,
    mut observer: impl FnMut(&A, &B, &C) + 'static,
) -> Disposable {
    map3(a, b, c, |a, b, c| (a.clone(), b.clone(), c.clone()))
        .observe_now(move |(a, b, c)| observer(a, b, c))
}

pub fn observe_now4<A: CellValue, B: CellValue, C: CellValue, D: CellValue>(
    a: &Cell<A>,
    b: &Cell<B>,
    c: &Cell<C>,
    d: &Cell<D>,
    mut observer: impl FnMut(&A, &B, &C, &D) + 'static,
) -> Disposable {
    let (ca, cb, cc, cd) = (a.clone(), b.clone(), c.clone(), d.clone());
    DependentCore::create(
        vec![
            a.as_dependency(),
            b.as_dependency(),
            c.as_dependency(),
            d.as_dependency(),
        ],
        move || (ca.value(), cb.value(), cc.value(), cd.value()),
    )
    .observe_now(move |(a, b, c, d)| observer(a, b, c, d))
}

pub fn observe_now5<A: CellValue, B: CellValue, C: CellValue, D: CellValue, E: CellValue>(
    a: &Cell<A>,
    b: &Cell<B>,
    c: &Cell<C>,
    d: &Cell<D>,
    e: &Cell<E>,
    mut observer: impl FnMut(&A, &B, &C, &D, &E) + 'static,
) -> Disposable {
    let (ca, cb, cc, cd, ce) = (a.clone(), b.clone(), c.clone(), d.clone(), e.clone());
    DependentCore::create(
        vec![
            a.as_dependency(),
            b.as_dependency(),
            c.as_dependency(),
            d.as_dependency(),
            e.as_dependency(),
        ],
        move || (ca.value(), cb.value(), cc.value(), cd.value(), ce.value()),
    )
    .observe_now(move |(a, b, c, d, e)| observer(a, b, c, d, e))
}

impl<T: CellValue> Cell<Option<T>> {
    pub fn is_none(&self) -> Cell<bool> {
        self.map(Option::is_none)
    }

    pub fn is_some(&self) -> Cell<bool> {
        self.map(Option::is_some)
    }

    /// Cell holding the value, or `default()` when it is `None`.
    pub fn or_else(&self, default: impl Fn() -> T + 'static) -> Cell<T> {
        self.map(move |value| value.clone().unwrap_or_else(&default))
    }
}

impl<T: CellValue> Cell<T> {
    pub fn eq_value(&self, value: T) -> Cell<bool> {
        self.map(move |current| *current == value)
    }

    pub fn eq_cell(&self, other: &Cell<T>) -> Cell<bool> {
        map2(self, other, |a, b| a == b)
    }

    pub fn ne_value(&self, value: T) -> Cell<bool> {
        self.map(move |current| *current != value)
    }

    pub fn ne_cell(&self, other: &Cell<T>) -> Cell<bool> {
        map2(self, other, |a, b| a != b)
    }
}

impl<T: CellValue + PartialOrd> Cell<T> {
    pub fn gt_value(&self, value: T) -> Cell<bool> {
        self.map(move |current| *current > value)
    }

    pub fn gt_cell(&self, other: &Cell<T>) -> Cell<bool> {
        map2(self, other, |a, b| a > b)
    }

    pub fn lt_value(&self, value: T) -> Cell<bool> {
        self.map(move |current| *current < value)
    }

    pub fn lt_cell(&self, other: &Cell<T>) -> Cell<bool> {
        map2(self, other, |a, b| a < b)
    }
}

impl Cell<bool> {
    pub fn and(&self, other: &Cell<bool>) -> Cell<bool> {
        map2(self, other, |a, b| *a && *b)
    }

    /// `self` if `other` is true, the shared `false` cell otherwise.
    pub fn and_value(&self, other: bool) -> Cell<bool> {
        if other {
            self.clone()
        } else {
            false_cell()
        }
    }

    pub fn or(&self, other: &Cell<bool>) -> Cell<bool> {
        map2(self, other, |a, b| *a || *b)
    }

    /// The shared `true` cell if `other` is true, `self` otherwise.
    pub fn or_value(&self, other: bool) -> Cell<bool> {
        if other {
            true_cell()
        } else {
            self.clone()
        }
    }

    pub fn xor(&self, other: &Cell<bool>) -> Cell<bool> {
        map2(self, other, |a, b| a != b)
    }
}

impl Not for &Cell<bool> {
    type Output = Cell<bool>;

    fn not(self) -> Cell<bool> {
        self.map(|value| !value)
    }
}

impl Not for Cell<bool> {
    type Output = Cell<bool>;

    fn not(self) -> Cell<bool> {
        !&self
    }
}

impl Add<i32> for &Cell<i32> {
    type Output = Cell<i32>;

    fn add(self, rhs: i32) -> Cell<i32> {
        self.map(move |value| value + rhs)
    }
}

impl Add<i32> for Cell<i32> {
    type Output = Cell<i32>;

    fn add(self, rhs: i32) -> Cell<i32> {
        &self + rhs
    }
}

impl Sub<i32> for &Cell<i32> {
    type Output = Cell<i32>;

    fn sub(self, rhs: i32) -> Cell<i32> {
        self.map(move |value| value - rhs)
    }
}

impl Sub<i32> for Cell<i32> {
    type Output = Cell<i32>;

    fn sub(self, rhs: i32) -> Cell<i32> {
        &self - rhs
    }
}

impl Cell<String> {
    pub fn is_empty(&self) -> Cell<bool> {
        self.map(String::is_empty)
    }

    pub fn is_not_empty(&self) -> Cell<bool> {
        self.map(|value| !value.is_empty())
    }

    /// True when the string is empty or only holds whitespace.
    pub fn is_blank(&self) -> Cell<bool> {
        self.map(|value| value.trim().is_empty())
    }

    pub fn is_not_blank(&self) -> Cell<bool> {
        self.map(|value| !value.trim().is_empty())
    }
}
