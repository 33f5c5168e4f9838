//! Cell-Flow: fine-grained reactive cells with two-phase, glitch-free propagation.
//!
//! A [`MutableCell`] holds a value. Derived cells ([`Cell::map`], [`map2`],
//! [`dependent_cell`], [`Cell::flat_map`], ...) compute their value from other cells and
//! stay consistent with them. Observers ([`Cell::observe`]) are called back after every
//! committed change.
//!
//! # Key Features
//!
//! - **Two-phase mutations**: writes made inside [`mutate`] only mark the graph dirty;
//!   recomputation and notification happen once, when the outermost `mutate` returns
//! - **Glitch freedom**: an observer never sees a mix of old and new values, and is
//!   notified at most once per mutation
//! - **Lazy subscription**: a derived cell subscribes to its dependencies only while it
//!   is observed, and recomputes on every read otherwise
//! - **Early cutoff**: a derived cell whose value did not change stops propagation
//! - **Dynamic dependencies**: [`Cell::flat_map`] follows a cell chosen at runtime
//! - **Deferred mutations**: observers write through [`mutate_deferred`], which runs
//!   after the current commit phase
//!
//! # Example
//!
//! ```
//! use cell_flow::{map2, mutable_cell, mutate};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let first = mutable_cell(String::from("Ada"));
//! let last = mutable_cell(String::from("Lovelace"));
//! let full = map2(&first, &last, |first, last| format!("{first} {last}"));
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let observer = {
//!     let seen = seen.clone();
//!     full.observe(move |name| seen.borrow_mut().push(name.clone()))
//! };
//!
//! mutate(|| {
//!     first.set("Grace".to_string());
//!     last.set("Hopper".to_string());
//! });
//!
//! assert_eq!(*seen.borrow(), vec!["Grace Hopper".to_string()]);
//! observer.dispose();
//! ```
//!
//! # Runtimes
//!
//! Every cell belongs to a [`Runtime`]. The free functions use the thread's default
//! runtime ([`Runtime::current`]); create a [`Runtime`] explicitly to isolate graphs or
//! to attach a [`Tracer`].

mod cell;
mod collector;
mod disposable;
mod error;
mod node;
mod runtime;
pub mod tracer;
mod transaction;
mod utils;

pub use cell::{cell, Cell, CellNode, CellValue, ChangeEvent, MutableCell};
pub use collector::{CellEvent, EventCollector};
pub use disposable::{Disposable, Disposer};
pub use error::CellError;
pub use node::{Dependency, Dependent, NodeId, Revision};
pub use runtime::{
    mutate, mutate_deferred, NodeHandle, ObserverPanics, Runtime, RuntimeBuilder,
};
#[cfg(feature = "tracing")]
pub use tracer::TracingTracer;
pub use tracer::{NoopTracer, RecomputeResult, Tracer};
pub use transaction::Phase;
pub use utils::{
    delegating_cell, dependent_cell, empty_string_cell, false_cell, flat_map2,
    flattening_cell, map2, map3, mutable_cell, none_cell, observe_now2, observe_now3,
    observe_now4, observe_now5, true_cell, zero_int_cell,
};
