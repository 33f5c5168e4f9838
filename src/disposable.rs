//! Handles that end subscriptions.

use std::fmt;

use crate::CellError;

/// Ends a subscription when disposed or dropped.
///
/// Disposing is idempotent: the dispose action runs at most once.
///
/// # Example
///
/// ```
/// use cell_flow::Runtime;
///
/// let runtime = Runtime::new();
/// let cell = runtime.mutable_cell(0);
/// let observer = cell.observe(|value| println!("{value}"));
/// assert_eq!(cell.dependent_count(), 1);
///
/// observer.dispose();
/// assert_eq!(cell.dependent_count(), 0);
/// ```
#[must_use = "dropping a Disposable ends the subscription right away"]
pub struct Disposable {
    action: Option<Box<dyn FnOnce()>>,
}

impl Disposable {
    /// Create a disposable running `action` once.
    pub fn new(action: impl FnOnce() + 'static) -> Self {
        Self {
            action: Some(Box::new(action)),
        }
    }

    /// A disposable that does nothing.
    pub fn noop() -> Self {
        Self { action: None }
    }

    /// Run the dispose action.
    pub fn dispose(mut self) {
        self.run();
    }

    /// Returns true if the dispose action has not run yet.
    pub fn is_active(&self) -> bool {
        self.action.is_some()
    }

    fn run(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}

impl Default for Disposable {
    fn default() -> Self {
        Self::noop()
    }
}

impl Drop for Disposable {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("active", &self.is_active())
            .finish()
    }
}

/// A bag of [`Disposable`]s disposed together, in the order they were added.
///
/// Dropping the disposer disposes everything it holds.
#[derive(Debug, Default)]
pub struct Disposer {
    disposables: Vec<Disposable>,
    disposed: bool,
}

impl Disposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a disposable.
    ///
    /// # Panics
    ///
    /// Panics if this disposer was disposed with [`Disposer::dispose`]. The disposable is
    /// disposed before panicking.
    pub fn add(&mut self, disposable: Disposable) {
        if let Err(err) = self.try_add(disposable) {
            panic!("{err}");
        }
    }

    /// Add a disposable, or dispose it right away and return `CellError::Disposed` if
    /// this disposer was already disposed.
    pub fn try_add(&mut self, disposable: Disposable) -> Result<(), CellError> {
        if self.disposed {
            disposable.dispose();
            return Err(CellError::Disposed);
        }
        self.disposables.push(disposable);
        Ok(())
    }

    pub fn add_all(&mut self, disposables: impl IntoIterator<Item = Disposable>) {
        for disposable in disposables {
            self.add(disposable);
        }
    }

    /// Dispose everything added so far. The disposer stays usable.
    pub fn dispose_all(&mut self) {
        for disposable in self.disposables.drain(..) {
            disposable.dispose();
        }
    }

    /// Dispose everything and refuse further additions.
    pub fn dispose(&mut self) {
        self.dispose_all();
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn len(&self) -> usize {
        self.disposables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.disposables.is_empty()
    }
}

impl Extend<Disposable> for Disposer {
    fn extend<I: IntoIterator<Item = Disposable>>(&mut self, iter: I) {
        self.add_all(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn logging(log: &Rc<RefCell<Vec<&'static str>>>, name: &'static str) -> Disposable {
        let log = log.clone();
        Disposable::new(move || log.borrow_mut().push(name))
    }

    #[test]
    fn test_dispose_runs_once() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let disposable = logging(&log, "a");
        assert!(disposable.is_active());

        disposable.dispose();
        assert_eq!(*log.borrow(), vec!["a"]);
    }

    #[test]
    fn test_drop_disposes() {
        let log = Rc::new(RefCell::new(Vec::new()));
        drop(logging(&log, "a"));
        assert_eq!(*log.borrow(), vec!["a"]);
    }

    #[test]
    fn test_disposer_keeps_insertion_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut disposer = Disposer::new();
        disposer.add(logging(&log, "first"));
        disposer.extend([logging(&log, "second"), logging(&log, "third")]);
        assert_eq!(disposer.len(), 3);

        disposer.dispose_all();
        assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
        assert!(disposer.is_empty());
        assert!(!disposer.is_disposed());
    }

    #[test]
    fn test_add_after_dispose() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut disposer = Disposer::new();
        disposer.dispose();

        assert_eq!(
            disposer.try_add(logging(&log, "late")),
            Err(CellError::Disposed)
        );
        assert_eq!(*log.borrow(), vec!["late"]);
    }

    #[test]
    fn test_dropping_disposer_disposes_contents() {
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let mut disposer = Disposer::new();
            disposer.add(logging(&log, "a"));
        }
        assert_eq!(*log.borrow(), vec!["a"]);
    }
}
