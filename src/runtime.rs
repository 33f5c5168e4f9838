//! Runtime: node arena, transaction engine and the thread's default instance.

use std::any::Any;
use std::cell::{Cell as StdCell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use slab::Slab;

use crate::node::NodeEntry;
use crate::tracer::{NoopTracer, Tracer};
use crate::transaction::{Phase, Transaction};
use crate::{CellError, Dependency, Dependent, NodeId, Revision};

type PanicPayload = Box<dyn Any + Send>;

// Default runtime used by the free functions of this crate.
thread_local! {
    static CURRENT: RefCell<Option<Runtime>> = const { RefCell::new(None) };
}

/// What the runtime does with a panic raised by an observer during the commit phase.
///
/// In both cases the panic is caught, reported to the [`Tracer`], and the remaining
/// observers of the batch are still notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObserverPanics {
    /// Resume the first observer panic once the transaction is closed.
    #[default]
    Resume,
    /// Only report observer panics to the tracer.
    Report,
}

/// Runtime owns a cell graph: the node arena, the transaction state and the
/// revision counter.
///
/// This is cheap to clone, so you can pass it around by just cloning it. Every cell
/// keeps a handle to the runtime it was created in.
///
/// # Example
///
/// ```
/// use cell_flow::Runtime;
///
/// let runtime = Runtime::new();
/// let a = runtime.mutable_cell(1);
/// let b = runtime.mutable_cell(2);
/// let sum = cell_flow::map2(&a, &b, |a, b| a + b);
///
/// runtime.mutate(|| {
///     a.set(10);
///     b.set(20);
/// });
/// assert_eq!(sum.value(), 30);
/// ```
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

struct RuntimeInner {
    nodes: RefCell<Slab<NodeEntry>>,
    next_generation: StdCell<u64>,
    revision: StdCell<Revision>,
    transaction: RefCell<Transaction>,
    tracer: Box<dyn Tracer>,
    observer_panics: ObserverPanics,
    max_deferred: Option<usize>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Runtime {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl PartialEq for Runtime {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Runtime {}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tx = self.inner.transaction.borrow();
        f.debug_struct("Runtime")
            .field("phase", &tx.phase)
            .field("batch", &tx.batch)
            .field("revision", &self.inner.revision.get())
            .field("nodes", &self.inner.nodes.borrow().len())
            .finish()
    }
}

impl Runtime {
    /// Create a new runtime with default settings.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for customizing the runtime.
    ///
    /// # Example
    ///
    /// ```
    /// use cell_flow::{ObserverPanics, Runtime};
    ///
    /// let runtime = Runtime::builder()
    ///     .observer_panics(ObserverPanics::Report)
    ///     .max_deferred(1_000)
    ///     .build();
    /// ```
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// The runtime used by the free functions ([`mutable_cell`](crate::mutable_cell),
    /// [`mutate`], ...) on this thread. Created on first use.
    pub fn current() -> Runtime {
        CURRENT.with(|current| {
            current
                .borrow_mut()
                .get_or_insert_with(Runtime::new)
                .clone()
        })
    }

    /// Make this runtime the one returned by [`Runtime::current`] on this thread.
    ///
    /// Cells created before the switch keep using the runtime they were created in.
    pub fn make_current(&self) {
        CURRENT.with(|current| *current.borrow_mut() = Some(self.clone()));
    }

    /// Revision of the most recent write.
    pub fn revision(&self) -> Revision {
        self.inner.revision.get()
    }

    /// Current phase of the transaction state machine.
    pub fn phase(&self) -> Phase {
        self.inner.transaction.borrow().phase
    }

    /// Id of the current (or most recent) batch.
    pub fn batch(&self) -> u64 {
        self.inner.transaction.borrow().batch
    }

    /// Nesting depth of `mutate` calls, 0 outside of any transaction.
    pub fn depth(&self) -> usize {
        self.inner.transaction.borrow().depth
    }

    /// Returns true while a transaction is open (write or commit phase).
    pub fn in_transaction(&self) -> bool {
        self.phase() != Phase::Idle
    }

    /// Number of live nodes in the arena.
    pub fn node_count(&self) -> usize {
        self.inner.nodes.borrow().len()
    }

    pub(crate) fn is_writing(&self) -> bool {
        self.phase() == Phase::Writing
    }

    /// Batch id if the write phase is running.
    pub(crate) fn writing_batch(&self) -> Option<u64> {
        let tx = self.inner.transaction.borrow();
        (tx.phase == Phase::Writing).then_some(tx.batch)
    }

    pub(crate) fn tracer(&self) -> &dyn Tracer {
        self.inner.tracer.as_ref()
    }

    // ------------------------------------------------------------------
    // Node arena
    // ------------------------------------------------------------------

    fn entry(nodes: &Slab<NodeEntry>, id: NodeId) -> Option<&NodeEntry> {
        nodes
            .get(id.index)
            .filter(|entry| entry.generation == id.generation)
    }

    fn entry_mut(nodes: &mut Slab<NodeEntry>, id: NodeId) -> Option<&mut NodeEntry> {
        nodes
            .get_mut(id.index)
            .filter(|entry| entry.generation == id.generation)
    }

    pub(crate) fn register(
        &self,
        kind: &'static str,
        handler: Option<Weak<dyn Dependent>>,
    ) -> NodeId {
        let generation = self.inner.next_generation.get();
        self.inner.next_generation.set(generation + 1);
        let index = self
            .inner
            .nodes
            .borrow_mut()
            .insert(NodeEntry::new(generation, kind, handler));
        NodeId { index, generation }
    }

    pub(crate) fn unregister(&self, id: NodeId) {
        let mut nodes = self.inner.nodes.borrow_mut();
        if Self::entry(&nodes, id).is_some() {
            nodes.remove(id.index);
        }
    }

    /// Register a custom node that only acts as a [`Dependency`].
    ///
    /// The node is removed from the arena when the handle is dropped.
    pub fn register_dependency(&self, kind: &'static str) -> NodeHandle {
        NodeHandle {
            runtime: self.clone(),
            id: self.register(kind, None),
        }
    }

    /// Register a custom [`Dependent`]. The runtime only keeps a weak reference to it.
    ///
    /// The node is removed from the arena when the handle is dropped. Remove it from its
    /// dependencies before that.
    pub fn register_dependent<D: Dependent + 'static>(
        &self,
        kind: &'static str,
        dependent: &Rc<D>,
    ) -> NodeHandle {
        let weak = Rc::downgrade(dependent);
        let handler: Weak<dyn Dependent> = weak;
        NodeHandle {
            runtime: self.clone(),
            id: self.register(kind, Some(handler)),
        }
    }

    /// Register `dependent` on `dependency`. Returns true if it is the first registration.
    pub fn add_dependent(&self, dependency: NodeId, dependent: NodeId) -> bool {
        let mut nodes = self.inner.nodes.borrow_mut();
        Self::entry_mut(&mut nodes, dependency)
            .map(|entry| entry.push_dependent(dependent))
            .unwrap_or(false)
    }

    /// Undo one registration. Returns true if `dependency` has no dependents left.
    pub fn remove_dependent(&self, dependency: NodeId, dependent: NodeId) -> bool {
        let mut nodes = self.inner.nodes.borrow_mut();
        Self::entry_mut(&mut nodes, dependency)
            .map(|entry| entry.pop_dependent(dependent))
            .unwrap_or(false)
    }

    /// Number of distinct dependents currently registered on `node`.
    pub fn dependent_count(&self, node: NodeId) -> usize {
        let nodes = self.inner.nodes.borrow();
        Self::entry(&nodes, node)
            .map(NodeEntry::distinct_dependents)
            .unwrap_or(0)
    }

    /// Kind name `node` was registered with, `None` if it no longer exists.
    pub fn kind(&self, node: NodeId) -> Option<&'static str> {
        let nodes = self.inner.nodes.borrow();
        Self::entry(&nodes, node).map(|entry| entry.kind)
    }

    fn handler(&self, id: NodeId) -> Option<Rc<dyn Dependent>> {
        let nodes = self.inner.nodes.borrow();
        Self::entry(&nodes, id)
            .and_then(|entry| entry.handler.as_ref())
            .and_then(Weak::upgrade)
    }

    // ------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------

    /// Record a write to a source node in the current batch and bump the revision.
    ///
    /// Returns true if this is the first write to `node` in the batch; only then should
    /// the caller push invalidation with [`Runtime::invalidate_dependents`].
    ///
    /// # Errors
    ///
    /// - `CellError::WriteDuringCommit` - observers are being notified
    /// - `CellError::NoTransaction` - no `mutate` block is running
    pub fn record_write(&self, node: NodeId) -> Result<bool, CellError> {
        let first = {
            let mut tx = self.inner.transaction.borrow_mut();
            match tx.phase {
                Phase::Idle => return Err(CellError::NoTransaction { node }),
                Phase::Committing => return Err(CellError::WriteDuringCommit { node }),
                Phase::Writing => tx.record_write(node),
            }
        };
        let revision = self.inner.revision.get().next();
        self.inner.revision.set(revision);
        self.inner.tracer.on_write(node, revision);
        Ok(first)
    }

    /// Notify every dependent registered on `node` that it was invalidated.
    ///
    /// A dependent registered more than once is notified once.
    pub fn invalidate_dependents(&self, node: NodeId) {
        let targets: Vec<Rc<dyn Dependent>> = {
            let nodes = self.inner.nodes.borrow();
            let Some(entry) = Self::entry(&nodes, node) else {
                return;
            };
            entry
                .dependents
                .keys()
                .filter_map(|dependent| {
                    Self::entry(&nodes, *dependent)?
                        .handler
                        .as_ref()?
                        .upgrade()
                })
                .collect()
        };
        for dependent in targets {
            dependent.dependency_invalidated(node);
        }
    }

    /// Ask for [`Dependent::pull`] to be called on `node` during the next commit phase.
    pub fn schedule_pull(&self, node: NodeId) {
        self.inner.transaction.borrow_mut().schedule(node);
    }

    /// Returns true if `node` was not invalidated yet in the current batch, and stamps
    /// `last_batch` with it.
    pub(crate) fn first_invalidation(
        &self,
        node: NodeId,
        dependency: NodeId,
        last_batch: &StdCell<u64>,
    ) -> bool {
        let batch = self.batch();
        if last_batch.replace(batch) == batch {
            return false;
        }
        self.inner.tracer.on_invalidated(node, dependency);
        true
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Run `block` as a mutation.
    ///
    /// Opens a transaction if none is open, otherwise joins the open one. When the
    /// outermost call returns, all writes made by `block` are committed at once: every
    /// dirty cell is recomputed once and every affected observer is notified once.
    /// Deferred mutations scheduled during the commit run before this returns.
    ///
    /// The commit also runs when `block` panics; the panic is resumed afterwards.
    ///
    /// # Panics
    ///
    /// Panics when called from an observer during the commit phase. Use
    /// [`Runtime::mutate_deferred`] there.
    pub fn mutate<R>(&self, block: impl FnOnce() -> R) -> R {
        match self.try_mutate(block) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Like [`Runtime::mutate`], but reports a mutation attempted during the commit phase
    /// as `CellError::MutateDuringCommit` instead of panicking.
    pub fn try_mutate<R>(&self, block: impl FnOnce() -> R) -> Result<R, CellError> {
        match self.phase() {
            Phase::Committing => Err(CellError::MutateDuringCommit),
            Phase::Writing => {
                let _nested = NestedGuard::enter(self);
                Ok(block())
            }
            Phase::Idle => Ok(self.run_transaction(block)),
        }
    }

    /// Run `block` after the current commit phase, as a fresh mutation.
    ///
    /// When no transaction is open this behaves like [`Runtime::mutate`]. This is the
    /// only way for an observer to write to cells.
    pub fn mutate_deferred(&self, block: impl FnOnce() + 'static) {
        let mut tx = self.inner.transaction.borrow_mut();
        if tx.phase == Phase::Idle {
            drop(tx);
            self.mutate(block);
            return;
        }
        let pending = tx.enqueue(Box::new(block));
        drop(tx);
        self.inner.tracer.on_deferred_enqueued(pending);
    }

    fn run_transaction<R>(&self, block: impl FnOnce() -> R) -> R {
        let _close = CloseGuard { runtime: self };
        let batch = self.inner.transaction.borrow_mut().open();
        self.inner.tracer.on_transaction_start(batch);

        let outcome = panic::catch_unwind(AssertUnwindSafe(block));
        let pending = self.drain();

        match outcome {
            Ok(value) => {
                if let Some(payload) = pending {
                    panic::resume_unwind(payload);
                }
                value
            }
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Commit the current batch, then run deferred mutations one batch at a time until
    /// none are left. Returns the first panic to resume.
    fn drain(&self) -> Option<PanicPayload> {
        let mut pending = None;
        let mut drained = 0usize;
        loop {
            self.commit(&mut pending);

            let next = self.inner.transaction.borrow_mut().next_deferred();
            let Some(mutation) = next else {
                break;
            };

            drained += 1;
            if let Some(limit) = self.inner.max_deferred {
                if drained > limit {
                    let err = CellError::DeferredLimitExceeded { limit };
                    pending.get_or_insert_with(|| Box::new(err.to_string()) as PanicPayload);
                    break;
                }
            }

            let batch = self.inner.transaction.borrow_mut().open();
            self.inner.tracer.on_transaction_start(batch);
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(mutation)) {
                pending.get_or_insert(payload);
            }
        }
        pending
    }

    fn commit(&self, pending: &mut Option<PanicPayload>) {
        let (batch, roots, leaves) = {
            let mut tx = self.inner.transaction.borrow_mut();
            let batch = tx.batch;
            let (roots, leaves) = tx.begin_commit();
            (batch, roots, leaves)
        };
        self.inner
            .tracer
            .on_commit(batch, roots.len(), leaves.len());

        for leaf in leaves {
            let Some(dependent) = self.handler(leaf) else {
                continue;
            };
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| dependent.pull())) {
                self.inner
                    .tracer
                    .on_observer_panicked(leaf, panic_message(payload.as_ref()));
                if self.inner.observer_panics == ObserverPanics::Resume {
                    pending.get_or_insert(payload);
                }
            }
        }
    }
}

/// Depth counter for nested `mutate` calls.
struct NestedGuard<'a> {
    runtime: &'a Runtime,
}

impl<'a> NestedGuard<'a> {
    fn enter(runtime: &'a Runtime) -> Self {
        runtime.inner.transaction.borrow_mut().depth += 1;
        Self { runtime }
    }
}

impl Drop for NestedGuard<'_> {
    fn drop(&mut self) {
        let mut tx = self.runtime.inner.transaction.borrow_mut();
        tx.depth = tx.depth.saturating_sub(1);
    }
}

/// Closes the transaction on every exit path of the outermost `mutate`.
struct CloseGuard<'a> {
    runtime: &'a Runtime,
}

impl Drop for CloseGuard<'_> {
    fn drop(&mut self) {
        let batch = {
            let mut tx = self.runtime.inner.transaction.borrow_mut();
            tx.reset();
            tx.batch
        };
        self.runtime.inner.tracer.on_transaction_end(batch);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Handle of a custom node registered with [`Runtime::register_dependency`] or
/// [`Runtime::register_dependent`].
pub struct NodeHandle {
    runtime: Runtime,
    id: NodeId,
}

impl NodeHandle {
    /// Id of the registered node.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Number of distinct dependents registered on this node.
    pub fn dependent_count(&self) -> usize {
        self.runtime.dependent_count(self.id)
    }
}

impl Dependency for NodeHandle {
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

impl Drop for NodeHandle {
    fn drop(&mut self) {
        self.runtime.unregister(self.id);
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle").field("id", &self.id).finish()
    }
}

/// Builder for [`Runtime`].
pub struct RuntimeBuilder {
    tracer: Box<dyn Tracer>,
    observer_panics: ObserverPanics,
    max_deferred: Option<usize>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    /// Create a builder with default settings: no tracing, observer panics resumed,
    /// unbounded deferred draining.
    pub fn new() -> Self {
        Self {
            tracer: Box::new(NoopTracer),
            observer_panics: ObserverPanics::default(),
            max_deferred: None,
        }
    }

    /// Set the tracer that receives engine events.
    pub fn tracer(mut self, tracer: impl Tracer) -> Self {
        self.tracer = Box::new(tracer);
        self
    }

    /// Set what happens to observer panics caught during the commit phase.
    pub fn observer_panics(mut self, policy: ObserverPanics) -> Self {
        self.observer_panics = policy;
        self
    }

    /// Limit the number of deferred mutations drained by one outermost `mutate`.
    ///
    /// When the limit is exceeded, the remaining deferred mutations are dropped and the
    /// `mutate` call panics with `CellError::DeferredLimitExceeded`.
    pub fn max_deferred(mut self, limit: usize) -> Self {
        self.max_deferred = Some(limit);
        self
    }

    /// Build the runtime.
    pub fn build(self) -> Runtime {
        Runtime {
            inner: Rc::new(RuntimeInner {
                nodes: RefCell::new(Slab::new()),
                next_generation: StdCell::new(0),
                revision: StdCell::new(Revision::default()),
                transaction: RefCell::new(Transaction::default()),
                tracer: self.tracer,
                observer_panics: self.observer_panics,
                max_deferred: self.max_deferred,
            }),
        }
    }
}

/// Run `block` as a mutation on the current thread's default runtime.
///
/// See [`Runtime::mutate`].
pub fn mutate<R>(block: impl FnOnce() -> R) -> R {
    Runtime::current().mutate(block)
}

/// Schedule `block` after the current commit phase of the default runtime.
///
/// See [`Runtime::mutate_deferred`].
pub fn mutate_deferred(block: impl FnOnce() + 'static) {
    Runtime::current().mutate_deferred(block)
}
