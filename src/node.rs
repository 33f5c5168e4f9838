use std::fmt;
use std::rc::Weak;

use indexmap::IndexMap;

use crate::Runtime;

/// NodeId is a handle to a node in a [`Runtime`] arena.
///
/// Slots are reused after a node is dropped, so every id also carries the generation of
/// the slot it was issued for. A stale id never resolves to a newer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId {
    pub(crate) index: usize,
    pub(crate) generation: u64,
}

impl NodeId {
    /// Index of the arena slot this id points at.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

/// Revision is a monotonically increasing number bumped on every source write.
///
/// Each cell remembers the revision at which its value last changed, and each observer
/// remembers the last revision it delivered. Note that this does not increase one by one
/// per cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Revision(pub u64);

impl Revision {
    pub(crate) fn next(self) -> Self {
        Revision(self.0 + 1)
    }
}

/// A node that can notify registered [`Dependent`]s when it is invalidated.
///
/// Every cell is a `Dependency`. Custom nodes (e.g. list-structured cells) implement this
/// trait on top of the registration methods of [`Runtime`].
pub trait Dependency {
    /// Identity of this node, `None` for nodes that can never change.
    fn node_id(&self) -> Option<NodeId>;

    /// Runtime that owns this node, `None` for nodes that can never change.
    fn runtime(&self) -> Option<&Runtime>;

    /// Register `dependent` to be notified when this node is invalidated.
    ///
    /// The same dependent may be registered more than once; it is notified once per
    /// invalidation regardless.
    fn add_dependent(&self, dependent: NodeId);

    /// Undo one earlier [`add_dependent`](Dependency::add_dependent) call.
    fn remove_dependent(&self, dependent: NodeId);
}

/// A node that reacts to invalidation of the dependencies it is registered with.
pub trait Dependent {
    /// Called synchronously during the write phase of a mutation.
    ///
    /// Implementations must only mark themselves dirty and forward the invalidation.
    /// Reading any cell value from here breaks the two-phase discipline.
    fn dependency_invalidated(&self, dependency: NodeId);

    /// Called during the commit phase for dependents that scheduled themselves with
    /// [`Runtime::schedule_pull`].
    fn pull(&self) {}
}

/// Arena slot of a node.
pub(crate) struct NodeEntry {
    pub generation: u64,
    pub kind: &'static str,
    /// Registration count per dependent, in first-registration order.
    pub dependents: IndexMap<NodeId, usize, ahash::RandomState>,
    pub handler: Option<Weak<dyn Dependent>>,
}

impl NodeEntry {
    pub fn new(
        generation: u64,
        kind: &'static str,
        handler: Option<Weak<dyn Dependent>>,
    ) -> Self {
        Self {
            generation,
            kind,
            dependents: IndexMap::default(),
            handler,
        }
    }

    /// Returns true if this is the first registration.
    pub fn push_dependent(&mut self, dependent: NodeId) -> bool {
        let first = self.dependents.is_empty();
        *self.dependents.entry(dependent).or_insert(0) += 1;
        first
    }

    /// Removes one registration. Returns true if no registrations remain afterwards.
    pub fn pop_dependent(&mut self, dependent: NodeId) -> bool {
        let Some(count) = self.dependents.get_mut(&dependent) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            self.dependents.shift_remove(&dependent);
        }
        self.dependents.is_empty()
    }

    /// Number of distinct dependents.
    pub fn distinct_dependents(&self) -> usize {
        self.dependents.len()
    }
}
