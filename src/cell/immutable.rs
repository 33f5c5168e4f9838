use std::rc::Rc;

use super::{Cell, CellNode, CellValue};
use crate::{Dependency, NodeId, Revision, Runtime};

const KIND: &str = "ImmutableCell";

/// A cell that never changes. It is not registered in any runtime.
pub(crate) struct ImmutableNode<T> {
    value: T,
}

impl<T: CellValue> CellNode<T> for ImmutableNode<T> {
    fn value(&self) -> T {
        self.value.clone()
    }

    fn changed_at(&self) -> Revision {
        Revision::default()
    }

    fn previous(&self) -> Option<T> {
        None
    }

    fn kind(&self) -> &'static str {
        KIND
    }
}

impl<T> Dependency for ImmutableNode<T> {
    fn node_id(&self) -> Option<NodeId> {
        None
    }

    fn runtime(&self) -> Option<&Runtime> {
        None
    }

    fn add_dependent(&self, _dependent: NodeId) {}

    fn remove_dependent(&self, _dependent: NodeId) {}
}

/// Create a cell that always holds `value`.
///
/// Immutable cells can be combined with cells of any runtime.
pub fn cell<T: CellValue>(value: T) -> Cell<T> {
    Cell::from_node(Rc::new(ImmutableNode { value }))
}
