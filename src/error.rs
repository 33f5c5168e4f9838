//! Error types for cell mutation and subscription.

use thiserror::Error;

use crate::NodeId;

/// Programming errors detected by the runtime.
///
/// User errors raised inside a [`mutate`](crate::mutate) block are not represented here:
/// an `Err` returned by the block is handed back to the caller untouched, and a panic is
/// resumed after the commit phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellError {
    /// A source cell was written while observers were being notified.
    ///
    /// Use [`mutate_deferred`](crate::mutate_deferred) to schedule the write after the
    /// current commit phase instead.
    #[error("cannot write to cell {node} during the commit phase, use mutate_deferred instead")]
    WriteDuringCommit {
        /// The cell that was written.
        node: NodeId,
    },

    /// `mutate` was called while observers were being notified.
    #[error("cannot start a mutation during the commit phase, use mutate_deferred instead")]
    MutateDuringCommit,

    /// A write was recorded on a custom node outside of any mutation.
    #[error("node {node} was written outside of a mutation")]
    NoTransaction {
        /// The node that was written.
        node: NodeId,
    },

    /// A derived cell combined cells owned by different runtimes.
    #[error("cells from different runtimes cannot depend on each other")]
    RuntimeMismatch,

    /// Deferred mutations kept scheduling more deferred mutations.
    #[error("more than {limit} deferred mutations were drained in a single transaction")]
    DeferredLimitExceeded {
        /// The configured limit.
        limit: usize,
    },

    /// A disposable was added to a disposer that has already been disposed.
    #[error("disposer has already been disposed")]
    Disposed,
}
