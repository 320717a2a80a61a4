//! Error types for the reactive engine.
//!
//! Most engine operations cannot fail: reads outside an effect, triggers on
//! fields nobody observes and wraps of plain values are all ordinary no-ops.
//! The errors below are the conditions a caller has to see.

/// Failures reported by batch draining, batch bookkeeping and list growth.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReactiveError {
    /// Draining the pending queue did not settle within the configured
    /// number of passes. Usually an effect that writes state which
    /// (transitively) re-triggers itself.
    #[error("runaway update: batch did not settle after {passes} drain passes")]
    RunawayUpdate {
        /// The pass limit that was exceeded.
        passes: usize,
    },

    /// `end_batch` was called with no open batch scope.
    #[error("end_batch called without a matching start_batch")]
    UnbalancedBatch,

    /// A list write would grow the list past
    /// [`MAX_LIST_LEN`](crate::state::MAX_LIST_LEN) slots, or the storage
    /// could not be allocated. The list is left unchanged.
    #[error("cannot grow list to {requested} slots")]
    ListCapacity {
        /// The length the write needed.
        requested: usize,
    },
}

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;
