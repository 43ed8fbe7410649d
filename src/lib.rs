//! In-memory indexing structures for data-profiling algorithms.
//!
//! Profiling algorithms that search for functional dependencies or unique
//! column combinations spend almost all of their time asking three questions:
//! which rows of a table agree on a given set of columns, has a partition for
//! a column combination already been computed, and does a stored combination
//! subsume a candidate. This crate answers them with three engines built on a
//! shared column-set value type:
//!
//! * [`StrippedPartition`]: equivalence classes of row indices (clusters of
//!   size ≥ 2; singletons are implicit) with a linear-time intersection
//!   algorithm, optionally parallelized over a [`WorkerPool`].
//! * [`SetTrie`]: a prefix tree over ascending column indices answering
//!   subset, superset, and minimal-set queries against a stored collection of
//!   combinations. Child storage is pluggable: a dense array for small, known
//!   universes or a sparse ordered map for wide ones.
//! * [`PartitionManager`]: builds the partition for an arbitrary combination
//!   by folding intersections of cached partitions, keeps results in a
//!   weight-bounded cache, and mirrors the cached keys in a [`SetTrie`] so
//!   callers can prune candidates without touching row data.
//!
//! Base partitions come from a single pass over the raw table rows
//! ([`scan_rows`]); everything above that operates purely on row indices.
//!
//! # Sharing and mutation
//! Partitions are immutable once constructed. The cache hands out
//! [`Arc`](std::sync::Arc)s; callers that need a private mutable copy clone
//! the partition. All manager operations are safe to call from multiple
//! threads; concurrent requests for the same missing combination may build it
//! more than once, which is harmless because builds are idempotent.

pub mod cache;
pub mod column_set;
pub mod partition;
pub mod pool;
pub mod table;
pub mod trie;

#[cfg(test)]
pub(crate) mod test_workloads;

pub use cache::{CacheSnapshot, PartitionManager};
pub use column_set::ColumnSet;
pub use partition::StrippedPartition;
pub use pool::WorkerPool;
pub use table::{scan_rows, NullPolicy, TableScan};
pub use trie::{DenseSetTrie, SetTrie, SparseSetTrie};

/// Errors reported by the indexing structures.
///
/// Bounds violations and build failures are deliberately separate variants:
/// the former means a caller referenced a column the universe does not have,
/// the latter that a structurally valid request could not be satisfied.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A column index at or beyond the declared universe size was used.
    #[error("column {column} out of bounds for universe of {universe} columns")]
    ColumnOutOfBounds { column: usize, universe: usize },

    /// A partition could not be constructed for the requested combination.
    #[error("partition build failed: {0}")]
    Build(String),

    /// The worker pool was used after [`WorkerPool::shutdown`].
    #[error("worker pool is shut down")]
    PoolShutdown,

    /// The underlying thread pool could not be constructed.
    #[error("failed to build worker pool")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    /// The row source failed mid-iteration. The original error is preserved
    /// unchanged as the source of this one.
    #[error("row source failed")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, Error>;
