//! `branch-source`: reference implementations of `branch-core`'s external
//! collaborators: an in-memory columnar [`SourceReader`], a
//! `rayon`-backed [`WorkerPool`], and a minimal histogram accumulator,
//! plus the process-wide parallel-mode flag re-exported from `branch-core`
//! for convenience.
//!
//! [`SourceReader`]: branch_core::SourceReader
//! [`WorkerPool`]: branch_core::WorkerPool

pub mod error;
pub mod histogram;
pub mod in_memory;
pub mod rayon_pool;

pub use error::ColumnError;
pub use histogram::Histogram1D;
pub use in_memory::InMemoryColumnSource;
pub use rayon_pool::RayonWorkerPool;
