//! `branch-core`: the pipeline graph, per-entry dispatch engine, and
//! parallel execution driver for a declarative, lazily-evaluated query
//! engine over row-oriented tabular datasets.
//!
//! A pipeline is a rooted DAG: a [`chain::Chain`] fluently books derived
//! columns and filters against the source (or against an earlier point in
//! the chain), then terminates in an action that returns a
//! [`graph::ResultHandle`]. No work happens until a handle's `observe()` is
//! first called; that triggers one pass over the dataset, shared across
//! every action booked on the same [`graph::PipelineGraph`].
//!
//! The crate never reads a dataset or spawns a thread itself: it consumes
//! the [`source::SourceReader`] and [`pool::WorkerPool`] traits, with
//! `branch-source` supplying the reference implementations used in tests
//! and the demo binary.

pub mod action;
pub mod chain;
pub mod errors;
pub mod graph;
pub mod node;
pub mod pool;
pub mod report;
pub mod source;
pub mod value;

pub use action::{Histogrammish, ActionDyn};
pub use chain::Chain;
pub use errors::EngineError;
pub use graph::{PipelineGraph, ResultHandle};
pub use node::NodeHandle;
pub use pool::{parallel_config, set_parallel_config, ParallelConfig, WorkerPool};
pub use report::{CutflowLine, CutflowReport};
pub use source::{partition_ranges, ColumnDirectoryEntry, RowCursor, SourceReader};
pub use value::{ColumnKind, ColumnValue};
