//! The user-facing booking surface: a thin, fluent wrapper over
//! [`PipelineGraph`] that mirrors the way callers actually write a
//! pipeline, `source.filter(...).define(...).filter(...).count()`, without
//! exposing the graph's internal node-handle bookkeeping.
//!
//! `Chain` is cheap to clone (an `Arc<PipelineGraph>` and a `NodeHandle`):
//! booking off the same point in the graph more than once is how a single
//! source fans out into several actions sharing one pass.

use std::sync::Arc;

use crate::action::{
    ActionDyn, CountAction, ForEachAction, ForEachSlotAction, Histogrammish, HistogramAction,
    MeanAction, MinMaxAction, ReduceAction, TakeAction,
};
use crate::errors::EngineError;
use crate::graph::{PipelineGraph, ResultHandle};
use crate::node::NodeHandle;
use crate::value::{ColumnKind, ColumnValue};

#[derive(Clone)]
pub struct Chain {
    graph: Arc<PipelineGraph>,
    handle: NodeHandle,
}

impl Chain {
    /// A chain rooted at `graph`'s source, with no filters applied yet.
    pub fn root(graph: &Arc<PipelineGraph>) -> Self {
        Self { graph: graph.clone(), handle: NodeHandle::Root }
    }

    pub fn handle(&self) -> NodeHandle {
        self.handle
    }

    pub fn graph(&self) -> &Arc<PipelineGraph> {
        &self.graph
    }

    /// Books a derived column and returns a chain continuing from it.
    pub fn define(
        &self,
        name: impl Into<String>,
        out_kind: ColumnKind,
        in_kinds: Vec<ColumnKind>,
        inputs: Option<Vec<String>>,
        callable: impl Fn(&[ColumnValue]) -> Result<ColumnValue, EngineError> + Send + Sync + 'static,
    ) -> Result<Chain, EngineError> {
        let handle = self.graph.book_derived(self.handle, name, out_kind, in_kinds, inputs, callable)?;
        Ok(Chain { graph: self.graph.clone(), handle })
    }

    /// Books an unnamed filter and returns a chain continuing from it.
    pub fn filter(
        &self,
        in_kinds: Vec<ColumnKind>,
        inputs: Option<Vec<String>>,
        callable: impl Fn(&[ColumnValue]) -> Result<bool, EngineError> + Send + Sync + 'static,
    ) -> Result<Chain, EngineError> {
        let handle = self.graph.book_filter(self.handle, in_kinds, inputs, None, callable)?;
        Ok(Chain { graph: self.graph.clone(), handle })
    }

    /// Books a named filter, additionally indexed for the cutflow report.
    pub fn filter_named(
        &self,
        name: impl Into<String>,
        in_kinds: Vec<ColumnKind>,
        inputs: Option<Vec<String>>,
        callable: impl Fn(&[ColumnValue]) -> Result<bool, EngineError> + Send + Sync + 'static,
    ) -> Result<Chain, EngineError> {
        let handle = self
            .graph
            .book_filter(self.handle, in_kinds, inputs, Some(name.into()), callable)?;
        Ok(Chain { graph: self.graph.clone(), handle })
    }

    fn book<T: Send + Sync + 'static>(
        &self,
        in_kinds: Vec<ColumnKind>,
        inputs: Option<Vec<String>>,
        action: Arc<dyn ActionDyn>,
    ) -> Result<ResultHandle<T>, EngineError> {
        self.graph.book_action(self.handle, in_kinds, inputs, action)
    }

    /// Counts rows reaching this point in the chain.
    pub fn count(&self) -> Result<ResultHandle<u64>, EngineError> {
        self.book(Vec::new(), Some(Vec::new()), Arc::new(CountAction::new()))
    }

    /// Appends the value of `input` for every accepted row, in
    /// slot-index-merged order.
    pub fn take(&self, kind: ColumnKind, input: impl Into<String>) -> Result<ResultHandle<Vec<ColumnValue>>, EngineError> {
        self.book(vec![kind], Some(vec![input.into()]), Arc::new(TakeAction::new()))
    }

    pub fn min(&self, kind: ColumnKind, input: impl Into<String>) -> Result<ResultHandle<ColumnValue>, EngineError> {
        self.book(vec![kind], Some(vec![input.into()]), Arc::new(MinMaxAction::min()))
    }

    pub fn max(&self, kind: ColumnKind, input: impl Into<String>) -> Result<ResultHandle<ColumnValue>, EngineError> {
        self.book(vec![kind], Some(vec![input.into()]), Arc::new(MinMaxAction::max()))
    }

    pub fn mean(&self, kind: ColumnKind, input: impl Into<String>) -> Result<ResultHandle<f64>, EngineError> {
        self.book(vec![kind], Some(vec![input.into()]), Arc::new(MeanAction::new()))
    }

    /// A left-fold with a user-supplied binary reduction, seeded by `init`.
    pub fn reduce(
        &self,
        kind: ColumnKind,
        input: impl Into<String>,
        init: ColumnValue,
        f: impl Fn(ColumnValue, ColumnValue) -> ColumnValue + Send + Sync + 'static,
    ) -> Result<ResultHandle<ColumnValue>, EngineError> {
        self.book(vec![kind], Some(vec![input.into()]), Arc::new(ReduceAction::new(init, f)))
    }

    /// Fills a histogram-like accumulator for every accepted row.
    pub fn histogram<H: Histogrammish>(
        &self,
        kind: ColumnKind,
        input: impl Into<String>,
        proto: H,
    ) -> Result<ResultHandle<H>, EngineError> {
        self.book(vec![kind], Some(vec![input.into()]), Arc::new(HistogramAction::new(proto)))
    }

    /// Runs `f` for every accepted row; thread safety of `f` is the
    /// caller's responsibility.
    pub fn for_each(
        &self,
        in_kinds: Vec<ColumnKind>,
        inputs: Option<Vec<String>>,
        f: impl Fn(&[ColumnValue]) + Send + Sync + 'static,
    ) -> Result<ResultHandle<()>, EngineError> {
        self.book(in_kinds, inputs, Arc::new(ForEachAction::new(f)))
    }

    /// Like [`Chain::for_each`] but given the worker slot, the supported
    /// mechanism for per-worker state without cross-slot synchronization.
    pub fn for_each_slot(
        &self,
        in_kinds: Vec<ColumnKind>,
        inputs: Option<Vec<String>>,
        f: impl Fn(usize, &[ColumnValue]) + Send + Sync + 'static,
    ) -> Result<ResultHandle<()>, EngineError> {
        self.book(in_kinds, inputs, Arc::new(ForEachSlotAction::new(f)))
    }
}
