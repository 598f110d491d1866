//! The pipeline graph (root/source node), its per-entry dispatch engine,
//! and the single-threaded and parallel execution drivers.
//!
//! This is the heart of the engine: everything else in the crate (nodes,
//! actions, the slot map, the report) is a collaborator that this module
//! wires together into one shared, lazily-evaluated pass.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};

use indexmap::IndexMap;

use crate::action::ActionDyn;
use crate::errors::EngineError;
use crate::node::{ColumnRef, DerivedNode, FilterNode, GraphNode, NodeHandle};
use crate::pool::{parallel_config, SlotAssigner, WorkerPool};
use crate::report::{CutflowLine, CutflowReport};
use crate::source::{partition_ranges, RowCursor, SourceReader};
use crate::value::{ColumnKind, ColumnValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootState {
    Booking,
    Running,
    Ready,
}

struct BookedAction {
    parent: NodeHandle,
    inputs: Vec<ColumnRef>,
    in_kinds: Vec<ColumnKind>,
    action: Arc<dyn ActionDyn>,
    slot: Arc<ActionResultSlot>,
}

/// Shared between a [`BookedAction`] and every [`ResultHandle`] it issued.
struct ActionResultSlot {
    ready: AtomicBool,
    value: Mutex<Option<Result<Arc<dyn Any + Send + Sync>, EngineError>>>,
}

impl ActionResultSlot {
    fn new() -> Self {
        Self { ready: AtomicBool::new(false), value: Mutex::new(None) }
    }
}

/// The root / source node of a pipeline graph: owns every booked node and
/// action, the default column list, and the run-once state machine.
pub struct PipelineGraph {
    source: Box<dyn SourceReader>,
    pool: Option<Arc<dyn WorkerPool>>,
    default_columns: Vec<String>,
    nodes: RwLock<Vec<GraphNode>>,
    derived_names: Mutex<IndexMap<String, usize>>,
    named_filters: Mutex<Vec<usize>>,
    actions: Mutex<Vec<Arc<BookedAction>>>,
    state: Mutex<RootState>,
    cv: Condvar,
}

impl PipelineGraph {
    /// Builds a root over `source`, with an optional default column list and
    /// an optional worker pool (required only if parallel mode is enabled at
    /// run time; see [`crate::pool::parallel_config`]).
    pub fn new(
        source: Box<dyn SourceReader>,
        default_columns: Vec<String>,
        pool: Option<Arc<dyn WorkerPool>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            source,
            pool,
            default_columns,
            nodes: RwLock::new(Vec::new()),
            derived_names: Mutex::new(IndexMap::new()),
            named_filters: Mutex::new(Vec::new()),
            actions: Mutex::new(Vec::new()),
            state: Mutex::new(RootState::Booking),
            cv: Condvar::new(),
        })
    }

    fn ensure_booking(&self) -> Result<(), EngineError> {
        if *self.state.lock().unwrap() != RootState::Booking {
            return Err(EngineError::RootFrozen);
        }
        Ok(())
    }

    /// Resolves `inputs` (or the default column list, if `inputs` is `None`)
    /// to concrete [`ColumnRef`]s, checking arity against `in_kinds.len()`
    /// along the way.
    fn resolve_inputs_for_booking(
        &self,
        node_label: &str,
        parent: NodeHandle,
        in_kinds: &[ColumnKind],
        inputs: Option<Vec<String>>,
        nodes: &[GraphNode],
    ) -> Result<Vec<ColumnRef>, EngineError> {
        let names = match inputs {
            Some(names) => {
                if names.len() != in_kinds.len() {
                    return Err(EngineError::ArityMismatch {
                        node: node_label.to_string(),
                        expected: in_kinds.len(),
                        actual: names.len(),
                    });
                }
                names
            }
            None => {
                if self.default_columns.len() < in_kinds.len() {
                    return Err(EngineError::ArityMismatch {
                        node: node_label.to_string(),
                        expected: in_kinds.len(),
                        actual: self.default_columns.len(),
                    });
                }
                self.default_columns[..in_kinds.len()].to_vec()
            }
        };

        names
            .iter()
            .map(|name| self.resolve_column_ref(parent, name, nodes))
            .collect()
    }

    fn resolve_column_ref(
        &self,
        parent: NodeHandle,
        name: &str,
        nodes: &[GraphNode],
    ) -> Result<ColumnRef, EngineError> {
        if let Some((idx, kind)) = self.source.column_index(name) {
            return Ok(ColumnRef::Persistent(idx, kind));
        }
        let mut cur = parent;
        loop {
            match cur {
                NodeHandle::Root => return Err(EngineError::UnknownColumn(name.to_string())),
                NodeHandle::Node(i) => {
                    if let GraphNode::Derived(d) = &nodes[i] {
                        if d.name == name {
                            return Ok(ColumnRef::Derived(i, d.out_kind));
                        }
                    }
                    cur = nodes[i].parent();
                }
            }
        }
    }

    /// Books a derived column against `parent`, typed by `out_kind`, with
    /// declared input kinds `in_kinds` consumed positionally from `inputs`
    /// (or the default column list when `inputs` is `None`).
    pub fn book_derived(
        &self,
        parent: NodeHandle,
        name: impl Into<String>,
        out_kind: ColumnKind,
        in_kinds: Vec<ColumnKind>,
        inputs: Option<Vec<String>>,
        callable: impl Fn(&[ColumnValue]) -> Result<ColumnValue, EngineError> + Send + Sync + 'static,
    ) -> Result<NodeHandle, EngineError> {
        self.ensure_booking()?;
        let name = name.into();

        let mut nodes = self.nodes.write().unwrap();
        if self.source.column_index(&name).is_some() {
            return Err(EngineError::DuplicateName(name));
        }
        {
            let derived = self.derived_names.lock().unwrap();
            if derived.contains_key(&name) {
                return Err(EngineError::DuplicateName(name));
            }
        }

        let resolved =
            self.resolve_inputs_for_booking(&name, parent, &in_kinds, inputs, &nodes)?;

        let idx = nodes.len();
        nodes.push(GraphNode::Derived(DerivedNode {
            name: name.clone(),
            out_kind,
            parent,
            inputs: resolved,
            in_kinds,
            callable: Box::new(callable),
            cache: Vec::new(),
        }));
        drop(nodes);
        self.derived_names.lock().unwrap().insert(name, idx);
        Ok(NodeHandle::Node(idx))
    }

    /// Books a filter against `parent`. Named filters are indexed, in
    /// booking order, for the cutflow report.
    pub fn book_filter(
        &self,
        parent: NodeHandle,
        in_kinds: Vec<ColumnKind>,
        inputs: Option<Vec<String>>,
        name: Option<String>,
        callable: impl Fn(&[ColumnValue]) -> Result<bool, EngineError> + Send + Sync + 'static,
    ) -> Result<NodeHandle, EngineError> {
        self.ensure_booking()?;
        let label = name.clone().unwrap_or_else(|| "<anonymous filter>".to_string());

        let mut nodes = self.nodes.write().unwrap();
        let resolved =
            self.resolve_inputs_for_booking(&label, parent, &in_kinds, inputs, &nodes)?;

        let idx = nodes.len();
        nodes.push(GraphNode::Filter(FilterNode {
            name: name.clone(),
            parent,
            inputs: resolved,
            in_kinds,
            callable: Box::new(callable),
            cache: Vec::new(),
            counts: Vec::new(),
        }));
        drop(nodes);
        if name.is_some() {
            self.named_filters.lock().unwrap().push(idx);
        }
        Ok(NodeHandle::Node(idx))
    }

    /// Books an action against `parent`, returning a result handle that
    /// becomes ready only after the next pass.
    pub fn book_action<T: Send + Sync + 'static>(
        self: &Arc<Self>,
        parent: NodeHandle,
        in_kinds: Vec<ColumnKind>,
        inputs: Option<Vec<String>>,
        action: Arc<dyn ActionDyn>,
    ) -> Result<ResultHandle<T>, EngineError> {
        self.ensure_booking()?;
        let nodes = self.nodes.read().unwrap();
        let resolved = self.resolve_inputs_for_booking(
            "<action>",
            parent,
            &in_kinds,
            inputs,
            &nodes,
        )?;
        drop(nodes);

        let slot = Arc::new(ActionResultSlot::new());
        let booked = Arc::new(BookedAction { parent, inputs: resolved, in_kinds, action, slot: slot.clone() });
        self.actions.lock().unwrap().push(booked);

        Ok(ResultHandle { graph: self.clone(), slot, _marker: std::marker::PhantomData })
    }

    /// Drives a pass if one has not already run; idempotent once ready.
    pub fn run(self: &Arc<Self>) -> Result<(), EngineError> {
        {
            let mut state = self.state.lock().unwrap();
            loop {
                match *state {
                    RootState::Ready => return Ok(()),
                    RootState::Running => {
                        state = self.cv.wait(state).unwrap();
                    }
                    RootState::Booking => {
                        *state = RootState::Running;
                        break;
                    }
                }
            }
        }

        let result = self.run_inner();

        let mut state = self.state.lock().unwrap();
        *state = match &result {
            Ok(()) => RootState::Ready,
            Err(_) => RootState::Booking,
        };
        drop(state);
        self.cv.notify_all();
        result
    }

    fn run_inner(self: &Arc<Self>) -> Result<(), EngineError> {
        let cfg = parallel_config();
        let n_workers = if cfg.enabled {
            self.pool.as_ref().map(|p| p.worker_count()).unwrap_or(1).max(1)
        } else {
            1
        };
        log::debug!(
            "pass starting: parallel={} workers={} rows={}",
            cfg.enabled && n_workers > 1,
            n_workers,
            self.source.row_count()
        );

        {
            let mut nodes = self.nodes.write().unwrap();
            for node in nodes.iter_mut() {
                node.allocate_slots(n_workers);
            }
        }
        let actions = self.actions.lock().unwrap().clone();
        for a in &actions {
            a.action.allocate_slots(n_workers);
        }

        let row_count = self.source.row_count();
        let dispatch_result = {
            let nodes = self.nodes.read().unwrap();
            if cfg.enabled && n_workers > 1 {
                self.run_parallel(&nodes, &actions, n_workers, row_count)
            } else {
                self.run_single(&nodes, &actions, row_count)
            }
        };
        dispatch_result?;

        for a in &actions {
            let res = a.action.finalize().map(|b| Arc::from(b));
            *a.slot.value.lock().unwrap() = Some(res);
            a.slot.ready.store(true, Ordering::Release);
        }
        self.actions.lock().unwrap().clear();
        log::debug!("pass completed");
        Ok(())
    }

    fn run_single(
        &self,
        nodes: &[GraphNode],
        actions: &[Arc<BookedAction>],
        row_count: usize,
    ) -> Result<(), EngineError> {
        let mut cursor = self.source.cursor_range(0, row_count);
        while cursor.advance() {
            let row = cursor.row_index();
            for a in actions {
                dispatch_action(nodes, a, 0, row, cursor.as_ref(), self.source.as_ref())?;
            }
        }
        Ok(())
    }

    fn run_parallel(
        &self,
        nodes: &[GraphNode],
        actions: &[Arc<BookedAction>],
        n_workers: usize,
        row_count: usize,
    ) -> Result<(), EngineError> {
        let pool = self
            .pool
            .as_ref()
            .expect("parallel mode requires a configured worker pool");
        let ranges = partition_ranges(row_count, n_workers);
        let assigner = SlotAssigner::new(n_workers.max(1));
        let first_error: Mutex<Option<EngineError>> = Mutex::new(None);
        let source = self.source.as_ref();

        let task = |i: usize| {
            if first_error.lock().unwrap().is_some() {
                return;
            }
            let (start, end) = ranges[i];
            let mut cursor = source.cursor_range(start, end);
            let slot = assigner.slot_for_current_thread();
            while cursor.advance() {
                let row = cursor.row_index();
                for a in actions {
                    if let Err(e) = dispatch_action(nodes, a, slot, row, cursor.as_ref(), source) {
                        let mut fe = first_error.lock().unwrap();
                        if fe.is_none() {
                            log::error!("worker error on row {row}: {e}");
                            *fe = Some(e);
                        }
                        return;
                    }
                }
            }
        };
        pool.run_partitioned(ranges.len(), &task);

        match first_error.into_inner().unwrap() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Prints, and returns, the cutflow report in booking order. Triggers a
    /// pass if one has not yet run.
    pub fn report(self: &Arc<Self>) -> Result<CutflowReport, EngineError> {
        if *self.state.lock().unwrap() != RootState::Ready {
            self.run()?;
        }
        let nodes = self.nodes.read().unwrap();
        let named = self.named_filters.lock().unwrap();
        let mut lines = Vec::with_capacity(named.len());
        for &idx in named.iter() {
            if let GraphNode::Filter(f) = &nodes[idx] {
                let totals = f.totals();
                let observed = totals.accept + totals.reject;
                let pct = if observed > 0 {
                    totals.accept as f64 / observed as f64 * 100.0
                } else {
                    0.0
                };
                lines.push(CutflowLine {
                    name: f.name.clone().expect("named_filters only indexes named filters"),
                    accept: totals.accept,
                    observed,
                    pct,
                });
            }
        }
        Ok(CutflowReport { lines })
    }
}

/// Whether `handle`'s row is reached at all: `Root` is always reached;
/// a `Filter` ancestor gates on its own (short-circuited) result; a
/// `Derived` ancestor is transparent and simply defers to its own parent.
fn reaches(
    nodes: &[GraphNode],
    handle: NodeHandle,
    slot: usize,
    row: usize,
    cursor: &dyn RowCursor,
    source: &dyn SourceReader,
) -> Result<bool, EngineError> {
    match handle {
        NodeHandle::Root => Ok(true),
        NodeHandle::Node(i) => match &nodes[i] {
            GraphNode::Filter(_) => eval_filter(nodes, i, slot, row, cursor, source),
            GraphNode::Derived(d) => reaches(nodes, d.parent, slot, row, cursor, source),
        },
    }
}

fn eval_filter(
    nodes: &[GraphNode],
    idx: usize,
    slot: usize,
    row: usize,
    cursor: &dyn RowCursor,
    source: &dyn SourceReader,
) -> Result<bool, EngineError> {
    let f = match &nodes[idx] {
        GraphNode::Filter(f) => f,
        GraphNode::Derived(_) => unreachable!("eval_filter called on a derived node"),
    };

    if let Some(hit) = cache_hit(&f.cache[slot], row) {
        return Ok(hit);
    }

    let ancestors_ok = reaches(nodes, f.parent, slot, row, cursor, source)?;
    if !ancestors_ok {
        record_filter(f, slot, row, false, false);
        return Ok(false);
    }

    let values = resolve_inputs(nodes, &f.inputs, &f.in_kinds, slot, row, cursor, source)?;
    let result = (f.callable)(&values)?;
    record_filter(f, slot, row, result, f.name.is_some());
    Ok(result)
}

fn cache_hit(cache: &Mutex<crate::node::SlotCache<bool>>, row: usize) -> Option<bool> {
    let c = cache.lock().unwrap();
    if c.last_row == Some(row) {
        c.value
    } else {
        None
    }
}

fn record_filter(f: &FilterNode, slot: usize, row: usize, result: bool, count: bool) {
    {
        let mut c = f.cache[slot].lock().unwrap();
        c.last_row = Some(row);
        c.value = Some(result);
    }
    if count {
        let mut counts = f.counts[slot].lock().unwrap();
        if result {
            counts.accept += 1;
        } else {
            counts.reject += 1;
        }
    }
}

fn eval_derived(
    nodes: &[GraphNode],
    idx: usize,
    slot: usize,
    row: usize,
    cursor: &dyn RowCursor,
    source: &dyn SourceReader,
) -> Result<ColumnValue, EngineError> {
    let d = match &nodes[idx] {
        GraphNode::Derived(d) => d,
        GraphNode::Filter(_) => unreachable!("eval_derived called on a filter node"),
    };

    {
        let c = d.cache[slot].lock().unwrap();
        if c.last_row == Some(row) {
            return Ok(c.value.clone().expect("cache hit implies a cached value"));
        }
    }

    let values = resolve_inputs(nodes, &d.inputs, &d.in_kinds, slot, row, cursor, source)?;
    let result = (d.callable)(&values)?;
    let mut c = d.cache[slot].lock().unwrap();
    c.last_row = Some(row);
    c.value = Some(result.clone());
    Ok(result)
}

/// Resolves every positional input of a node or action, checking each
/// input's declared kind against the resolver-provided kind.
fn resolve_inputs(
    nodes: &[GraphNode],
    inputs: &[ColumnRef],
    in_kinds: &[ColumnKind],
    slot: usize,
    row: usize,
    cursor: &dyn RowCursor,
    source: &dyn SourceReader,
) -> Result<Vec<ColumnValue>, EngineError> {
    inputs
        .iter()
        .zip(in_kinds.iter())
        .map(|(cref, declared)| {
            let (value, actual_kind, column_name) = match cref {
                ColumnRef::Persistent(i, kind) => {
                    (cursor.column(*i), *kind, source.columns()[*i].name.clone())
                }
                ColumnRef::Derived(i, kind) => {
                    let name = match &nodes[*i] {
                        GraphNode::Derived(d) => d.name.clone(),
                        GraphNode::Filter(_) => unreachable!(),
                    };
                    (eval_derived(nodes, *i, slot, row, cursor, source)?, *kind, name)
                }
            };
            if *declared != actual_kind {
                return Err(EngineError::TypeMismatch {
                    column: column_name,
                    expected: *declared,
                    actual: actual_kind,
                });
            }
            Ok(value)
        })
        .collect()
}

fn dispatch_action(
    nodes: &[GraphNode],
    a: &Arc<BookedAction>,
    slot: usize,
    row: usize,
    cursor: &dyn RowCursor,
    source: &dyn SourceReader,
) -> Result<(), EngineError> {
    let accepted = reaches(nodes, a.parent, slot, row, cursor, source)?;
    if !accepted {
        return Ok(());
    }
    let values = resolve_inputs(nodes, &a.inputs, &a.in_kinds, slot, row, cursor, source)?;
    a.action.accumulate(slot, &values)
}

/// A future-like reference to one action's finalised value. The first
/// observation across every handle issued for the same action triggers the
/// root's pass, if none has run yet; subsequent observations never re-drive
/// a pass that already succeeded.
pub struct ResultHandle<T> {
    graph: Arc<PipelineGraph>,
    slot: Arc<ActionResultSlot>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Send + Sync + Clone + 'static> ResultHandle<T> {
    pub fn observe(&self) -> Result<T, EngineError> {
        if !self.slot.ready.load(Ordering::Acquire) {
            self.graph.run()?;
        }
        let guard = self.slot.value.lock().unwrap();
        match guard.as_ref() {
            Some(Ok(v)) => v
                .downcast_ref::<T>()
                .cloned()
                .ok_or_else(|| EngineError::UserCallableFailure("result type mismatch".into())),
            Some(Err(e)) => Err(e.clone()),
            None => Err(EngineError::UserCallableFailure(
                "action result missing after a completed pass".into(),
            )),
        }
    }
}

impl<T> Clone for ResultHandle<T> {
    fn clone(&self) -> Self {
        Self { graph: self.graph.clone(), slot: self.slot.clone(), _marker: std::marker::PhantomData }
    }
}
