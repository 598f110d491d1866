//! The pipeline graph's non-leaf nodes: derived columns and filters.
//!
//! Every node a caller books is one of these two kinds, plus the leaf
//! actions defined in [`crate::action`]. Both kinds hold a `parent` (the
//! node they were booked against), giving a rooted tree: walking `parent`
//! pointers upward from any node reaches the root exactly once, by
//! construction, since a node can only be booked against a handle that
//! already exists.

use std::sync::Mutex;

use crate::errors::EngineError;
use crate::value::{ColumnKind, ColumnValue};

/// Opaque reference to a booked node, or the root itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeHandle {
    Root,
    Node(usize),
}

/// A resolved input: the name lookup that happens once, at booking time.
#[derive(Debug, Clone)]
pub enum ColumnRef {
    /// Index into the source's column directory.
    Persistent(usize, ColumnKind),
    /// Index into the graph's flat node list; always a `Derived` entry.
    Derived(usize, ColumnKind),
}

/// Per-slot, per-row memoised result. `last_row` of `None` means "never
/// evaluated in this slot yet"; a cache hit compares the stored row index
/// against the row currently being dispatched.
#[derive(Debug, Default)]
pub struct SlotCache<T> {
    pub last_row: Option<usize>,
    pub value: Option<T>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FilterCounts {
    pub accept: u64,
    pub reject: u64,
}

/// A node's declared input type for each positional input, captured at
/// booking time as a type witness. Checked against the resolver-provided
/// kind of the actual column at first access.
pub type DeclaredKinds = Vec<ColumnKind>;

pub struct DerivedNode {
    pub name: String,
    pub out_kind: ColumnKind,
    pub parent: NodeHandle,
    pub inputs: Vec<ColumnRef>,
    pub in_kinds: DeclaredKinds,
    pub callable: Box<dyn Fn(&[ColumnValue]) -> Result<ColumnValue, EngineError> + Send + Sync>,
    pub cache: Vec<Mutex<SlotCache<ColumnValue>>>,
}

impl DerivedNode {
    pub fn allocate_slots(&mut self, n: usize) {
        self.cache = (0..n).map(|_| Mutex::new(SlotCache::default())).collect();
    }
}

pub struct FilterNode {
    pub name: Option<String>,
    pub parent: NodeHandle,
    pub inputs: Vec<ColumnRef>,
    pub in_kinds: DeclaredKinds,
    pub callable: Box<dyn Fn(&[ColumnValue]) -> Result<bool, EngineError> + Send + Sync>,
    pub cache: Vec<Mutex<SlotCache<bool>>>,
    pub counts: Vec<Mutex<FilterCounts>>,
}

impl FilterNode {
    pub fn allocate_slots(&mut self, n: usize) {
        self.cache = (0..n).map(|_| Mutex::new(SlotCache::default())).collect();
        self.counts = (0..n).map(|_| Mutex::new(FilterCounts::default())).collect();
    }

    pub fn totals(&self) -> FilterCounts {
        self.counts.iter().fold(FilterCounts::default(), |mut acc, m| {
            let c = m.lock().unwrap();
            acc.accept += c.accept;
            acc.reject += c.reject;
            acc
        })
    }
}

pub enum GraphNode {
    Derived(DerivedNode),
    Filter(FilterNode),
}

impl GraphNode {
    pub fn parent(&self) -> NodeHandle {
        match self {
            GraphNode::Derived(d) => d.parent,
            GraphNode::Filter(f) => f.parent,
        }
    }

    pub fn allocate_slots(&mut self, n: usize) {
        match self {
            GraphNode::Derived(d) => d.allocate_slots(n),
            GraphNode::Filter(f) => f.allocate_slots(n),
        }
    }
}
