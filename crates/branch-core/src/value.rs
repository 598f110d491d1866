//! Type-erased column values.
//!
//! The engine itself never interprets a value beyond its [`ColumnKind`]; the
//! per-node callables supplied by the caller are the only place a concrete
//! Rust type (`i64`, `f64`, ...) is recovered. This keeps the dispatch engine
//! agnostic to the shape of any particular dataset while still letting a
//! mismatch between a node's declared input type and the resolver-provided
//! type surface as a typed error instead of a silent coercion.

use std::cmp::Ordering;

/// The type tag carried alongside every [`ColumnValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Int64,
    Float64,
    Bool,
    Text,
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ColumnKind::Int64 => "Int64",
            ColumnKind::Float64 => "Float64",
            ColumnKind::Bool => "Bool",
            ColumnKind::Text => "Text",
        };
        f.write_str(s)
    }
}

/// A single row's value for one column, tagged with its [`ColumnKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Int64(i64),
    Float64(f64),
    Bool(bool),
    Text(String),
}

impl ColumnValue {
    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnValue::Int64(_) => ColumnKind::Int64,
            ColumnValue::Float64(_) => ColumnKind::Float64,
            ColumnValue::Bool(_) => ColumnKind::Bool,
            ColumnValue::Text(_) => ColumnKind::Text,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ColumnValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ColumnValue::Int64(v) => Some(*v as f64),
            ColumnValue::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ColumnValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ColumnValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Ordering within the same kind only; used by the min/max actions.
    /// Mixed-kind comparisons (which booking-time type checks should have
    /// already ruled out) return `None` rather than panicking.
    pub fn partial_compare(&self, other: &ColumnValue) -> Option<Ordering> {
        match (self, other) {
            (ColumnValue::Int64(a), ColumnValue::Int64(b)) => a.partial_cmp(b),
            (ColumnValue::Float64(a), ColumnValue::Float64(b)) => a.partial_cmp(b),
            (ColumnValue::Bool(a), ColumnValue::Bool(b)) => a.partial_cmp(b),
            (ColumnValue::Text(a), ColumnValue::Text(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}
