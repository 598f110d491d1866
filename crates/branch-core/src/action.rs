//! Leaf actions: count, take, min/max, mean, reduce, histogram-like, and the
//! two per-row callback variants.
//!
//! Every action stores its per-slot state behind interior mutability so
//! `accumulate` can be called concurrently from different worker slots
//! through a shared `&self`; the executor never needs `&mut` access to an
//! in-flight action, which is what lets every slot run without any
//! cross-slot synchronization in the hot loop.

use std::any::Any;
use std::sync::Mutex;

use crate::errors::EngineError;
use crate::value::ColumnValue;

pub trait ActionDyn: Send + Sync {
    fn allocate_slots(&self, n: usize);
    fn accumulate(&self, slot: usize, inputs: &[ColumnValue]) -> Result<(), EngineError>;
    fn finalize(&self) -> Result<Box<dyn Any + Send + Sync>, EngineError>;
}

/// A histogram-like accumulator: something with in-place `add` and an
/// associative `merge_from`, used by the histogram-like action kind.
pub trait Histogrammish: Send + Sync + Clone + 'static {
    fn add(&mut self, value: &ColumnValue);
    fn merge_from(&mut self, other: &Self);
}

pub struct CountAction {
    slots: Mutex<Vec<u64>>,
}

impl CountAction {
    pub fn new() -> Self {
        Self { slots: Mutex::new(Vec::new()) }
    }
}

impl ActionDyn for CountAction {
    fn allocate_slots(&self, n: usize) {
        *self.slots.lock().unwrap() = vec![0u64; n];
    }

    fn accumulate(&self, slot: usize, _inputs: &[ColumnValue]) -> Result<(), EngineError> {
        self.slots.lock().unwrap()[slot] += 1;
        Ok(())
    }

    fn finalize(&self) -> Result<Box<dyn Any + Send + Sync>, EngineError> {
        let total: u64 = self.slots.lock().unwrap().iter().sum();
        Ok(Box::new(total))
    }
}

pub struct TakeAction {
    slots: Mutex<Vec<Vec<ColumnValue>>>,
}

impl TakeAction {
    pub fn new() -> Self {
        Self { slots: Mutex::new(Vec::new()) }
    }
}

impl ActionDyn for TakeAction {
    fn allocate_slots(&self, n: usize) {
        *self.slots.lock().unwrap() = (0..n).map(|_| Vec::new()).collect();
    }

    fn accumulate(&self, slot: usize, inputs: &[ColumnValue]) -> Result<(), EngineError> {
        self.slots.lock().unwrap()[slot].push(inputs[0].clone());
        Ok(())
    }

    fn finalize(&self) -> Result<Box<dyn Any + Send + Sync>, EngineError> {
        let slots = self.slots.lock().unwrap();
        let mut out = Vec::new();
        for slot in slots.iter() {
            out.extend(slot.iter().cloned());
        }
        Ok(Box::new(out))
    }
}

enum MinMaxKind {
    Min,
    Max,
}

pub struct MinMaxAction {
    kind: MinMaxKind,
    slots: Mutex<Vec<Option<ColumnValue>>>,
}

impl MinMaxAction {
    pub fn min() -> Self {
        Self { kind: MinMaxKind::Min, slots: Mutex::new(Vec::new()) }
    }

    pub fn max() -> Self {
        Self { kind: MinMaxKind::Max, slots: Mutex::new(Vec::new()) }
    }
}

impl ActionDyn for MinMaxAction {
    fn allocate_slots(&self, n: usize) {
        *self.slots.lock().unwrap() = vec![None; n];
    }

    fn accumulate(&self, slot: usize, inputs: &[ColumnValue]) -> Result<(), EngineError> {
        let mut slots = self.slots.lock().unwrap();
        let candidate = &inputs[0];
        let better = match &slots[slot] {
            None => true,
            Some(cur) => match cur.partial_compare(candidate) {
                Some(std::cmp::Ordering::Greater) => matches!(self.kind, MinMaxKind::Min),
                Some(std::cmp::Ordering::Less) => matches!(self.kind, MinMaxKind::Max),
                _ => false,
            },
        };
        if better {
            slots[slot] = Some(candidate.clone());
        }
        Ok(())
    }

    fn finalize(&self) -> Result<Box<dyn Any + Send + Sync>, EngineError> {
        let slots = self.slots.lock().unwrap();
        let mut best: Option<ColumnValue> = None;
        for s in slots.iter() {
            if let Some(v) = s {
                best = Some(match best.take() {
                    None => v.clone(),
                    Some(cur) => match cur.partial_compare(v) {
                        Some(std::cmp::Ordering::Greater) if matches!(self.kind, MinMaxKind::Min) => v.clone(),
                        Some(std::cmp::Ordering::Less) if matches!(self.kind, MinMaxKind::Max) => v.clone(),
                        _ => cur,
                    },
                });
            }
        }
        best.map(|v| Box::new(v) as Box<dyn Any + Send + Sync>).ok_or(EngineError::EmptyInput)
    }
}

pub struct MeanAction {
    slots: Mutex<Vec<(f64, u64)>>,
}

impl MeanAction {
    pub fn new() -> Self {
        Self { slots: Mutex::new(Vec::new()) }
    }
}

impl ActionDyn for MeanAction {
    fn allocate_slots(&self, n: usize) {
        *self.slots.lock().unwrap() = vec![(0.0, 0u64); n];
    }

    fn accumulate(&self, slot: usize, inputs: &[ColumnValue]) -> Result<(), EngineError> {
        let v = inputs[0].as_f64().ok_or_else(|| {
            EngineError::UserCallableFailure("mean input is not numeric".into())
        })?;
        let mut slots = self.slots.lock().unwrap();
        slots[slot].0 += v;
        slots[slot].1 += 1;
        Ok(())
    }

    fn finalize(&self) -> Result<Box<dyn Any + Send + Sync>, EngineError> {
        let slots = self.slots.lock().unwrap();
        let (sum, count) = slots.iter().fold((0.0, 0u64), |acc, s| (acc.0 + s.0, acc.1 + s.1));
        if count == 0 {
            return Err(EngineError::EmptyInput);
        }
        Ok(Box::new(sum / count as f64))
    }
}

/// Left-fold with a user-supplied binary reduction, seeded by `init`.
/// Each slot folds independently starting from a clone of `init`; the final
/// merge continues the same fold, starting again from `init` and combining
/// the per-slot accumulators in slot-index order. For an associative,
/// commutative `f` (e.g. addition with `init = 0`) this yields the
/// mathematically expected total; for a non-commutative `f` the result is
/// still deterministic, just ordered by slot index rather than original row
/// order (documented in DESIGN.md).
pub struct ReduceAction {
    init: ColumnValue,
    f: Box<dyn Fn(ColumnValue, ColumnValue) -> ColumnValue + Send + Sync>,
    slots: Mutex<Vec<ColumnValue>>,
}

impl ReduceAction {
    pub fn new(
        init: ColumnValue,
        f: impl Fn(ColumnValue, ColumnValue) -> ColumnValue + Send + Sync + 'static,
    ) -> Self {
        Self { init, f: Box::new(f), slots: Mutex::new(Vec::new()) }
    }
}

impl ActionDyn for ReduceAction {
    fn allocate_slots(&self, n: usize) {
        *self.slots.lock().unwrap() = (0..n).map(|_| self.init.clone()).collect();
    }

    fn accumulate(&self, slot: usize, inputs: &[ColumnValue]) -> Result<(), EngineError> {
        let mut slots = self.slots.lock().unwrap();
        let cur = std::mem::replace(&mut slots[slot], self.init.clone());
        slots[slot] = (self.f)(cur, inputs[0].clone());
        Ok(())
    }

    fn finalize(&self) -> Result<Box<dyn Any + Send + Sync>, EngineError> {
        let slots = self.slots.lock().unwrap();
        let total = slots.iter().cloned().fold(self.init.clone(), |acc, s| (self.f)(acc, s));
        Ok(Box::new(total))
    }
}

pub struct HistogramAction<H: Histogrammish> {
    proto: H,
    slots: Mutex<Vec<H>>,
}

impl<H: Histogrammish> HistogramAction<H> {
    pub fn new(proto: H) -> Self {
        Self { proto, slots: Mutex::new(Vec::new()) }
    }
}

impl<H: Histogrammish> ActionDyn for HistogramAction<H> {
    fn allocate_slots(&self, n: usize) {
        *self.slots.lock().unwrap() = (0..n).map(|_| self.proto.clone()).collect();
    }

    fn accumulate(&self, slot: usize, inputs: &[ColumnValue]) -> Result<(), EngineError> {
        self.slots.lock().unwrap()[slot].add(&inputs[0]);
        Ok(())
    }

    fn finalize(&self) -> Result<Box<dyn Any + Send + Sync>, EngineError> {
        let slots = self.slots.lock().unwrap();
        let mut iter = slots.iter();
        let mut total = match iter.next() {
            Some(first) => first.clone(),
            None => return Err(EngineError::EmptyInput),
        };
        for s in iter {
            total.merge_from(s);
        }
        Ok(Box::new(total))
    }
}

/// Per-row callback, single-slot signature. Runs for every accepted row;
/// thread safety of the closure is the caller's responsibility since it may
/// be invoked from any worker slot.
pub struct ForEachAction {
    f: Box<dyn Fn(&[ColumnValue]) + Send + Sync>,
}

impl ForEachAction {
    pub fn new(f: impl Fn(&[ColumnValue]) + Send + Sync + 'static) -> Self {
        Self { f: Box::new(f) }
    }
}

impl ActionDyn for ForEachAction {
    fn allocate_slots(&self, _n: usize) {}

    fn accumulate(&self, _slot: usize, inputs: &[ColumnValue]) -> Result<(), EngineError> {
        (self.f)(inputs);
        Ok(())
    }

    fn finalize(&self) -> Result<Box<dyn Any + Send + Sync>, EngineError> {
        Ok(Box::new(()))
    }
}

/// Per-row callback, slot-aware signature: the supported mechanism for a
/// caller that needs disjoint per-worker state without synchronizing.
pub struct ForEachSlotAction {
    f: Box<dyn Fn(usize, &[ColumnValue]) + Send + Sync>,
}

impl ForEachSlotAction {
    pub fn new(f: impl Fn(usize, &[ColumnValue]) + Send + Sync + 'static) -> Self {
        Self { f: Box::new(f) }
    }
}

impl ActionDyn for ForEachSlotAction {
    fn allocate_slots(&self, _n: usize) {}

    fn accumulate(&self, slot: usize, inputs: &[ColumnValue]) -> Result<(), EngineError> {
        (self.f)(slot, inputs);
        Ok(())
    }

    fn finalize(&self) -> Result<Box<dyn Any + Send + Sync>, EngineError> {
        Ok(Box::new(()))
    }
}
