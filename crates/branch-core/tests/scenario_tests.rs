//! End-to-end scenarios covering filter/action composition, derived
//! columns, named-filter cutflow reporting, shared passes, callable
//! failure and retry, and parallel/sequential agreement, plus the
//! boundary-behaviour cases called out alongside them.

use std::sync::{Arc, Mutex, MutexGuard};

use branch_core::{
    set_parallel_config, Chain, ColumnKind, ColumnValue, EngineError, ParallelConfig, PipelineGraph,
};
use branch_source::{Histogram1D, InMemoryColumnSource, RayonWorkerPool};

fn ints(values: &[i64]) -> Vec<ColumnValue> {
    values.iter().map(|v| ColumnValue::Int64(*v)).collect()
}

/// `ParallelConfig` is process-wide; serialize every test in this file
/// against it rather than let `cargo test`'s default thread pool interleave
/// reads of one test's global state with another's writes.
static CONFIG_LOCK: Mutex<()> = Mutex::new(());

fn lock_config() -> MutexGuard<'static, ()> {
    CONFIG_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn reset_sequential() {
    set_parallel_config(ParallelConfig { enabled: false, workers: 1 });
}

/// A=[1,2,3,4,5]; filter(A>2).count() -> 3.
#[test]
fn filter_then_count() {
    let _guard = lock_config();
    reset_sequential();
    let source = InMemoryColumnSource::new(vec![("A", ints(&[1, 2, 3, 4, 5]))]).unwrap();
    let graph = PipelineGraph::new(Box::new(source), vec![], None);
    let root = Chain::root(&graph);

    let gt2 = root
        .filter(vec![ColumnKind::Int64], Some(vec!["A".into()]), |v| {
            Ok(v[0].as_i64().unwrap() > 2)
        })
        .unwrap();
    let count = gt2.count().unwrap();

    assert_eq!(count.observe().unwrap(), 3);
}

/// A=[1..5], B=[5,4,3,2,1]; derived C=A+B, filter(C==6).take(A) -> all rows.
#[test]
fn derived_column_then_take() {
    let _guard = lock_config();
    reset_sequential();
    let source = InMemoryColumnSource::new(vec![
        ("A", ints(&[1, 2, 3, 4, 5])),
        ("B", ints(&[5, 4, 3, 2, 1])),
    ])
    .unwrap();
    let graph = PipelineGraph::new(Box::new(source), vec![], None);
    let root = Chain::root(&graph);

    let with_c = root
        .define(
            "C",
            ColumnKind::Int64,
            vec![ColumnKind::Int64, ColumnKind::Int64],
            Some(vec!["A".into(), "B".into()]),
            |v| Ok(ColumnValue::Int64(v[0].as_i64().unwrap() + v[1].as_i64().unwrap())),
        )
        .unwrap();
    let eq6 = with_c
        .filter(vec![ColumnKind::Int64], Some(vec!["C".into()]), |v| {
            Ok(v[0].as_i64().unwrap() == 6)
        })
        .unwrap();
    let taken = eq6.take(ColumnKind::Int64, "A").unwrap();

    let values: Vec<i64> = taken.observe().unwrap().into_iter().map(|v| v.as_i64().unwrap()).collect();
    assert_eq!(values, vec![1, 2, 3, 4, 5]);
}

/// A=[1,2,3]; named filters gt1: A>1, lt3: A<3, chained; count downstream
/// of both -> 1; report prints the two lines in booking order with the
/// documented percentage formatting.
#[test]
fn named_filter_cutflow() {
    let _guard = lock_config();
    reset_sequential();
    let source = InMemoryColumnSource::new(vec![("A", ints(&[1, 2, 3]))]).unwrap();
    let graph = PipelineGraph::new(Box::new(source), vec![], None);
    let root = Chain::root(&graph);

    let gt1 = root
        .filter_named("gt1", vec![ColumnKind::Int64], Some(vec!["A".into()]), |v| {
            Ok(v[0].as_i64().unwrap() > 1)
        })
        .unwrap();
    let lt3 = gt1
        .filter_named("lt3", vec![ColumnKind::Int64], Some(vec!["A".into()]), |v| {
            Ok(v[0].as_i64().unwrap() < 3)
        })
        .unwrap();
    let count = lt3.count().unwrap();

    assert_eq!(count.observe().unwrap(), 1);

    let report = graph.report().unwrap();
    assert_eq!(report.lines.len(), 2);
    assert_eq!(report.lines[0].name, "gt1");
    assert_eq!(report.lines[0].accept, 2);
    assert_eq!(report.lines[0].observed, 3);
    assert!((report.lines[0].pct - 66.666_666_666_666_67).abs() < 1e-9);
    assert_eq!(report.lines[1].name, "lt3");
    assert_eq!(report.lines[1].accept, 1);
    assert_eq!(report.lines[1].observed, 2);
    assert!((report.lines[1].pct - 50.0).abs() < 1e-9);

    // report() called twice prints (and returns) identical lines.
    let report2 = graph.report().unwrap();
    assert_eq!(report, report2);
}

/// h1 = histogram(A | A>10), h2 = histogram(A); observing h1 then h2
/// runs the pass once; h2 has all rows, h1 the accepted subset.
#[test]
fn two_actions_share_one_pass() {
    let _guard = lock_config();
    reset_sequential();
    let source = InMemoryColumnSource::new(vec![("A", ints(&[1, 5, 11, 20, 3]))]).unwrap();
    let graph = PipelineGraph::new(Box::new(source), vec![], None);
    let root = Chain::root(&graph);

    let above_10 = root
        .filter(vec![ColumnKind::Int64], Some(vec!["A".into()]), |v| {
            Ok(v[0].as_i64().unwrap() > 10)
        })
        .unwrap();
    let h1 = above_10.histogram(ColumnKind::Int64, "A", Histogram1D::new(10, 0.0, 30.0)).unwrap();
    let h2 = root.histogram(ColumnKind::Int64, "A", Histogram1D::new(10, 0.0, 30.0)).unwrap();

    let h1_result = h1.observe().unwrap();
    let h2_result = h2.observe().unwrap();

    assert_eq!(h1_result.total(), 2); // 11, 20
    assert_eq!(h2_result.total(), 5); // every row
}

/// A derived column whose callable fails on one particular row; the
/// observation raises user-callable-failure and the root remains unready,
/// so observing again re-runs and raises again.
#[test]
fn user_callable_failure_aborts_and_is_retryable() {
    let _guard = lock_config();
    reset_sequential();
    let source = InMemoryColumnSource::new(vec![("A", ints(&[1, 2, 3, 4, 5]))]).unwrap();
    let graph = PipelineGraph::new(Box::new(source), vec![], None);
    let root = Chain::root(&graph);

    let derived = root
        .define(
            "D",
            ColumnKind::Int64,
            vec![ColumnKind::Int64],
            Some(vec!["A".into()]),
            |v| {
                let a = v[0].as_i64().unwrap();
                if a == 3 {
                    Err(EngineError::UserCallableFailure("boom on row with A=3".into()))
                } else {
                    Ok(ColumnValue::Int64(a))
                }
            },
        )
        .unwrap();
    let taken = derived.take(ColumnKind::Int64, "D").unwrap();

    let first = taken.observe();
    assert!(matches!(first, Err(EngineError::UserCallableFailure(_))));
    let second = taken.observe();
    assert!(matches!(second, Err(EngineError::UserCallableFailure(_))));
}

/// Parallel mode with 4 workers over a large dataset; the reduced sum
/// matches the sequential result, and an always-true named filter's
/// per-slot accept counts sum to the row count.
#[test]
fn parallel_matches_sequential_sum() {
    let _guard = lock_config();
    const ROWS: i64 = 1_000_000;
    let values: Vec<i64> = (1..=ROWS).collect();
    let expected_sum: i64 = values.iter().sum();

    let pool = Arc::new(RayonWorkerPool::new(4).unwrap());
    let source = InMemoryColumnSource::new(vec![("A", ints(&values))]).unwrap();
    let graph = PipelineGraph::new(Box::new(source), vec![], Some(pool));
    let root = Chain::root(&graph);

    let always = root
        .filter_named("always", vec![ColumnKind::Int64], Some(vec!["A".into()]), |_| Ok(true))
        .unwrap();
    let total = always
        .reduce(ColumnKind::Int64, "A", ColumnValue::Int64(0), |acc, v| {
            ColumnValue::Int64(acc.as_i64().unwrap() + v.as_i64().unwrap())
        })
        .unwrap();

    set_parallel_config(ParallelConfig { enabled: true, workers: 4 });
    let result = total.observe().unwrap();
    assert_eq!(result.as_i64().unwrap(), expected_sum);

    let report = graph.report().unwrap();
    assert_eq!(report.lines[0].accept, ROWS as u64);
    assert_eq!(report.lines[0].observed, ROWS as u64);

    reset_sequential();
}

/// Boundary: empty dataset -> count=0, take=empty, min/max/mean all raise
/// empty-input.
#[test]
fn boundary_empty_dataset() {
    let _guard = lock_config();
    reset_sequential();
    let source = InMemoryColumnSource::new(vec![("A", Vec::<ColumnValue>::new())]).unwrap();
    let graph = PipelineGraph::new(Box::new(source), vec![], None);
    let root = Chain::root(&graph);

    let count = root.count().unwrap();
    let take = root.take(ColumnKind::Int64, "A").unwrap();
    let min = root.min(ColumnKind::Int64, "A").unwrap();

    assert_eq!(count.observe().unwrap(), 0);
    assert_eq!(take.observe().unwrap(), Vec::<ColumnValue>::new());
    assert!(matches!(min.observe(), Err(EngineError::EmptyInput)));
}

/// Boundary: every row filtered out yields the same empty-input behaviour
/// for min/max/mean as an empty dataset.
#[test]
fn boundary_all_rows_rejected() {
    let _guard = lock_config();
    reset_sequential();
    let source = InMemoryColumnSource::new(vec![("A", ints(&[1, 2, 3]))]).unwrap();
    let graph = PipelineGraph::new(Box::new(source), vec![], None);
    let root = Chain::root(&graph);

    let none = root
        .filter(vec![ColumnKind::Int64], Some(vec!["A".into()]), |_| Ok(false))
        .unwrap();
    let mean = none.mean(ColumnKind::Int64, "A").unwrap();
    let max = none.max(ColumnKind::Int64, "A").unwrap();

    assert!(matches!(mean.observe(), Err(EngineError::EmptyInput)));
    assert!(matches!(max.observe(), Err(EngineError::EmptyInput)));
}

/// Boundary: a single-row dataset with more workers than rows still
/// produces the correct (trivial) result.
#[test]
fn boundary_single_row_with_more_workers_than_rows() {
    let _guard = lock_config();
    let pool = Arc::new(RayonWorkerPool::new(4).unwrap());
    let source = InMemoryColumnSource::new(vec![("A", ints(&[42]))]).unwrap();
    let graph = PipelineGraph::new(Box::new(source), vec![], Some(pool));
    let root = Chain::root(&graph);
    let count = root.count().unwrap();

    set_parallel_config(ParallelConfig { enabled: true, workers: 4 });
    assert_eq!(count.observe().unwrap(), 1);
    reset_sequential();
}

/// Observing the same handle twice returns the same value without
/// re-driving a pass, and booking after a completed pass is rejected.
#[test]
fn idempotent_observation_and_frozen_root_after_ready() {
    let _guard = lock_config();
    reset_sequential();
    let source = InMemoryColumnSource::new(vec![("A", ints(&[1, 2, 3]))]).unwrap();
    let graph = PipelineGraph::new(Box::new(source), vec![], None);
    let root = Chain::root(&graph);
    let count = root.count().unwrap();

    assert_eq!(count.observe().unwrap(), 3);
    assert_eq!(count.observe().unwrap(), 3);

    let err = root.count().unwrap_err();
    assert!(matches!(err, EngineError::RootFrozen));
}
