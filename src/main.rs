//! branchflow: a small demo binary wiring the engine up to the in-memory
//! reference source and printing a cutflow report. For the library, see
//! `branch-core` and `branch-source`; this binary only books a pipeline and
//! drives it.

use std::sync::Arc;

use branch_core::{Chain, ColumnKind, ColumnValue, PipelineGraph};
use branch_source::{InMemoryColumnSource, RayonWorkerPool};

fn main() {
    let _ = dotenvy::dotenv();
    env_logger::init();

    let source = InMemoryColumnSource::new(vec![
        ("event", (0..20i64).map(ColumnValue::Int64).collect()),
        ("energy", (0..20i64).map(|i| ColumnValue::Float64(i as f64 * 1.5)).collect()),
    ])
    .expect("demo columns are well-formed");

    let pool = RayonWorkerPool::new(4).expect("rayon pool builds with a sane thread count");
    let graph = PipelineGraph::new(Box::new(source), vec![], Some(Arc::new(pool)));
    let root = Chain::root(&graph);

    let with_scaled = root
        .define(
            "scaled_energy",
            ColumnKind::Float64,
            vec![ColumnKind::Float64],
            Some(vec!["energy".into()]),
            |v| Ok(ColumnValue::Float64(v[0].as_f64().unwrap() * 2.0)),
        )
        .expect("define books against the root");

    let energetic = with_scaled
        .filter_named("energetic", vec![ColumnKind::Float64], Some(vec!["scaled_energy".into()]), |v| {
            Ok(v[0].as_f64().unwrap() > 15.0)
        })
        .expect("filter books against the derived column");

    let count = energetic.count().expect("count books against the filter");
    let mean_energy = energetic.mean(ColumnKind::Float64, "scaled_energy").expect("mean books a float column");

    match count.observe() {
        Ok(n) => println!("events passing 'energetic': {n}"),
        Err(e) => eprintln!("pass failed: {e}"),
    }
    match mean_energy.observe() {
        Ok(mean) => println!("mean scaled_energy among survivors: {mean:.3}"),
        Err(e) => eprintln!("pass failed: {e}"),
    }

    match graph.report() {
        Ok(report) => report.print(),
        Err(e) => eprintln!("report failed: {e}"),
    }
}
