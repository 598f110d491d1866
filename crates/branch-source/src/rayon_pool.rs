//! The thread-pool contract, backed by a `rayon::ThreadPool`.
//!
//! `branch-core` only ever asks a [`WorkerPool`] to run a partitioned task
//! and blocks until every partition has completed; it never touches `rayon`
//! directly. This is the one place in the workspace that does.

use branch_core::WorkerPool;
use rayon::ThreadPool;

pub struct RayonWorkerPool {
    pool: ThreadPool,
    workers: usize,
}

impl RayonWorkerPool {
    pub fn new(workers: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let workers = workers.max(1);
        log::debug!("building rayon worker pool with {workers} threads");
        let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build()?;
        Ok(Self { pool, workers })
    }
}

impl WorkerPool for RayonWorkerPool {
    fn worker_count(&self) -> usize {
        self.workers
    }

    fn run_partitioned(&self, num_partitions: usize, task: &(dyn Fn(usize) + Sync)) {
        self.pool.scope(|scope| {
            for i in 0..num_partitions {
                scope.spawn(move |_| task(i));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn runs_every_partition_exactly_once() {
        let pool = RayonWorkerPool::new(4).unwrap();
        let seen = (0..8).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>();
        pool.run_partitioned(8, &|i| {
            seen[i].fetch_add(1, Ordering::SeqCst);
        });
        assert!(seen.iter().all(|c| c.load(Ordering::SeqCst) == 1));
    }
}
