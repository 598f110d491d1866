//! The thread-pool contract (external collaborator) and the process-wide
//! parallel-mode flag.
//!
//! `branch-core` never spawns threads itself; it asks a [`WorkerPool`] to
//! run a partitioned task concurrently and blocks until every partition has
//! completed (or the first error has propagated). `branch-source`'s
//! `RayonWorkerPool` is the reference implementation.

use std::cell::Cell;
use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};
use std::thread::{self, ThreadId};

use once_cell::sync::Lazy;

pub trait WorkerPool: Send + Sync {
    /// Number of distinct worker threads backing this pool.
    fn worker_count(&self) -> usize;

    /// Runs `task(i)` for every `i` in `0..num_partitions`, across the
    /// pool's threads, returning only once every invocation has completed.
    fn run_partitioned(&self, num_partitions: usize, task: &(dyn Fn(usize) + Sync));
}

/// Process-wide parallel-execution mode, read once at the start of every
/// pass. Changing it mid-pass has no effect on a pass already underway.
#[derive(Debug, Clone, Copy)]
pub struct ParallelConfig {
    pub enabled: bool,
    pub workers: usize,
}

impl ParallelConfig {
    fn from_env() -> Self {
        let enabled = env::var("BRANCHFLOW_PARALLEL")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"))
            .unwrap_or(false);
        let workers = env::var("BRANCHFLOW_WORKERS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|w| *w > 0)
            .unwrap_or_else(|| thread::available_parallelism().map(|n| n.get()).unwrap_or(1));
        Self { enabled, workers }
    }
}

static PARALLEL_CONFIG: Lazy<RwLock<ParallelConfig>> =
    Lazy::new(|| RwLock::new(ParallelConfig::from_env()));

pub fn parallel_config() -> ParallelConfig {
    *PARALLEL_CONFIG.read().unwrap()
}

/// Overrides the global mode flag, mainly for tests that need a
/// deterministic worker count without relying on environment variables.
pub fn set_parallel_config(cfg: ParallelConfig) {
    *PARALLEL_CONFIG.write().unwrap() = cfg;
}

/// Assigns a stable slot in `[0, capacity)` to each physical thread that
/// asks for one, the first time it asks. The mapping is guarded by a short
/// critical section; every subsequent lookup from the same thread is served
/// from a thread-local cache and never touches the lock.
///
/// A thread pool's worker threads outlive any single pass, so the thread
/// local is keyed by this assigner's own id, not just the thread: a thread
/// that cached a slot for a previous pass's (possibly larger) assigner must
/// not reuse that slot against a new assigner with a smaller capacity.
pub struct SlotAssigner {
    id: usize,
    map: Mutex<HashMap<ThreadId, usize>>,
    next: Mutex<usize>,
    capacity: usize,
}

static NEXT_ASSIGNER_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static CACHED_SLOT: Cell<Option<(usize, usize)>> = Cell::new(None);
}

impl SlotAssigner {
    pub fn new(capacity: usize) -> Self {
        Self {
            id: NEXT_ASSIGNER_ID.fetch_add(1, Ordering::Relaxed),
            map: Mutex::new(HashMap::new()),
            next: Mutex::new(0),
            capacity: capacity.max(1),
        }
    }

    pub fn slot_for_current_thread(&self) -> usize {
        if let Some((id, s)) = CACHED_SLOT.with(|c| c.get()) {
            if id == self.id {
                return s;
            }
        }
        let id = thread::current().id();
        let mut map = self.map.lock().unwrap();
        let slot = *map.entry(id).or_insert_with(|| {
            let mut next = self.next.lock().unwrap();
            let s = *next % self.capacity;
            *next += 1;
            s
        });
        drop(map);
        CACHED_SLOT.with(|c| c.set(Some((self.id, slot))));
        slot
    }
}
