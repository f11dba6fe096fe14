//! Bounded parallel executor with fail-fast semantics.
//!
//! Runs `unit_count` independent units of work on a dedicated rayon pool of
//! `workers` OS threads. Each worker drains a shared cursor: lock, take the
//! next index, unlock, run the unit. The cursor and the recorded failure sit
//! behind one mutex, so these hold at any degree of parallelism:
//!
//! - the **first** failure to reach the lock is the one returned, later ones
//!   are dropped;
//! - once a failure is recorded no worker takes another index, while units
//!   already in flight run to completion;
//! - with one worker, units run strictly in index order and nothing after
//!   the failing unit starts.
//!
//! The executor never reorders results because it produces none: units write
//! their own output, and callers that need ordered results index by unit.

use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Worker count used when none is configured: one per available core.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

pub struct Executor {
    pool: ThreadPool,
    workers: usize,
}

struct Queue<E> {
    next: usize,
    failure: Option<E>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking unit poisons nothing we can't still read; the panic itself
    // is re-raised by the scope.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Executor {
    /// Build a pool of `workers` threads. Zero is treated as one.
    pub fn new(workers: usize) -> Result<Self, ThreadPoolBuildError> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("chapter-sync-{i}"))
            .build()?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run units `0..unit_count`, returning the first error any of them raised.
    pub fn run<E, F>(&self, unit_count: usize, work: F) -> Result<(), E>
    where
        E: Send,
        F: Fn(usize) -> Result<(), E> + Sync,
    {
        if unit_count == 0 {
            return Ok(());
        }

        let queue = Mutex::new(Queue {
            next: 0,
            failure: None,
        });

        let drain = || {
            loop {
                let index = {
                    let mut q = lock(&queue);
                    if q.failure.is_some() || q.next >= unit_count {
                        return;
                    }
                    q.next += 1;
                    q.next - 1
                };

                if let Err(e) = work(index) {
                    let mut q = lock(&queue);
                    if q.failure.is_none() {
                        tracing::debug!(unit = index, "unit failed, draining");
                        q.failure = Some(e);
                    }
                }
            }
        };

        let spawned = self.workers.min(unit_count);
        self.pool.scope(|scope| {
            for _ in 0..spawned {
                scope.spawn(|_| drain());
            }
        });

        let queue = queue.into_inner().unwrap_or_else(PoisonError::into_inner);
        match queue.failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
