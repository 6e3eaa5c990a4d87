//! Fixed worker pool
//!
//! Jobs of a [`DomainPartition`] are claimed dynamically through an atomic
//! cursor by a fixed set of workers, each with its own state created by the
//! [`Task`]. The first error raises an abort flag that stops further claims;
//! jobs already running finish, then the pool joins and reports that error.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use mathcheck_core::{DomainPartition, Job};
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::error::{Error, Result};

/// Work executed for every job of a partition.
pub trait Task: Sync {
    /// Per-worker state, created once on the worker's thread.
    type Worker: Send;

    fn create_worker(&self, thread_index: usize) -> Result<Self::Worker>;

    fn run_job(&self, job: Job, worker: &mut Self::Worker) -> Result<()>;
}

/// A fixed number of worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    threads: usize,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `task` over every job of `partition`.
    ///
    /// Returns the worker states after all workers joined, in thread order,
    /// so their results can be folded. On failure the first error wins and
    /// the worker states are dropped.
    pub fn run<T: Task>(&self, task: &T, partition: &DomainPartition) -> Result<Vec<T::Worker>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|index| format!("mathcheck-worker-{index}"))
            .build()?;

        let cursor = AtomicU32::new(0);
        let abort = AtomicBool::new(false);
        let first_error: Mutex<Option<Error>> = Mutex::new(None);

        let fail = |error: Error| {
            abort.store(true, Ordering::Release);
            let mut slot = first_error.lock();
            if slot.is_none() {
                *slot = Some(error);
            }
        };

        let workers: Vec<Option<T::Worker>> = pool.install(|| {
            (0..self.threads)
                .into_par_iter()
                .map(|thread_index| {
                    let mut worker = match task.create_worker(thread_index) {
                        Ok(worker) => worker,
                        Err(error) => {
                            fail(error);
                            return None;
                        }
                    };

                    while !abort.load(Ordering::Acquire) {
                        let job_id = cursor.fetch_add(1, Ordering::Relaxed);
                        let Some(job) = partition.job(job_id) else {
                            break;
                        };
                        if let Err(error) = task.run_job(job, &mut worker) {
                            tracing::debug!(thread_index, job_id, "job failed, stopping pool");
                            fail(error);
                            break;
                        }
                    }
                    Some(worker)
                })
                .collect()
        });

        if let Some(error) = first_error.into_inner() {
            return Err(error);
        }
        Ok(workers.into_iter().flatten().collect())
    }
}
