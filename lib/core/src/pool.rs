// Bounded worker pool used by every estimator and by the clustering rounds.
// A shared FIFO job queue is drained by at most `concurrency` worker threads;
// each finished job posts a completion message and `run` returns only once
// every dispatched job has reported back.

use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::mpsc;
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(Error::InvalidConfig("concurrency must be positive".to_string()));
        }
        Ok(Self { concurrency })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `work` over every job with at most `concurrency` jobs in flight.
    ///
    /// Blocks until all jobs completed. Results are returned in job order.
    pub fn run<J, T, F>(&self, jobs: Vec<J>, work: F) -> Result<Vec<T>>
    where
        J: Send,
        T: Send,
        F: Fn(J) -> T + Sync,
    {
        let dispatched = jobs.len();
        if dispatched == 0 {
            return Ok(Vec::new());
        }

        let queue = Mutex::new(jobs.into_iter().enumerate().collect::<VecDeque<_>>());
        let workers = self.concurrency.min(dispatched);
        let (done_tx, done_rx) = mpsc::channel::<(usize, T)>();
        let mut results: Vec<Option<T>> = Vec::with_capacity(dispatched);
        results.resize_with(dispatched, || None);

        let spawned = thread::scope(|scope| {
            let queue = &queue;
            let work = &work;
            let mut spawned = 0;
            for worker_id in 0..workers {
                let done_tx = done_tx.clone();
                let handle = thread::Builder::new()
                    .name(format!("dprof-worker-{}", worker_id))
                    .spawn_scoped(scope, move || loop {
                        // Release the queue lock before executing the job
                        let next = queue.lock().pop_front();
                        match next {
                            Some((idx, job)) => {
                                let out = work(job);
                                if done_tx.send((idx, out)).is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    });
                match handle {
                    Ok(_) => spawned += 1,
                    Err(e) => tracing::warn!("Failed to spawn worker {}: {}", worker_id, e),
                }
            }
            drop(done_tx);

            // Barrier: wait for one completion per dispatched job
            for (idx, out) in done_rx.iter().take(dispatched) {
                results[idx] = Some(out);
            }
            spawned
        });

        if spawned == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "no worker thread could be spawned",
            )));
        }

        let completed: Vec<T> = results.into_iter().flatten().collect();
        if completed.len() != dispatched {
            return Err(Error::Computation(format!(
                "{} of {} jobs did not complete",
                dispatched - completed.len(),
                dispatched
            )));
        }
        Ok(completed)
    }
}
