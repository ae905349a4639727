//! Fixed-size worker pool over crossbeam channels.
//!
//! A pool is created per run, hands each worker an `Arc` to the shared
//! read-only context, and streams results back over a bounded channel so
//! at most one finished result per worker sits in flight. Task order in,
//! result order out are unrelated; callers fold results with operations
//! that do not care about arrival order.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver};

use entwine_core::{EntwineError, Result};

/// Number of logical CPUs, falling back to 1 when it cannot be queried.
#[must_use]
pub fn num_cpus() -> usize {
    thread::available_parallelism().map(|p| p.get()).unwrap_or(1)
}

/// A fixed-size pool of worker threads.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    /// Creates a pool of exactly `workers` threads.
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(EntwineError::Config("worker count must be at least 1".into()));
        }
        Ok(Self { workers })
    }

    /// Creates a pool sized to the machine's available parallelism.
    #[must_use]
    pub fn with_available_parallelism() -> Self {
        Self { workers: num_cpus() }
    }

    /// Number of worker threads this pool spawns per run.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Spawns the workers, feeds them `tasks`, and returns the result stream.
    ///
    /// Each worker pulls the next pending task, runs `task_fn` against the
    /// shared `context`, and sends the outcome back. A panic inside the task
    /// is caught and surfaced as a `Worker` error carrying the task index,
    /// so one bad partition fails the run instead of the process.
    pub fn run_unordered<C, T, R, F>(
        &self,
        context: Arc<C>,
        tasks: Vec<T>,
        task_fn: F,
    ) -> ResultStream<R>
    where
        C: Send + Sync + 'static,
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(&C, T) -> Result<R> + Send + Sync + 'static,
    {
        let (task_sender, task_receiver) = unbounded::<(usize, T)>();
        let (result_sender, result_receiver) = bounded::<Result<R>>(self.workers);
        for task in tasks.into_iter().enumerate() {
            // the receiver is alive, an unbounded send cannot fail here
            let _ = task_sender.send(task);
        }
        drop(task_sender);

        let task_fn = Arc::new(task_fn);
        let mut handles = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            let tasks = task_receiver.clone();
            let results = result_sender.clone();
            let context = Arc::clone(&context);
            let task_fn = Arc::clone(&task_fn);
            handles.push(thread::spawn(move || {
                while let Ok((index, task)) = tasks.recv() {
                    let outcome =
                        panic::catch_unwind(AssertUnwindSafe(|| task_fn(&context, task)));
                    let outcome = match outcome {
                        Ok(Ok(result)) => Ok(result),
                        Ok(Err(error)) => Err(EntwineError::Worker {
                            partition: index,
                            message: error.to_string(),
                        }),
                        Err(_) => Err(EntwineError::Worker {
                            partition: index,
                            message: "task panicked".into(),
                        }),
                    };
                    if results.send(outcome).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(result_sender);

        ResultStream { results: result_receiver, handles }
    }
}

/// Streaming iterator over worker results, in completion order.
///
/// Dropping the stream early closes the result channel, which unblocks any
/// worker waiting to send, then joins the threads.
pub struct ResultStream<R> {
    results: Receiver<Result<R>>,
    handles: Vec<JoinHandle<()>>,
}

impl<R> Iterator for ResultStream<R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        self.results.recv().ok()
    }
}

impl<R> Drop for ResultStream<R> {
    fn drop(&mut self) {
        // close the channel before joining so blocked senders bail out
        drop(std::mem::replace(&mut self.results, crossbeam_channel::never()));
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
