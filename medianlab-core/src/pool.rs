//! Fixed-size worker pool with a FIFO task queue.
//!
//! Each submission gets its own one-shot result channel, so callers hold a
//! typed [`TaskHandle<T>`] instead of a shared, type-erased result slot. The
//! queue is the only state shared between threads and is guarded by a single
//! mutex/condvar pair.
//!
//! Shutdown is graceful: queued tasks still run, new submissions are rejected
//! with [`PoolError::ShutDown`], and every worker is joined before
//! [`WorkerPool::shutdown`] returns. Nothing is cancelled mid-task.

use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool is shut down; task rejected")]
    ShutDown,

    #[error("task panicked before producing a result")]
    TaskPanicked,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Queue {
    jobs: VecDeque<Job>,
    stopping: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        // Jobs never run under the lock, so a poisoned queue is still consistent.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to the eventual result of one submitted task.
#[must_use = "dropping a TaskHandle discards the task's result"]
pub struct TaskHandle<T> {
    rx: mpsc::Receiver<thread::Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Block until the task finishes and return its result.
    pub fn join(self) -> Result<T, PoolError> {
        match self.rx.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) | Err(_) => Err(PoolError::TaskPanicked),
        }
    }
}

/// Fixed number of worker threads draining a shared FIFO queue.
pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    /// Spawn `size` workers (at least one).
    pub fn new(size: usize) -> Result<Self, PoolError> {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                jobs: VecDeque::new(),
                stopping: false,
            }),
            available: Condvar::new(),
        });

        let mut workers = Vec::with_capacity(size);
        for i in 0..size {
            let worker_shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("medianlab-worker-{i}"))
                .spawn(move || worker_loop(&worker_shared));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Tear down whatever already started before reporting.
                    shared.lock().stopping = true;
                    shared.available.notify_all();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        tracing::debug!(workers = size, "worker pool started");
        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            size,
        })
    }

    /// Pool sized to the machine's available parallelism.
    pub fn with_default_size() -> Result<Self, PoolError> {
        Self::new(default_worker_count())
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Enqueue a task. Fails once shutdown has begun.
    pub fn submit<F, T>(&self, task: F) -> Result<TaskHandle<T>, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let job: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(task));
            // The receiver may already be gone; the result is simply unwanted then.
            let _ = tx.send(result);
        });

        {
            let mut queue = self.shared.lock();
            if queue.stopping {
                return Err(PoolError::ShutDown);
            }
            queue.jobs.push_back(job);
        }
        self.shared.available.notify_one();
        Ok(TaskHandle { rx })
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.lock().stopping
    }

    /// Stop accepting work, run what is queued, and join every worker.
    ///
    /// Idempotent, and safe to call from several threads: every caller returns
    /// only after all workers have been joined. Must not be called from inside
    /// a pool task.
    pub fn shutdown(&self) {
        self.shared.lock().stopping = true;
        self.shared.available.notify_all();

        // Held across the joins so a concurrent caller waits for them.
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if workers.is_empty() {
            return;
        }
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
        tracing::debug!(workers = self.size, "worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut queue = shared.lock();
            loop {
                if let Some(job) = queue.jobs.pop_front() {
                    break job;
                }
                if queue.stopping {
                    return;
                }
                queue = shared
                    .available
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };
        job();
    }
}

/// Available hardware parallelism, falling back to one worker.
pub fn default_worker_count() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}
