//! Bounded-parallelism executor for the per-block and per-account fan-out.
//!
//! The pool runs a fixed number of long-lived tokio tasks that pull work from one unbounded
//! queue. Callers that need to wait for a group of tasks attach them to a [`TaskBatch`].

use futures::FutureExt;
use std::{
    fmt,
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::{
    sync::{Notify, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, warn};

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A fixed set of workers consuming a shared task queue.
pub struct WorkerPool {
    sender: async_channel::Sender<Task>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("queued", &self.sender.len())
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

impl WorkerPool {
    /// Spawns `size` workers on the current tokio runtime. A size of zero is raised to one.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = async_channel::unbounded::<Task>();

        let workers = (0..size)
            .map(|id| {
                let receiver = receiver.clone();
                tokio::spawn(async move {
                    while let Ok(task) = receiver.recv().await {
                        if AssertUnwindSafe(task).catch_unwind().await.is_err() {
                            error!(target: "worker_pool", worker = id, "Task panicked");
                        }
                    }
                    debug!(target: "worker_pool", worker = id, "Worker stopped");
                })
            })
            .collect();

        Self { sender, workers: Mutex::new(workers), size }
    }

    /// Returns the number of workers.
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Enqueues `task`. Returns immediately.
    ///
    /// Tasks submitted after [`WorkerPool::shutdown`] are dropped.
    pub fn submit<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.sender.try_send(Box::pin(task)).is_err() {
            warn!(target: "worker_pool", "Task submitted to a stopped pool, dropping it");
        }
    }

    /// Enqueues `task` as a member of `batch`.
    ///
    /// The batch counts the task as outstanding until it completes, panics or is dropped.
    pub fn submit_to<F>(&self, batch: &TaskBatch, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = batch.enter();
        self.submit(async move {
            let _guard = guard;
            task.await;
        });
    }

    /// Runs all `tasks` on the pool and returns their outputs in submission order.
    ///
    /// The output of a task that panicked is `None`.
    pub async fn join_all<I, F, T>(&self, tasks: I) -> Vec<Option<T>>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let receivers: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let (tx, rx) = oneshot::channel();
                self.submit(async move {
                    let _ = tx.send(task.await);
                });
                rx
            })
            .collect();

        futures::future::join_all(receivers).await.into_iter().map(Result::ok).collect()
    }

    /// Closes the queue and waits for the workers to drain it.
    pub async fn shutdown(&self) {
        self.sender.close();
        let workers =
            std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        for worker in workers {
            if let Err(err) = worker.await {
                warn!(target: "worker_pool", %err, "Worker terminated abnormally");
            }
        }
    }
}

/// A counting barrier over tasks submitted with [`WorkerPool::submit_to`].
#[derive(Debug, Clone, Default)]
pub struct TaskBatch {
    inner: Arc<BatchState>,
}

#[derive(Debug, Default)]
struct BatchState {
    outstanding: AtomicUsize,
    done: Notify,
}

impl TaskBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks that have not finished yet.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Waits until every task of the batch has finished. Returns immediately for an empty batch.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.done.notified();
            tokio::pin!(notified);
            // register before checking so a completion in between is not missed
            notified.as_mut().enable();
            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn enter(&self) -> BatchGuard {
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        BatchGuard { state: Arc::clone(&self.inner) }
    }
}

struct BatchGuard {
    state: Arc<BatchState>,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        if self.state.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.state.done.notify_waiters();
        }
    }
}
