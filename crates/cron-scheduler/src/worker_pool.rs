//! Bounded worker pool that executes fired jobs.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::scheduler::JobId;

/// Configuration for a worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Number of jobs that may execute concurrently.
    pub max_workers: usize,
    /// Fired jobs that may wait for a free worker before new fires are rejected.
    pub queue_capacity: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 1,
            queue_capacity: 1,
        }
    }
}

/// Why a fired job could not be handed to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// All workers are busy and the queue is full.
    QueueFull,
    /// The pool has shut down.
    Closed,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::QueueFull => write!(f, "worker queue is full"),
            DispatchError::Closed => write!(f, "worker pool is closed"),
        }
    }
}

impl std::error::Error for DispatchError {}

/// A fired job waiting for a worker.
pub(crate) struct Task {
    pub job_id: JobId,
    pub job_name: String,
    pub future: BoxFuture<'static, ()>,
}

/// Execution counters shared between the timer loop and the workers.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub fired: AtomicU64,
    pub rejected: AtomicU64,
    pub completed: AtomicU64,
    pub panicked: AtomicU64,
}

/// Point-in-time copy of a scheduler's execution counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Fires handed to the worker pool.
    pub fired: u64,
    /// Fires dropped because the queue was full.
    pub rejected: u64,
    /// Jobs that ran to completion.
    pub completed: u64,
    /// Jobs that panicked.
    pub panicked: u64,
}

impl Counters {
    pub fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            fired: self.fired.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

/// A fixed set of workers draining a bounded queue.
pub(crate) struct WorkerPool {
    label: String,
    config: WorkerPoolConfig,
    sender: mpsc::Sender<Task>,
    receiver: parking_lot::Mutex<Option<mpsc::Receiver<Task>>>,
    active_workers: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn new(label: impl Into<String>, config: WorkerPoolConfig) -> Self {
        let config = WorkerPoolConfig {
            max_workers: config.max_workers.max(1),
            queue_capacity: config.queue_capacity.max(1),
        };
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        Self {
            label: label.into(),
            config,
            sender,
            receiver: parking_lot::Mutex::new(Some(receiver)),
            active_workers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Spawn the workers. Later calls are no-ops.
    ///
    /// Workers stop taking new tasks once `cancel` fires; a task already
    /// executing is always allowed to finish.
    pub fn start(&self, cancel: CancellationToken, counters: Arc<Counters>) {
        let Some(receiver) = self.receiver.lock().take() else {
            return;
        };
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        for worker in 0..self.config.max_workers {
            let receiver = receiver.clone();
            let cancel = cancel.clone();
            let counters = counters.clone();
            let active_workers = self.active_workers.clone();
            let label = self.label.clone();

            tokio::spawn(async move {
                debug!(scheduler = %label, worker, "worker started");

                loop {
                    let task = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        task = async { receiver.lock().await.recv().await } => task,
                    };
                    let Some(task) = task else { break };

                    if cancel.is_cancelled() {
                        debug!(
                            scheduler = %label,
                            job = %task.job_name,
                            "discarding queued job after shutdown"
                        );
                        break;
                    }

                    active_workers.fetch_add(1, Ordering::SeqCst);
                    let outcome = AssertUnwindSafe(task.future).catch_unwind().await;
                    active_workers.fetch_sub(1, Ordering::SeqCst);

                    match outcome {
                        Ok(()) => {
                            counters.completed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(panic) => {
                            counters.panicked.fetch_add(1, Ordering::Relaxed);
                            error!(
                                scheduler = %label,
                                job = %task.job_name,
                                job_id = %task.job_id,
                                panic = panic_message(panic.as_ref()),
                                "job panicked"
                            );
                        }
                    }
                }

                debug!(scheduler = %label, worker, "worker stopped");
            });
        }
    }

    /// Queue a fired job without waiting.
    pub fn try_dispatch(&self, task: Task) -> Result<(), DispatchError> {
        self.sender.try_send(task).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
        })
    }

    /// Number of workers currently executing a job.
    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}
