//! Background job scheduler.
//!
//! A [`JobScheduler`] owns one timer task and one [`WorkerPool`]. The timer
//! task keeps a min-heap of `(due, job)` entries, sleeps until the earliest is
//! due, hands the job's future to the pool and, for recurring triggers, pushes
//! the next occurrence back onto the heap. Slow jobs therefore never delay the
//! timer, and the bounded pool applies back-pressure when a job keeps firing
//! faster than it completes.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Local};
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SchedulerError;
use crate::trigger::Trigger;
use crate::worker_pool::{
    Counters, DispatchError, SchedulerStats, Task, WorkerPool, WorkerPoolConfig,
};

/// Identifier of a job within one scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub(crate) u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Worker pool sizing. The default (one worker, one queued fire)
    /// serializes executions of a job.
    pub pool: WorkerPoolConfig,
}

type JobFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct Job {
    name: String,
    trigger: Trigger,
    callback: JobFn,
    occurrence: Option<DateTime<Local>>,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Scheduled {
    due: Instant,
    id: JobId,
}

#[derive(Default)]
struct State {
    jobs: HashMap<JobId, Job>,
    queue: BinaryHeap<Reverse<Scheduled>>,
}

struct Inner {
    label: String,
    state: parking_lot::Mutex<State>,
    wake: Notify,
    cancel: CancellationToken,
    started: AtomicBool,
    next_id: AtomicU64,
    counters: Arc<Counters>,
    pool: WorkerPool,
}

/// A timer service firing jobs on their triggers.
///
/// Cloning yields another handle to the same scheduler.
#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<Inner>,
}

/// Handle that shuts a scheduler down without keeping it alive.
#[derive(Debug, Clone)]
pub struct StopHandle {
    cancel: CancellationToken,
}

impl StopHandle {
    /// Shut the scheduler down. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl JobScheduler {
    /// Create a scheduler. Nothing fires until [`JobScheduler::start`].
    pub fn new(label: impl Into<String>, config: SchedulerConfig) -> Self {
        let label = label.into();
        Self {
            inner: Arc::new(Inner {
                pool: WorkerPool::new(label.clone(), config.pool),
                label,
                state: parking_lot::Mutex::new(State::default()),
                wake: Notify::new(),
                cancel: CancellationToken::new(),
                started: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
                counters: Arc::new(Counters::default()),
            }),
        }
    }

    /// Spawn the timer task and the workers on the current tokio runtime.
    pub fn start(&self) -> Result<(), SchedulerError> {
        if self.inner.cancel.is_cancelled() {
            return Err(SchedulerError::ShutDown);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.inner
            .pool
            .start(self.inner.cancel.clone(), self.inner.counters.clone());
        runtime.spawn(run_timer(self.inner.clone()));

        debug!(scheduler = %self.inner.label, "scheduler started");
        Ok(())
    }

    /// Register a job. Returns its id.
    ///
    /// Fails if the scheduler was shut down or the trigger can never fire.
    pub fn add_job<F, Fut>(
        &self,
        name: impl Into<String>,
        trigger: Trigger,
        callback: F,
    ) -> Result<JobId, SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.inner.cancel.is_cancelled() {
            return Err(SchedulerError::ShutDown);
        }
        let next = trigger.next_fire(None).ok_or(SchedulerError::NoFireTime)?;

        let id = JobId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let name = name.into();
        let callback: JobFn = Arc::new(move || callback().boxed());

        {
            let mut state = self.inner.state.lock();
            state.jobs.insert(
                id,
                Job {
                    name: name.clone(),
                    trigger,
                    callback,
                    occurrence: next.occurrence,
                },
            );
            state.queue.push(Reverse(Scheduled { due: next.due, id }));
        }
        self.inner.wake.notify_one();

        debug!(scheduler = %self.inner.label, job = %name, %id, "job added");
        Ok(id)
    }

    /// Cancel one job. Returns `false` if it was not registered.
    ///
    /// An execution that already started is not interrupted.
    pub fn remove_job(&self, id: JobId) -> bool {
        let removed = self.inner.state.lock().jobs.remove(&id).is_some();
        if removed {
            self.inner.wake.notify_one();
        }
        removed
    }

    pub fn has_job(&self, id: JobId) -> bool {
        self.inner.state.lock().jobs.contains_key(&id)
    }

    pub fn job_count(&self) -> usize {
        self.inner.state.lock().jobs.len()
    }

    /// Whether the scheduler was started and has not been shut down.
    pub fn is_running(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst) && !self.inner.cancel.is_cancelled()
    }

    /// Number of jobs currently executing.
    pub fn active_jobs(&self) -> usize {
        self.inner.pool.active_workers()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.inner.counters.snapshot()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            cancel: self.inner.cancel.clone(),
        }
    }

    /// Stop the timer and discard pending fires. Idempotent.
    ///
    /// Jobs that are already executing run to completion.
    pub fn shutdown(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        self.inner.cancel.cancel();
        let mut state = self.inner.state.lock();
        state.jobs.clear();
        state.queue.clear();
        debug!(scheduler = %self.inner.label, "scheduler shut down");
    }
}

impl fmt::Debug for JobScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobScheduler")
            .field("label", &self.inner.label)
            .field("running", &self.is_running())
            .field("jobs", &self.job_count())
            .finish()
    }
}

async fn run_timer(inner: Arc<Inner>) {
    loop {
        let next_due = inner.state.lock().queue.peek().map(|Reverse(entry)| entry.due);

        tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => break,
            _ = inner.wake.notified() => {}
            _ = sleep_until(next_due) => inner.fire_due(),
        }
    }

    let mut state = inner.state.lock();
    state.jobs.clear();
    state.queue.clear();
    debug!(scheduler = %inner.label, "timer stopped");
}

async fn sleep_until(due: Option<Instant>) {
    match due {
        Some(due) => tokio::time::sleep_until(due).await,
        None => std::future::pending().await,
    }
}

impl Inner {
    fn fire_due(&self) {
        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        while let Some(Reverse(entry)) = state.queue.peek() {
            if entry.due > now {
                break;
            }
            let Some(Reverse(entry)) = state.queue.pop() else {
                break;
            };
            // Entries of removed jobs are dropped lazily.
            let Some(job) = state.jobs.get_mut(&entry.id) else {
                continue;
            };

            self.dispatch(entry.id, job);

            if !job.trigger.is_recurring() {
                state.jobs.remove(&entry.id);
                continue;
            }

            match job.trigger.next_fire(job.occurrence) {
                Some(next) => {
                    job.occurrence = next.occurrence;
                    state.queue.push(Reverse(Scheduled {
                        due: next.due,
                        id: entry.id,
                    }));
                }
                None => {
                    warn!(
                        scheduler = %self.label,
                        job = %job.name,
                        "trigger has no further fire time, removing job"
                    );
                    state.jobs.remove(&entry.id);
                }
            }
        }
    }

    fn dispatch(&self, id: JobId, job: &Job) {
        let task = Task {
            job_id: id,
            job_name: job.name.clone(),
            future: (job.callback)(),
        };

        match self.pool.try_dispatch(task) {
            Ok(()) => {
                self.counters.fired.fetch_add(1, Ordering::Relaxed);
                debug!(scheduler = %self.label, job = %job.name, "job fired");
            }
            Err(DispatchError::QueueFull) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(
                    scheduler = %self.label,
                    job = %job.name,
                    "previous executions still pending, skipping this fire"
                );
            }
            Err(DispatchError::Closed) => {
                info!(
                    scheduler = %self.label,
                    job = %job.name,
                    "worker pool closed, dropping fire"
                );
            }
        }
    }
}
