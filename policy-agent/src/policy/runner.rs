//! Per-policy runner.
//!
//! A [`PolicyRunner`] owns one private [`JobScheduler`] with exactly one job.
//! The job resolves nothing at fire time: the backend and the ingestion client
//! are built once during [`PolicyRunner::setup`] and captured by the job.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cron_scheduler::{
    JobId, JobScheduler, SchedulerConfig, SchedulerError, SchedulerStats, StopHandle, Trigger,
};
use tracing::{debug, error, info};

use super::status::{Status, StatusCell};
use crate::backend::{Backend, BackendRegistry, Entity};
use crate::config::{PolicyConfig, Scope, SinkConfig};
use crate::error::{Error, Result};
use crate::ingest::{ClientIdentity, IngestClient, IngestClientFactory};

/// Delay before a policy without a schedule runs.
pub const ONE_SHOT_DELAY: Duration = Duration::from_secs(1);

/// Strip line breaks so names cannot forge log lines.
pub fn sanitize_name(raw: &str) -> String {
    raw.replace("\r\n", "").replace('\n', "")
}

/// Dependencies shared by every runner of a manager.
#[derive(Clone)]
pub struct RunnerContext {
    pub sink: SinkConfig,
    pub backends: Arc<BackendRegistry>,
    pub clients: Arc<dyn IngestClientFactory>,
    pub scheduler: SchedulerConfig,
}

impl RunnerContext {
    pub fn new(
        sink: SinkConfig,
        backends: Arc<BackendRegistry>,
        clients: Arc<dyn IngestClientFactory>,
    ) -> Self {
        Self {
            sink,
            backends,
            clients,
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl fmt::Debug for RunnerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerContext")
            .field("sink", &self.sink)
            .field("backends", &self.backends)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

/// Result of one execution of a policy job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The sink accepted every record.
    Ingested { count: usize },
    /// The sink reported per-record errors.
    IngestionFailed(Vec<String>),
    /// The sink could not be reached.
    IngestionError(String),
    /// The backend failed; the next fire runs as usual.
    ExecutionFailed(String),
    /// The backend failed permanently and the runner stopped.
    Fatal(String),
    /// The runner was not running.
    Skipped,
}

/// State captured by the scheduled job.
struct PolicyJob {
    name: String,
    config: PolicyConfig,
    scope: Scope,
    backend: Arc<dyn Backend>,
    client: Arc<dyn IngestClient>,
    status: Arc<StatusCell>,
    stop: StopHandle,
}

impl PolicyJob {
    async fn execute(&self) -> RunOutcome {
        if self.status.get() != Status::Running {
            debug!(
                policy = %self.name,
                status = %self.status.get(),
                "policy is not running, skipping execution"
            );
            return RunOutcome::Skipped;
        }

        let entities = match self.collect().await {
            Ok(entities) => entities,
            Err(err) if err.is_unrecoverable() => {
                error!(
                    policy = %self.name,
                    error = %err,
                    "backend failed permanently, stopping policy"
                );
                self.status.transition(Status::Running, Status::Failed);
                self.stop.stop();
                return RunOutcome::Fatal(err.to_string());
            }
            Err(err) => {
                error!(policy = %self.name, error = %err, "policy execution failed");
                return RunOutcome::ExecutionFailed(err.to_string());
            }
        };

        let count = entities.len();
        match self.client.ingest(entities).await {
            Ok(response) if response.is_success() => {
                info!(policy = %self.name, entities = count, "successful ingestion");
                RunOutcome::Ingested { count }
            }
            Ok(response) => {
                error!(policy = %self.name, errors = ?response.errors, "ingestion failed");
                RunOutcome::IngestionFailed(response.errors)
            }
            Err(err) => {
                error!(policy = %self.name, error = %err, "error ingesting entities");
                RunOutcome::IngestionError(err.to_string())
            }
        }
    }

    async fn collect(&self) -> Result<Vec<Entity>> {
        let run = self.backend.run(&self.config, &self.scope);
        match self.config.timeout {
            Some(secs) => tokio::time::timeout(Duration::from_secs(secs), run)
                .await
                .map_err(|_| Error::Timeout(secs))?,
            None => run.await,
        }
    }
}

/// Runs one policy on its own schedule.
pub struct PolicyRunner {
    name: String,
    status: Arc<StatusCell>,
    config: Option<PolicyConfig>,
    scheduler: Option<JobScheduler>,
    job: Option<JobId>,
}

impl PolicyRunner {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            status: Arc::new(StatusCell::default()),
            config: None,
            scheduler: None,
            job: None,
        }
    }

    /// Resolve the backend, build the ingestion client and schedule the job.
    ///
    /// Must be called from within a tokio runtime. On error nothing stays
    /// scheduled and the runner remains [`Status::New`].
    pub fn setup(
        &mut self,
        name: &str,
        context: &RunnerContext,
        mut config: PolicyConfig,
        scope: Scope,
    ) -> Result<()> {
        if self.status.get() != Status::New {
            return Err(Error::Other(format!(
                "policy runner '{}' was already set up",
                self.name
            )));
        }

        let name = sanitize_name(name);
        config.backend = sanitize_name(&config.backend);

        let backend = context.backends.resolve(&config.backend)?;
        let metadata = backend.setup()?;
        let identity = ClientIdentity::new(&context.sink, &metadata);
        let client = context.clients.create(&context.sink, identity)?;
        let trigger = build_trigger(&config)?;

        match config.schedule.as_deref() {
            Some(schedule) => {
                info!(policy = %name, backend = %config.backend, schedule, "scheduled to run")
            }
            None => info!(policy = %name, backend = %config.backend, "one-time run"),
        }

        let scheduler = JobScheduler::new(format!("policy:{name}"), context.scheduler.clone());
        let job = Arc::new(PolicyJob {
            name: name.clone(),
            config: config.clone(),
            scope,
            backend,
            client,
            status: self.status.clone(),
            stop: scheduler.stop_handle(),
        });

        if let Err(err) = scheduler.start() {
            scheduler.shutdown();
            return Err(err.into());
        }

        // Running before the job exists, so an immediate first fire is not skipped.
        self.status.transition(Status::New, Status::Running);
        let registered = scheduler.add_job(name.clone(), trigger, move || {
            let job = job.clone();
            async move {
                job.execute().await;
            }
        });

        let job_id = match registered {
            Ok(id) => id,
            Err(err) => {
                scheduler.shutdown();
                self.status.transition(Status::Running, Status::New);
                return Err(match err {
                    SchedulerError::NoFireTime => Error::invalid_schedule(
                        config.schedule.clone().unwrap_or_default(),
                        "schedule never fires",
                    ),
                    other => other.into(),
                });
            }
        };

        self.name = name;
        self.config = Some(config);
        self.scheduler = Some(scheduler);
        self.job = Some(job_id);
        Ok(())
    }

    /// Shut the scheduler down. An execution in flight finishes on its own.
    ///
    /// Idempotent. A failed runner stays [`Status::Failed`].
    pub fn stop(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.shutdown();
        }
        if self.status.transition(Status::Running, Status::Finished) {
            info!(policy = %self.name, "policy stopped");
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> Status {
        self.status.get()
    }

    pub fn config(&self) -> Option<&PolicyConfig> {
        self.config.as_ref()
    }

    /// Whether the runner's job is still registered with a live scheduler.
    pub fn is_scheduled(&self) -> bool {
        match (&self.scheduler, self.job) {
            (Some(scheduler), Some(job)) => scheduler.is_running() && scheduler.has_job(job),
            _ => false,
        }
    }

    pub fn stats(&self) -> Option<SchedulerStats> {
        self.scheduler.as_ref().map(JobScheduler::stats)
    }
}

impl Default for PolicyRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PolicyRunner {
    fn drop(&mut self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.shutdown();
        }
    }
}

impl fmt::Debug for PolicyRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyRunner")
            .field("name", &self.name)
            .field("status", &self.status())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn build_trigger(config: &PolicyConfig) -> Result<Trigger> {
    match config.schedule.as_deref() {
        Some(schedule) => Trigger::cron(schedule).map_err(|err| match err {
            SchedulerError::InvalidCron { reason, .. } => Error::invalid_schedule(schedule, reason),
            other => other.into(),
        }),
        None => Ok(Trigger::after(ONE_SHOT_DELAY)),
    }
}
