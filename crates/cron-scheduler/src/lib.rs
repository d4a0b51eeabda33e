//! Small background scheduler for cron and one-shot jobs.
//!
//! - [`CronSchedule`] parses five-field cron expressions and computes the next
//!   occurrence.
//! - [`Trigger`] decides when a job fires: on a cron schedule or once.
//! - [`JobScheduler`] runs one timer task plus a bounded worker pool and fires
//!   registered jobs on their triggers.

mod cron;
mod error;
mod scheduler;
mod trigger;
mod worker_pool;

pub use cron::CronSchedule;
pub use error::SchedulerError;
pub use scheduler::{JobId, JobScheduler, SchedulerConfig, StopHandle};
pub use trigger::Trigger;
pub use worker_pool::{DispatchError, SchedulerStats, WorkerPoolConfig};
