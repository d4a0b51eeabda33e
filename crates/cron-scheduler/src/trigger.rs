//! Trigger definitions.

use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::time::Instant;

use crate::cron::CronSchedule;
use crate::error::SchedulerError;

/// When a job fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Fires on every occurrence of a cron schedule, in local time.
    Cron(CronSchedule),
    /// Fires once at the given instant.
    At(Instant),
}

/// A computed fire time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NextFire {
    /// Monotonic deadline the timer loop sleeps until.
    pub due: Instant,
    /// Wall-clock occurrence, for cron triggers.
    pub occurrence: Option<DateTime<Local>>,
}

impl Trigger {
    /// Parse a cron trigger.
    pub fn cron(expression: &str) -> Result<Self, SchedulerError> {
        CronSchedule::parse(expression).map(Self::Cron)
    }

    /// A one-shot trigger firing `delay` from now.
    pub fn after(delay: Duration) -> Self {
        Self::At(Instant::now() + delay)
    }

    /// Whether the trigger keeps firing after its first occurrence.
    pub fn is_recurring(&self) -> bool {
        matches!(self, Self::Cron(_))
    }

    /// Compute the next fire time.
    ///
    /// `previous` is the wall-clock occurrence of the last fire. Cron triggers
    /// search from whichever is later, the previous occurrence or now, so one
    /// occurrence never fires twice when the monotonic and wall clocks drift.
    pub(crate) fn next_fire(&self, previous: Option<DateTime<Local>>) -> Option<NextFire> {
        match self {
            Self::At(at) => Some(NextFire {
                due: *at,
                occurrence: None,
            }),
            Self::Cron(schedule) => {
                let now = Local::now();
                let from = match previous {
                    Some(previous) if previous > now => previous,
                    _ => now,
                };
                let occurrence = schedule.next_after(&from)?;
                let wait = (occurrence - now).to_std().unwrap_or(Duration::ZERO);
                Some(NextFire {
                    due: Instant::now() + wait,
                    occurrence: Some(occurrence),
                })
            }
        }
    }
}
