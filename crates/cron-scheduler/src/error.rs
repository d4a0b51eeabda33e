use thiserror::Error;

/// Errors produced while building triggers or registering jobs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("trigger has no future fire time")]
    NoFireTime,

    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("scheduler has been shut down")]
    ShutDown,

    #[error("scheduler must be started from within a tokio runtime")]
    NoRuntime,
}

impl SchedulerError {
    pub(crate) fn invalid_cron(expression: &str, reason: impl Into<String>) -> Self {
        Self::InvalidCron {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }
}
