//! Application-wide error types.

use cron_scheduler::SchedulerError;
use thiserror::Error;

use crate::config::FieldError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        errors: Vec<FieldError>,
    },

    #[error("Invalid schedule '{schedule}': {reason}")]
    InvalidSchedule { schedule: String, reason: String },

    #[error("policy '{0}' already exists")]
    Conflict(String),

    #[error("policy '{0}' not found")]
    NotFound(String),

    #[error("Failed to resolve backend '{backend}': {reason}")]
    Resolution { backend: String, reason: String },

    #[error("Backend error: {0}")]
    Backend(String),

    /// The backend cannot recover; its runner stops firing.
    #[error("Unrecoverable backend error: {0}")]
    Unrecoverable(String),

    #[error("Execution timed out after {0}s")]
    Timeout(u64),

    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
            errors: Vec::new(),
        }
    }

    /// Configuration error carrying per-field validation failures.
    pub fn invalid_fields(errors: Vec<FieldError>) -> Self {
        let message = match errors.as_slice() {
            [single] => format!("{}: {}", single.field, single.error),
            _ => format!("{} fields failed validation", errors.len()),
        };
        Self::Configuration { message, errors }
    }

    pub fn invalid_schedule(schedule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            schedule: schedule.into(),
            reason: reason.into(),
        }
    }

    pub fn resolution(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn unrecoverable(msg: impl Into<String>) -> Self {
        Self::Unrecoverable(msg.into())
    }

    pub fn ingestion(msg: impl Into<String>) -> Self {
        Self::Ingestion(msg.into())
    }

    /// Whether the runner that produced this error must stop firing.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Unrecoverable(_))
    }
}
