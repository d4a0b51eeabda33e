//! Runner status.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

/// Lifecycle state of a policy runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Status {
    /// Constructed, not yet set up.
    New = 0,
    /// Scheduled and firing.
    Running = 1,
    /// Stopped by its owner.
    Finished = 2,
    /// Stopped by an unrecoverable backend error.
    Failed = 3,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::New => "new",
            Status::Running => "running",
            Status::Finished => "finished",
            Status::Failed => "failed",
        }
    }

    /// Whether the runner can never run again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Finished | Status::Failed)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Status::New,
            1 => Status::Running,
            2 => Status::Finished,
            _ => Status::Failed,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free status shared between a runner and its job.
#[derive(Debug)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn new(status: Status) -> Self {
        Self(AtomicU8::new(status as u8))
    }

    pub fn get(&self) -> Status {
        Status::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`. Returns `false`, leaving the status
    /// untouched, if the current status is not `from`.
    pub fn transition(&self, from: Status, to: Status) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new(Status::New)
    }
}
