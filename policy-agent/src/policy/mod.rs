//! Policy lifecycle: runners and the registry that owns them.

mod manager;
mod runner;
mod status;

pub use manager::PolicyManager;
pub use runner::{ONE_SHOT_DELAY, PolicyRunner, RunOutcome, RunnerContext, sanitize_name};
pub use status::{Status, StatusCell};
